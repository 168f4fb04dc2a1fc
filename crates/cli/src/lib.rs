pub mod commands;

pub const GASPROBE_VERSION_MESSAGE: &str = concat!("gasprobe ", env!("CARGO_PKG_VERSION"));
