use core::fmt::Debug;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use hashbrown::HashMap;
use serde_json::Value;
use strum::IntoEnumIterator;

use crate::{Preset, Tracer, TracerError};

/// A tracer constructor, wrapped in a smart pointer.
pub type BoxedConstructor =
    Arc<dyn Fn(Option<&Value>) -> Result<Tracer, TracerError> + Send + Sync>;

/// Wrap a function in a smart pointer so it may be placed in a [`TracerRegistry`].
pub fn constructor(
    f: impl Fn(Option<&Value>) -> Result<Tracer, TracerError> + Send + Sync + 'static,
) -> BoxedConstructor {
    Arc::new(f)
}

/// Named tracer constructors. Each name can be registered once.
#[derive(Clone)]
pub struct TracerRegistry {
    table: HashMap<String, BoxedConstructor>,
}

impl TracerRegistry {
    /// Create a registry holding the [`Preset`]s.
    #[must_use]
    pub fn new() -> Self {
        TracerRegistry::default()
    }

    /// Create an empty [`TracerRegistry`].
    #[must_use]
    pub fn empty() -> Self {
        Self { table: HashMap::default() }
    }

    /// Register `ctor` under `name`.
    pub fn register(&mut self, name: &str, ctor: BoxedConstructor) -> Result<(), TracerError> {
        if self.table.contains_key(name) {
            return Err(TracerError::DuplicateTracer(name.to_string()));
        }
        self.table.insert(name.to_string(), ctor);
        Ok(())
    }

    /// Get the constructor registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoxedConstructor> {
        self.table.get(name).cloned()
    }

    /// Construct the tracer registered under `name`.
    pub fn construct(&self, name: &str, overrides: Option<&Value>) -> Result<Tracer, TracerError> {
        let ctor = self.get(name).ok_or_else(|| TracerError::UnknownTracer(name.to_string()))?;
        ctor(overrides)
    }

    /// The registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TracerRegistry {
    fn default() -> Self {
        let table = Preset::iter()
            .map(|preset| {
                (preset.name().to_string(), constructor(move |overrides| preset.build(overrides)))
            })
            .collect();
        Self { table }
    }
}

impl Debug for TracerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerRegistry")
            .field(
                "table",
                &format_args!("{{{} tracers registered as {:?}}}", self.table.len(), self.names()),
            )
            .finish()
    }
}

fn global() -> &'static RwLock<TracerRegistry> {
    static REGISTRY: OnceLock<RwLock<TracerRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(TracerRegistry::new()))
}

/// Register `ctor` under `name` in the process-wide registry.
pub fn register(
    name: &str,
    ctor: impl Fn(Option<&Value>) -> Result<Tracer, TracerError> + Send + Sync + 'static,
) -> Result<(), TracerError> {
    let mut registry = global().write().unwrap_or_else(PoisonError::into_inner);
    registry.register(name, constructor(ctor))?;
    tracing::debug!("registered tracer `{name}`");
    Ok(())
}

/// Construct a tracer from the process-wide registry.
pub fn lookup(name: &str, overrides: Option<&Value>) -> Result<Tracer, TracerError> {
    // The lock is released before the constructor runs.
    let ctor = global().read().unwrap_or_else(PoisonError::into_inner).get(name);
    let ctor = ctor.ok_or_else(|| TracerError::UnknownTracer(name.to_string()))?;
    ctor(overrides)
}

/// The names in the process-wide registry, sorted.
#[must_use]
pub fn registered_names() -> Vec<String> {
    global().read().unwrap_or_else(PoisonError::into_inner).names()
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use crate::{Dimension, TracerConfig};

    use super::*;

    fn cycles(_: Option<&Value>) -> Result<Tracer, TracerError> {
        Tracer::new(TracerConfig::builder().dimension(Dimension::Cycles).resolution(1).build()?)
    }

    #[test]
    fn default_holds_presets() {
        let registry = TracerRegistry::new();
        assert_eq!(
            registry.names(),
            vec![
                "cycleTracer",
                "memoryTracer",
                "memoryTransactionTracer",
                "storageRateTracer",
                "storageTracer",
                "timingTracer",
            ]
        );
        assert!(TracerRegistry::empty().names().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = TracerRegistry::empty();
        registry.register("custom", constructor(cycles)).unwrap();
        let err = registry.register("custom", constructor(cycles)).unwrap_err();
        assert!(matches!(err, TracerError::DuplicateTracer(name) if name == "custom"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = TracerRegistry::new().construct("nope", None).unwrap_err();
        assert!(matches!(err, TracerError::UnknownTracer(name) if name == "nope"));
    }

    #[test]
    fn debug_lists_names() {
        let mut registry = TracerRegistry::empty();
        registry.register("b", constructor(cycles)).unwrap();
        registry.register("a", constructor(cycles)).unwrap();
        assert_eq!(
            format!("{registry:?}"),
            r#"TracerRegistry { table: {2 tracers registered as ["a", "b"]} }"#
        );
    }

    #[test]
    #[serial]
    fn global_registry() {
        let name = "registry_unit_cycles";
        if !registered_names().iter().any(|n| n == name) {
            register(name, cycles).unwrap();
        }
        assert!(matches!(register(name, cycles), Err(TracerError::DuplicateTracer(_))));
        let tracer = lookup(name, None).unwrap();
        assert_eq!(tracer.header(), vec!["opcode", "cycles", "cost"]);
        assert!(lookup("cycleTracer", None).is_ok());
    }
}
