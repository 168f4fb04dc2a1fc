use std::time::{Duration, Instant};

use crate::{Dimension, Measurement, Sampler, SamplingUnavailable};

/// Cumulative I/O counters of the current process, as reported by `/proc/<pid>/io`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    /// Bytes read through any read-like syscall.
    pub rchar: u64,
    /// Bytes written through any write-like syscall.
    pub wchar: u64,
    /// Read syscalls.
    pub syscr: u64,
    /// Write syscalls.
    pub syscw: u64,
    /// Bytes fetched from the block layer.
    pub read_bytes: u64,
    /// Bytes sent to the block layer.
    pub write_bytes: u64,
    /// Written bytes whose write-back was cancelled (truncated pages).
    pub cancelled_write_bytes: u64,
}

impl IoCounters {
    /// Parse the contents of a `/proc/<pid>/io` file. Unknown or malformed lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut counters = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(": ") else { continue };
            let Ok(value) = value.trim().parse::<u64>() else { continue };
            let field = match key {
                "rchar" => &mut counters.rchar,
                "wchar" => &mut counters.wchar,
                "syscr" => &mut counters.syscr,
                "syscw" => &mut counters.syscw,
                "read_bytes" => &mut counters.read_bytes,
                "write_bytes" => &mut counters.write_bytes,
                "cancelled_write_bytes" => &mut counters.cancelled_write_bytes,
                _ => continue,
            };
            *field = value;
        }
        counters
    }

    fn to_measurements(self) -> Vec<Measurement> {
        [self.rchar, self.wchar, self.syscr, self.syscw, self.read_bytes, self.write_bytes]
            .into_iter()
            .map(Measurement::from)
            .collect()
    }
}

/// Read the I/O counters of the current process.
pub fn read_io_counters() -> Result<IoCounters, SamplingUnavailable> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/self/io")
            .map(|text| IoCounters::parse(&text))
            .map_err(|e| SamplingUnavailable::new(Dimension::Io, e.to_string()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(SamplingUnavailable::new(Dimension::Io, "unsupported platform"))
    }
}

type IoReader = Box<dyn FnMut() -> Result<IoCounters, SamplingUnavailable> + Send>;

/// Reports the cumulative I/O counters at each reading.
pub struct IoSampler {
    read: IoReader,
}

impl IoSampler {
    /// Create a sampler over the current process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reader(read_io_counters)
    }

    /// Create a sampler over an arbitrary counter source.
    pub fn with_reader(
        read: impl FnMut() -> Result<IoCounters, SamplingUnavailable> + Send + 'static,
    ) -> Self {
        Self { read: Box::new(read) }
    }
}

impl Default for IoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for IoSampler {
    fn dimension(&self) -> Dimension {
        Dimension::Io
    }

    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable> {
        (self.read)().map(IoCounters::to_measurements)
    }
}

/// Reports block-device throughput between consecutive readings.
///
/// Columns are read bytes/s, written bytes/s and their sum. The first reading has no
/// reference interval and reports zeros.
pub struct IoRateSampler {
    read: IoReader,
    last: Option<(IoCounters, Instant)>,
}

impl IoRateSampler {
    /// Create a sampler over the current process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reader(read_io_counters)
    }

    /// Create a sampler over an arbitrary counter source.
    pub fn with_reader(
        read: impl FnMut() -> Result<IoCounters, SamplingUnavailable> + Send + 'static,
    ) -> Self {
        Self { read: Box::new(read), last: None }
    }
}

impl Default for IoRateSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-second read, write and total block I/O between two readings.
#[must_use]
pub fn io_rates(previous: &IoCounters, current: &IoCounters, elapsed: Duration) -> [f64; 3] {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return [0.0; 3];
    }
    let read = current.read_bytes.saturating_sub(previous.read_bytes) as f64 / secs;
    let write = current.write_bytes.saturating_sub(previous.write_bytes) as f64 / secs;
    [read, write, read + write]
}

impl Sampler for IoRateSampler {
    fn dimension(&self) -> Dimension {
        Dimension::IoRate
    }

    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable> {
        let current = (self.read)()
            .map_err(|e| SamplingUnavailable { dimension: Dimension::IoRate, ..e })?;
        let now = Instant::now();
        let rates = match self.last.replace((current, now)) {
            Some((previous, at)) => io_rates(&previous, &current, now.duration_since(at)),
            None => [0.0; 3],
        };
        Ok(rates.into_iter().map(Measurement::Float).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_IO: &str = "rchar: 4096\n\
        wchar: 1024\n\
        syscr: 12\n\
        syscw: 3\n\
        read_bytes: 8192\n\
        write_bytes: 512\n\
        cancelled_write_bytes: 64\n";

    #[test]
    fn parses_proc_io() {
        let counters = IoCounters::parse(PROC_IO);
        assert_eq!(
            counters,
            IoCounters {
                rchar: 4096,
                wchar: 1024,
                syscr: 12,
                syscw: 3,
                read_bytes: 8192,
                write_bytes: 512,
                cancelled_write_bytes: 64,
            }
        );
        assert_eq!(
            counters.to_measurements(),
            [4096, 1024, 12, 3, 8192, 512].map(Measurement::Int).to_vec()
        );
    }

    #[test]
    fn ignores_garbage_lines() {
        let counters = IoCounters::parse("rchar: x\nbogus\nsyscw: 9\n");
        assert_eq!(counters.syscw, 9);
        assert_eq!(counters.rchar, 0);
    }

    #[test]
    fn rates_over_interval() {
        let previous = IoCounters { read_bytes: 1000, write_bytes: 0, ..Default::default() };
        let current = IoCounters { read_bytes: 3000, write_bytes: 500, ..Default::default() };
        let rates = io_rates(&previous, &current, Duration::from_millis(500));
        assert_eq!(rates, [4000.0, 1000.0, 5000.0]);
        assert_eq!(io_rates(&previous, &current, Duration::ZERO), [0.0; 3]);
    }

    #[test]
    fn rate_sampler_starts_at_zero() {
        let mut next = 0u64;
        let mut sampler = IoRateSampler::with_reader(move || {
            next += 4096;
            Ok(IoCounters { read_bytes: next, ..Default::default() })
        });
        assert_eq!(sampler.sample().unwrap(), vec![Measurement::Float(0.0); 3]);
        let second = sampler.sample().unwrap();
        assert_eq!(second.len(), 3);
        assert!(second[0].as_f64() >= 0.0);
    }

    #[test]
    fn reader_failure_is_reported_as_rate() {
        let mut sampler =
            IoRateSampler::with_reader(|| Err(SamplingUnavailable::new(Dimension::Io, "gone")));
        assert_eq!(sampler.sample().unwrap_err().dimension, Dimension::IoRate);
    }
}
