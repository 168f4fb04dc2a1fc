use crate::{Dimension, Measurement, Sampler, SamplingUnavailable};

const MIB: u64 = 1024 * 1024;

/// A point-in-time view of the process memory, in bytes.
///
/// On Linux the fields are derived from `/proc/self/status`: `heap_alloc` is the resident
/// anonymous memory (`RssAnon`), `heap_sys` the data segment (`VmData`), `heap_idle` the part
/// of the data segment that is not resident, `heap_inuse` the resident set (`VmRSS`),
/// `stack_in_use` the main stack (`VmStk`) and `stack_sys` the soft stack limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Heap bytes currently allocated.
    pub heap_alloc: u64,
    /// Heap bytes reserved from the operating system.
    pub heap_sys: u64,
    /// Reserved heap bytes that are not in use.
    pub heap_idle: u64,
    /// Heap bytes in use.
    pub heap_inuse: u64,
    /// Stack bytes in use.
    pub stack_in_use: u64,
    /// Stack bytes reserved.
    pub stack_sys: u64,
}

impl MemoryStats {
    /// Parse the contents of a `/proc/<pid>/status` file.
    ///
    /// `stack_limit` is used for `stack_sys`; `VmStk` is used when it is unknown.
    pub fn from_status(status: &str, stack_limit: Option<u64>) -> Result<Self, String> {
        let mut rss = None;
        let mut rss_anon = None;
        let mut data = None;
        let mut stack = 0;
        for line in status.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            let Some(bytes) = parse_kb(value) else { continue };
            match key.trim() {
                "VmRSS" => rss = Some(bytes),
                "RssAnon" => rss_anon = Some(bytes),
                "VmData" => data = Some(bytes),
                "VmStk" => stack = bytes,
                _ => {}
            }
        }

        let rss = rss.ok_or("missing VmRSS")?;
        let data = data.ok_or("missing VmData")?;
        // Kernels before 4.5 do not split the resident set.
        let heap_alloc = rss_anon.unwrap_or(rss);
        Ok(Self {
            heap_alloc,
            heap_sys: data,
            heap_idle: data.saturating_sub(heap_alloc),
            heap_inuse: rss,
            stack_in_use: stack,
            stack_sys: stack_limit.unwrap_or(stack),
        })
    }

    /// The stats in table column order, converted to whole MiB.
    #[must_use]
    pub fn to_measurements(&self) -> Vec<Measurement> {
        [
            self.heap_alloc,
            self.heap_sys,
            self.heap_idle,
            self.heap_inuse,
            self.stack_in_use,
            self.stack_sys,
        ]
        .into_iter()
        .map(|bytes| Measurement::from(bytes / MIB))
        .collect()
    }
}

/// Parses a `"  1234 kB"` field into bytes.
fn parse_kb(value: &str) -> Option<u64> {
    let mut parts = value.split_whitespace();
    let number = parts.next()?.parse::<u64>().ok()?;
    match parts.next() {
        Some("kB") => Some(number * 1024),
        None => Some(number),
        Some(_) => None,
    }
}

/// Read the memory stats of the current process.
pub fn read_memory_stats() -> Result<MemoryStats, SamplingUnavailable> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status")
            .map_err(|e| SamplingUnavailable::new(Dimension::Memory, e.to_string()))?;
        MemoryStats::from_status(&status, stack_limit())
            .map_err(|e| SamplingUnavailable::new(Dimension::Memory, e))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(SamplingUnavailable::new(Dimension::Memory, "unsupported platform"))
    }
}

#[cfg(target_os = "linux")]
fn stack_limit() -> Option<u64> {
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `limit` is a valid, writable `rlimit`.
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) };
    (ret == 0 && limit.rlim_cur != libc::RLIM_INFINITY).then_some(limit.rlim_cur as u64)
}

/// Samples heap and stack occupancy of the current process.
#[derive(Debug, Default)]
pub struct MemorySampler {
    _private: (),
}

impl MemorySampler {
    /// Create a new [`MemorySampler`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sampler for MemorySampler {
    fn dimension(&self) -> Dimension {
        Dimension::Memory
    }

    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable> {
        read_memory_stats().map(|stats| stats.to_measurements())
    }
}
