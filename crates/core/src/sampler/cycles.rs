use crate::{Dimension, Measurement, Sampler, SamplingUnavailable};

/// Counts CPU cycles between consecutive readings.
///
/// The counter is opened lazily on the first reading, so it follows the thread that drives the
/// tracer callbacks rather than the one that built the tracer. A hardware counter from
/// `perf_event_open` is preferred; on x86_64 the time-stamp counter is used when it cannot be
/// opened. The first reading returns 0.
#[derive(Debug, Default)]
pub struct CycleSampler {
    source: Option<CycleSource>,
}

#[derive(Debug)]
enum CycleSource {
    #[cfg(all(target_os = "linux", not(gasprobe_no_perf)))]
    Perf(perf::PerfCounter),
    #[cfg(target_arch = "x86_64")]
    Tsc { last: u64 },
    Unavailable(String),
}

impl CycleSampler {
    /// Create a new [`CycleSampler`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open() -> CycleSource {
        #[cfg(all(target_os = "linux", not(gasprobe_no_perf)))]
        match perf::PerfCounter::open() {
            Ok(counter) => return CycleSource::Perf(counter),
            Err(e) => tracing::debug!("perf cycle counter unavailable: {e}"),
        }

        #[cfg(target_arch = "x86_64")]
        {
            CycleSource::Tsc { last: tsc() }
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            CycleSource::Unavailable("no cycle counter on this platform".to_string())
        }
    }
}

impl Sampler for CycleSampler {
    fn dimension(&self) -> Dimension {
        Dimension::Cycles
    }

    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable> {
        let source = match &mut self.source {
            Some(source) => source,
            slot @ None => {
                let source = Self::open();
                let first = match &source {
                    CycleSource::Unavailable(reason) => {
                        tracing::warn!("cycle sampling disabled: {reason}");
                        Err(SamplingUnavailable::new(Dimension::Cycles, reason.clone()))
                    }
                    #[allow(unreachable_patterns)]
                    _ => Ok(vec![Measurement::Int(0)]),
                };
                *slot = Some(source);
                return first;
            }
        };

        let cycles = match source {
            #[cfg(all(target_os = "linux", not(gasprobe_no_perf)))]
            CycleSource::Perf(counter) => counter
                .read_and_reset()
                .map_err(|e| SamplingUnavailable::new(Dimension::Cycles, e.to_string()))?,
            #[cfg(target_arch = "x86_64")]
            CycleSource::Tsc { last } => {
                let now = tsc();
                let elapsed = now.wrapping_sub(*last);
                *last = now;
                elapsed
            }
            CycleSource::Unavailable(reason) => {
                return Err(SamplingUnavailable::new(Dimension::Cycles, reason.clone()))
            }
        };
        Ok(vec![Measurement::from(cycles)])
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn tsc() -> u64 {
    // SAFETY: `rdtsc` is available on every x86_64 CPU and has no side effects.
    #[allow(unused_unsafe)]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
}

#[cfg(all(target_os = "linux", not(gasprobe_no_perf)))]
mod perf {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    const PERF_TYPE_HARDWARE: u32 = 0;
    const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
    const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;
    const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;

    // Bits of `perf_event_attr.flags`.
    const EXCLUDE_KERNEL: u64 = 1 << 5;
    const EXCLUDE_HV: u64 = 1 << 6;

    /// `perf_event_attr` up to `PERF_ATTR_SIZE_VER1`.
    #[repr(C)]
    #[derive(Default)]
    struct PerfEventAttr {
        type_: u32,
        size: u32,
        config: u64,
        sample_period: u64,
        sample_type: u64,
        read_format: u64,
        flags: u64,
        wakeup_events: u32,
        bp_type: u32,
        config1: u64,
        config2: u64,
    }

    /// A user-space cycle counter for the calling thread.
    #[derive(Debug)]
    pub(super) struct PerfCounter {
        fd: OwnedFd,
    }

    impl PerfCounter {
        pub(super) fn open() -> io::Result<Self> {
            let attr = PerfEventAttr {
                type_: PERF_TYPE_HARDWARE,
                size: core::mem::size_of::<PerfEventAttr>() as u32,
                config: PERF_COUNT_HW_CPU_CYCLES,
                // Kernel and hypervisor cycles need a permissive `perf_event_paranoid`.
                flags: EXCLUDE_KERNEL | EXCLUDE_HV,
                ..Default::default()
            };
            // SAFETY: `attr` outlives the call and is laid out as the kernel expects.
            let fd = unsafe {
                libc::syscall(
                    libc::SYS_perf_event_open,
                    &attr as *const PerfEventAttr,
                    0 as libc::pid_t,
                    -1 as libc::c_int,
                    -1 as libc::c_int,
                    PERF_FLAG_FD_CLOEXEC,
                )
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: the syscall returned a fresh descriptor that nothing else owns.
            Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd as libc::c_int) } })
        }

        /// Returns the cycles counted since the previous reset and restarts the count.
        pub(super) fn read_and_reset(&mut self) -> io::Result<u64> {
            let mut buf = [0u8; 8];
            let fd = self.fd.as_raw_fd();
            // SAFETY: `buf` is valid for 8 bytes of writes.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n != 8 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: RESET takes no argument beyond the descriptor.
            if unsafe { libc::ioctl(fd, PERF_EVENT_IOC_RESET as _, 0) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(u64::from_ne_bytes(buf))
        }
    }
}
