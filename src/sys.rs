//! Host facts needed to interpret kernel accounting values.
//!
//! The kernel reports some CPU accounting values in clock ticks, and CPU
//! percentages are normalized by the number of logical cores. Both values are
//! constant for the lifetime of the process, so they are queried once and
//! passed by reference into the readers that need them.

/// Per-host constants queried once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysConf {
    /// Clock ticks per second (`_SC_CLK_TCK`), used to convert `cpuacct.stat`
    /// values to nanoseconds.
    pub ticks_per_sec: u64,
    /// Number of logical CPUs (`_SC_NPROCESSORS_ONLN`), used to normalize
    /// CPU percentages.
    pub logical_cpus: usize,
}

const DEFAULT_TICKS_PER_SEC: u64 = 100;

impl SysConf {
    /// Queries the host. Falls back to the conventional 100 ticks/sec and a
    /// single CPU if `sysconf` reports nothing usable.
    pub fn detect() -> Self {
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        Self {
            ticks_per_sec: if ticks > 0 {
                ticks as u64
            } else {
                DEFAULT_TICKS_PER_SEC
            },
            logical_cpus: if cpus > 0 { cpus as usize } else { 1 },
        }
    }

    /// Converts a value in clock ticks to nanoseconds, saturating on
    /// implausibly large counter values.
    pub fn ticks_to_ns(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(1_000_000_000 / self.ticks_per_sec)
    }
}

impl Default for SysConf {
    fn default() -> Self {
        Self::detect()
    }
}
