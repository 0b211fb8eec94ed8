//! Readers for cgroup v1 subsystems.
//!
//! Each reader knows the file set and format of one v1 subsystem. Missing
//! files are treated as "feature disabled on this kernel" and leave the
//! corresponding fields absent; malformed content is a hard error.

mod blkio;
mod cpu;
mod cpuacct;
mod memory;

pub use blkio::{BlkioSubsystem, DeviceStats, OperationValues, TotalIo};
pub use cpu::{CfsLimits, CpuSubsystem, RtLimits, ThrottleStats};
pub use cpuacct::CpuAccountingSubsystem;
pub use memory::{MemoryData, MemoryStats, MemorySubsystem};
