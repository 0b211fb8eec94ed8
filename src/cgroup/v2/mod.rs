//! Readers for cgroup v2 (unified hierarchy) controllers.
//!
//! Same soft-missing convention as the v1 readers: a missing interface file
//! leaves its fields absent, malformed content is a hard error. Limit files
//! use the literal `max` sentinel instead of v1's `-1`.

mod cpu;
mod io;
mod memory;

pub use cpu::{CpuStats, CpuSubsystem};
pub use io::{DeviceIndex, IoDeviceStats, IoSubsystem};
pub use memory::{MemLimit, MemoryData, MemoryEvents, MemoryStats, MemorySubsystem};
