//! Compile-time tunables and the mount-option configuration surface (component L).
//!
//! Values mirror the constants carried by the original kernel module
//! (`KFI_MAX_SGE`, `KFI_DEFAULT_CQ_SIZE`, ...); they are grouped here as
//! associated constants rather than free `const` items so each has a single,
//! discoverable home.

/// Tunables shared across the crate.
pub struct Config;

impl Config {
    /// Maximum scatter-gather elements per work request.
    pub const MAX_SGE: usize = 16;
    /// Maximum bytes eligible for inline send data.
    pub const MAX_INLINE: usize = 512;
    /// Default completion queue capacity.
    pub const DEFAULT_CQ_DEPTH: u32 = 1024;
    /// Default queue pair send/recv depth.
    pub const DEFAULT_QP_DEPTH: u32 = 256;
    /// Default memory-region cache capacity (number of entries).
    pub const MR_CACHE_SIZE: usize = 1024;
    /// Maximum number of memory regions a device will track.
    pub const MR_MAX_REGIONS: usize = 8192;
    /// Number of completions drained per progress-engine poll.
    pub const PROGRESS_POLL_BATCH: usize = 16;
    /// Sleep range (microseconds) after a transient-empty poll.
    pub const PROGRESS_EMPTY_SLEEP_US: (u64, u64) = (10, 100);
    /// Sleep range (milliseconds) after any other poll error.
    pub const PROGRESS_ERROR_SLEEP_MS: (u64, u64) = (1, 5);
    /// Maximum valid VNI value.
    pub const VNI_MAX: u32 = 65535;
    /// Maximum descriptors in one batched submission.
    pub const MAX_BATCH_SIZE: usize = 16;
}
