//! Fabric error taxonomy (component A) and the crate's public error type (component K).

use std::fmt;

use thiserror::Error;

/// Offset applied to fabric-specific error codes so they never collide with
/// ordinary OS errno values returned by the same call sites.
pub const KFI_ERRNO_OFFSET: i32 = 256;
/// Offset applied to provider-only error codes (truncation, overrun, ...).
pub const KFI_ERRNO_PROV_OFFSET: i32 = 512;

/// The fabric's own error taxonomy, disjoint from `std::io::ErrorKind`.
///
/// Every fallible call into the provider (see the consumed interface) returns
/// one of these on failure. Conversion from the raw encoded integer is total:
/// an unrecognized code becomes [`FabricError::Other`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FabricError {
    /// Operation would block; retry later.
    #[error("fabric operation would block (try again)")]
    Again,
    /// Invalid argument to a fabric call.
    #[error("invalid argument")]
    InvalidArg,
    /// Fabric resource exhaustion.
    #[error("out of memory")]
    NoMem,
    /// No data available (empty completion queue).
    #[error("no data available")]
    NoData,
    /// Message too long for the operation.
    #[error("message too long")]
    MsgSize,
    /// Operation not supported by this provider.
    #[error("operation not supported")]
    NotSupported,
    /// Requested entry does not exist.
    #[error("no such entry")]
    NoEntry,
    /// Resource is busy (non-zero usage count).
    #[error("resource busy")]
    Busy,
    /// Network is down.
    #[error("network down")]
    NetworkDown,
    /// Network is unreachable.
    #[error("network unreachable")]
    NetworkUnreachable,
    /// Connection refused.
    #[error("connection refused")]
    ConnRefused,
    /// Connection reset.
    #[error("connection reset")]
    ConnReset,
    /// Operation timed out.
    #[error("timed out")]
    TimedOut,
    /// Endpoint is not connected.
    #[error("not connected")]
    NotConnected,
    /// Permission denied (e.g. no VNI available).
    #[error("permission denied")]
    Access,
    /// Operation was canceled (e.g. a QP in flush/error state).
    #[error("operation canceled")]
    Canceled,
    /// Provider-specific: data was truncated.
    #[error("data truncated")]
    Truncated,
    /// Provider-specific: a queue overran.
    #[error("queue overrun")]
    Overrun,
    /// Provider-specific: an error with no closer classification.
    #[error("unclassified fabric error")]
    Other,
}

impl FabricError {
    /// Decode a raw, offset-encoded fabric return value (always negative, or
    /// the offset-encoded positive magnitude, per provider convention: `-err`
    /// or `err` both accepted since call sites vary in sign convention).
    pub fn from_raw(code: i32) -> Self {
        let code = code.abs();
        match code - KFI_ERRNO_OFFSET {
            1 => FabricError::Again,
            2 => FabricError::InvalidArg,
            3 => FabricError::NoMem,
            4 => FabricError::NoData,
            5 => FabricError::MsgSize,
            6 => FabricError::NotSupported,
            7 => FabricError::NoEntry,
            8 => FabricError::Busy,
            9 => FabricError::NetworkDown,
            10 => FabricError::NetworkUnreachable,
            11 => FabricError::ConnRefused,
            12 => FabricError::ConnReset,
            13 => FabricError::TimedOut,
            14 => FabricError::NotConnected,
            15 => FabricError::Access,
            16 => FabricError::Canceled,
            _ => match code - KFI_ERRNO_PROV_OFFSET {
                1 => FabricError::Truncated,
                2 => FabricError::Overrun,
                3 => FabricError::Other,
                _ => FabricError::Other,
            },
        }
    }

    /// Whether this error indicates the caller should retry later rather
    /// than treat the operation as failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FabricError::Again)
    }
}

/// The verbs-style completion status that a [`FabricError`] (or success)
/// renders to. See component D for where this is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcStatus {
    Success,
    LocalLengthError,
    LocalProtectionError,
    WrFlushError,
    GeneralError,
}

impl fmt::Display for WcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WcStatus::Success => "success",
            WcStatus::LocalLengthError => "local length error",
            WcStatus::LocalProtectionError => "local protection error",
            WcStatus::WrFlushError => "flush error",
            WcStatus::GeneralError => "general error",
        };
        f.write_str(s)
    }
}

impl From<FabricError> for WcStatus {
    /// The mapping is fixed and total: every taxonomy code maps to exactly
    /// one work-completion status (truncation -> local length, permission ->
    /// local protection, canceled -> flush, everything else -> general).
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::Truncated => WcStatus::LocalLengthError,
            FabricError::Access => WcStatus::LocalProtectionError,
            FabricError::Canceled => WcStatus::WrFlushError,
            _ => WcStatus::GeneralError,
        }
    }
}

/// The crate's public error type. Composes the fabric taxonomy with the
/// small number of shim-level failure modes that never reach the fabric.
#[derive(Debug, Error)]
pub enum Error {
    /// A fabric call failed; see [`FabricError`] for the category.
    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),

    /// A requested capability exceeds what the device reports.
    #[error("capability not supported: {0}")]
    CapabilityNotSupported(&'static str),

    /// The mount-option VNI could not be parsed.
    #[error("invalid VNI in mount options: {0}")]
    InvalidMountOption(String),

    /// A destroy was attempted on a resource with nonzero usage.
    #[error("resource is still in use")]
    Busy,
}

pub type Result<T> = std::result::Result<T, Error>;
