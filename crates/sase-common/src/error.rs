//! Error types for OpenSASE classification

use thiserror::Error;

use crate::GateId;

const EINVAL: i32 = 22;
const EEXIST: i32 = 17;
const ENOENT: i32 = 2;
const ENOSPC: i32 = 28;
const EIO: i32 = 5;

/// OpenSASE error type
///
/// Every variant is a control-plane failure returned synchronously to the
/// caller of a mutating operation. The packet path never produces one.
#[derive(Error, Debug)]
pub enum SaseError {
    /// Malformed field spec, count mismatch or bad field value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Gate is neither a valid output nor the drop gate
    #[error("invalid gate: {0}")]
    InvalidGate(GateId),

    /// Masked key already present
    #[error("rule already exists")]
    DuplicateRule,

    /// Delete target is not installed
    #[error("rule not found")]
    NotFound,

    /// Fixed-size resource exhausted (tuples, fields, metadata)
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Metadata attribute name is unknown
    #[error("unresolved attribute: {0}")]
    Unresolved(String),

    /// Configuration file could not be decoded
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SaseError {
    /// Errno-style code reported by command layers.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::InvalidGate(_) | Self::Config(_) => EINVAL,
            Self::DuplicateRule => EEXIST,
            Self::NotFound | Self::Unresolved(_) => ENOENT,
            Self::CapacityExceeded(_) => ENOSPC,
            Self::Io(_) => EIO,
        }
    }

    /// Shorthand for [`SaseError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type for OpenSASE
pub type SaseResult<T> = Result<T, SaseError>;
