//! Error types for the i915-perfmon library

use crate::command::PerfmonOp;
use std::io;
use thiserror::Error;

/// Main error type for perfmon operations
#[derive(Error, Debug)]
pub enum PerfmonError {
    /// The perfmon control call returned nonzero
    ///
    /// `code` is what the C interface returns for the operation: the raw
    /// ioctl result for most operations, `-errno` for pin/unpin.
    #[error("{op} failed: {code}")]
    ControlCall {
        /// Operation that was submitted
        op: PerfmonOp,
        /// Result code
        code: i32,
    },

    /// Failed to open device
    #[error("Failed to open device: {0}")]
    DeviceOpen(io::Error),

    /// No DRM device found on the system
    #[error("No DRM device found")]
    NoDevice,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PerfmonError {
    /// Integer a C caller would have received for this failure
    pub fn code(&self) -> i32 {
        match self {
            PerfmonError::ControlCall { code, .. } => *code,
            PerfmonError::DeviceOpen(err) => -err.raw_os_error().unwrap_or(libc::EIO),
            PerfmonError::NoDevice => -libc::ENOENT,
            PerfmonError::Config(_) | PerfmonError::Json(_) => -libc::EINVAL,
        }
    }
}

impl From<io::Error> for PerfmonError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => PerfmonError::NoDevice,
            _ => PerfmonError::DeviceOpen(err),
        }
    }
}

/// Result type for perfmon operations
pub type PerfmonResult<T> = std::result::Result<T, PerfmonError>;

/// Collapse an operation result into its C-style status code, 0 on success
pub fn status_code(result: &PerfmonResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}
