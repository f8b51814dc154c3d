//! Library-wide error taxonomy.

use thiserror::Error;

/// Errors surfaced by plan construction, caching, and execution.
///
/// The variants map one-to-one onto the status codes of the C-style host API:
/// a `Result<T>` of `Ok` is `success`, everything else names the failure.
#[derive(Debug, Error)]
pub enum FftError {
    /// The caller handed us a description that cannot describe any transform
    /// (inconsistent lengths/strides, mismatched real/hermitian pairing,
    /// in-place layout violations, malformed cache payloads).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The description is well-formed but no decomposition, fuse, and buffer
    /// assignment covers it with the kernels we have.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Device or host allocation failed (twiddles, temp buffers).
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// The driver rejected a launch, copy, or compile.
    #[error("device failure: {0}")]
    DeviceFailure(String),

    /// A caller-supplied work buffer is smaller than the plan requires.
    #[error("invalid work buffer: plan needs {needed} bytes, caller supplied {supplied}")]
    InvalidWorkBuffer { needed: usize, supplied: usize },
}

pub type Result<T> = std::result::Result<T, FftError>;

impl FftError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        FftError::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        FftError::UnsupportedConfiguration(msg.into())
    }
}
