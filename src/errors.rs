use crate::services::storage_service::StorageError;
use std::{fmt, io, process::ExitCode};

/// General failure (I/O, configuration).
pub const EXIT_FAILURE: u8 = 1;
/// Bucket or object does not exist.
pub const EXIT_NOT_FOUND: u8 = 2;
/// Stored content did not match the expected checksum.
pub const EXIT_INVALID_CHECKSUM: u8 = 3;

/// A command failure: the message shown to the user plus the process exit code.
#[derive(Debug)]
pub struct AppError {
    pub code: u8,
    pub message: String,
}

impl AppError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a general failure
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(EXIT_FAILURE, msg)
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => EXIT_NOT_FOUND,
            StorageError::InvalidChecksum { .. } => EXIT_INVALID_CHECKSUM,
            StorageError::Io(_) => EXIT_FAILURE,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(format!("{:#}", err))
    }
}
