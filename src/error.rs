/*!
 * Error types for bucketferry
 */

use crate::storage::{ObjectLocator, StorageError};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_COPY_FAILED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// The identity exchange for the source account failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot assume role {role_arn}: {reason}")]
pub struct AuthorizationError {
    pub role_arn: String,
    pub reason: String,
}

impl AuthorizationError {
    pub fn new(role_arn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            reason: reason.into(),
        }
    }
}

/// Listing the source prefix failed part-way through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listing s3://{bucket}/{prefix} failed: {source}")]
pub struct EnumerationError {
    pub bucket: String,
    pub prefix: String,
    pub source: StorageError,
}

/// Step of a single object copy at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    /// Opening the multipart session on the destination
    Open,
    /// Opening or reading the source object stream
    Read,
    /// Uploading the given part
    UploadPart(i32),
    /// Committing the session
    Complete,
}

impl fmt::Display for CopyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStage::Open => write!(f, "opening upload session"),
            CopyStage::Read => write!(f, "reading source object"),
            CopyStage::UploadPart(n) => write!(f, "uploading part {}", n),
            CopyStage::Complete => write!(f, "completing upload session"),
        }
    }
}

/// Aborting a failed session failed as well
///
/// Reported alongside the [`CopyError`] that triggered the abort, never in its place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Abort of upload {upload_id} for {key} failed: {source}")]
pub struct AbortError {
    pub key: String,
    pub upload_id: String,
    pub source: StorageError,
}

/// Copying one object failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to copy {source_key} to {destination} while {stage}: {cause}")]
pub struct CopyError {
    /// Key of the source object
    pub source_key: String,

    /// Where the object was being written
    pub destination: ObjectLocator,

    /// Step that failed
    pub stage: CopyStage,

    /// Storage failure that stopped the copy
    #[source]
    pub cause: StorageError,

    /// Set when the cleanup abort failed too
    pub abort_failure: Option<AbortError>,
}

impl CopyError {
    pub fn new(
        source_key: impl Into<String>,
        destination: ObjectLocator,
        stage: CopyStage,
        cause: StorageError,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            destination,
            stage,
            cause,
            abort_failure: None,
        }
    }
}

/// Run-level error; every variant terminates the run
#[derive(Error, Debug)]
pub enum TransferError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage client could not be built
    #[error("Failed to build storage client: {0}")]
    Client(#[source] StorageError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error(transparent)]
    Copy(#[from] CopyError),
}

impl TransferError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TransferError::Copy(_) => EXIT_COPY_FAILED,
            TransferError::Config(_)
            | TransferError::Client(_)
            | TransferError::Authorization(_)
            | TransferError::Enumeration(_) => EXIT_FATAL,
        }
    }

    /// Key of the object whose copy failed, if this is a copy failure
    pub fn failed_key(&self) -> Option<&str> {
        match self {
            TransferError::Copy(e) => Some(&e.source_key),
            _ => None,
        }
    }
}
