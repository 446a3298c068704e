//! Error types for the storage boundary

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by an [`ObjectStore`](super::ObjectStore) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// AWS SDK error that did not map onto a more specific variant
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// Storage service error with a specific error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied error
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Multipart session error (missing upload id, missing ETag, ...)
    #[error("Multipart upload error: {0}")]
    MultipartUpload(String),

    /// Listing error (malformed page, stuck continuation token, ...)
    #[error("Listing error: {0}")]
    Listing(String),

    /// I/O error while reading an object body
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error with added context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        StorageError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check whether the error means the object or bucket does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Service { code, .. } => code == "NoSuchKey" || code == "NoSuchBucket",
            StorageError::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Convert AWS SDK errors to StorageError
impl<E> From<aws_sdk_s3::error::SdkError<E>> for StorageError
where
    E: std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                StorageError::Network(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::ResponseError(e) => StorageError::Network(format!("Response error: {:?}", e)),
            SdkError::TimeoutError(e) => StorageError::Timeout(format!("{:?}", e)),
            SdkError::ServiceError(e) => {
                let err_str = format!("{:?}", e);

                if err_str.contains("NoSuchKey") {
                    StorageError::Service {
                        code: "NoSuchKey".to_string(),
                        message: "The specified key does not exist".to_string(),
                    }
                } else if err_str.contains("NoSuchBucket") {
                    StorageError::Service {
                        code: "NoSuchBucket".to_string(),
                        message: "The specified bucket does not exist".to_string(),
                    }
                } else if err_str.contains("NoSuchUpload") {
                    StorageError::Service {
                        code: "NoSuchUpload".to_string(),
                        message: "The specified multipart upload does not exist".to_string(),
                    }
                } else if err_str.contains("AccessDenied") {
                    StorageError::AccessDenied("Access denied to resource".to_string())
                } else {
                    StorageError::Service {
                        code: "Unknown".to_string(),
                        message: err_str,
                    }
                }
            }
            _ => StorageError::Sdk(format!("{:?}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let base = StorageError::MultipartUpload("no upload id".to_string());
        let wrapped = base.context("opening session");

        assert!(matches!(wrapped, StorageError::WithContext { .. }));
        assert_eq!(
            wrapped.to_string(),
            "opening session: Multipart upload error: no upload id"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = StorageError::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.clone().context("get").is_not_found());

        let err = StorageError::Service {
            code: "NoSuchKey".to_string(),
            message: "gone".to_string(),
        };
        assert!(err.is_not_found());

        assert!(!StorageError::Network("reset".to_string()).is_not_found());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "body truncated");
        let err: StorageError = io_err.into();
        assert_eq!(err, StorageError::Io("body truncated".to_string()));
    }

    #[test]
    fn test_error_display_formats() {
        let err = StorageError::NotFound {
            bucket: "my-bucket".to_string(),
            key: "my-key".to_string(),
        };
        assert_eq!(err.to_string(), "Object not found: my-bucket/my-key");

        let err = StorageError::Service {
            code: "SlowDown".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "S3 service error (SlowDown): rate limited");

        let err = StorageError::Timeout("30s elapsed".to_string());
        assert_eq!(err.to_string(), "Operation timed out: 30s elapsed");
    }
}
