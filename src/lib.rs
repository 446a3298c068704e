/*!
 * bucketferry - cross-account S3 bulk copy
 *
 * Copies every object under a prefix of a bucket owned by another AWS account
 * into a bucket owned by the caller:
 * - Temporary source credentials from an assumed role
 * - Lazy, paginated enumeration of the source prefix
 * - Streaming multipart copy with memory bounded by the chunk size
 * - Abort of partially written uploads on failure
 * - Sequential, fail-fast runs with a per-object report
 */

pub mod config;
pub mod credentials;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod storage;

// Re-export commonly used types
pub use config::{LogLevel, TransferConfig};
pub use credentials::{CredentialBroker, CredentialBundle, IdentityIssuer, StsIssuer};
pub use engine::{CopiedObject, StreamingCopyEngine};
pub use enumerator::{ListedObject, ObjectEnumerator};
pub use error::{
    AbortError, AuthorizationError, CopyError, CopyStage, EnumerationError, Result,
    TransferError,
};
pub use orchestrator::{
    CopyOrchestrator, CopyOutcome, CopyStatus, ProgressEvent, RunReport, S3Connector,
    StoreConnector,
};
pub use storage::{ObjectLocator, ObjectStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
