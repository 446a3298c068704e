//! Object storage boundary
//!
//! Everything the transfer engine needs from an object store is expressed by the
//! [`ObjectStore`] trait: reading an object as a byte stream, listing a prefix one
//! page at a time, and the four multipart session calls.
//!
//! Two implementations ship with the crate:
//!
//! - [`S3Store`] wraps `aws-sdk-s3` and talks to AWS S3 or an S3-compatible service
//! - [`MemoryStore`] keeps objects in memory, records every call and can inject
//!   failures; it backs the test suite
//!
//! # Example
//!
//! ```ignore
//! use bucketferry::storage::{ObjectStore, S3Store, S3StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = S3Store::from_env(&S3StoreConfig::default()).await?;
//!     let page = store.list_objects_page("my-bucket", "logs/", None).await?;
//!     for entry in page.entries {
//!         println!("{}", entry.key);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod memory;
mod s3;
mod types;


use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::AsyncRead;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, StoreCall};
pub use s3::{S3Store, S3StoreConfig};
pub use types::{ListEntry, ListPage, ObjectLocator, PartRecord};

/// Default multipart chunk size (5 MiB - minimum part size for S3)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Minimum multipart chunk size accepted by S3 for every part but the last
pub const MIN_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Maximum multipart chunk size (5 GiB)
pub const MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts in one multipart session
pub const MAX_PARTS: i32 = 10_000;

/// Readable body of a stored object
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Operations the transfer engine needs from an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a read stream over an object
    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody>;

    /// Fetch one page of keys under `prefix`
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Start a multipart session and return its upload id
    async fn open_session(&self, bucket: &str, key: &str) -> StorageResult<String>;

    /// Upload one part of an open session
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartRecord>;

    /// Commit a session from its ordered parts
    async fn complete_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<()>;

    /// Discard an open session and any parts uploaded to it
    async fn abort_session(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()>;
}
