//! Type definitions shared across the storage boundary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocator {
    /// Bucket name
    pub bucket: String,

    /// Object key (full path within the bucket)
    pub key: String,
}

impl ObjectLocator {
    /// Create a new locator
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Locator for the same key in another bucket
    pub fn in_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: self.key.clone(),
        }
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Object key
    pub key: String,

    /// Object size in bytes, when the listing reports it
    pub size: Option<u64>,
}

impl ListEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
        }
    }
}

/// A single page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries on this page; may be empty even when more pages follow
    pub entries: Vec<ListEntry>,

    /// Token for the next page; `None` ends the listing
    pub next_token: Option<String>,
}

/// Metadata for one uploaded part of a multipart session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    /// Part number (1-indexed)
    pub part_number: i32,

    /// Checksum tag (ETag) assigned by the storage layer
    pub etag: String,

    /// Size of the part in bytes
    pub size: usize,
}

impl PartRecord {
    /// Create a new part record
    pub fn new(part_number: i32, etag: impl Into<String>, size: usize) -> Self {
        Self {
            part_number,
            etag: etag.into(),
            size,
        }
    }
}
