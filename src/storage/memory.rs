//! In-memory object store
//!
//! Keeps objects in a `BTreeMap` per bucket, implements the multipart protocol
//! faithfully (objects only appear once a session completes) and records every
//! call it receives so tests can assert on the exact protocol sequence. Failures
//! can be injected per operation.

use super::error::{StorageError, StorageResult};
use super::types::{ListEntry, ListPage, PartRecord};
use super::{ObjectBody, ObjectStore};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of keys returned per listing page
const DEFAULT_PAGE_SIZE: usize = 1000;

/// One call received by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetObject {
        bucket: String,
        key: String,
    },
    ListPage {
        bucket: String,
        prefix: String,
        token: Option<String>,
    },
    OpenSession {
        bucket: String,
        key: String,
    },
    UploadPart {
        key: String,
        upload_id: String,
        part_number: i32,
        size: usize,
    },
    CompleteSession {
        key: String,
        upload_id: String,
        part_numbers: Vec<i32>,
    },
    AbortSession {
        key: String,
        upload_id: String,
    },
}

#[derive(Debug)]
struct OpenUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Debug, Default)]
struct Faults {
    open_session: bool,
    get_object: bool,
    upload_part: Option<i32>,
    complete_session: bool,
    abort_session: bool,
    list_after_pages: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    uploads: HashMap<String, OpenUpload>,
    calls: Vec<StoreCall>,
    next_upload: u64,
    pages_served: usize,
    faults: Faults,
}

/// In-memory [`ObjectStore`] for tests and local experiments
///
/// # Example
///
/// ```rust
/// use bucketferry::storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.put_object("source-bucket", "a/b.txt", b"hello".to_vec());
/// assert_eq!(store.object("source-bucket", "a/b.txt").unwrap().as_ref(), b"hello");
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    page_size: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set how many keys each listing page returns
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded calls from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object directly, bypassing the multipart protocol
    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Read back a committed object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Keys of every committed object in a bucket, in key order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of sessions opened but neither completed nor aborted
    pub fn open_session_count(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Make `open_session` fail
    pub fn fail_open_session(&self) {
        self.lock().faults.open_session = true;
    }

    /// Make `get_object_stream` fail
    pub fn fail_get_object(&self) {
        self.lock().faults.get_object = true;
    }

    /// Make `upload_part` fail for the given part number
    pub fn fail_upload_part(&self, part_number: i32) {
        self.lock().faults.upload_part = Some(part_number);
    }

    /// Make `complete_session` fail
    pub fn fail_complete_session(&self) {
        self.lock().faults.complete_session = true;
    }

    /// Make `abort_session` fail
    pub fn fail_abort_session(&self) {
        self.lock().faults.abort_session = true;
    }

    /// Make listing fail once `pages` pages have been served
    pub fn fail_listing_after(&self, pages: usize) {
        self.lock().faults.list_after_pages = Some(pages);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(operation: &str) -> StorageError {
    StorageError::Network(format!("injected {} failure", operation))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody> {
        let mut state = self.lock();
        state.calls.push(StoreCall::GetObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if state.faults.get_object {
            return Err(injected("get_object"));
        }

        let data = state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let mut state = self.lock();
        state.calls.push(StoreCall::ListPage {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: continuation_token.clone(),
        });

        if let Some(limit) = state.faults.list_after_pages {
            if state.pages_served >= limit {
                return Err(injected("list_objects"));
            }
        }
        state.pages_served += 1;

        let objects = state.buckets.get(bucket);
        let mut keys = objects
            .into_iter()
            .flat_map(|objects| objects.iter())
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| match &continuation_token {
                Some(after) => key.as_str() > after.as_str(),
                None => true,
            });

        let entries: Vec<ListEntry> = keys
            .by_ref()
            .take(self.page_size)
            .map(|(key, data)| ListEntry {
                key: key.clone(),
                size: Some(data.len() as u64),
            })
            .collect();

        let next_token = match keys.next() {
            Some(_) => entries.last().map(|entry| entry.key.clone()),
            None => None,
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }

    async fn open_session(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let mut state = self.lock();
        state.calls.push(StoreCall::OpenSession {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if state.faults.open_session {
            return Err(injected("open_session"));
        }

        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            OpenUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartRecord> {
        let mut state = self.lock();
        let size = data.len();
        state.calls.push(StoreCall::UploadPart {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
            size,
        });

        if state.faults.upload_part == Some(part_number) {
            return Err(injected("upload_part"));
        }

        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| {
            StorageError::MultipartUpload(format!("No such upload: {}", upload_id))
        })?;
        upload.parts.insert(part_number, data);

        Ok(PartRecord::new(
            part_number,
            format!("\"{}-{}\"", upload_id, part_number),
            size,
        ))
    }

    async fn complete_session(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::CompleteSession {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });

        if state.faults.complete_session {
            return Err(injected("complete_session"));
        }

        let upload = state.uploads.remove(upload_id).ok_or_else(|| {
            StorageError::MultipartUpload(format!("No such upload: {}", upload_id))
        })?;

        let mut body = BytesMut::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::MultipartUpload(format!(
                    "Part {} was never uploaded",
                    part.part_number
                ))
            })?;
            body.extend_from_slice(data);
        }

        state
            .buckets
            .entry(upload.bucket)
            .or_default()
            .insert(upload.key, body.freeze());
        Ok(())
    }

    async fn abort_session(&self, _bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::AbortSession {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });

        if state.faults.abort_session {
            return Err(injected("abort_session"));
        }

        state.uploads.remove(upload_id);
        Ok(())
    }
}
