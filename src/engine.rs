/*!
 * Streaming multipart copy of a single object
 *
 * One call to [`StreamingCopyEngine::copy_one`] walks the session through
 * `Open -> Streaming -> Completing` and, on any failure after the session exists,
 * through `Aborting`. The source body is read one chunk at a time and every chunk
 * is uploaded before the next one is read, so memory use is bounded by the chunk
 * size regardless of object size.
 */

use crate::error::{AbortError, CopyError, CopyStage};
use crate::storage::{
    ObjectLocator, ObjectStore, PartRecord, StorageError, DEFAULT_CHUNK_SIZE, MAX_PARTS,
};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Splits a byte stream into fixed-size chunks
///
/// Every chunk but the last is exactly `chunk_size` bytes. An empty stream yields a
/// single empty chunk, so a zero-byte object still produces one part.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    chunks_read: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            chunks_read: 0,
            eof: false,
        }
    }

    /// Read the next chunk; `None` once the stream is exhausted
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        while buf.len() < self.chunk_size {
            let remaining = (self.chunk_size - buf.len()) as u64;
            let n = (&mut self.reader).take(remaining).read_buf(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
        }

        if buf.is_empty() && self.chunks_read > 0 {
            return Ok(None);
        }

        self.chunks_read += 1;
        Ok(Some(buf.freeze()))
    }
}

/// Terminal state of an [`UploadSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Completed,
    Aborted,
}

/// An open multipart session on the destination
#[derive(Debug)]
pub struct UploadSession {
    destination: ObjectLocator,
    upload_id: String,
    parts: Vec<PartRecord>,
    status: SessionStatus,
}

impl UploadSession {
    fn new(destination: ObjectLocator, upload_id: String) -> Self {
        Self {
            destination,
            upload_id,
            parts: Vec::new(),
            status: SessionStatus::Open,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    fn next_part_number(&self) -> i32 {
        self.parts.len() as i32 + 1
    }

    /// Append a part; numbers must stay contiguous from 1
    fn record_part(&mut self, part: PartRecord) -> Result<(), StorageError> {
        let expected = self.next_part_number();
        if part.part_number != expected {
            return Err(StorageError::MultipartUpload(format!(
                "storage acknowledged part {} but part {} was uploaded",
                part.part_number, expected
            )));
        }
        self.parts.push(part);
        Ok(())
    }

    fn finish(&mut self, status: SessionStatus) {
        debug_assert_eq!(
            self.status,
            SessionStatus::Open,
            "session {} finished twice",
            self.upload_id
        );
        self.status = status;
    }
}

/// Result of a successful single-object copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedObject {
    pub source: ObjectLocator,
    pub destination: ObjectLocator,
    pub upload_id: String,
    pub bytes: u64,
    pub parts: Vec<PartRecord>,
}

enum CopyState {
    Streaming,
    Completing { bytes: u64 },
    Aborting(CopyError),
}

/// Copies one object through a destination multipart session
#[derive(Debug, Clone, Copy)]
pub struct StreamingCopyEngine {
    chunk_size: usize,
}

impl Default for StreamingCopyEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamingCopyEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `source` into `destination`
    ///
    /// The destination object only becomes visible if every part uploads and the
    /// session completes. On any later failure the session is aborted exactly once;
    /// if that abort fails too, the abort error is logged and attached to the
    /// returned [`CopyError`], which still reports the original failure.
    pub async fn copy_one(
        &self,
        source_store: &dyn ObjectStore,
        dest_store: &dyn ObjectStore,
        source: &ObjectLocator,
        destination: &ObjectLocator,
    ) -> Result<CopiedObject, CopyError> {
        self.copy_with_size_hint(source_store, dest_store, source, destination, None)
            .await
    }

    /// Largest object one session can hold at this chunk size
    pub fn max_object_size(&self) -> u64 {
        self.chunk_size as u64 * MAX_PARTS as u64
    }

    /// [`copy_one`](Self::copy_one) with the size reported by the listing
    ///
    /// An object known to need more than [`MAX_PARTS`] parts is rejected before
    /// any session is opened.
    pub async fn copy_with_size_hint(
        &self,
        source_store: &dyn ObjectStore,
        dest_store: &dyn ObjectStore,
        source: &ObjectLocator,
        destination: &ObjectLocator,
        size_hint: Option<u64>,
    ) -> Result<CopiedObject, CopyError> {
        if let Some(size) = size_hint.filter(|&size| size > self.max_object_size()) {
            return Err(CopyError::new(
                &source.key,
                destination.clone(),
                CopyStage::Open,
                too_many_parts(size, self.chunk_size),
            ));
        }

        let upload_id = dest_store
            .open_session(&destination.bucket, &destination.key)
            .await
            .map_err(|e| CopyError::new(&source.key, destination.clone(), CopyStage::Open, e))?;

        debug!(key = %destination.key, upload_id = %upload_id, "Opened upload session");
        let mut session = UploadSession::new(destination.clone(), upload_id);

        let mut state = CopyState::Streaming;
        loop {
            state = match state {
                CopyState::Streaming => {
                    match self
                        .stream_parts(source_store, dest_store, source, &mut session)
                        .await
                    {
                        Ok(bytes) => CopyState::Completing { bytes },
                        Err(e) => CopyState::Aborting(e),
                    }
                }
                CopyState::Completing { bytes } => {
                    match dest_store
                        .complete_session(
                            &destination.bucket,
                            &destination.key,
                            &session.upload_id,
                            &session.parts,
                        )
                        .await
                    {
                        Ok(()) => {
                            session.finish(SessionStatus::Completed);
                            info!(
                                source = %source,
                                destination = %destination,
                                bytes,
                                parts = session.parts.len(),
                                "Completed upload session"
                            );
                            return Ok(CopiedObject {
                                source: source.clone(),
                                destination: destination.clone(),
                                upload_id: session.upload_id,
                                bytes,
                                parts: session.parts,
                            });
                        }
                        Err(e) => CopyState::Aborting(CopyError::new(
                            &source.key,
                            destination.clone(),
                            CopyStage::Complete,
                            e,
                        )),
                    }
                }
                CopyState::Aborting(mut error) => {
                    warn!(
                        key = %destination.key,
                        upload_id = %session.upload_id,
                        error = %error.cause,
                        "Aborting upload session"
                    );
                    if let Err(e) = dest_store
                        .abort_session(&destination.bucket, &destination.key, &session.upload_id)
                        .await
                    {
                        let abort_error = AbortError {
                            key: destination.key.clone(),
                            upload_id: session.upload_id.clone(),
                            source: e,
                        };
                        warn!(error = %abort_error, "Abort failed; upload may linger until lifecycle cleanup");
                        error.abort_failure = Some(abort_error);
                    }
                    session.finish(SessionStatus::Aborted);
                    return Err(error);
                }
            };
        }
    }

    /// Read the source one chunk at a time, uploading each chunk as the next part
    async fn stream_parts(
        &self,
        source_store: &dyn ObjectStore,
        dest_store: &dyn ObjectStore,
        source: &ObjectLocator,
        session: &mut UploadSession,
    ) -> Result<u64, CopyError> {
        let destination = session.destination.clone();
        let fail = |stage: CopyStage, cause: StorageError| {
            CopyError::new(&source.key, destination.clone(), stage, cause)
        };

        let body = source_store
            .get_object_stream(&source.bucket, &source.key)
            .await
            .map_err(|e| fail(CopyStage::Read, e))?;

        let mut chunks = ChunkReader::new(body, self.chunk_size);
        let mut bytes = 0u64;

        while let Some(chunk) = chunks
            .next_chunk()
            .await
            .map_err(|e| fail(CopyStage::Read, e.into()))?
        {
            let part_number = session.next_part_number();
            let size = chunk.len();
            if part_number > MAX_PARTS {
                return Err(fail(
                    CopyStage::UploadPart(part_number),
                    too_many_parts(bytes + size as u64, self.chunk_size),
                ));
            }

            let part = dest_store
                .upload_part(
                    &destination.bucket,
                    &destination.key,
                    &session.upload_id,
                    part_number,
                    chunk,
                )
                .await
                .map_err(|e| fail(CopyStage::UploadPart(part_number), e))?;

            session
                .record_part(part)
                .map_err(|e| fail(CopyStage::UploadPart(part_number), e))?;
            bytes += size as u64;

            debug!(key = %destination.key, part_number, size, "Uploaded part");
        }

        Ok(bytes)
    }
}

fn too_many_parts(size: u64, chunk_size: usize) -> StorageError {
    StorageError::MultipartUpload(format!(
        "{} bytes need more than {} parts of {} bytes",
        size, MAX_PARTS, chunk_size
    ))
}
