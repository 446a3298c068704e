/*!
 * Lazy enumeration of the objects under a prefix
 */

use crate::error::EnumerationError;
use crate::storage::{ObjectLocator, ObjectStore, StorageError};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

/// A listed object with the size reported by the listing, when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub locator: ObjectLocator,
    pub size: Option<u64>,
}

/// Flattens a paginated prefix listing into one stream of [`ObjectLocator`]s
///
/// Nothing is fetched until the stream is polled. Pages are requested one at a
/// time as the previous one is drained; empty pages are skipped and only the absence
/// of a continuation token ends the stream. A failed page yields a single
/// [`EnumerationError`] and ends the stream.
#[derive(Clone, Copy)]
pub struct ObjectEnumerator<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectEnumerator<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// List every object under `prefix` in `bucket`
    pub fn list_objects(
        &self,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> BoxStream<'a, Result<ObjectLocator, EnumerationError>> {
        self.list_entries(bucket, prefix)
            .map_ok(|listed| listed.locator)
            .boxed()
    }

    /// Like [`list_objects`](Self::list_objects), keeping each listed size
    pub fn list_entries(
        &self,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> BoxStream<'a, Result<ListedObject, EnumerationError>> {
        let store = self.store;
        let bucket = bucket.into();
        let prefix = prefix.into();

        // `Some(token)` means another page must be fetched; `None` means done.
        let pages = stream::try_unfold(Some(None::<String>), move |cursor| {
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move {
                let Some(token) = cursor else {
                    return Ok(None);
                };

                let fail = |source: StorageError| EnumerationError {
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                    source,
                };

                let page = store
                    .list_objects_page(&bucket, &prefix, token.clone())
                    .await
                    .map_err(&fail)?;

                if token.is_some() && page.next_token == token {
                    return Err(fail(StorageError::Listing(format!(
                        "continuation token {:?} did not advance",
                        token
                    ))));
                }

                debug!(
                    bucket = %bucket,
                    prefix = %prefix,
                    entries = page.entries.len(),
                    more = page.next_token.is_some(),
                    "Fetched listing page"
                );

                let listed: Vec<ListedObject> = page
                    .entries
                    .into_iter()
                    .map(|entry| ListedObject {
                        locator: ObjectLocator::new(bucket.clone(), entry.key),
                        size: entry.size,
                    })
                    .collect();

                Ok::<_, EnumerationError>(Some((listed, page.next_token.map(Some))))
            }
        });

        pages
            .map_ok(|listed| stream::iter(listed.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
