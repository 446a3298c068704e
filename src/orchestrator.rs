/*!
 * Run-level coordination of a cross-account copy
 *
 * [`CopyOrchestrator::run`] assumes the source role once, builds a source client
 * from the resulting bundle and a destination client from the caller's own
 * identity, then copies every object under the prefix one at a time. The first
 * failure ends the run.
 */

use crate::config::TransferConfig;
use crate::credentials::{CredentialBroker, CredentialBundle, StsIssuer};
use crate::engine::{CopiedObject, StreamingCopyEngine};
use crate::enumerator::ObjectEnumerator;
use crate::error::{CopyError, Result, TransferError};
use crate::storage::{ObjectLocator, ObjectStore, S3Store, S3StoreConfig, StorageResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info, warn};

/// Builds the storage clients for a run
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Client scoped to the source account through `bundle`
    async fn source_store(&self, bundle: &CredentialBundle) -> StorageResult<Arc<dyn ObjectStore>>;

    /// Client using the caller's ambient identity
    async fn destination_store(&self) -> StorageResult<Arc<dyn ObjectStore>>;
}

/// [`StoreConnector`] producing [`S3Store`]s
#[derive(Debug, Clone, Default)]
pub struct S3Connector {
    source: S3StoreConfig,
    destination: S3StoreConfig,
}

impl S3Connector {
    pub fn new(source: S3StoreConfig, destination: S3StoreConfig) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.source_store_config(), config.dest_store_config())
    }
}

#[async_trait]
impl StoreConnector for S3Connector {
    async fn source_store(&self, bundle: &CredentialBundle) -> StorageResult<Arc<dyn ObjectStore>> {
        let store = S3Store::with_credentials(&self.source, bundle).await?;
        Ok(Arc::new(store))
    }

    async fn destination_store(&self) -> StorageResult<Arc<dyn ObjectStore>> {
        let store = S3Store::from_env(&self.destination).await?;
        Ok(Arc::new(store))
    }
}

/// How a single object copy ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Copied,
    Failed(String),
}

/// Per-object result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub source: ObjectLocator,
    pub destination: ObjectLocator,
    pub status: CopyStatus,
    pub bytes: u64,
    pub parts: usize,
}

impl CopyOutcome {
    fn copied(copied: &CopiedObject) -> Self {
        Self {
            source: copied.source.clone(),
            destination: copied.destination.clone(),
            status: CopyStatus::Copied,
            bytes: copied.bytes,
            parts: copied.parts.len(),
        }
    }

    fn failed(source: ObjectLocator, error: &CopyError) -> Self {
        Self {
            source,
            destination: error.destination.clone(),
            status: CopyStatus::Failed(error.to_string()),
            bytes: 0,
            parts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CopyStatus::Copied
    }
}

impl fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CopyStatus::Copied => write!(
                f,
                "Copied {} -> {} ({} bytes, {} parts)",
                self.source, self.destination, self.bytes, self.parts
            ),
            CopyStatus::Failed(reason) => write!(
                f,
                "FAILED {} -> {}: {}",
                self.source, self.destination, reason
            ),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<CopyOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn objects_copied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes).sum()
    }

    pub fn total_parts(&self) -> usize {
        self.outcomes.iter().map(|o| o.parts).sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Copied {} objects ({} bytes in {} parts) in {:.2}s",
            self.objects_copied(),
            self.total_bytes(),
            self.total_parts(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Progress notification emitted while a run is in flight
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    /// An object copy is about to start; `index` counts from 1
    Started {
        index: usize,
        source: &'a ObjectLocator,
        destination: &'a ObjectLocator,
    },
    /// An object copy ended, successfully or not
    Finished(&'a CopyOutcome),
}

/// Runs one cross-account copy
pub struct CopyOrchestrator {
    config: TransferConfig,
    broker: CredentialBroker,
    connector: Arc<dyn StoreConnector>,
    engine: StreamingCopyEngine,
}

impl CopyOrchestrator {
    pub fn new(
        config: TransferConfig,
        broker: CredentialBroker,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let engine = StreamingCopyEngine::new(config.chunk_size);
        Self {
            config,
            broker,
            connector,
            engine,
        }
    }

    /// Orchestrator wired to AWS STS and S3
    pub async fn from_config(config: TransferConfig) -> Self {
        let issuer = StsIssuer::from_env(config.region.clone()).await;
        let connector = S3Connector::from_config(&config);
        Self::new(
            config,
            CredentialBroker::new(Arc::new(issuer)),
            Arc::new(connector),
        )
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Run the copy, logging progress only
    pub async fn run(&self) -> Result<RunReport> {
        self.run_with_progress(|_| {}).await
    }

    /// Run the copy, reporting every object start and finish to `on_event`
    ///
    /// Zero matching objects is a successful run with an empty report. A failed
    /// copy is reported as a failed [`CopyOutcome`] before its error is returned.
    pub async fn run_with_progress<F>(&self, mut on_event: F) -> Result<RunReport>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        let started = Instant::now();
        let config = &self.config;

        let bundle = self
            .broker
            .assume_identity(&config.role_arn, &config.session_label)
            .await?;

        let source_store = self
            .connector
            .source_store(&bundle)
            .await
            .map_err(TransferError::Client)?;
        let dest_store = self
            .connector
            .destination_store()
            .await
            .map_err(TransferError::Client)?;

        info!(
            source_bucket = %config.source_bucket,
            prefix = %config.prefix,
            dest_bucket = %config.dest_bucket,
            chunk_size = self.engine.chunk_size(),
            "Starting cross-account copy"
        );

        let mut objects = ObjectEnumerator::new(source_store.as_ref())
            .list_entries(config.source_bucket.as_str(), config.prefix.as_str());
        let mut report = RunReport::default();

        while let Some(listed) = objects.try_next().await? {
            let source = listed.locator;
            let destination = source.in_bucket(config.dest_bucket.as_str());

            if bundle.is_expired_at(SystemTime::now()) {
                warn!(
                    key = %source.key,
                    "Source credentials have expired; remaining copies will likely be denied"
                );
            }

            on_event(ProgressEvent::Started {
                index: report.outcomes.len() + 1,
                source: &source,
                destination: &destination,
            });

            match self
                .engine
                .copy_with_size_hint(
                    source_store.as_ref(),
                    dest_store.as_ref(),
                    &source,
                    &destination,
                    listed.size,
                )
                .await
            {
                Ok(copied) => {
                    let outcome = CopyOutcome::copied(&copied);
                    on_event(ProgressEvent::Finished(&outcome));
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    let outcome = CopyOutcome::failed(source, &e);
                    error!(
                        key = %e.source_key,
                        stage = %e.stage,
                        error = %e.cause,
                        copied_before_failure = report.objects_copied(),
                        "Copy failed; stopping run"
                    );
                    on_event(ProgressEvent::Finished(&outcome));
                    return Err(e.into());
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            objects = report.objects_copied(),
            bytes = report.total_bytes(),
            parts = report.total_parts(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cross-account copy finished"
        );

        Ok(report)
    }
}

impl fmt::Debug for CopyOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOrchestrator")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
