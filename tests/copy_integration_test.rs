/*!
 * Integration tests for cross-account copy runs
 *
 * Runs the orchestrator end to end against in-memory stores:
 * - Keys under the prefix land in the destination unchanged
 * - An empty prefix is a successful, empty run
 * - The first failed copy stops the run
 * - Credential, listing and client failures are fatal
 */

use async_trait::async_trait;
use bucketferry::{
    config::TransferConfig,
    credentials::{CredentialBroker, CredentialBundle, IdentityIssuer},
    error::{AuthorizationError, CopyStage, TransferError, EXIT_COPY_FAILED, EXIT_FATAL},
    orchestrator::{CopyOrchestrator, CopyStatus, ProgressEvent, StoreConnector},
    storage::{MemoryStore, ObjectStore, StorageError, StorageResult, StoreCall},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

const ROLE_ARN: &str = "arn:aws:iam::111122223333:role/PartnerExportReader";

/// Issuer handing out a fixed bundle, or rejecting every request
struct StaticIssuer {
    calls: AtomicUsize,
    expiry: Option<SystemTime>,
    reject: bool,
}

impl StaticIssuer {
    fn granting(expiry: Option<SystemTime>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            expiry,
            reject: false,
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            expiry: None,
            reject: true,
        })
    }
}

#[async_trait]
impl IdentityIssuer for StaticIssuer {
    async fn assume_identity(
        &self,
        role_arn: &str,
        session_label: &str,
    ) -> Result<CredentialBundle, AuthorizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AuthorizationError::new(
                role_arn,
                "not authorized to perform sts:AssumeRole",
            ));
        }
        Ok(CredentialBundle::new(
            format!("ASIA-{}", session_label),
            "secret",
            "session-token",
            self.expiry,
        ))
    }
}

/// Connector handing out shared in-memory stores
struct MemoryConnector {
    source: MemoryStore,
    dest: MemoryStore,
    source_keys_seen: Mutex<Vec<String>>,
    fail_destination: bool,
}

impl MemoryConnector {
    fn new(source: &MemoryStore, dest: &MemoryStore) -> Self {
        Self {
            source: source.clone(),
            dest: dest.clone(),
            source_keys_seen: Mutex::new(Vec::new()),
            fail_destination: false,
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn source_store(&self, bundle: &CredentialBundle) -> StorageResult<Arc<dyn ObjectStore>> {
        self.source_keys_seen
            .lock()
            .unwrap()
            .push(bundle.access_key_id().to_string());
        Ok(Arc::new(self.source.clone()))
    }

    async fn destination_store(&self) -> StorageResult<Arc<dyn ObjectStore>> {
        if self.fail_destination {
            return Err(StorageError::InvalidConfig(
                "no credentials in environment".to_string(),
            ));
        }
        Ok(Arc::new(self.dest.clone()))
    }
}

fn transfer_config(prefix: &str, chunk_size: usize) -> TransferConfig {
    let mut config = TransferConfig::new("partner-exports", prefix, "ingest-landing", ROLE_ARN);
    config.chunk_size = chunk_size;
    config
}

fn orchestrator(
    config: TransferConfig,
    issuer: Arc<StaticIssuer>,
    connector: Arc<MemoryConnector>,
) -> CopyOrchestrator {
    CopyOrchestrator::new(config, CredentialBroker::new(issuer), connector)
}

fn seeded_source() -> MemoryStore {
    let source = MemoryStore::new();
    source.put_object("partner-exports", "daily/a.csv", b"abc".to_vec());
    source.put_object("partner-exports", "daily/b.csv", b"abcdef".to_vec());
    source.put_object("partner-exports", "daily/c.csv", b"xyz".to_vec());
    source.put_object("partner-exports", "weekly/d.csv", b"skip me".to_vec());
    source
}

#[tokio::test]
async fn test_copies_every_object_under_prefix() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let issuer = StaticIssuer::granting(Some(SystemTime::now() + Duration::from_secs(3600)));
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    let report = orchestrator(transfer_config("daily/", 4), issuer.clone(), connector.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        dest.keys("ingest-landing"),
        vec!["daily/a.csv", "daily/b.csv", "daily/c.csv"]
    );
    assert_eq!(
        dest.object("ingest-landing", "daily/b.csv").unwrap().as_ref(),
        b"abcdef"
    );

    assert_eq!(report.objects_copied(), 3);
    assert_eq!(report.total_bytes(), 12);
    // 3 bytes -> 1 part, 6 bytes -> 2 parts, 3 bytes -> 1 part
    assert_eq!(report.total_parts(), 4);
    for outcome in &report.outcomes {
        assert_eq!(outcome.status, CopyStatus::Copied);
        assert_eq!(outcome.source.key, outcome.destination.key);
        assert_eq!(outcome.destination.bucket, "ingest-landing");
    }

    assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *connector.source_keys_seen.lock().unwrap(),
        vec!["ASIA-CrossAccountSession".to_string()]
    );
    assert_eq!(dest.open_session_count(), 0);
}

#[tokio::test]
async fn test_source_account_is_only_read() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    orchestrator(
        transfer_config("daily/", 4),
        StaticIssuer::granting(None),
        connector,
    )
    .run()
    .await
    .unwrap();

    assert!(source.calls().iter().all(|call| matches!(
        call,
        StoreCall::ListPage { .. } | StoreCall::GetObject { .. }
    )));
    assert!(dest
        .calls()
        .iter()
        .all(|call| !matches!(call, StoreCall::ListPage { .. } | StoreCall::GetObject { .. })));
}

#[tokio::test]
async fn test_empty_prefix_is_successful_empty_run() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    let report = orchestrator(
        transfer_config("monthly/", 4),
        StaticIssuer::granting(None),
        connector,
    )
    .run()
    .await
    .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.total_bytes(), 0);
    assert!(dest.calls().is_empty());
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    // daily/a.csv has one part; daily/b.csv fails on its second.
    dest.fail_upload_part(2);
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    let mut started = Vec::new();
    let mut failed = Vec::new();
    let err = orchestrator(
        transfer_config("daily/", 4),
        StaticIssuer::granting(None),
        connector,
    )
    .run_with_progress(|event| match event {
        ProgressEvent::Started { source, .. } => started.push(source.key.clone()),
        ProgressEvent::Finished(outcome) if !outcome.is_success() => {
            failed.push(outcome.source.key.clone())
        }
        ProgressEvent::Finished(_) => {}
    })
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_COPY_FAILED);
    assert_eq!(err.failed_key(), Some("daily/b.csv"));
    assert_eq!(started, vec!["daily/a.csv", "daily/b.csv"]);
    assert_eq!(failed, vec!["daily/b.csv"]);

    // Earlier copies stay; the failed one left nothing behind.
    assert_eq!(dest.keys("ingest-landing"), vec!["daily/a.csv"]);
    assert_eq!(dest.open_session_count(), 0);
    let aborts = dest
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::AbortSession { .. }))
        .count();
    assert_eq!(aborts, 1);
}

#[tokio::test]
async fn test_authorization_failure_is_fatal() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let issuer = StaticIssuer::rejecting();
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    let err = orchestrator(transfer_config("daily/", 4), issuer.clone(), connector.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Authorization(_)));
    assert_eq!(err.exit_code(), EXIT_FATAL);
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    assert!(connector.source_keys_seen.lock().unwrap().is_empty());
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn test_listing_failure_after_partial_progress() {
    let source = seeded_source().with_page_size(2);
    source.fail_listing_after(1);
    let dest = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    let err = orchestrator(
        transfer_config("daily/", 4),
        StaticIssuer::granting(None),
        connector,
    )
    .run()
    .await
    .unwrap_err();

    match err {
        TransferError::Enumeration(ref e) => {
            assert_eq!(e.bucket, "partner-exports");
            assert_eq!(e.prefix, "daily/");
        }
        other => panic!("expected enumeration error, got {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_FATAL);
    // Objects from the first page were copied before the listing broke.
    assert_eq!(
        dest.keys("ingest-landing"),
        vec!["daily/a.csv", "daily/b.csv"]
    );
}

#[tokio::test]
async fn test_destination_client_failure_is_fatal() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let mut connector = MemoryConnector::new(&source, &dest);
    connector.fail_destination = true;

    let err = orchestrator(
        transfer_config("daily/", 4),
        StaticIssuer::granting(None),
        Arc::new(connector),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, TransferError::Client(_)));
    assert_eq!(err.exit_code(), EXIT_FATAL);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn test_expired_credentials_are_not_renewed() {
    let source = seeded_source();
    let dest = MemoryStore::new();
    let issuer = StaticIssuer::granting(Some(SystemTime::now() - Duration::from_secs(1)));
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    // The in-memory source does not check expiry, so the run still succeeds; the
    // bundle is requested exactly once regardless.
    let report = orchestrator(transfer_config("daily/", 4), issuer.clone(), connector)
        .run()
        .await
        .unwrap();

    assert_eq!(report.objects_copied(), 3);
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_object_over_part_limit_rejected_before_upload() {
    let source = MemoryStore::new();
    source.put_object("partner-exports", "daily/huge.bin", vec![7u8; 10_001]);
    let dest = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(&source, &dest));

    // One-byte parts cap an object at 10,000 bytes.
    let err = orchestrator(
        transfer_config("daily/", 1),
        StaticIssuer::granting(None),
        connector,
    )
    .run()
    .await
    .unwrap_err();

    match err {
        TransferError::Copy(ref e) => {
            assert_eq!(e.source_key, "daily/huge.bin");
            assert_eq!(e.stage, CopyStage::Open);
        }
        ref other => panic!("expected copy error, got {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_COPY_FAILED);
    assert!(dest.calls().is_empty());
    assert!(source
        .calls()
        .iter()
        .all(|call| !matches!(call, StoreCall::GetObject { .. })));
}
