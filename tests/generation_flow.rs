// End-to-end scenarios for the generation engine
//
// Drives the public API (resolver, policy, coordinator, orchestrator)
// against the in-memory stores and a scripted vendor.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tryon_orchestrator::auth::StaticAuthVerifier;
use tryon_orchestrator::generation::{
    AuditStore, GarmentCategory, GenerationOrchestrator, GenerationRequest, GenerationVendor,
    InMemoryAuditStore, PersonImage, PollPolicy, TaskHandle, TaskPoll, TaskState, VendorError,
};
use tryon_orchestrator::quota::{
    IdentityResolver, InMemoryLedger, IncrementCoordinator, LedgerKey, LedgerStore, QuotaConfig,
    QuotaIdentity, QuotaPolicy, RequestContext,
};
use tryon_orchestrator::storage::{ObjectStorage, StorageError, UploadQueue};

/// Vendor that resolves every task on its first poll. `fail_all` scripts
/// a total outage; `submits` counts how many tasks were ever started.
#[derive(Default)]
struct FakeVendor {
    fail_all: AtomicBool,
    submits: AtomicUsize,
}

#[async_trait]
impl GenerationVendor for FakeVendor {
    async fn submit(
        &self,
        person_url: &str,
        _garment_url: &str,
        _category: GarmentCategory,
    ) -> Result<TaskHandle, VendorError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VendorError::Api {
                status: 503,
                message: "vendor outage".to_string(),
            });
        }
        Ok(TaskHandle {
            task_id: format!("task:{person_url}"),
        })
    }

    async fn poll(&self, task: &TaskHandle) -> Result<TaskPoll, VendorError> {
        Ok(TaskPoll {
            status: TaskState::Done,
            result_url: Some(format!("https://cdn.vendor.example/{}", task.task_id)),
            error: None,
        })
    }

    async fn download(&self, _url: &str) -> Result<Bytes, VendorError> {
        Ok(Bytes::from_static(b"png"))
    }
}

struct AcceptingStorage;

#[async_trait]
impl ObjectStorage for AcceptingStorage {
    async fn upload(&self, key: &str, _bytes: Bytes) -> Result<String, StorageError> {
        Ok(format!("https://cdn.example/{key}"))
    }
}

struct Engine {
    orchestrator: GenerationOrchestrator,
    policy: QuotaPolicy,
    coordinator: IncrementCoordinator,
    ledger: InMemoryLedger,
    vendor: Arc<FakeVendor>,
}

fn engine() -> Engine {
    let ledger = InMemoryLedger::new();
    let store: Arc<dyn LedgerStore> = Arc::new(ledger.clone());
    let vendor = Arc::new(FakeVendor::default());

    let orchestrator = GenerationOrchestrator::new(
        IdentityResolver::new(Arc::new(StaticAuthVerifier::new())),
        QuotaPolicy::new(QuotaConfig::default(), Arc::clone(&store)),
        IncrementCoordinator::new(QuotaConfig::default(), Arc::clone(&store)),
        vendor.clone() as Arc<dyn GenerationVendor>,
        PollPolicy::default()
            .interval(Duration::from_millis(1))
            .max_attempts(3),
        Arc::new(InMemoryAuditStore::new()) as Arc<dyn AuditStore>,
        Arc::new(AcceptingStorage) as Arc<dyn ObjectStorage>,
        UploadQueue::new(),
    );

    Engine {
        orchestrator,
        policy: QuotaPolicy::new(QuotaConfig::default(), Arc::clone(&store)),
        coordinator: IncrementCoordinator::new(QuotaConfig::default(), store),
        ledger,
        vendor,
    }
}

fn anon(fp: &str, ip: &str) -> QuotaIdentity {
    QuotaIdentity::Anonymous {
        fingerprint: fp.to_string(),
        ip: ip.parse().unwrap(),
    }
}

fn ctx(fp: &str, ip: &str) -> RequestContext {
    RequestContext::anonymous(fp, ip.parse().unwrap())
}

fn batch(names: &[&str]) -> GenerationRequest {
    GenerationRequest {
        person_images: names
            .iter()
            .map(|n| PersonImage::remote(n, &format!("https://img.example/{n}")))
            .collect(),
        garment_url: "https://img.example/garment.jpg".to_string(),
        category: GarmentCategory::UpperBody,
    }
}

// P1: concurrent increments against one identity/period never lose updates.
#[tokio::test]
async fn concurrent_increments_all_land() {
    let e = engine();
    let identity = anon("fp-1", "1.2.3.4");
    // A generous limit so none of the 16 increments is policy-relevant.
    let config = QuotaConfig {
        anonymous_daily_limit: 100,
        ..QuotaConfig::default()
    };
    let store: Arc<dyn LedgerStore> = Arc::new(e.ledger.clone());
    let coordinator = Arc::new(IncrementCoordinator::new(config.clone(), Arc::clone(&store)));
    QuotaPolicy::new(config, store)
        .evaluate(&identity)
        .await
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let identity = identity.clone();
            tokio::spawn(async move { coordinator.increment(&identity, 1).await.unwrap() })
        })
        .collect();
    futures::future::join_all(tasks).await;

    let row = e.ledger.get(&identity.ledger_key()).await.unwrap().unwrap();
    assert_eq!(row.used_count, 16);
}

// P2: repeated evaluation of a fresh identity is read-idempotent.
#[tokio::test]
async fn repeated_evaluation_creates_one_row() {
    let e = engine();
    let identity = anon("fp-1", "1.2.3.4");

    let first = e.policy.evaluate(&identity).await.unwrap();
    assert_eq!((first.used, first.remaining), (0, 3));
    for _ in 0..5 {
        assert_eq!(e.policy.evaluate(&identity).await.unwrap(), first);
    }
    assert_eq!(e.ledger.count().await, 1);
}

// P3: an exhausted row from yesterday rolls forward to a fresh allowance.
#[tokio::test]
async fn period_rollover_resets_in_place() {
    let e = engine();
    let identity = anon("fp-1", "1.2.3.4");
    let key = identity.ledger_key();
    let yesterday = chrono::Utc::now().date_naive() - chrono::Duration::days(1);

    e.ledger.open_period(&key, yesterday).await.unwrap();
    e.ledger.increment(&key, yesterday, 3).await.unwrap();

    let status = e.policy.evaluate(&identity).await.unwrap();
    assert!(status.can_generate);
    assert_eq!(status.used, 0);

    let row = e.ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.period_date, chrono::Utc::now().date_naive());
    assert_eq!(row.used_count, 0);
    assert_eq!(e.ledger.count().await, 1);
}

// P4: two fingerprints behind one IP share one allowance.
#[tokio::test]
async fn ip_aggregate_blocks_fingerprint_churn() {
    let e = engine();
    let fp1 = anon("fp-1", "1.2.3.4");
    let fp2 = anon("fp-2", "1.2.3.4");

    for identity in [&fp1, &fp2] {
        e.policy.evaluate(identity).await.unwrap();
        e.coordinator.increment(identity, 1).await.unwrap();
        e.coordinator.increment(identity, 1).await.unwrap();
    }

    for identity in [&fp1, &fp2] {
        let status = e.policy.evaluate(identity).await.unwrap();
        assert_eq!(status.used, 4);
        assert!(!status.can_generate);
    }
}

// P5: a total vendor outage costs nothing.
#[tokio::test]
async fn vendor_outage_consumes_no_quota() {
    let e = engine();
    let before = e.policy.evaluate(&anon("fp-1", "1.2.3.4")).await.unwrap();

    e.vendor.fail_all.store(true, Ordering::SeqCst);
    let response = e
        .orchestrator
        .run(&ctx("fp-1", "1.2.3.4"), batch(&["a.jpg", "b.jpg"]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.succeeded(), 0);
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.daily_limit, before);

    let after = e.policy.evaluate(&anon("fp-1", "1.2.3.4")).await.unwrap();
    assert_eq!(after.used, before.used);
}

// P6: a batch is one generation event, however many photos it carries.
#[tokio::test]
async fn batch_of_three_charges_one_unit() {
    let e = engine();

    let response = e
        .orchestrator
        .run(&ctx("fp-1", "1.2.3.4"), batch(&["a.jpg", "b.jpg", "c.jpg"]))
        .await
        .unwrap();

    assert_eq!(response.succeeded(), 3);
    assert_eq!(response.daily_limit.used, 1);

    let key = LedgerKey::device("fp-1", "1.2.3.4".parse().unwrap());
    let row = e.ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.used_count, 1);
}

// The end-to-end scenario: evaluate, exhaust, deny before the vendor.
#[tokio::test]
async fn exhaustion_scenario_denies_before_vendor() {
    let e = engine();
    let identity = anon("fp1", "1.2.3.4");

    let status = e.policy.evaluate(&identity).await.unwrap();
    assert_eq!(
        (status.can_generate, status.used, status.remaining),
        (true, 0, 3)
    );

    for _ in 0..3 {
        e.coordinator.increment(&identity, 1).await.unwrap();
    }

    let status = e.policy.evaluate(&identity).await.unwrap();
    assert_eq!(
        (status.can_generate, status.used, status.remaining),
        (false, 3, 0)
    );

    // The fourth batch dies in CHECKING; the vendor never hears about it.
    let err = e
        .orchestrator
        .run(&ctx("fp1", "1.2.3.4"), batch(&["a.jpg"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ANON_LIMIT_EXCEEDED");
    assert_eq!(e.vendor.submits.load(Ordering::SeqCst), 0);
}

// Duplicate submissions race the full orchestrator; only admitted batches
// charge, and every charge lands.
#[tokio::test]
async fn concurrent_batches_never_overcharge() {
    let e = engine();
    let orchestrator = Arc::new(e.orchestrator);

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .run(&ctx("fp-1", "1.2.3.4"), batch(&["a.jpg"]))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }

    let key = LedgerKey::device("fp-1", "1.2.3.4".parse().unwrap());
    let row = e.ledger.get(&key).await.unwrap().unwrap();
    // One unit per admitted batch, no lost or phantom updates. Admission
    // count depends on interleaving but can never exceed the attempts.
    assert_eq!(row.used_count, admitted);
    assert!(admitted >= 1 && admitted <= 5);
}

// Premium users bypass the ledger entirely.
#[tokio::test]
async fn premium_batches_are_unmetered() {
    let ledger = InMemoryLedger::new();
    let store: Arc<dyn LedgerStore> = Arc::new(ledger.clone());
    let verifier = StaticAuthVerifier::new();
    verifier
        .insert(
            "tok-premium",
            tryon_orchestrator::auth::AuthClaims {
                user_id: "user-1".to_string(),
                premium: tryon_orchestrator::quota::PremiumStatus::lifetime(),
            },
        )
        .await;

    let orchestrator = GenerationOrchestrator::new(
        IdentityResolver::new(Arc::new(verifier)),
        QuotaPolicy::new(QuotaConfig::default(), Arc::clone(&store)),
        IncrementCoordinator::new(QuotaConfig::default(), store),
        Arc::new(FakeVendor::default()) as Arc<dyn GenerationVendor>,
        PollPolicy::default().interval(Duration::from_millis(1)),
        Arc::new(InMemoryAuditStore::new()) as Arc<dyn AuditStore>,
        Arc::new(AcceptingStorage) as Arc<dyn ObjectStorage>,
        UploadQueue::new(),
    );

    for _ in 0..5 {
        let response = orchestrator
            .run(&RequestContext::bearer("tok-premium"), batch(&["a.jpg"]))
            .await
            .unwrap();
        assert!(response.daily_limit.is_unlimited());
    }
    assert_eq!(ledger.count().await, 0);
}
