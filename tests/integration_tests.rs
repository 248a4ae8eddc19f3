//! Integration tests for donation-ledger against an in-memory SQLite store

use bigdecimal::BigDecimal;
use donation_ledger::storage::SqliteStorage;
use donation_ledger::utils::{EnhancedCampaignValidator, EnhancedDonationValidator};
use donation_ledger::{
    Campaign, CampaignLedger, ConsoleReporter, Donation, DonationStatus, LedgerError,
    LedgerStorage, ReconcileMode, ReconcileOptions, ReconcileScope, ReconciliationEngine,
};
use uuid::Uuid;

async fn test_store() -> SqliteStorage {
    let storage = SqliteStorage::connect("sqlite::memory:", 1)
        .await
        .expect("failed to create in-memory pool");
    storage.init_schema().await.expect("failed to init schema");
    storage
}

fn ledger(storage: &SqliteStorage) -> CampaignLedger<SqliteStorage> {
    CampaignLedger::with_validators(
        storage.clone(),
        Box::new(EnhancedCampaignValidator),
        Box::new(EnhancedDonationValidator),
    )
}

/// Insert a campaign whose cached total is `cached`, regardless of donations
async fn seed_campaign(storage: &SqliteStorage, title: &str, cached: i64) -> String {
    let id = Uuid::new_v4().to_string();
    let mut campaign = Campaign::new(id.clone(), title.to_string(), BigDecimal::from(10000));
    campaign.collected_amount = BigDecimal::from(cached);
    storage.save_campaign(&campaign).await.unwrap();
    id
}

/// Insert a donation with its final status already written, the way a
/// gateway callback that skipped the campaign update leaves it
async fn seed_donation(
    storage: &SqliteStorage,
    campaign_id: &str,
    amount: i64,
    status: DonationStatus,
) -> String {
    let mut donation = Donation::new(
        Uuid::new_v4().to_string(),
        campaign_id.to_string(),
        BigDecimal::from(amount),
    );
    donation.status = status;
    storage.save_donation(&donation).await.unwrap();
    donation.id
}

async fn collected(storage: &SqliteStorage, campaign_id: &str) -> BigDecimal {
    storage
        .get_campaign(campaign_id)
        .await
        .unwrap()
        .unwrap()
        .collected_amount
}

#[tokio::test]
async fn test_failed_donations_excluded_from_total() {
    let storage = test_store().await;
    let campaign = seed_campaign(&storage, "Clean water", 0).await;
    for amount in [1000, 2000, 500] {
        seed_donation(&storage, &campaign, amount, DonationStatus::Success).await;
    }
    seed_donation(&storage, &campaign, 9999, DonationStatus::Failed).await;
    seed_donation(&storage, &campaign, 4000, DonationStatus::Pending).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine.run(&ReconcileOptions::default()).await.unwrap();

    assert_eq!(collected(&storage, &campaign).await, BigDecimal::from(3500));
    assert_eq!(report.campaigns.len(), 1);
    assert_eq!(report.campaigns[0].actual_collected, BigDecimal::from(3500));
}

#[tokio::test]
async fn test_campaigns_without_successful_donations_reset_to_zero() {
    let storage = test_store().await;
    let empty = seed_campaign(&storage, "No donations yet", 700).await;
    let failed_only = seed_campaign(&storage, "Only failures", 300).await;
    seed_donation(&storage, &failed_only, 300, DonationStatus::Failed).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine.run(&ReconcileOptions::default()).await.unwrap();

    assert_eq!(report.campaigns.len(), 2);
    assert_eq!(collected(&storage, &empty).await, BigDecimal::from(0));
    assert_eq!(collected(&storage, &failed_only).await, BigDecimal::from(0));
    assert_eq!(report.after_total, BigDecimal::from(0));
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let storage = test_store().await;
    let a = seed_campaign(&storage, "School roof", 100).await;
    let b = seed_campaign(&storage, "Medical aid", 5000).await;
    seed_donation(&storage, &a, 2500, DonationStatus::Success).await;
    seed_donation(&storage, &b, 1200, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let first = engine.run(&ReconcileOptions::default()).await.unwrap();
    let after_first = (collected(&storage, &a).await, collected(&storage, &b).await);

    let second = engine.run(&ReconcileOptions::default()).await.unwrap();
    let after_second = (collected(&storage, &a).await, collected(&storage, &b).await);

    assert!(!first.is_consistent());
    assert_eq!(after_first, after_second);
    assert_eq!(second.global_delta(), BigDecimal::from(0));
    assert!(second.is_consistent());
    // Unchanged rows are still written.
    assert_eq!(second.rows_updated, 2);
}

#[tokio::test]
async fn test_drift_report_sorted_by_difference_descending() {
    let storage = test_store().await;
    let under = seed_campaign(&storage, "Under-counted", 1000).await;
    let over = seed_campaign(&storage, "Over-counted", 1200).await;
    let exact = seed_campaign(&storage, "Exact", 800).await;
    seed_donation(&storage, &under, 1500, DonationStatus::Success).await;
    seed_donation(&storage, &over, 1000, DonationStatus::Success).await;
    seed_donation(&storage, &exact, 800, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine.run(&ReconcileOptions::default()).await.unwrap();

    let order: Vec<(&str, BigDecimal)> = report
        .campaigns
        .iter()
        .map(|c| (c.campaign_id.as_str(), c.difference.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            (under.as_str(), BigDecimal::from(500)),
            (exact.as_str(), BigDecimal::from(0)),
            (over.as_str(), BigDecimal::from(-200)),
        ]
    );
}

#[tokio::test]
async fn test_global_delta_matches_sum_of_differences() {
    let storage = test_store().await;
    let a = seed_campaign(&storage, "Orphanage", 0).await;
    let b = seed_campaign(&storage, "Mosque", 900).await;
    let c = seed_campaign(&storage, "Library", 50).await;
    seed_donation(&storage, &a, 750, DonationStatus::Success).await;
    seed_donation(&storage, &b, 400, DonationStatus::Success).await;
    seed_donation(&storage, &c, 50, DonationStatus::Success).await;
    seed_donation(&storage, &c, 25, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine.run(&ReconcileOptions::default()).await.unwrap();

    assert_eq!(report.before_total, BigDecimal::from(950));
    assert_eq!(report.after_total, BigDecimal::from(1225));
    assert_eq!(report.global_delta(), report.total_difference());
    assert_eq!(report.global_delta(), BigDecimal::from(275));
}

#[tokio::test]
async fn test_failing_bulk_update_changes_nothing() {
    let storage = test_store().await;
    let healthy = seed_campaign(&storage, "Healthy", 0).await;
    let poisoned = seed_campaign(&storage, "Poisoned", 0).await;
    seed_donation(&storage, &healthy, 1000, DonationStatus::Success).await;
    seed_donation(&storage, &poisoned, 2000, DonationStatus::Success).await;

    sqlx::query(&format!(
        "CREATE TRIGGER reject_poisoned BEFORE UPDATE OF collected_amount ON campaigns \
         WHEN NEW.id = '{}' BEGIN SELECT RAISE(ABORT, 'injected constraint violation'); END",
        poisoned
    ))
    .execute(storage.pool())
    .await
    .unwrap();

    let engine = ReconciliationEngine::new(storage.clone());
    let mut reporter = ConsoleReporter::new(Vec::new());
    let result = engine
        .run_and_report(&ReconcileOptions::default(), &mut reporter)
        .await;

    assert!(matches!(result, Err(LedgerError::Database(_))));
    assert!(reporter.into_inner().is_empty());
    assert_eq!(collected(&storage, &healthy).await, BigDecimal::from(0));
    assert_eq!(collected(&storage, &poisoned).await, BigDecimal::from(0));
}

#[tokio::test]
async fn test_audit_mode_reports_without_writing() {
    let storage = test_store().await;
    let campaign = seed_campaign(&storage, "Flood relief", 100).await;
    seed_donation(&storage, &campaign, 600, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine
        .run(&ReconcileOptions {
            scope: ReconcileScope::All,
            mode: ReconcileMode::Audit,
        })
        .await
        .unwrap();

    assert_eq!(report.rows_updated, 0);
    assert_eq!(report.total_difference(), BigDecimal::from(500));
    assert_eq!(report.global_delta(), BigDecimal::from(0));
    assert_eq!(collected(&storage, &campaign).await, BigDecimal::from(100));
}

#[tokio::test]
async fn test_scoped_run_touches_only_one_campaign() {
    let storage = test_store().await;
    let target = seed_campaign(&storage, "Target", 0).await;
    let other = seed_campaign(&storage, "Other", 0).await;
    seed_donation(&storage, &target, 300, DonationStatus::Success).await;
    seed_donation(&storage, &other, 400, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let report = engine
        .run(&ReconcileOptions {
            scope: ReconcileScope::Campaign(target.clone()),
            mode: ReconcileMode::Apply,
        })
        .await
        .unwrap();

    assert_eq!(report.campaigns.len(), 1);
    assert_eq!(report.rows_updated, 1);
    assert_eq!(collected(&storage, &target).await, BigDecimal::from(300));
    assert_eq!(collected(&storage, &other).await, BigDecimal::from(0));

    let missing = engine
        .run(&ReconcileOptions {
            scope: ReconcileScope::Campaign(Uuid::new_v4().to_string()),
            mode: ReconcileMode::Apply,
        })
        .await;
    assert!(matches!(missing, Err(LedgerError::CampaignNotFound(_))));
}

#[tokio::test]
async fn test_transactional_settlement_keeps_totals_consistent() {
    let storage = test_store().await;
    let ledger = ledger(&storage);

    let campaign = ledger
        .create_campaign(
            Uuid::new_v4().to_string(),
            "Rebuild the village clinic".to_string(),
            BigDecimal::from(50000),
        )
        .await
        .unwrap();

    let paid = ledger
        .record_donation(Uuid::new_v4().to_string(), campaign.id.clone(), BigDecimal::from(15000))
        .await
        .unwrap();
    let rejected = ledger
        .record_donation(Uuid::new_v4().to_string(), campaign.id.clone(), BigDecimal::from(9000))
        .await
        .unwrap();

    ledger.confirm_donation(&paid.id).await.unwrap();
    // Gateway redelivers the same notification.
    ledger.confirm_donation(&paid.id).await.unwrap();
    ledger.fail_donation(&rejected.id).await.unwrap();

    let late_success = ledger.confirm_donation(&rejected.id).await;
    assert!(matches!(
        late_success,
        Err(LedgerError::InvalidTransition { .. })
    ));

    let progress = ledger.campaign_progress(&campaign.id).await.unwrap();
    assert_eq!(progress.collected_amount, BigDecimal::from(15000));
    assert_eq!(progress.progress_percent, Some(BigDecimal::from(30)));

    let report = ledger
        .reconciliation_engine()
        .run(&ReconcileOptions::default())
        .await
        .unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.global_delta(), BigDecimal::from(0));
}

#[tokio::test]
async fn test_zero_goal_campaign_renders_without_progress() {
    let storage = test_store().await;
    let id = Uuid::new_v4().to_string();
    storage
        .save_campaign(&Campaign::new(
            id.clone(),
            "Legacy campaign".to_string(),
            BigDecimal::from(0),
        ))
        .await
        .unwrap();
    seed_donation(&storage, &id, 100, DonationStatus::Success).await;

    let engine = ReconciliationEngine::new(storage.clone());
    let mut reporter = ConsoleReporter::new(Vec::new());
    let report = engine
        .run_and_report(&ReconcileOptions::default(), &mut reporter)
        .await
        .unwrap();

    assert_eq!(report.campaigns[0].actual_progress_percent(), None);
    let text = String::from_utf8(reporter.into_inner()).unwrap();
    assert!(text.contains("Legacy campaign"));
    assert!(text.contains("Global delta: +100"));
}

#[tokio::test]
async fn test_invalid_donation_rejected_by_ledger() {
    let storage = test_store().await;
    let ledger = ledger(&storage);
    let campaign = seed_campaign(&storage, "Books", 0).await;

    let result = ledger
        .record_donation("not-a-uuid".to_string(), campaign, BigDecimal::from(100))
        .await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn test_foreign_keys_enforced_on_every_pooled_connection() {
    let path = std::env::temp_dir().join(format!("donation-ledger-{}.db", Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let storage = SqliteStorage::connect(&url, 4).await.unwrap();
    storage.init_schema().await.unwrap();

    // Hold three connections so the insert below runs on a fresh one.
    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(storage.pool().acquire().await.unwrap());
    }

    let orphan = Donation::new(
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
        BigDecimal::from(100),
    );
    let result = storage.save_donation(&orphan).await;
    assert!(matches!(result, Err(LedgerError::Database(_))));

    drop(held);
    storage.close().await;
    let _ = std::fs::remove_file(&path);
}
