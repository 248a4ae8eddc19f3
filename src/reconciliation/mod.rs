//! Reconciliation of cached campaign totals against donation records
//!
//! A campaign's `collected_amount` is a denormalised running total. It can
//! drift from the donations table when a status changes after the total was
//! written or when donation processing fails half way. The
//! [`ReconciliationEngine`] recomputes every total from the successful
//! donations, reports the drift and, in [`ReconcileMode::Apply`], repairs it
//! with one set-based update.
//!
//! The read of the drift and the bulk write are separate statements with no
//! lock between them. A donation settling in that window shows up in the
//! next run, so the routine belongs in a low-traffic maintenance window.

pub mod report;

pub use report::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::traits::*;
use crate::types::*;

/// Whether a run repairs drift or only detects it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Overwrite cached totals with the recomputed sums
    #[default]
    Apply,
    /// Report drift without writing
    Audit,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::Apply => f.write_str("apply"),
            ReconcileMode::Audit => f.write_str("audit"),
        }
    }
}

impl FromStr for ReconcileMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apply" => Ok(ReconcileMode::Apply),
            "audit" => Ok(ReconcileMode::Audit),
            other => Err(LedgerError::Config(format!(
                "unknown reconcile mode '{}', expected 'apply' or 'audit'",
                other
            ))),
        }
    }
}

/// Options for one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    pub scope: ReconcileScope,
    pub mode: ReconcileMode,
}

/// Exit status of a run that failed
pub const EXIT_FAILURE: u8 = 1;
/// Exit status of an audit that found drift
pub const EXIT_DRIFT_FOUND: u8 = 2;

/// How a completed run ends for the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Totals were consistent or have been repaired
    Completed,
    /// An audit run left drift in place
    DriftFound,
}

impl RunOutcome {
    pub fn from_report(report: &ReconciliationReport) -> Self {
        if report.mode == ReconcileMode::Audit && !report.is_consistent() {
            RunOutcome::DriftFound
        } else {
            RunOutcome::Completed
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::DriftFound => EXIT_DRIFT_FOUND,
        }
    }
}

/// Process exit status for the result of [`run_once`]
pub fn exit_code(result: &LedgerResult<RunOutcome>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => EXIT_FAILURE,
    }
}

/// Run one reported pass over `storage`, then close it whatever the outcome.
pub async fn run_once<S: LedgerStorage>(
    storage: S,
    options: &ReconcileOptions,
    reporter: &mut dyn ReconciliationReporter,
) -> LedgerResult<RunOutcome> {
    let engine = ReconciliationEngine::new(storage);
    let result = engine.run_and_report(options, reporter).await;
    engine.storage().close().await;

    result.map(|report| RunOutcome::from_report(&report))
}

/// Largest positive difference first; ties by title, then id.
pub fn sort_by_difference(campaigns: &mut [CampaignDrift]) {
    campaigns.sort_by(|a, b| {
        b.difference
            .cmp(&a.difference)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
    });
}

/// Recomputes cached campaign totals from successful donations
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> ReconciliationEngine<S> {
    /// Create a new engine over the given storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The storage backend the engine runs against
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run one reconciliation pass.
    ///
    /// Any store failure aborts the pass and is returned as is. In apply
    /// mode the repair is a single statement, so either every campaign in
    /// scope is rewritten or none is.
    pub async fn run(&self, options: &ReconcileOptions) -> LedgerResult<ReconciliationReport> {
        let scope = &options.scope;
        if let ReconcileScope::Campaign(id) = scope {
            if self.storage.get_campaign(id).await?.is_none() {
                return Err(LedgerError::CampaignNotFound(id.clone()));
            }
        }

        let started_at = chrono::Utc::now().naive_utc();
        info!(mode = %options.mode, scope = ?scope, "starting ledger reconciliation");

        let before_total = self.storage.total_collected(scope).await?;
        let mut campaigns = self.storage.campaign_drift(scope).await?;
        sort_by_difference(&mut campaigns);

        for campaign in campaigns.iter().filter(|c| c.has_drift()) {
            warn!(
                campaign_id = %campaign.campaign_id,
                cached = %campaign.current_collected,
                actual = %campaign.actual_collected,
                difference = %campaign.difference,
                "campaign total drifted"
            );
        }

        let (rows_updated, after_total) = match options.mode {
            ReconcileMode::Apply => {
                let rows = self.storage.recalculate_collected(scope).await?;
                debug!(rows, "bulk recalculation applied");
                (rows, self.storage.total_collected(scope).await?)
            }
            ReconcileMode::Audit => (0, before_total.clone()),
        };

        let report = ReconciliationReport {
            mode: options.mode,
            scope: scope.clone(),
            started_at,
            before_total,
            after_total,
            campaigns,
            rows_updated,
        };

        info!(
            campaigns = report.campaigns.len(),
            drifted = report.drifted().count(),
            global_delta = %report.global_delta(),
            "ledger reconciliation finished"
        );

        Ok(report)
    }

    /// Run one pass and hand the report to `reporter`.
    ///
    /// Nothing is reported when the pass fails.
    pub async fn run_and_report(
        &self,
        options: &ReconcileOptions,
        reporter: &mut dyn ReconciliationReporter,
    ) -> LedgerResult<ReconciliationReport> {
        let report = self.run(options).await?;
        reporter.report(&report)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;

    async fn seed_campaign(
        storage: &MemoryStorage,
        id: &str,
        title: &str,
        cached: i64,
        donations: &[(i64, DonationStatus)],
    ) {
        let mut campaign =
            Campaign::new(id.to_string(), title.to_string(), BigDecimal::from(10000));
        campaign.collected_amount = BigDecimal::from(cached);
        storage.save_campaign(&campaign).await.unwrap();

        for (i, (amount, status)) in donations.iter().enumerate() {
            let mut donation = Donation::new(
                format!("{}-d{}", id, i),
                id.to_string(),
                BigDecimal::from(*amount),
            );
            donation.status = *status;
            storage.save_donation(&donation).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_recalculation_excludes_failed_donations() {
        let storage = MemoryStorage::new();
        seed_campaign(
            &storage,
            "c1",
            "Clean water",
            0,
            &[
                (1000, DonationStatus::Success),
                (2000, DonationStatus::Success),
                (500, DonationStatus::Success),
                (9999, DonationStatus::Failed),
            ],
        )
        .await;

        let engine = ReconciliationEngine::new(storage.clone());
        let report = engine.run(&ReconcileOptions::default()).await.unwrap();

        let campaign = storage.get_campaign("c1").await.unwrap().unwrap();
        assert_eq!(campaign.collected_amount, BigDecimal::from(3500));
        assert_eq!(report.global_delta(), BigDecimal::from(3500));
        assert_eq!(report.rows_updated, 1);
    }

    #[tokio::test]
    async fn test_report_ordering_by_difference() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "a", "Under", 0, &[(500, DonationStatus::Success)]).await;
        seed_campaign(&storage, "b", "Over", 700, &[(500, DonationStatus::Success)]).await;
        seed_campaign(&storage, "c", "Exact", 500, &[(500, DonationStatus::Success)]).await;

        let engine = ReconciliationEngine::new(storage);
        let report = engine.run(&ReconcileOptions::default()).await.unwrap();

        let differences: Vec<BigDecimal> =
            report.campaigns.iter().map(|c| c.difference.clone()).collect();
        assert_eq!(
            differences,
            vec![
                BigDecimal::from(500),
                BigDecimal::from(0),
                BigDecimal::from(-200)
            ]
        );
        assert_eq!(report.global_delta(), report.total_difference());
    }

    #[tokio::test]
    async fn test_audit_mode_does_not_write() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "c1", "Orphanage", 100, &[(400, DonationStatus::Success)]).await;

        let engine = ReconciliationEngine::new(storage.clone());
        let report = engine
            .run(&ReconcileOptions {
                scope: ReconcileScope::All,
                mode: ReconcileMode::Audit,
            })
            .await
            .unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.rows_updated, 0);
        assert_eq!(report.global_delta(), BigDecimal::from(0));
        let campaign = storage.get_campaign("c1").await.unwrap().unwrap();
        assert_eq!(campaign.collected_amount, BigDecimal::from(100));
    }

    #[tokio::test]
    async fn test_failed_bulk_update_leaves_totals_untouched() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "c1", "Mosque", 0, &[(800, DonationStatus::Success)]).await;
        seed_campaign(&storage, "c2", "Clinic", 0, &[(900, DonationStatus::Success)]).await;
        storage
            .fail_recalculation_for(Some("c2".to_string()))
            .unwrap();

        let engine = ReconciliationEngine::new(storage.clone());
        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = engine
            .run_and_report(&ReconcileOptions::default(), &mut reporter)
            .await;

        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert!(reporter.into_inner().is_empty());
        for id in ["c1", "c2"] {
            let campaign = storage.get_campaign(id).await.unwrap().unwrap();
            assert_eq!(campaign.collected_amount, BigDecimal::from(0));
        }

        // The injected failure is spent; a rerun repairs both campaigns.
        let report = engine.run(&ReconcileOptions::default()).await.unwrap();
        assert_eq!(report.rows_updated, 2);
        assert_eq!(report.global_delta(), BigDecimal::from(1700));
    }

    #[tokio::test]
    async fn test_unknown_campaign_scope() {
        let engine = ReconciliationEngine::new(MemoryStorage::new());
        let result = engine
            .run(&ReconcileOptions {
                scope: ReconcileScope::Campaign("missing".to_string()),
                mode: ReconcileMode::Apply,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::CampaignNotFound(_))));
    }

    #[tokio::test]
    async fn test_run_once_closes_store_and_exits_zero() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "c1", "Shelter", 0, &[(250, DonationStatus::Success)]).await;

        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = run_once(storage.clone(), &ReconcileOptions::default(), &mut reporter).await;

        assert_eq!(result.as_ref().unwrap(), &RunOutcome::Completed);
        assert_eq!(exit_code(&result), 0);
        assert_eq!(storage.close_count(), 1);
        assert!(!reporter.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_audit_with_drift_exits_two() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "c1", "Shelter", 0, &[(250, DonationStatus::Success)]).await;
        let options = ReconcileOptions {
            scope: ReconcileScope::All,
            mode: ReconcileMode::Audit,
        };

        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = run_once(storage.clone(), &options, &mut reporter).await;

        assert_eq!(result.as_ref().unwrap(), &RunOutcome::DriftFound);
        assert_eq!(exit_code(&result), EXIT_DRIFT_FOUND);
        assert_eq!(storage.close_count(), 1);

        // A clean audit is a normal exit.
        seed_campaign(&storage, "c2", "Clinic", 0, &[]).await;
        let clean = ReconcileOptions {
            scope: ReconcileScope::Campaign("c2".to_string()),
            mode: ReconcileMode::Audit,
        };
        let result = run_once(storage.clone(), &clean, &mut reporter).await;
        assert_eq!(exit_code(&result), 0);
        assert_eq!(storage.close_count(), 2);
    }

    #[tokio::test]
    async fn test_run_once_failure_exits_one_and_still_closes() {
        let storage = MemoryStorage::new();
        seed_campaign(&storage, "c1", "Shelter", 0, &[(250, DonationStatus::Success)]).await;
        storage
            .fail_recalculation_for(Some("c1".to_string()))
            .unwrap();

        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = run_once(storage.clone(), &ReconcileOptions::default(), &mut reporter).await;

        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert_eq!(exit_code(&result), EXIT_FAILURE);
        assert_eq!(storage.close_count(), 1);
        assert!(reporter.into_inner().is_empty());

        let missing = ReconcileOptions {
            scope: ReconcileScope::Campaign("missing".to_string()),
            mode: ReconcileMode::Apply,
        };
        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = run_once(storage.clone(), &missing, &mut reporter).await;
        assert_eq!(exit_code(&result), EXIT_FAILURE);
        assert_eq!(storage.close_count(), 2);
    }
}
