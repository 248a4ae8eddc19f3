//! Main ledger orchestrator that coordinates campaigns and donations

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{CampaignManager, DonationManager};
use crate::reconciliation::{ReconcileMode, ReconcileOptions, ReconciliationEngine};
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all donation bookkeeping
pub struct CampaignLedger<S: LedgerStorage> {
    campaign_manager: CampaignManager<S>,
    donation_manager: DonationManager<S>,
}

impl<S: LedgerStorage + Clone> CampaignLedger<S> {
    /// Create a new ledger with the given storage backend
    pub fn new(storage: S) -> Self {
        Self {
            campaign_manager: CampaignManager::new(storage.clone()),
            donation_manager: DonationManager::new(storage),
        }
    }

    /// Create a new ledger with custom validators
    pub fn with_validators(
        storage: S,
        campaign_validator: Box<dyn CampaignValidator>,
        donation_validator: Box<dyn DonationValidator>,
    ) -> Self {
        Self {
            campaign_manager: CampaignManager::with_validator(storage.clone(), campaign_validator),
            donation_manager: DonationManager::with_validator(storage, donation_validator),
        }
    }

    // Campaign operations
    /// Create a new campaign
    pub async fn create_campaign(
        &self,
        id: String,
        title: String,
        goal_amount: BigDecimal,
    ) -> LedgerResult<Campaign> {
        self.campaign_manager
            .create_campaign(id, title, goal_amount)
            .await
    }

    /// Get a campaign by ID
    pub async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>> {
        self.campaign_manager.get_campaign(campaign_id).await
    }

    /// List all campaigns
    pub async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        self.campaign_manager.list_campaigns().await
    }

    /// Change a campaign's title and goal
    pub async fn update_campaign_details(
        &self,
        campaign_id: &str,
        title: String,
        goal_amount: BigDecimal,
    ) -> LedgerResult<Campaign> {
        self.campaign_manager
            .update_details(campaign_id, title, goal_amount)
            .await
    }

    // Donation operations
    /// Record a pending donation
    pub async fn record_donation(
        &self,
        id: String,
        campaign_id: String,
        amount: BigDecimal,
    ) -> LedgerResult<Donation> {
        self.donation_manager
            .record_donation(id, campaign_id, amount)
            .await
    }

    /// Mark a donation paid and add it to its campaign's total
    pub async fn confirm_donation(&self, donation_id: &str) -> LedgerResult<Donation> {
        self.donation_manager
            .settle(donation_id, DonationStatus::Success)
            .await
    }

    /// Mark a donation failed
    pub async fn fail_donation(&self, donation_id: &str) -> LedgerResult<Donation> {
        self.donation_manager
            .settle(donation_id, DonationStatus::Failed)
            .await
    }

    /// Get a donation by ID
    pub async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>> {
        self.donation_manager.get_donation(donation_id).await
    }

    /// List every donation of a campaign
    pub async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>> {
        self.donation_manager
            .list_campaign_donations(campaign_id)
            .await
    }

    // Reporting and consistency
    /// Funding progress of a campaign
    pub async fn campaign_progress(&self, campaign_id: &str) -> LedgerResult<CampaignProgress> {
        let campaign = self
            .campaign_manager
            .get_campaign_required(campaign_id)
            .await?;
        let donations = self
            .donation_manager
            .list_campaign_donations(campaign_id)
            .await?;

        Ok(CampaignProgress {
            campaign_id: campaign.id.clone(),
            progress_percent: campaign.progress_percent(),
            collected_amount: campaign.collected_amount,
            goal_amount: campaign.goal_amount,
            successful_donations: donations
                .iter()
                .filter(|d| d.status.counts_toward_total())
                .count(),
            pending_donations: donations
                .iter()
                .filter(|d| d.status == DonationStatus::Pending)
                .count(),
        })
    }

    /// Check one campaign's cached total without repairing it
    pub async fn audit_campaign(&self, campaign_id: &str) -> LedgerResult<CampaignDrift> {
        let report = self
            .reconciliation_engine()
            .run(&ReconcileOptions {
                scope: ReconcileScope::Campaign(campaign_id.to_string()),
                mode: ReconcileMode::Audit,
            })
            .await?;

        report
            .campaigns
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::CampaignNotFound(campaign_id.to_string()))
    }

    /// A reconciliation engine over the same storage
    pub fn reconciliation_engine(&self) -> ReconciliationEngine<S> {
        ReconciliationEngine::new(self.campaign_manager.storage.clone())
    }
}

/// Funding progress snapshot of one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignProgress {
    pub campaign_id: String,
    pub collected_amount: BigDecimal,
    pub goal_amount: BigDecimal,
    /// `None` when the goal is not positive
    pub progress_percent: Option<BigDecimal>,
    pub successful_donations: usize,
    pub pending_donations: usize,
}
