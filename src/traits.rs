//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::reconciliation::ReconciliationReport;
use crate::types::*;
use crate::utils::validation::{validate_campaign_title, validate_positive_amount, validate_uuid};

/// Storage abstraction for the donation ledger
///
/// Implemented by the MySQL and SQLite backends in [`crate::storage`] and by
/// the in-memory store in [`crate::utils`]. Each method is one awaited round
/// trip; none of them retries.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Insert a new campaign
    async fn save_campaign(&self, campaign: &Campaign) -> LedgerResult<()>;

    /// Get a campaign by ID
    async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>>;

    /// List all campaigns
    async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>>;

    /// Overwrite title, goal and cached total of an existing campaign
    async fn update_campaign(&self, campaign: &Campaign) -> LedgerResult<()>;

    /// Insert a new donation
    async fn save_donation(&self, donation: &Donation) -> LedgerResult<()>;

    /// Get a donation by ID
    async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>>;

    /// List donations of one campaign, any status
    async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>>;

    /// Move a pending donation to a terminal status.
    ///
    /// The status change and, for [`DonationStatus::Success`], the increment
    /// of the campaign's `collected_amount` happen in one unit of work.
    /// Re-applying the status a donation already has is a no-op.
    async fn settle_donation(
        &self,
        donation_id: &str,
        status: DonationStatus,
    ) -> LedgerResult<Donation>;

    /// Sum of cached `collected_amount` over the campaigns in scope
    async fn total_collected(&self, scope: &ReconcileScope) -> LedgerResult<BigDecimal>;

    /// Cached and recomputed totals for every campaign in scope, including
    /// campaigns without donations
    async fn campaign_drift(&self, scope: &ReconcileScope) -> LedgerResult<Vec<CampaignDrift>>;

    /// Reset `collected_amount` of every campaign in scope to the sum of its
    /// successful donations as a single statement. Returns the rows written.
    async fn recalculate_collected(&self, scope: &ReconcileScope) -> LedgerResult<u64>;

    /// Release the underlying connections
    async fn close(&self);
}

/// Trait for implementing custom campaign validation rules
pub trait CampaignValidator: Send + Sync {
    /// Validate a campaign before saving
    fn validate_campaign(&self, campaign: &Campaign) -> LedgerResult<()>;
}

/// Trait for implementing custom donation validation rules
pub trait DonationValidator: Send + Sync {
    /// Validate a donation before saving
    fn validate_donation(&self, donation: &Donation) -> LedgerResult<()>;
}

/// Default campaign validator: UUID id, non-empty title of at most 255
/// characters, positive goal
pub struct DefaultCampaignValidator;

impl CampaignValidator for DefaultCampaignValidator {
    fn validate_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        validate_uuid("Campaign", &campaign.id)?;
        validate_campaign_title(&campaign.title)?;

        if campaign.goal_amount <= BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "Campaign goal must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default donation validator: UUID ids and a positive amount
pub struct DefaultDonationValidator;

impl DonationValidator for DefaultDonationValidator {
    fn validate_donation(&self, donation: &Donation) -> LedgerResult<()> {
        validate_uuid("Donation", &donation.id)?;
        validate_uuid("Campaign", &donation.campaign_id)?;
        validate_positive_amount(&donation.amount)
    }
}

/// Sink for reconciliation reports
pub trait ReconciliationReporter {
    /// Emit a finished report
    fn report(&mut self, report: &ReconciliationReport) -> LedgerResult<()>;
}
