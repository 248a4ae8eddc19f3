//! Donation recording and settlement

use bigdecimal::BigDecimal;
use tracing::info;

use crate::traits::*;
use crate::types::*;

/// Donation manager for recording donations and applying gateway outcomes
pub struct DonationManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn DonationValidator>,
}

impl<S: LedgerStorage> DonationManager<S> {
    /// Create a new donation manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultDonationValidator),
        }
    }

    /// Create a new donation manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn DonationValidator>) -> Self {
        Self { storage, validator }
    }

    /// Record a pending donation for an existing campaign
    pub async fn record_donation(
        &self,
        id: String,
        campaign_id: String,
        amount: BigDecimal,
    ) -> LedgerResult<Donation> {
        let donation = Donation::new(id, campaign_id, amount);

        self.validator.validate_donation(&donation)?;

        if self.storage.get_campaign(&donation.campaign_id).await?.is_none() {
            return Err(LedgerError::CampaignNotFound(donation.campaign_id.clone()));
        }

        self.storage.save_donation(&donation).await?;

        Ok(donation)
    }

    /// Apply a payment outcome to a pending donation.
    ///
    /// A successful payment increments the campaign total in the same unit
    /// of work, so settlement on its own never introduces drift.
    pub async fn settle(
        &self,
        donation_id: &str,
        status: DonationStatus,
    ) -> LedgerResult<Donation> {
        let donation = self.storage.settle_donation(donation_id, status).await?;
        info!(
            donation_id,
            campaign_id = %donation.campaign_id,
            status = %donation.status,
            amount = %donation.amount,
            "donation settled"
        );
        Ok(donation)
    }

    /// Get a donation by ID
    pub async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>> {
        self.storage.get_donation(donation_id).await
    }

    /// Get a donation by ID, returning an error if not found
    pub async fn get_donation_required(&self, donation_id: &str) -> LedgerResult<Donation> {
        self.storage
            .get_donation(donation_id)
            .await?
            .ok_or_else(|| LedgerError::DonationNotFound(donation_id.to_string()))
    }

    /// List every donation of a campaign
    pub async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>> {
        self.storage.list_campaign_donations(campaign_id).await
    }

    /// Sum of a campaign's successful donations, computed from the records
    pub async fn successful_total(&self, campaign_id: &str) -> LedgerResult<BigDecimal> {
        Ok(self
            .list_campaign_donations(campaign_id)
            .await?
            .iter()
            .filter(|d| d.status.counts_toward_total())
            .map(|d| &d.amount)
            .sum())
    }
}
