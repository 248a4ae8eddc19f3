//! Campaign management functionality

use bigdecimal::BigDecimal;

use crate::traits::*;
use crate::types::*;

/// Campaign manager for creating and reading campaigns
pub struct CampaignManager<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn CampaignValidator>,
}

impl<S: LedgerStorage> CampaignManager<S> {
    /// Create a new campaign manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultCampaignValidator),
        }
    }

    /// Create a new campaign manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn CampaignValidator>) -> Self {
        Self { storage, validator }
    }

    /// Create a new campaign with nothing collected
    pub async fn create_campaign(
        &self,
        id: String,
        title: String,
        goal_amount: BigDecimal,
    ) -> LedgerResult<Campaign> {
        let campaign = Campaign::new(id, title, goal_amount);

        self.validator.validate_campaign(&campaign)?;

        if self.storage.get_campaign(&campaign.id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Campaign with ID '{}' already exists",
                campaign.id
            )));
        }

        self.storage.save_campaign(&campaign).await?;

        Ok(campaign)
    }

    /// Get a campaign by ID
    pub async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>> {
        self.storage.get_campaign(campaign_id).await
    }

    /// Get a campaign by ID, returning an error if not found
    pub async fn get_campaign_required(&self, campaign_id: &str) -> LedgerResult<Campaign> {
        self.storage
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| LedgerError::CampaignNotFound(campaign_id.to_string()))
    }

    /// List all campaigns
    pub async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        self.storage.list_campaigns().await
    }

    /// Change the title and goal of a campaign.
    ///
    /// The cached total is left as stored; only settlement and
    /// reconciliation write it.
    pub async fn update_details(
        &self,
        campaign_id: &str,
        title: String,
        goal_amount: BigDecimal,
    ) -> LedgerResult<Campaign> {
        let mut campaign = self.get_campaign_required(campaign_id).await?;
        campaign.title = title;
        campaign.goal_amount = goal_amount;
        campaign.updated_at = chrono::Utc::now().naive_utc();

        self.validator.validate_campaign(&campaign)?;
        self.storage.update_campaign(&campaign).await?;

        Ok(campaign)
    }
}
