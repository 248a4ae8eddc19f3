//! In-memory storage implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
///
/// Lock order is donations before campaigns wherever both are held.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    campaigns: Arc<RwLock<HashMap<String, Campaign>>>,
    donations: Arc<RwLock<HashMap<String, Donation>>>,
    failing_campaign: Arc<RwLock<Option<String>>>,
    closes: Arc<AtomicUsize>,
}

fn poisoned<T>(_: PoisonError<T>) -> LedgerError {
    LedgerError::Storage("memory storage lock poisoned".to_string())
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        self.campaigns.write().map_err(poisoned)?.clear();
        self.donations.write().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Make the next bulk recalculation fail when it reaches this campaign,
    /// the way a constraint violation aborts a single SQL statement.
    /// The failure is consumed by that recalculation.
    pub fn fail_recalculation_for(&self, campaign_id: Option<String>) -> LedgerResult<()> {
        *self.failing_campaign.write().map_err(poisoned)? = campaign_id;
        Ok(())
    }

    /// How many times `close` has been called on this store or its clones
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn in_scope(campaign: &Campaign, scope: &ReconcileScope) -> bool {
        scope.campaign_id().is_none_or(|id| campaign.id == id)
    }

    fn successful_sum(donations: &HashMap<String, Donation>, campaign_id: &str) -> BigDecimal {
        donations
            .values()
            .filter(|d| d.campaign_id == campaign_id && d.status.counts_toward_total())
            .map(|d| &d.amount)
            .sum()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        let mut campaigns = self.campaigns.write().map_err(poisoned)?;
        if campaigns.contains_key(&campaign.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate campaign id {}",
                campaign.id
            )));
        }
        campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>> {
        Ok(self
            .campaigns
            .read()
            .map_err(poisoned)?
            .get(campaign_id)
            .cloned())
    }

    async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(campaigns)
    }

    async fn update_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        let mut campaigns = self.campaigns.write().map_err(poisoned)?;
        match campaigns.get_mut(&campaign.id) {
            Some(existing) => {
                *existing = campaign.clone();
                Ok(())
            }
            None => Err(LedgerError::CampaignNotFound(campaign.id.clone())),
        }
    }

    async fn save_donation(&self, donation: &Donation) -> LedgerResult<()> {
        let mut donations = self.donations.write().map_err(poisoned)?;
        if !self
            .campaigns
            .read()
            .map_err(poisoned)?
            .contains_key(&donation.campaign_id)
        {
            return Err(LedgerError::CampaignNotFound(donation.campaign_id.clone()));
        }
        if donations.contains_key(&donation.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate donation id {}",
                donation.id
            )));
        }
        donations.insert(donation.id.clone(), donation.clone());
        Ok(())
    }

    async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>> {
        Ok(self
            .donations
            .read()
            .map_err(poisoned)?
            .get(donation_id)
            .cloned())
    }

    async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>> {
        let mut donations: Vec<Donation> = self
            .donations
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|d| d.campaign_id == campaign_id)
            .cloned()
            .collect();
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(donations)
    }

    async fn settle_donation(
        &self,
        donation_id: &str,
        status: DonationStatus,
    ) -> LedgerResult<Donation> {
        let mut donations = self.donations.write().map_err(poisoned)?;
        let mut campaigns = self.campaigns.write().map_err(poisoned)?;

        let donation = donations
            .get_mut(donation_id)
            .ok_or_else(|| LedgerError::DonationNotFound(donation_id.to_string()))?;

        if donation.status == status {
            return Ok(donation.clone());
        }
        if donation.status.is_terminal() || !status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                donation_id: donation_id.to_string(),
                from: donation.status,
                to: status,
            });
        }

        if status.counts_toward_total() {
            let campaign = campaigns
                .get_mut(&donation.campaign_id)
                .ok_or_else(|| LedgerError::CampaignNotFound(donation.campaign_id.clone()))?;
            campaign.apply_donation(&donation.amount);
        }

        donation.status = status;
        donation.updated_at = chrono::Utc::now().naive_utc();
        Ok(donation.clone())
    }

    async fn total_collected(&self, scope: &ReconcileScope) -> LedgerResult<BigDecimal> {
        Ok(self
            .campaigns
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|c| Self::in_scope(c, scope))
            .map(|c| &c.collected_amount)
            .sum())
    }

    async fn campaign_drift(&self, scope: &ReconcileScope) -> LedgerResult<Vec<CampaignDrift>> {
        let donations = self.donations.read().map_err(poisoned)?;
        let campaigns = self.campaigns.read().map_err(poisoned)?;

        Ok(campaigns
            .values()
            .filter(|c| Self::in_scope(c, scope))
            .map(|c| {
                CampaignDrift::new(
                    c.id.clone(),
                    c.title.clone(),
                    c.goal_amount.clone(),
                    c.collected_amount.clone(),
                    Self::successful_sum(&donations, &c.id),
                )
            })
            .collect())
    }

    async fn recalculate_collected(&self, scope: &ReconcileScope) -> LedgerResult<u64> {
        let donations = self.donations.read().map_err(poisoned)?;
        let mut campaigns = self.campaigns.write().map_err(poisoned)?;
        let failing = self.failing_campaign.write().map_err(poisoned)?.take();

        // Compute every new total before touching any row.
        let mut updates = Vec::new();
        for campaign in campaigns.values().filter(|c| Self::in_scope(c, scope)) {
            if failing.as_deref() == Some(campaign.id.as_str()) {
                return Err(LedgerError::Storage(format!(
                    "constraint violation while updating campaign {}",
                    campaign.id
                )));
            }
            updates.push((
                campaign.id.clone(),
                Self::successful_sum(&donations, &campaign.id),
            ));
        }

        let now = chrono::Utc::now().naive_utc();
        for (id, actual) in &updates {
            if let Some(campaign) = campaigns.get_mut(id) {
                campaign.collected_amount = actual.clone();
                campaign.updated_at = now;
            }
        }

        Ok(updates.len() as u64)
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
