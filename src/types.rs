//! Core types and data structures for the donation ledger

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment status of a donation, as written by payment-gateway callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    /// Created, waiting for the gateway to confirm or reject the payment
    Pending,
    /// Paid; the only status that counts toward a campaign's collected amount
    Success,
    /// Rejected, expired or cancelled by the gateway
    Failed,
}

impl DonationStatus {
    /// The literal stored in the `donations.status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "PENDING",
            DonationStatus::Success => "SUCCESS",
            DonationStatus::Failed => "FAILED",
        }
    }

    /// Whether donations with this status are part of `collected_amount`
    pub fn counts_toward_total(&self) -> bool {
        matches!(self, DonationStatus::Success)
    }

    /// Terminal statuses cannot be settled again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DonationStatus::Pending)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DonationStatus::Pending),
            "SUCCESS" => Ok(DonationStatus::Success),
            "FAILED" => Ok(DonationStatus::Failed),
            other => Err(LedgerError::Validation(format!(
                "Unknown donation status '{}'",
                other
            ))),
        }
    }
}

/// A fundraising campaign with its cached running total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// UUID of the campaign
    pub id: String,
    /// Human-readable campaign title
    pub title: String,
    /// Cached sum of successful donations; may drift from the real sum
    pub collected_amount: BigDecimal,
    /// Funding goal
    pub goal_amount: BigDecimal,
    /// When the campaign was created
    pub created_at: NaiveDateTime,
    /// When the campaign was last updated
    pub updated_at: NaiveDateTime,
}

impl Campaign {
    /// Create a new campaign with nothing collected yet
    pub fn new(id: String, title: String, goal_amount: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            title,
            collected_amount: BigDecimal::from(0),
            goal_amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// Funding progress in percent, rounded to two decimals.
    ///
    /// Returns `None` when the goal is zero or negative.
    pub fn progress_percent(&self) -> Option<BigDecimal> {
        progress_percent(&self.collected_amount, &self.goal_amount)
    }

    /// Add a settled donation amount to the cached total
    pub fn apply_donation(&mut self, amount: &BigDecimal) {
        self.collected_amount += amount;
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// A single contribution to a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    /// UUID of the donation
    pub id: String,
    /// Campaign receiving the donation
    pub campaign_id: String,
    /// Donated amount
    pub amount: BigDecimal,
    /// Payment status
    pub status: DonationStatus,
    /// When the donation was created
    pub created_at: NaiveDateTime,
    /// When the donation was last updated
    pub updated_at: NaiveDateTime,
}

impl Donation {
    /// Create a new pending donation
    pub fn new(id: String, campaign_id: String, amount: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            campaign_id,
            amount,
            status: DonationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which campaigns a reconciliation run touches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileScope {
    /// Every campaign in the store
    #[default]
    All,
    /// A single campaign by id
    Campaign(String),
}

impl ReconcileScope {
    /// The campaign id filter, if any
    pub fn campaign_id(&self) -> Option<&str> {
        match self {
            ReconcileScope::All => None,
            ReconcileScope::Campaign(id) => Some(id.as_str()),
        }
    }
}

/// Cached versus recomputed total for one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDrift {
    pub campaign_id: String,
    pub title: String,
    pub goal_amount: BigDecimal,
    /// `collected_amount` as currently cached
    pub current_collected: BigDecimal,
    /// Sum of the campaign's successful donations
    pub actual_collected: BigDecimal,
    /// `actual_collected - current_collected`
    pub difference: BigDecimal,
}

impl CampaignDrift {
    pub fn new(
        campaign_id: String,
        title: String,
        goal_amount: BigDecimal,
        current_collected: BigDecimal,
        actual_collected: BigDecimal,
    ) -> Self {
        let difference = &actual_collected - &current_collected;
        Self {
            campaign_id,
            title,
            goal_amount,
            current_collected,
            actual_collected,
            difference,
        }
    }

    /// Whether the cached total disagrees with the donations
    pub fn has_drift(&self) -> bool {
        self.difference != BigDecimal::from(0)
    }

    /// Progress the campaign will show once its total is corrected
    pub fn actual_progress_percent(&self) -> Option<BigDecimal> {
        progress_percent(&self.actual_collected, &self.goal_amount)
    }
}

fn progress_percent(collected: &BigDecimal, goal: &BigDecimal) -> Option<BigDecimal> {
    if *goal <= BigDecimal::from(0) {
        return None;
    }
    let percent = collected * BigDecimal::from(100) / goal;
    Some(percent.round(2))
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),
    #[error("Donation not found: {0}")]
    DonationNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Donation {donation_id} cannot move from {from} to {to}")]
    InvalidTransition {
        donation_id: String,
        from: DonationStatus,
        to: DonationStatus,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
