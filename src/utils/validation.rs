//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;
use uuid::Uuid;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an ID is a well-formed UUID
pub fn validate_uuid(kind: &str, id: &str) -> LedgerResult<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|e| LedgerError::Validation(format!("{} ID '{}' is not a UUID: {}", kind, id, e)))
}

/// Validate that a campaign title is valid
pub fn validate_campaign_title(title: &str) -> LedgerResult<()> {
    if title.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Campaign title cannot be empty".to_string(),
        ));
    }

    if title.chars().count() > 255 {
        return Err(LedgerError::Validation(
            "Campaign title cannot exceed 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Default campaign rules plus a non-negative cached total, for records
/// loaded from elsewhere
pub struct EnhancedCampaignValidator;

impl CampaignValidator for EnhancedCampaignValidator {
    fn validate_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        DefaultCampaignValidator.validate_campaign(campaign)?;

        if campaign.collected_amount < BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "Collected amount cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default donation rules plus the requirement that new donations are pending
pub struct EnhancedDonationValidator;

impl DonationValidator for EnhancedDonationValidator {
    fn validate_donation(&self, donation: &Donation) -> LedgerResult<()> {
        DefaultDonationValidator.validate_donation(donation)?;

        if donation.status != DonationStatus::Pending {
            return Err(LedgerError::Validation(format!(
                "New donations must be PENDING, got {}",
                donation.status
            )));
        }

        Ok(())
    }
}
