//! SQLite LedgerStorage implementation.
//!
//! Amounts are stored as whole `INTEGER` currency units.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use crate::traits::*;
use crate::types::*;

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        collected_amount INTEGER NOT NULL DEFAULT 0,
        goal_amount INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS donations (
        id TEXT PRIMARY KEY,
        campaign_id TEXT NOT NULL REFERENCES campaigns(id),
        amount INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_donations_campaign_status ON donations (campaign_id, status)",
];

const DRIFT_QUERY: &str = r#"
    SELECT c.id, c.title, c.goal_amount,
           c.collected_amount AS current_collected,
           COALESCE(SUM(d.amount), 0) AS actual_collected
    FROM campaigns c
    LEFT JOIN donations d ON d.campaign_id = c.id AND d.status = ?
    WHERE (? IS NULL OR c.id = ?)
    GROUP BY c.id, c.title, c.goal_amount, c.collected_amount
    ORDER BY (COALESCE(SUM(d.amount), 0) - c.collected_amount) DESC
"#;

const RECALCULATE_STATEMENT: &str = r#"
    UPDATE campaigns
    SET collected_amount = (
            SELECT COALESCE(SUM(d.amount), 0)
            FROM donations d
            WHERE d.campaign_id = campaigns.id AND d.status = ?
        ),
        updated_at = ?
    WHERE (? IS NULL OR id = ?)
"#;

/// SQLite implementation of LedgerStorage.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for a `sqlite:` URL.
    pub async fn connect(url: &str, max_connections: u32) -> LedgerResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        Ok(Self::new(pool))
    }

    /// Create the campaign and donation tables if they do not exist.
    pub async fn init_schema(&self) -> LedgerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Access the pool, e.g. for fixtures in tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn whole_units(amount: &BigDecimal) -> LedgerResult<i64> {
    if !amount.is_integer() {
        return Err(LedgerError::Validation(format!(
            "Amount {} has a fractional part",
            amount
        )));
    }
    amount
        .to_i64()
        .ok_or_else(|| LedgerError::Validation(format!("Amount {} is out of range", amount)))
}

fn campaign_from_row(row: &SqliteRow) -> LedgerResult<Campaign> {
    Ok(Campaign {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        collected_amount: BigDecimal::from(row.try_get::<i64, _>("collected_amount")?),
        goal_amount: BigDecimal::from(row.try_get::<i64, _>("goal_amount")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn donation_from_row(row: &SqliteRow) -> LedgerResult<Donation> {
    Ok(Donation {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        amount: BigDecimal::from(row.try_get::<i64, _>("amount")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl LedgerStorage for SqliteStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO campaigns \
             (id, title, collected_amount, goal_amount, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&campaign.id)
        .bind(&campaign.title)
        .bind(whole_units(&campaign.collected_amount)?)
        .bind(whole_units(&campaign.goal_amount)?)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        let rows = sqlx::query("SELECT * FROM campaigns ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    async fn update_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE campaigns SET title = ?, collected_amount = ?, goal_amount = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&campaign.title)
        .bind(whole_units(&campaign.collected_amount)?)
        .bind(whole_units(&campaign.goal_amount)?)
        .bind(campaign.updated_at)
        .bind(&campaign.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::CampaignNotFound(campaign.id.clone()));
        }
        Ok(())
    }

    async fn save_donation(&self, donation: &Donation) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO donations (id, campaign_id, amount, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&donation.id)
        .bind(&donation.campaign_id)
        .bind(whole_units(&donation.amount)?)
        .bind(donation.status.as_str())
        .bind(donation.created_at)
        .bind(donation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>> {
        let row = sqlx::query("SELECT * FROM donations WHERE id = ?")
            .bind(donation_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(donation_from_row).transpose()
    }

    async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>> {
        let rows =
            sqlx::query("SELECT * FROM donations WHERE campaign_id = ? ORDER BY created_at, id")
                .bind(campaign_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(donation_from_row).collect()
    }

    async fn settle_donation(
        &self,
        donation_id: &str,
        status: DonationStatus,
    ) -> LedgerResult<Donation> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM donations WHERE id = ?")
            .bind(donation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LedgerError::DonationNotFound(donation_id.to_string()))?;
        let mut donation = donation_from_row(&row)?;

        if donation.status == status {
            return Ok(donation);
        }
        if donation.status.is_terminal() || !status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                donation_id: donation_id.to_string(),
                from: donation.status,
                to: status,
            });
        }

        let now = chrono::Utc::now().naive_utc();
        let updated = sqlx::query(
            "UPDATE donations SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(donation_id)
        .bind(DonationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(LedgerError::InvalidTransition {
                donation_id: donation_id.to_string(),
                from: donation.status,
                to: status,
            });
        }

        if status.counts_toward_total() {
            sqlx::query(
                "UPDATE campaigns SET collected_amount = collected_amount + ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(whole_units(&donation.amount)?)
            .bind(now)
            .bind(&donation.campaign_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(donation_id, status = %status, "donation settled");

        donation.status = status;
        donation.updated_at = now;
        Ok(donation)
    }

    async fn total_collected(&self, scope: &ReconcileScope) -> LedgerResult<BigDecimal> {
        let campaign_id = scope.campaign_id();
        let row = sqlx::query(
            "SELECT COALESCE(SUM(collected_amount), 0) AS total FROM campaigns \
             WHERE (? IS NULL OR id = ?)",
        )
        .bind(campaign_id)
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(BigDecimal::from(row.try_get::<i64, _>("total")?))
    }

    async fn campaign_drift(&self, scope: &ReconcileScope) -> LedgerResult<Vec<CampaignDrift>> {
        let campaign_id = scope.campaign_id();
        let rows = sqlx::query(DRIFT_QUERY)
            .bind(DonationStatus::Success.as_str())
            .bind(campaign_id)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CampaignDrift::new(
                    row.try_get("id")?,
                    row.try_get("title")?,
                    BigDecimal::from(row.try_get::<i64, _>("goal_amount")?),
                    BigDecimal::from(row.try_get::<i64, _>("current_collected")?),
                    BigDecimal::from(row.try_get::<i64, _>("actual_collected")?),
                ))
            })
            .collect()
    }

    async fn recalculate_collected(&self, scope: &ReconcileScope) -> LedgerResult<u64> {
        let campaign_id = scope.campaign_id();
        let result = sqlx::query(RECALCULATE_STATEMENT)
            .bind(DonationStatus::Success.as_str())
            .bind(chrono::Utc::now().naive_utc())
            .bind(campaign_id)
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
