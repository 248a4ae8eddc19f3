//! MySQL LedgerStorage implementation.
//!
//! This is the production backend. Amounts live in `DECIMAL(15,2)` columns
//! and every aggregate is cast back to `DECIMAL` so it decodes as
//! `BigDecimal` whatever the column type of an existing deployment.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlPool, Row};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::traits::*;
use crate::types::*;

const SCHEMA: [&str; 2] = [
    r#"CREATE TABLE IF NOT EXISTS campaigns (
        id CHAR(36) NOT NULL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        collected_amount DECIMAL(15,2) NOT NULL DEFAULT 0,
        goal_amount DECIMAL(15,2) NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS donations (
        id CHAR(36) NOT NULL PRIMARY KEY,
        campaign_id CHAR(36) NOT NULL,
        amount DECIMAL(15,2) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        INDEX idx_donations_campaign_status (campaign_id, status),
        CONSTRAINT fk_donations_campaign FOREIGN KEY (campaign_id) REFERENCES campaigns (id)
    )"#,
];

const CAMPAIGN_COLUMNS: &str = "id, title, \
    CAST(collected_amount AS DECIMAL(20,2)) AS collected_amount, \
    CAST(goal_amount AS DECIMAL(20,2)) AS goal_amount, created_at, updated_at";

const DONATION_COLUMNS: &str = "id, campaign_id, \
    CAST(amount AS DECIMAL(20,2)) AS amount, status, created_at, updated_at";

const DRIFT_QUERY: &str = r#"
    SELECT c.id, c.title,
           CAST(c.goal_amount AS DECIMAL(20,2)) AS goal_amount,
           CAST(c.collected_amount AS DECIMAL(20,2)) AS current_collected,
           CAST(COALESCE(SUM(d.amount), 0) AS DECIMAL(20,2)) AS actual_collected
    FROM campaigns c
    LEFT JOIN donations d ON d.campaign_id = c.id AND d.status = ?
    WHERE (? IS NULL OR c.id = ?)
    GROUP BY c.id, c.title, c.goal_amount, c.collected_amount
    ORDER BY (COALESCE(SUM(d.amount), 0) - c.collected_amount) DESC
"#;

const RECALCULATE_STATEMENT: &str = r#"
    UPDATE campaigns c
    SET c.collected_amount = (
            SELECT COALESCE(SUM(d.amount), 0)
            FROM donations d
            WHERE d.campaign_id = c.id AND d.status = ?
        ),
        c.updated_at = ?
    WHERE (? IS NULL OR c.id = ?)
"#;

/// MySQL implementation of LedgerStorage.
#[derive(Debug, Clone)]
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    /// Wrap an existing pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Open a pool from the configured host, credentials and pool limit.
    pub async fn connect(config: &DatabaseConfig) -> LedgerResult<Self> {
        let opts = match &config.url {
            Some(url) => url.parse::<MySqlConnectOptions>()?,
            None => MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database),
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.connection_limit)
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
}

fn campaign_from_row(row: &MySqlRow) -> LedgerResult<Campaign> {
    Ok(Campaign {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        collected_amount: row.try_get("collected_amount")?,
        goal_amount: row.try_get("goal_amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn donation_from_row(row: &MySqlRow) -> LedgerResult<Donation> {
    Ok(Donation {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        amount: row.try_get("amount")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl LedgerStorage for MySqlStorage {
    async fn save_campaign(&self, campaign: &Campaign) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO campaigns \
             (id, title, collected_amount, goal_amount, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&campaign.id)
        .bind(&campaign.title)
        .bind(&campaign.collected_amount)
        .bind(&campaign.goal_amount)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> LedgerResult<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM campaigns WHERE id = ?",
            CAMPAIGN_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn list_campaigns(&self) -> LedgerResult<Vec<Campaign>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM campaigns ORDER BY created_at, id",
            CAMPAIGN_COLUMNS
        ))
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
        .bind(&campaign.collected_amount)
        .bind(&campaign.goal_amount)
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
        .bind(&donation.amount)
        .bind(donation.status.as_str())
        .bind(donation.created_at)
        .bind(donation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_donation(&self, donation_id: &str) -> LedgerResult<Option<Donation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM donations WHERE id = ?",
            DONATION_COLUMNS
        ))
        .bind(donation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(donation_from_row).transpose()
    }

    async fn list_campaign_donations(&self, campaign_id: &str) -> LedgerResult<Vec<Donation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM donations WHERE campaign_id = ? ORDER BY created_at, id",
            DONATION_COLUMNS
        ))
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

        // Row lock on the donation serialises concurrent webhook deliveries.
        let row = sqlx::query(&format!(
            "SELECT {} FROM donations WHERE id = ? FOR UPDATE",
            DONATION_COLUMNS
        ))
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
        sqlx::query("UPDATE donations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(donation_id)
            .execute(&mut *tx)
            .await?;

        if status.counts_toward_total() {
            sqlx::query(
                "UPDATE campaigns SET collected_amount = collected_amount + ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(&donation.amount)
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
            "SELECT CAST(COALESCE(SUM(collected_amount), 0) AS DECIMAL(20,2)) AS total \
             FROM campaigns WHERE (? IS NULL OR id = ?)",
        )
        .bind(campaign_id)
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
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
                    row.try_get("goal_amount")?,
                    row.try_get("current_collected")?,
                    row.try_get("actual_collected")?,
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
