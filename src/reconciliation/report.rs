//! Reconciliation reports and console rendering

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::io::Write;

use super::ReconcileMode;
use crate::traits::ReconciliationReporter;
use crate::types::*;

const TITLE_WIDTH: usize = 32;

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub mode: ReconcileMode,
    pub scope: ReconcileScope,
    pub started_at: NaiveDateTime,
    /// Sum of cached totals before the run
    pub before_total: BigDecimal,
    /// Sum of cached totals after the run
    pub after_total: BigDecimal,
    /// Per-campaign drift, largest positive difference first
    pub campaigns: Vec<CampaignDrift>,
    /// Rows touched by the bulk update (0 in audit mode)
    pub rows_updated: u64,
}

impl ReconciliationReport {
    /// `after_total - before_total`
    pub fn global_delta(&self) -> BigDecimal {
        &self.after_total - &self.before_total
    }

    /// Sum of the per-campaign differences
    pub fn total_difference(&self) -> BigDecimal {
        self.campaigns.iter().map(|c| &c.difference).sum()
    }

    /// Campaigns whose cached total was wrong
    pub fn drifted(&self) -> impl Iterator<Item = &CampaignDrift> {
        self.campaigns.iter().filter(|c| c.has_drift())
    }

    /// True when no campaign had drift
    pub fn is_consistent(&self) -> bool {
        self.drifted().next().is_none()
    }
}

fn signed(amount: &BigDecimal) -> String {
    if *amount > BigDecimal::from(0) {
        format!("+{}", amount)
    } else {
        amount.to_string()
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_WIDTH {
        title.to_string()
    } else {
        let head: String = title.chars().take(TITLE_WIDTH - 3).collect();
        format!("{}...", head)
    }
}

/// Render a report as the operator-facing text block
pub fn render_report(report: &ReconciliationReport) -> String {
    let mut out = String::new();
    let scope = match &report.scope {
        ReconcileScope::All => "all campaigns".to_string(),
        ReconcileScope::Campaign(id) => format!("campaign {}", id),
    };

    out.push_str(&format!(
        "Ledger reconciliation ({}, {}) started {}\n",
        report.mode, scope, report.started_at
    ));
    out.push_str(&format!("Total collected before: {}\n\n", report.before_total));

    out.push_str(&format!(
        "{:<32} {:>16} {:>16} {:>16} {:>9}\n",
        "CAMPAIGN", "CACHED", "ACTUAL", "DIFFERENCE", "PROGRESS"
    ));
    for campaign in &report.campaigns {
        let progress = campaign
            .actual_progress_percent()
            .map(|p| format!("{}%", p))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<32} {:>16} {:>16} {:>16} {:>9}\n",
            truncate_title(&campaign.title),
            campaign.current_collected.to_string(),
            campaign.actual_collected.to_string(),
            signed(&campaign.difference),
            progress
        ));
    }
    if report.campaigns.is_empty() {
        out.push_str("(no campaigns)\n");
    }

    out.push_str("\nSummary\n");
    out.push_str(&format!(
        "Campaigns checked: {}, drifted: {}, updated: {}\n",
        report.campaigns.len(),
        report.drifted().count(),
        report.rows_updated
    ));
    out.push_str(&format!("Total collected after: {}\n", report.after_total));
    out.push_str(&format!("Global delta: {}\n", signed(&report.global_delta())));
    if report.mode == ReconcileMode::Audit && !report.is_consistent() {
        out.push_str(&format!(
            "Audit only: {} of drift left unrepaired\n",
            signed(&report.total_difference())
        ));
    }

    out
}

/// Writes rendered reports to any `Write`, stdout by default
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReconciliationReporter for ConsoleReporter<W> {
    fn report(&mut self, report: &ReconciliationReport) -> LedgerResult<()> {
        self.out.write_all(render_report(report).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}
