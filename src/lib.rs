//! # Donation Ledger
//!
//! Bookkeeping for a donation-based crowdfunding platform: campaigns with a
//! cached `collected_amount`, donations settled by payment-gateway outcomes,
//! and a reconciliation routine that repairs drift between the two.
//!
//! ## Features
//!
//! - **Campaigns and donations**: validated creation and lookups
//! - **Transactional settlement**: a successful payment updates the donation and the
//!   campaign total together
//! - **Reconciliation**: recompute every cached total from successful donations with one
//!   set-based update
//! - **Audit mode**: report drift without writing
//! - **Storage abstraction**: MySQL and SQLite backends via sqlx, plus an in-memory store for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use donation_ledger::utils::MemoryStorage;
//! use donation_ledger::{CampaignLedger, ReconcileOptions};
//! use bigdecimal::BigDecimal;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = CampaignLedger::new(MemoryStorage::new());
//! ledger
//!     .create_campaign(
//!         "5a0c1d7e-8f3b-4c2a-9e6d-1b2c3d4e5f60".to_string(),
//!         "Clean water".to_string(),
//!         BigDecimal::from(5000),
//!     )
//!     .await
//!     .unwrap();
//!
//! let report = ledger
//!     .reconciliation_engine()
//!     .run(&ReconcileOptions::default())
//!     .await
//!     .unwrap();
//! assert!(report.is_consistent());
//! # });
//! ```

pub mod config;
pub mod ledger;
pub mod reconciliation;
pub mod storage;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use ledger::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
