//! ICM Dashboard - Library interface
//!
//! Backend for sending and tracking Teleporter (ICM) cross-chain messages.
//! Re-exports internal modules for use in integration tests.

pub mod analytics;
pub mod api;
pub mod chains;
pub mod config;
pub mod contracts;
pub mod encoder;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod store;
pub mod tracker;
pub mod types;
pub mod wallet;

pub use error::{IcmError, StoreError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SendDraft};
