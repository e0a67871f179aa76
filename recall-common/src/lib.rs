//! # Recall Alert Common Library
//!
//! Shared code for the recall alert pipeline including:
//! - Canonical recall models and the structured summary types
//! - Configuration loading (CLI → ENV → TOML → defaults)
//! - SQLite initialization for the relational store
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{Alert, RawRecord, Recall, RecallSummary, RecordId, RiskLevel, StoredRecall};
