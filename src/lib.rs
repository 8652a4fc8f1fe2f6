//! Charge anomaly detection for EV fleets.
//!
//! Per-user isolation forests flag unusual monthly spend/energy and unusual
//! single charges. Modular structure:
//! - [`source`] — Read-only charge history (SQLite)
//! - [`features`] — Monthly and per-charge feature tables
//! - [`model`] — Isolation forest, per-partition trainer, swappable registry
//! - [`scoring`] — Request-time scoring against the visible registry generation
//! - [`refresh`] — Startup and periodic retraining
//! - [`service`] — Operations exposed to the HTTP layer
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod error;
pub mod source;
pub mod features;
pub mod model;
pub mod scoring;
pub mod refresh;
pub mod service;
pub mod logging;

pub use config::ServiceConfig;
pub use error::{AnomalyError, Result};
pub use features::{Aggregator, ChargeRecord, FeatureSet, MonthlyRecord, Scope};
pub use model::{AnomalyLabel, IsolationForest, ModelKey, ModelRegistry, Trainer};
pub use scoring::{ChargeAnomaly, MonthlyAnomaly, Scorer};
pub use refresh::{RefreshReport, Refresher};
pub use service::AnomalyService;
pub use source::{ChargeSource, SqliteSource};
pub use logging::StructuredLogger;
