//! Shared library for the Marketing Insights Lambda functions.
//!
//! Aggregates Google Ads, GA4 and WordPress data, asks a language model for
//! insights and caches the answer. The Lambda binaries are thin wrappers over
//! [`QueryOrchestrator`] and [`ReportService`].

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod http;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod reports;
pub mod secrets;
pub mod settings;
pub mod sources;
pub mod token_cache;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use models::{FormattedResponse, ModelPreference, QueryOutcome, QueryRequest};
pub use orchestrator::QueryOrchestrator;
pub use reports::{ReportCadence, ReportService};
pub use secrets::{DatabaseCredentials, SecretStore};
pub use settings::Settings;
