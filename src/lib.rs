//! # Care Quality Engine
//!
//! Scores care-visit checklists, aggregates weekly quality trends, detects
//! special notes that need follow-up, and generates guardian-facing reports
//! through a Langbase pipe.
//!
//! ## Pipeline
//!
//! ```text
//! visit completed → ChecklistScorer ─┐
//!                 → SpecialNoteDetector ─┤→ ContentGenerator → commit (SQLite tx)
//!                                                                   ↓
//!                                            webhooks ∥ guardian notification
//! ```
//!
//! Weekly records and trends are recomputed on demand by [`weekly::WeeklyScoreService`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use care_quality_engine::{Config, Engine};
//! use care_quality_engine::generator::LangbaseGenerator;
//! use care_quality_engine::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let generator = Arc::new(LangbaseGenerator::new(&config.generator, config.request.clone())?);
//!     let engine = Engine::new(config, storage, generator)?;
//!     let outcome = engine.orchestrator.generate_report("visit-id", "caregiver-id").await?;
//!     println!("{}", outcome.report.id);
//!     Ok(())
//! }
//! ```

/// Capability checks for privileged operations.
pub mod access;
/// Checklist catalog, answers and scoring.
pub mod checklist;
/// Configuration management.
pub mod config;
/// Component wiring.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Report content generation.
pub mod generator;
/// Special-note rules and detection.
pub mod notes;
/// Notifications and broadcast.
pub mod notifications;
/// System prompts for the generator pipe.
pub mod prompts;
/// Reports and the report orchestrator.
pub mod reports;
/// SQLite storage layer for persistence.
pub mod storage;
/// Post-commit webhooks.
pub mod webhooks;
/// Weekly aggregation and trends.
pub mod weekly;

pub use config::Config;
pub use engine::Engine;
pub use error::{AppError, AppResult};
