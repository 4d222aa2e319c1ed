use std::sync::Arc;
use tracing::info;

use crate::access::RoleBasedAccess;
use crate::checklist::{default_catalog, ChecklistScorer};
use crate::config::Config;
use crate::error::AppResult;
use crate::generator::ContentGenerator;
use crate::notes::{default_rules, load_rules, SpecialNoteDetector};
use crate::notifications::NotificationDispatcher;
use crate::reports::ReportOrchestrator;
use crate::storage::{CatalogStore, SqliteStorage};
use crate::webhooks::WebhookDispatcher;
use crate::weekly::WeeklyScoreService;

/// Fully wired engine components.
pub struct Engine {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: Arc<SqliteStorage>,
    /// Report lifecycle coordinator.
    pub orchestrator: ReportOrchestrator,
    /// Weekly score recompute and queries.
    pub weekly: WeeklyScoreService,
    /// Notification delivery and read state.
    pub notifications: NotificationDispatcher,
}

impl Engine {
    /// Wire the engine over a storage backend and content generator.
    pub fn new(config: Config, storage: Arc<SqliteStorage>, generator: Arc<dyn ContentGenerator>) -> AppResult<Self> {
        let rules = match &config.detection.rules_path {
            Some(path) => load_rules(path)?,
            None => default_rules(),
        };
        info!(
            rules = rules.len(),
            webhooks = config.webhooks.urls.len(),
            admins = config.access.admin_user_ids.len(),
            "Engine initializing"
        );

        let scorer = ChecklistScorer::new(config.scoring.clone());
        let notifications = NotificationDispatcher::new(
            storage.clone(),
            storage.clone(),
            config.notifications.clone(),
        );
        let webhooks = WebhookDispatcher::new(&config.webhooks)?;

        let orchestrator = ReportOrchestrator::new(
            storage.clone(),
            generator,
            Arc::new(RoleBasedAccess::new(&config.access)),
            webhooks,
            notifications.clone(),
        )
        .with_scorer(scorer.clone())
        .with_detector(SpecialNoteDetector::new(rules));

        let weekly = WeeklyScoreService::new(storage.clone(), scorer);

        Ok(Self {
            config,
            storage,
            orchestrator,
            weekly,
            notifications,
        })
    }

    /// Upsert the built-in checklist catalog. Returns the number of questions written.
    pub async fn seed_catalog(&self) -> AppResult<usize> {
        let catalog = default_catalog();
        for question in catalog.iter() {
            self.storage.upsert_question(question).await?;
        }
        info!(questions = catalog.len(), "Checklist catalog seeded");
        Ok(catalog.len())
    }
}
