use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::keywords::{trending_keywords, KeywordCount};
use super::{Feedback, Report, ReportTransition};
use crate::access::{AccessContext, AccessPolicy, Action};
use crate::checklist::{ChecklistScorer, VisitScore};
use crate::error::{AppError, AppResult};
use crate::generator::{ContentGenerator, GenerationRequest};
use crate::notes::{NoteChanges, SpecialNote, SpecialNoteDetector};
use crate::notifications::{
    BroadcastOutcome, NotificationDispatcher, NotificationMessage, FEEDBACK_NOTIFICATION,
    REPORT_NOTIFICATION,
};
use crate::storage::{Recipient, ReportCommit, Storage, UserType, Visit};
use crate::webhooks::{WebhookDispatcher, WebhookTriggerResponse};

/// Result of the guardian notification sent after a report commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent {
        notification_id: String,
        receiver_id: String,
    },
    Failed {
        receiver_id: String,
        error: String,
    },
    /// The recipient has no guardian to notify.
    Skipped,
}

/// Post-commit delivery results. Never affects the committed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub webhooks: WebhookTriggerResponse,
    pub guardian_notification: NotificationOutcome,
}

/// Result of generating or regenerating a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub report: Report,
    pub score: VisitScore,
    pub notes: NoteChanges,
    /// Present for first-time generation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliveries: Option<DeliveryReport>,
}

/// Commit retries after a concurrent commit opened one of the same notes.
const NOTE_RECONCILE_RETRIES: u32 = 2;

/// Visit data gathered and evaluated ahead of content generation.
struct PreparedVisit {
    request: GenerationRequest,
    notes: NoteChanges,
}

/// Coordinates scoring, note detection, generation, commit and delivery.
pub struct ReportOrchestrator {
    storage: Arc<dyn Storage>,
    generator: Arc<dyn ContentGenerator>,
    access: Arc<dyn AccessPolicy>,
    webhooks: WebhookDispatcher,
    notifications: NotificationDispatcher,
    scorer: ChecklistScorer,
    detector: SpecialNoteDetector,
}

impl ReportOrchestrator {
    /// Create a new orchestrator with the default scorer and note rules.
    pub fn new(
        storage: Arc<dyn Storage>,
        generator: Arc<dyn ContentGenerator>,
        access: Arc<dyn AccessPolicy>,
        webhooks: WebhookDispatcher,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            storage,
            generator,
            access,
            webhooks,
            notifications,
            scorer: ChecklistScorer::default(),
            detector: SpecialNoteDetector::default(),
        }
    }

    /// Use a custom scorer.
    pub fn with_scorer(mut self, scorer: ChecklistScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Use a custom note detector.
    pub fn with_detector(mut self, detector: SpecialNoteDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Generate the report of a completed visit.
    ///
    /// Fails without side effects when the visit is missing or not completed,
    /// the actor lacks the capability, a report already exists, or generation
    /// fails. Webhook and notification failures after the commit are reported
    /// in the outcome.
    pub async fn generate_report(&self, visit_id: &str, actor_id: &str) -> AppResult<ReportOutcome> {
        let start = Instant::now();

        let (visit, recipient) = self.load_completed_visit(visit_id).await?;
        self.access
            .check(actor_id, Action::GenerateReport, &context_of(&visit, &recipient))?;

        if self.storage.get_report_by_visit(visit_id).await?.is_some() {
            return Err(AppError::Conflict {
                message: format!("Report already exists for visit {}", visit_id),
            });
        }

        let mut prepared = self.prepare(visit, recipient).await?;
        let generated = self.generate(&prepared.request).await?;
        let report = Report::new(visit_id, generated);

        self.commit(&report, true, &mut prepared).await?;

        let deliveries = self
            .deliver(&prepared.request.visit, &prepared.request.recipient, &report)
            .await;

        info!(
            visit_id = %visit_id,
            report_id = %report.id,
            score_percentage = prepared.request.score.score_percentage,
            notes_created = prepared.notes.created.len(),
            notes_appended = prepared.notes.appended.len(),
            notes_resolved = prepared.notes.resolved.len(),
            webhooks_ok = deliveries.webhooks.succeeded(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Report generated"
        );

        Ok(ReportOutcome {
            report,
            score: prepared.request.score,
            notes: prepared.notes,
            deliveries: Some(deliveries),
        })
    }

    /// Regenerate a report's content in place.
    ///
    /// Keeps the report id, resets status to `generated` and increments the
    /// regeneration count. Special notes are re-evaluated for the visit.
    pub async fn regenerate_report(&self, report_id: &str, actor_id: &str) -> AppResult<ReportOutcome> {
        let start = Instant::now();

        let mut report = self.load_report(report_id).await?;
        let (visit, recipient) = self.load_completed_visit(&report.visit_id).await?;
        self.access
            .check(actor_id, Action::RegenerateReport, &context_of(&visit, &recipient))?;

        let mut prepared = self.prepare(visit, recipient).await?;
        let generated = self.generate(&prepared.request).await?;
        report.regenerate(generated);

        self.commit(&report, false, &mut prepared).await?;

        info!(
            report_id = %report.id,
            visit_id = %report.visit_id,
            regeneration_count = report.regeneration_count,
            latency_ms = start.elapsed().as_millis() as u64,
            "Report regenerated"
        );

        Ok(ReportOutcome {
            report,
            score: prepared.request.score,
            notes: prepared.notes,
            deliveries: None,
        })
    }

    /// Open a report. The guardian opening a `generated` report marks it `read`.
    pub async fn open_report(&self, report_id: &str, viewer_id: &str) -> AppResult<Report> {
        let mut report = self.load_report(report_id).await?;
        let (visit, recipient) = self.load_visit(&report.visit_id).await?;
        let context = context_of(&visit, &recipient);
        self.access.check(viewer_id, Action::ViewReport, &context)?;

        if context.guardian_id.as_deref() == Some(viewer_id) {
            let next = report.status.apply(ReportTransition::Read);
            if next != report.status {
                self.set_status(&mut report, next).await?;
                debug!(report_id = %report_id, "Report marked read");
            }
        }

        Ok(report)
    }

    /// Mark a report reviewed.
    pub async fn review_report(&self, report_id: &str, actor_id: &str) -> AppResult<Report> {
        let mut report = self.load_report(report_id).await?;
        let (visit, recipient) = self.load_visit(&report.visit_id).await?;
        self.access
            .check(actor_id, Action::ReviewReport, &context_of(&visit, &recipient))?;

        let next = report.status.apply(ReportTransition::Review);
        if next != report.status {
            self.set_status(&mut report, next).await?;
            info!(report_id = %report_id, actor_id = %actor_id, "Report reviewed");
        }

        Ok(report)
    }

    /// Record guardian feedback on a report and notify the visit's caregiver.
    pub async fn submit_feedback(
        &self,
        report_id: &str,
        guardian_id: &str,
        message: &str,
        requirements: Option<String>,
    ) -> AppResult<Feedback> {
        if message.trim().is_empty() {
            return Err(AppError::validation("message", "Feedback message cannot be empty"));
        }

        let report = self.load_report(report_id).await?;
        let (visit, recipient) = self.load_visit(&report.visit_id).await?;
        self.access
            .check(guardian_id, Action::SubmitFeedback, &context_of(&visit, &recipient))?;

        let feedback = Feedback::new(
            report_id,
            guardian_id,
            message.trim(),
            requirements.filter(|r| !r.trim().is_empty()),
        );
        self.storage.create_feedback(&feedback).await?;

        let notice = NotificationMessage::new(
            FEEDBACK_NOTIFICATION,
            "New guardian feedback",
            format!("{}'s guardian left feedback on a care report.", recipient.name),
        )
        .with_data(json!({ "feedback_id": feedback.id, "report_id": report_id }));

        if let Err(e) = self
            .notifications
            .notify(Some(guardian_id), &visit.caregiver_id, &notice)
            .await
        {
            warn!(feedback_id = %feedback.id, error = %e, "Failed to notify caregiver of feedback");
        }

        info!(feedback_id = %feedback.id, report_id = %report_id, "Feedback submitted");
        Ok(feedback)
    }

    /// Most frequent report keywords over the last `days` days.
    pub async fn trending_keywords(
        &self,
        actor_id: &str,
        days: u32,
        limit: usize,
    ) -> AppResult<Vec<KeywordCount>> {
        self.access
            .check(actor_id, Action::ViewTrendingKeywords, &AccessContext::global())?;
        if days == 0 {
            return Err(AppError::validation("days", "must be at least 1"));
        }

        let since = Utc::now() - Duration::days(i64::from(days));
        let reports = self.storage.list_reports_since(since).await?;
        Ok(trending_keywords(&reports, limit))
    }

    /// Broadcast a message to active users, optionally of one type.
    pub async fn broadcast(
        &self,
        actor_id: &str,
        user_type: Option<UserType>,
        message: &NotificationMessage,
    ) -> AppResult<BroadcastOutcome> {
        self.access
            .check(actor_id, Action::Broadcast, &AccessContext::global())?;
        self.notifications
            .broadcast_to_group(Some(actor_id), user_type, message)
            .await
    }

    /// A recipient's most recent special notes, newest first.
    pub async fn special_notes(&self, recipient_id: &str, limit: usize) -> AppResult<Vec<SpecialNote>> {
        if self.storage.get_recipient(recipient_id).await?.is_none() {
            return Err(AppError::not_found("recipient", recipient_id));
        }
        Ok(self.storage.list_special_notes(recipient_id, limit).await?)
    }

    /// Score a visit without generating anything.
    pub async fn score_visit(&self, visit_id: &str) -> AppResult<VisitScore> {
        let visit = self
            .storage
            .get_visit(visit_id)
            .await?
            .ok_or_else(|| AppError::not_found("visit", visit_id))?;
        let catalog = self.storage.load_catalog().await?;
        let responses = self.storage.get_visit_responses(&visit.id).await?;
        Ok(self.scorer.score(&visit.id, &catalog, &responses))
    }

    // ------------------------------------------------------------------------
    // Pipeline steps
    // ------------------------------------------------------------------------

    async fn load_visit(&self, visit_id: &str) -> AppResult<(Visit, Recipient)> {
        let visit = self
            .storage
            .get_visit(visit_id)
            .await?
            .ok_or_else(|| AppError::not_found("visit", visit_id))?;
        let recipient = self
            .storage
            .get_recipient(&visit.recipient_id)
            .await?
            .ok_or_else(|| AppError::not_found("recipient", &visit.recipient_id))?;
        Ok((visit, recipient))
    }

    async fn load_completed_visit(&self, visit_id: &str) -> AppResult<(Visit, Recipient)> {
        let (visit, recipient) = self.load_visit(visit_id).await?;
        if !visit.is_completed() {
            return Err(AppError::validation(
                "visit",
                format!("Visit {} is {}, reports require a completed visit", visit_id, visit.status),
            ));
        }
        Ok((visit, recipient))
    }

    async fn load_report(&self, report_id: &str) -> AppResult<Report> {
        self.storage
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::not_found("report", report_id))
    }

    async fn prepare(&self, visit: Visit, recipient: Recipient) -> AppResult<PreparedVisit> {
        let catalog = self.storage.load_catalog().await?;
        let responses = self.storage.get_visit_responses(&visit.id).await?;
        let care_notes = self.storage.get_visit_care_notes(&visit.id).await?;

        let score = self.scorer.score(&visit.id, &catalog, &responses);

        debug!(
            visit_id = %visit.id,
            answered = score.answered,
            skipped = score.skipped,
            partial = score.partial,
            score_percentage = score.score_percentage,
            "Visit scored"
        );

        let request = GenerationRequest {
            visit,
            recipient,
            responses,
            care_notes,
            score,
        };
        let notes = self.detect_notes(&request).await?;

        Ok(PreparedVisit { request, notes })
    }

    /// Reconcile the visit against the recipient's current notes.
    async fn detect_notes(&self, request: &GenerationRequest) -> AppResult<NoteChanges> {
        let visit = &request.visit;
        let mut known = self.storage.list_open_special_notes(&visit.recipient_id).await?;
        known.extend(
            self.storage
                .list_resolved_special_notes_covering(&visit.recipient_id, &visit.id, visit.timestamp())
                .await?,
        );

        Ok(self
            .detector
            .detect(visit, &request.responses, &request.care_notes, &known))
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<crate::generator::GeneratedContent> {
        self.generator.generate(request).await.map_err(|e| {
            error!(visit_id = %request.visit.id, error = %e, "Report generation failed");
            AppError::GenerationFailed(e)
        })
    }

    /// Commit the report with its note changes.
    ///
    /// A concurrent commit for the same recipient can open a note of the same
    /// type first; the visit is then reconciled again and the commit retried.
    async fn commit(&self, report: &Report, is_new: bool, prepared: &mut PreparedVisit) -> AppResult<()> {
        let mut attempts = 0;

        loop {
            let commit = ReportCommit {
                report: report.clone(),
                is_new,
                created_notes: prepared.notes.created.clone(),
                updated_notes: prepared.notes.updated(),
            };

            match self.storage.commit_report(&commit).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_unique_violation_on("special_notes") && attempts < NOTE_RECONCILE_RETRIES => {
                    attempts += 1;
                    warn!(
                        visit_id = %report.visit_id,
                        attempt = attempts,
                        "Open notes changed during generation, reconciling again"
                    );
                    prepared.notes = self.detect_notes(&prepared.request).await?;
                }
                Err(e) if e.is_unique_violation_on("reports") => {
                    return Err(AppError::Conflict {
                        message: format!("Report already exists for visit {}: {}", report.visit_id, e),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn set_status(&self, report: &mut Report, status: super::ReportStatus) -> AppResult<()> {
        let updated_at = Utc::now();
        self.storage
            .update_report_status(&report.id, status, updated_at)
            .await?;
        report.status = status;
        report.updated_at = updated_at;
        Ok(())
    }

    async fn deliver(&self, visit: &Visit, recipient: &Recipient, report: &Report) -> DeliveryReport {
        let (webhooks, guardian_notification) = tokio::join!(
            self.webhooks.trigger(&visit.id),
            self.notify_guardian(visit, recipient, report)
        );

        DeliveryReport {
            webhooks,
            guardian_notification,
        }
    }

    async fn notify_guardian(&self, visit: &Visit, recipient: &Recipient, report: &Report) -> NotificationOutcome {
        let Some(guardian_id) = recipient.guardian_id.as_deref() else {
            debug!(recipient_id = %recipient.id, "Recipient has no guardian, skipping notification");
            return NotificationOutcome::Skipped;
        };

        let message = NotificationMessage::new(
            REPORT_NOTIFICATION,
            "New care report",
            format!(
                "{}'s care report for {} is ready.",
                recipient.name,
                visit.start_time.format("%Y-%m-%d")
            ),
        )
        .with_data(json!({ "report_id": report.id, "visit_id": visit.id }));

        match self
            .notifications
            .notify(Some(&visit.caregiver_id), guardian_id, &message)
            .await
        {
            Ok(notification) => NotificationOutcome::Sent {
                notification_id: notification.id,
                receiver_id: guardian_id.to_string(),
            },
            Err(e) => {
                warn!(report_id = %report.id, receiver_id = %guardian_id, error = %e, "Guardian notification failed");
                NotificationOutcome::Failed {
                    receiver_id: guardian_id.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn context_of(visit: &Visit, recipient: &Recipient) -> AccessContext {
    AccessContext::for_visit(visit.caregiver_id.clone(), recipient.guardian_id.clone())
}
