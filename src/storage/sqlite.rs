use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    CareNote, CatalogStore, DirectoryStore, NotificationStore, Recipient, ReportCommit, ReportStore, User,
    UserType, Visit, VisitStore, WeeklyScoreStore,
};
use crate::checklist::{ChecklistQuestion, ChecklistResponse, QuestionCatalog};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::notes::SpecialNote;
use crate::notifications::Notification;
use crate::reports::{Feedback, Report, ReportStatus};
use crate::weekly::WeeklyChecklistScore;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database, used by tests.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // One connection that never expires: the database lives only as long as it does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ============================================================================
// Visits
// ============================================================================

#[async_trait]
impl VisitStore for SqliteStorage {
    async fn create_recipient(&self, recipient: &Recipient) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recipients (id, name, guardian_id, caregiver_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&recipient.id)
        .bind(&recipient.name)
        .bind(&recipient.guardian_id)
        .bind(&recipient.caregiver_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_recipient(&self, id: &str) -> StorageResult<Option<Recipient>> {
        let row: Option<RecipientRow> = sqlx::query_as(
            "SELECT id, name, guardian_id, caregiver_id FROM recipients WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Recipient::from))
    }

    async fn create_visit(&self, visit: &Visit) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO visits (id, recipient_id, caregiver_id, status, start_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&visit.id)
        .bind(&visit.recipient_id)
        .bind(&visit.caregiver_id)
        .bind(visit.status.to_string())
        .bind(timestamp(visit.start_time))
        .bind(visit.end_time.map(timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_visit(&self, id: &str) -> StorageResult<Option<Visit>> {
        let row: Option<VisitRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, caregiver_id, status, start_time, end_time
            FROM visits
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Visit::try_from).transpose()
    }

    async fn list_completed_visits(
        &self,
        recipient_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<Visit>> {
        let rows: Vec<VisitRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, caregiver_id, status, start_time, end_time
            FROM visits
            WHERE recipient_id = ?
              AND status = 'completed'
              AND COALESCE(end_time, start_time) >= ?
              AND COALESCE(end_time, start_time) < ?
            ORDER BY COALESCE(end_time, start_time) ASC, id ASC
            "#,
        )
        .bind(recipient_id)
        .bind(timestamp(from))
        .bind(timestamp(until))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Visit::try_from).collect()
    }

    async fn add_checklist_response(&self, response: &ChecklistResponse) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO checklist_responses (visit_id, question_key, answer, note)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&response.visit_id)
        .bind(&response.question_key)
        .bind(to_json(&response.answer)?)
        .bind(&response.note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_visit_responses(&self, visit_id: &str) -> StorageResult<Vec<ChecklistResponse>> {
        let rows: Vec<ResponseRow> = sqlx::query_as(
            r#"
            SELECT visit_id, question_key, answer, note
            FROM checklist_responses
            WHERE visit_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(visit_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChecklistResponse::try_from).collect()
    }

    async fn add_care_note(&self, note: &CareNote) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO care_notes (id, visit_id, note_type, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(&note.visit_id)
        .bind(&note.note_type)
        .bind(&note.content)
        .bind(timestamp(note.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_visit_care_notes(&self, visit_id: &str) -> StorageResult<Vec<CareNote>> {
        let rows: Vec<CareNoteRow> = sqlx::query_as(
            r#"
            SELECT id, visit_id, note_type, content, created_at
            FROM care_notes
            WHERE visit_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(visit_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CareNote::try_from).collect()
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[async_trait]
impl CatalogStore for SqliteStorage {
    async fn upsert_question(&self, question: &ChecklistQuestion) -> StorageResult<()> {
        let scale = question.scale.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO checklist_questions (key, category, text, kind, options, scale, weight)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                category = excluded.category,
                text = excluded.text,
                kind = excluded.kind,
                options = excluded.options,
                scale = excluded.scale,
                weight = excluded.weight
            "#,
        )
        .bind(&question.key)
        .bind(&question.category)
        .bind(&question.text)
        .bind(question.kind.as_str())
        .bind(to_json(&question.options)?)
        .bind(scale)
        .bind(question.weight)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_catalog(&self) -> StorageResult<QuestionCatalog> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            "SELECT key, category, text, kind, options, scale, weight FROM checklist_questions",
        )
        .fetch_all(&self.pool)
        .await?;

        let questions = rows
            .into_iter()
            .map(ChecklistQuestion::try_from)
            .collect::<StorageResult<Vec<_>>>()?;

        debug!(questions = questions.len(), "Catalog loaded");
        Ok(QuestionCatalog::from_questions(questions))
    }
}

// ============================================================================
// Reports, special notes, feedback
// ============================================================================

#[async_trait]
impl ReportStore for SqliteStorage {
    async fn get_report(&self, id: &str) -> StorageResult<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, visit_id, keywords, content, ai_comment, status, regeneration_count, created_at, updated_at
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    async fn get_report_by_visit(&self, visit_id: &str) -> StorageResult<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, visit_id, keywords, content, ai_comment, status, regeneration_count, created_at, updated_at
            FROM reports
            WHERE visit_id = ?
            "#,
        )
        .bind(visit_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    async fn commit_report(&self, commit: &ReportCommit) -> StorageResult<()> {
        let report = &commit.report;
        let keywords = to_json(&report.keywords)?;

        let mut tx = self.pool.begin().await?;

        if commit.is_new {
            sqlx::query(
                r#"
                INSERT INTO reports (id, visit_id, keywords, content, ai_comment, status, regeneration_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&report.id)
            .bind(&report.visit_id)
            .bind(&keywords)
            .bind(&report.content)
            .bind(&report.ai_comment)
            .bind(report.status.as_str())
            .bind(i64::from(report.regeneration_count))
            .bind(timestamp(report.created_at))
            .bind(timestamp(report.updated_at))
            .execute(&mut *tx)
            .await?;
        } else {
            let result = sqlx::query(
                r#"
                UPDATE reports
                SET keywords = ?, content = ?, ai_comment = ?, status = ?, regeneration_count = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&keywords)
            .bind(&report.content)
            .bind(&report.ai_comment)
            .bind(report.status.as_str())
            .bind(i64::from(report.regeneration_count))
            .bind(timestamp(report.updated_at))
            .bind(&report.id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StorageError::Query {
                    message: format!("Report {} does not exist", report.id),
                });
            }
        }

        for note in &commit.created_notes {
            sqlx::query(
                r#"
                INSERT INTO special_notes (
                    id, recipient_id, visit_id, note_type, short_summary, detailed_content,
                    priority_level, is_resolved, created_at, resolved_at, last_visit_id, last_observed_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&note.id)
            .bind(&note.recipient_id)
            .bind(&note.visit_id)
            .bind(&note.note_type)
            .bind(&note.short_summary)
            .bind(&note.detailed_content)
            .bind(note.priority_level.as_str())
            .bind(note.is_resolved)
            .bind(timestamp(note.created_at))
            .bind(note.resolved_at.map(timestamp))
            .bind(&note.last_visit_id)
            .bind(timestamp(note.last_observed_at))
            .execute(&mut *tx)
            .await?;
        }

        for note in &commit.updated_notes {
            sqlx::query(
                r#"
                UPDATE special_notes
                SET detailed_content = ?, priority_level = ?, is_resolved = ?, resolved_at = ?,
                    last_visit_id = ?, last_observed_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&note.detailed_content)
            .bind(note.priority_level.as_str())
            .bind(note.is_resolved)
            .bind(note.resolved_at.map(timestamp))
            .bind(&note.last_visit_id)
            .bind(timestamp(note.last_observed_at))
            .bind(&note.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            report_id = %report.id,
            is_new = commit.is_new,
            notes_created = commit.created_notes.len(),
            notes_updated = commit.updated_notes.len(),
            "Report committed"
        );

        Ok(())
    }

    async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE reports SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(timestamp(updated_at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Query {
                message: format!("Report {} does not exist", id),
            });
        }

        Ok(())
    }

    async fn list_reports_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, visit_id, keywords, content, ai_comment, status, regeneration_count, created_at, updated_at
            FROM reports
            WHERE created_at >= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Report::try_from).collect()
    }

    async fn get_special_note(&self, id: &str) -> StorageResult<Option<SpecialNote>> {
        let row: Option<SpecialNoteRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, visit_id, note_type, short_summary, detailed_content, priority_level,
                   is_resolved, created_at, resolved_at, last_visit_id, last_observed_at
            FROM special_notes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SpecialNote::try_from).transpose()
    }

    async fn list_open_special_notes(&self, recipient_id: &str) -> StorageResult<Vec<SpecialNote>> {
        let rows: Vec<SpecialNoteRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, visit_id, note_type, short_summary, detailed_content, priority_level,
                   is_resolved, created_at, resolved_at, last_visit_id, last_observed_at
            FROM special_notes
            WHERE recipient_id = ? AND is_resolved = 0
            ORDER BY created_at ASC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SpecialNote::try_from).collect()
    }

    async fn list_resolved_special_notes_covering(
        &self,
        recipient_id: &str,
        visit_id: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Vec<SpecialNote>> {
        let at = timestamp(at);
        let rows: Vec<SpecialNoteRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, visit_id, note_type, short_summary, detailed_content, priority_level,
                   is_resolved, created_at, resolved_at, last_visit_id, last_observed_at
            FROM special_notes
            WHERE recipient_id = ? AND is_resolved = 1
              AND (visit_id = ? OR last_visit_id = ? OR last_observed_at >= ? OR resolved_at >= ?)
            ORDER BY created_at ASC
            "#,
        )
        .bind(recipient_id)
        .bind(visit_id)
        .bind(visit_id)
        .bind(&at)
        .bind(&at)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SpecialNote::try_from).collect()
    }

    async fn list_special_notes(&self, recipient_id: &str, limit: usize) -> StorageResult<Vec<SpecialNote>> {
        let rows: Vec<SpecialNoteRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, visit_id, note_type, short_summary, detailed_content, priority_level,
                   is_resolved, created_at, resolved_at, last_visit_id, last_observed_at
            FROM special_notes
            WHERE recipient_id = ?
            ORDER BY created_at DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(recipient_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SpecialNote::try_from).collect()
    }

    async fn create_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, report_id, guardian_id, message, requirements, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.id)
        .bind(&feedback.report_id)
        .bind(&feedback.guardian_id)
        .bind(&feedback.message)
        .bind(&feedback.requirements)
        .bind(feedback.status.to_string())
        .bind(timestamp(feedback.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_report_feedback(&self, report_id: &str) -> StorageResult<Vec<Feedback>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, report_id, guardian_id, message, requirements, status, created_at
            FROM feedback
            WHERE report_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Feedback::try_from).collect()
    }
}

// ============================================================================
// Weekly scores
// ============================================================================

#[async_trait]
impl WeeklyScoreStore for SqliteStorage {
    async fn upsert_weekly_score(&self, score: &WeeklyChecklistScore) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO weekly_checklist_scores (
                recipient_id, week_start, week_end, total_score, score_percentage,
                checklist_count, score_breakdown, trend_indicator, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(recipient_id, week_start) DO UPDATE SET
                week_end = excluded.week_end,
                total_score = excluded.total_score,
                score_percentage = excluded.score_percentage,
                checklist_count = excluded.checklist_count,
                score_breakdown = excluded.score_breakdown,
                trend_indicator = excluded.trend_indicator,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&score.recipient_id)
        .bind(score.week_start.to_string())
        .bind(score.week_end.to_string())
        .bind(score.total_score)
        .bind(score.score_percentage)
        .bind(i64::from(score.checklist_count))
        .bind(to_json(&score.score_breakdown)?)
        .bind(score.trend_indicator.as_str())
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_weekly_score(
        &self,
        recipient_id: &str,
        week_start: NaiveDate,
    ) -> StorageResult<Option<WeeklyChecklistScore>> {
        let row: Option<WeeklyRow> = sqlx::query_as(
            r#"
            SELECT recipient_id, week_start, week_end, total_score, score_percentage,
                   checklist_count, score_breakdown, trend_indicator
            FROM weekly_checklist_scores
            WHERE recipient_id = ? AND week_start = ?
            "#,
        )
        .bind(recipient_id)
        .bind(week_start.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WeeklyChecklistScore::try_from).transpose()
    }

    async fn list_weekly_scores(
        &self,
        recipient_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> StorageResult<Vec<WeeklyChecklistScore>> {
        let rows: Vec<WeeklyRow> = sqlx::query_as(
            r#"
            SELECT recipient_id, week_start, week_end, total_score, score_percentage,
                   checklist_count, score_breakdown, trend_indicator
            FROM weekly_checklist_scores
            WHERE recipient_id = ? AND week_start >= ? AND week_start <= ?
            ORDER BY week_start ASC
            "#,
        )
        .bind(recipient_id)
        .bind(from.to_string())
        .bind(until.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WeeklyChecklistScore::try_from).collect()
    }

    async fn delete_weekly_score(&self, recipient_id: &str, week_start: NaiveDate) -> StorageResult<()> {
        sqlx::query("DELETE FROM weekly_checklist_scores WHERE recipient_id = ? AND week_start = ?")
            .bind(recipient_id)
            .bind(week_start.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Notifications and directory
// ============================================================================

#[async_trait]
impl NotificationStore for SqliteStorage {
    async fn create_notification(&self, notification: &Notification) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, sender_id, receiver_id, notification_type, title, content, data, is_read, read_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.sender_id)
        .bind(&notification.receiver_id)
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(to_json(&notification.data)?)
        .bind(notification.is_read)
        .bind(notification.read_at.map(timestamp))
        .bind(timestamp(notification.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_notification(&self, id: &str) -> StorageResult<Option<Notification>> {
        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, receiver_id, notification_type, title, content, data, is_read, read_at, created_at
            FROM notifications
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn mark_notification_read(&self, id: &str, read_at: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(timestamp(read_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_notifications(&self, receiver_id: &str, unread_only: bool) -> StorageResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, receiver_id, notification_type, title, content, data, is_read, read_at, created_at
            FROM notifications
            WHERE receiver_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(receiver_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn count_unread(&self, receiver_id: &str) -> StorageResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE receiver_id = ? AND is_read = 0")
                .bind(receiver_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DirectoryStore for SqliteStorage {
    async fn upsert_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, user_type, is_active)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_type = excluded.user_type,
                is_active = excluded.is_active
            "#,
        )
        .bind(&user.id)
        .bind(user.user_type.to_string())
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_users(&self, user_type: Option<UserType>) -> StorageResult<Vec<User>> {
        let user_type = user_type.map(|t| t.to_string());
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, user_type, is_active
            FROM users
            WHERE is_active = 1 AND (? IS NULL OR user_type = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(&user_type)
        .bind(&user_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}

// ============================================================================
// Column encoding
// ============================================================================

/// Fixed-precision UTC text, so stored timestamps compare lexicographically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(column, raw, e))
}

fn parse_optional_timestamp(column: &str, raw: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(column, &s)).transpose()
}

fn parse_date(column: &str, raw: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| corrupt(column, raw, e))
}

fn parse_enum<T: FromStr<Err = String>>(column: &str, raw: &str) -> StorageResult<T> {
    raw.parse().map_err(|e: String| corrupt(column, raw, e))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to encode column: {}", e),
    })
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw).map_err(|e| corrupt(column, raw, e))
}

fn corrupt(column: &str, raw: &str, error: impl std::fmt::Display) -> StorageError {
    StorageError::Query {
        message: format!("Invalid {} value '{}': {}", column, raw, error),
    }
}

// Internal row types for SQLx mapping

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: String,
    name: String,
    guardian_id: Option<String>,
    caregiver_id: Option<String>,
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            guardian_id: row.guardian_id,
            caregiver_id: row.caregiver_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VisitRow {
    id: String,
    recipient_id: String,
    caregiver_id: String,
    status: String,
    start_time: String,
    end_time: Option<String>,
}

impl TryFrom<VisitRow> for Visit {
    type Error = StorageError;

    fn try_from(row: VisitRow) -> StorageResult<Self> {
        Ok(Self {
            status: parse_enum("visits.status", &row.status)?,
            start_time: parse_timestamp("visits.start_time", &row.start_time)?,
            end_time: parse_optional_timestamp("visits.end_time", row.end_time)?,
            id: row.id,
            recipient_id: row.recipient_id,
            caregiver_id: row.caregiver_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResponseRow {
    visit_id: String,
    question_key: String,
    answer: String,
    note: Option<String>,
}

impl TryFrom<ResponseRow> for ChecklistResponse {
    type Error = StorageError;

    fn try_from(row: ResponseRow) -> StorageResult<Self> {
        Ok(Self {
            answer: from_json("checklist_responses.answer", &row.answer)?,
            visit_id: row.visit_id,
            question_key: row.question_key,
            note: row.note,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CareNoteRow {
    id: String,
    visit_id: String,
    note_type: String,
    content: String,
    created_at: String,
}

impl TryFrom<CareNoteRow> for CareNote {
    type Error = StorageError;

    fn try_from(row: CareNoteRow) -> StorageResult<Self> {
        Ok(Self {
            created_at: parse_timestamp("care_notes.created_at", &row.created_at)?,
            id: row.id,
            visit_id: row.visit_id,
            note_type: row.note_type,
            content: row.content,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    key: String,
    category: String,
    text: String,
    kind: String,
    options: String,
    scale: Option<String>,
    weight: f64,
}

impl TryFrom<QuestionRow> for ChecklistQuestion {
    type Error = StorageError;

    fn try_from(row: QuestionRow) -> StorageResult<Self> {
        Ok(Self {
            kind: parse_enum("checklist_questions.kind", &row.kind)?,
            options: from_json("checklist_questions.options", &row.options)?,
            scale: row
                .scale
                .as_deref()
                .map(|raw| from_json("checklist_questions.scale", raw))
                .transpose()?,
            key: row.key,
            category: row.category,
            text: row.text,
            weight: row.weight,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: String,
    visit_id: String,
    keywords: String,
    content: String,
    ai_comment: String,
    status: String,
    regeneration_count: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = StorageError;

    fn try_from(row: ReportRow) -> StorageResult<Self> {
        Ok(Self {
            keywords: from_json("reports.keywords", &row.keywords)?,
            status: parse_enum("reports.status", &row.status)?,
            regeneration_count: u32::try_from(row.regeneration_count)
                .map_err(|e| corrupt("reports.regeneration_count", &row.regeneration_count.to_string(), e))?,
            created_at: parse_timestamp("reports.created_at", &row.created_at)?,
            updated_at: parse_timestamp("reports.updated_at", &row.updated_at)?,
            id: row.id,
            visit_id: row.visit_id,
            content: row.content,
            ai_comment: row.ai_comment,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SpecialNoteRow {
    id: String,
    recipient_id: String,
    visit_id: String,
    note_type: String,
    short_summary: String,
    detailed_content: String,
    priority_level: String,
    is_resolved: bool,
    created_at: String,
    resolved_at: Option<String>,
    last_visit_id: String,
    last_observed_at: String,
}

impl TryFrom<SpecialNoteRow> for SpecialNote {
    type Error = StorageError;

    fn try_from(row: SpecialNoteRow) -> StorageResult<Self> {
        Ok(Self {
            priority_level: parse_enum("special_notes.priority_level", &row.priority_level)?,
            created_at: parse_timestamp("special_notes.created_at", &row.created_at)?,
            resolved_at: parse_optional_timestamp("special_notes.resolved_at", row.resolved_at)?,
            last_observed_at: parse_timestamp("special_notes.last_observed_at", &row.last_observed_at)?,
            id: row.id,
            recipient_id: row.recipient_id,
            visit_id: row.visit_id,
            note_type: row.note_type,
            short_summary: row.short_summary,
            detailed_content: row.detailed_content,
            is_resolved: row.is_resolved,
            last_visit_id: row.last_visit_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WeeklyRow {
    recipient_id: String,
    week_start: String,
    week_end: String,
    total_score: i64,
    score_percentage: f64,
    checklist_count: i64,
    score_breakdown: String,
    trend_indicator: String,
}

impl TryFrom<WeeklyRow> for WeeklyChecklistScore {
    type Error = StorageError;

    fn try_from(row: WeeklyRow) -> StorageResult<Self> {
        Ok(Self {
            week_start: parse_date("weekly_checklist_scores.week_start", &row.week_start)?,
            week_end: parse_date("weekly_checklist_scores.week_end", &row.week_end)?,
            checklist_count: u32::try_from(row.checklist_count).map_err(|e| {
                corrupt(
                    "weekly_checklist_scores.checklist_count",
                    &row.checklist_count.to_string(),
                    e,
                )
            })?,
            score_breakdown: from_json("weekly_checklist_scores.score_breakdown", &row.score_breakdown)?,
            trend_indicator: parse_enum("weekly_checklist_scores.trend_indicator", &row.trend_indicator)?,
            recipient_id: row.recipient_id,
            total_score: row.total_score,
            score_percentage: row.score_percentage,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    sender_id: Option<String>,
    receiver_id: String,
    notification_type: String,
    title: String,
    content: String,
    data: String,
    is_read: bool,
    read_at: Option<String>,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StorageError;

    fn try_from(row: NotificationRow) -> StorageResult<Self> {
        Ok(Self {
            data: from_json("notifications.data", &row.data)?,
            read_at: parse_optional_timestamp("notifications.read_at", row.read_at)?,
            created_at: parse_timestamp("notifications.created_at", &row.created_at)?,
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            notification_type: row.notification_type,
            title: row.title,
            content: row.content,
            is_read: row.is_read,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: String,
    report_id: String,
    guardian_id: String,
    message: String,
    requirements: Option<String>,
    status: String,
    created_at: String,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = StorageError;

    fn try_from(row: FeedbackRow) -> StorageResult<Self> {
        Ok(Self {
            status: parse_enum("feedback.status", &row.status)?,
            created_at: parse_timestamp("feedback.created_at", &row.created_at)?,
            id: row.id,
            report_id: row.report_id,
            guardian_id: row.guardian_id,
            message: row.message,
            requirements: row.requirements,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    user_type: String,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> StorageResult<Self> {
        Ok(Self {
            user_type: parse_enum("users.user_type", &row.user_type)?,
            id: row.id,
            is_active: row.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2024, 5, 13, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);

        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(timestamp(earlier), "2024-05-13T09:00:00.000000Z");
        assert_eq!(parse_timestamp("t", &timestamp(later)).unwrap(), later);
    }

    #[test]
    fn test_corrupt_value_is_query_error() {
        let err = parse_enum::<ReportStatus>("reports.status", "archived").unwrap_err();
        assert!(matches!(err, StorageError::Query { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_storage_runs_migrations() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let catalog = storage.load_catalog().await.unwrap();
        assert!(catalog.is_empty());
    }
}
