//! Storage layer for the engine.
//!
//! This module provides:
//! - Visit-side records consumed by the engine ([`Visit`], [`Recipient`], [`CareNote`], [`User`])
//! - Narrow store contracts, one per concern, composed into [`Storage`]
//! - The SQLite implementation ([`SqliteStorage`])
//!
//! Entities reference each other by id only; relationships are resolved by lookup.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checklist::{ChecklistQuestion, ChecklistResponse, QuestionCatalog};
use crate::error::StorageResult;
use crate::notes::SpecialNote;
use crate::notifications::Notification;
use crate::reports::{Feedback, Report, ReportStatus};
use crate::weekly::WeeklyChecklistScore;

// ============================================================================
// Visit-side records
// ============================================================================

/// Lifecycle status of a care visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    /// Caregiver has checked in.
    #[default]
    Active,
    /// Caregiver has checked out; data is immutable.
    Completed,
    /// Visit was cancelled.
    Cancelled,
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisitStatus::Active => write!(f, "active"),
            VisitStatus::Completed => write!(f, "completed"),
            VisitStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(VisitStatus::Active),
            "completed" => Ok(VisitStatus::Completed),
            "cancelled" => Ok(VisitStatus::Cancelled),
            _ => Err(format!("Unknown visit status: {}", s)),
        }
    }
}

/// A single care session for one recipient by one caregiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    /// Unique visit identifier.
    pub id: String,
    /// Recipient receiving care.
    pub recipient_id: String,
    /// Caregiver performing the visit.
    pub caregiver_id: String,
    /// Visit status.
    pub status: VisitStatus,
    /// Check-in time.
    pub start_time: DateTime<Utc>,
    /// Check-out time, set on completion.
    pub end_time: Option<DateTime<Utc>>,
}

impl Visit {
    /// Create an active visit starting at `start_time`.
    pub fn new(
        recipient_id: impl Into<String>,
        caregiver_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.into(),
            caregiver_id: caregiver_id.into(),
            status: VisitStatus::Active,
            start_time,
            end_time: None,
        }
    }

    /// Mark the visit completed at `end_time`.
    pub fn completed_at(mut self, end_time: DateTime<Utc>) -> Self {
        self.status = VisitStatus::Completed;
        self.end_time = Some(end_time);
        self
    }

    /// The instant the visit is attributed to: check-out, else check-in.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.start_time)
    }

    /// Whether the visit is completed.
    pub fn is_completed(&self) -> bool {
        self.status == VisitStatus::Completed
    }
}

/// The person receiving care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub guardian_id: Option<String>,
    pub caregiver_id: Option<String>,
}

impl Recipient {
    /// Create a recipient with no guardian or caregiver assigned.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            guardian_id: None,
            caregiver_id: None,
        }
    }

    /// Assign the guardian.
    pub fn with_guardian(mut self, guardian_id: impl Into<String>) -> Self {
        self.guardian_id = Some(guardian_id.into());
        self
    }

    /// Assign the caregiver.
    pub fn with_caregiver(mut self, caregiver_id: impl Into<String>) -> Self {
        self.caregiver_id = Some(caregiver_id.into());
        self
    }
}

/// Free-text care note written during a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareNote {
    pub id: String,
    pub visit_id: String,
    /// Prompt category, e.g. `special_moments` or `health_observation`.
    pub note_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl CareNote {
    /// Create a care note for a visit.
    pub fn new(
        visit_id: impl Into<String>,
        note_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            visit_id: visit_id.into(),
            note_type: note_type.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Role of a directory user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Caregiver,
    Guardian,
    Admin,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Caregiver => write!(f, "caregiver"),
            UserType::Guardian => write!(f, "guardian"),
            UserType::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "caregiver" => Ok(UserType::Caregiver),
            "guardian" => Ok(UserType::Guardian),
            "admin" => Ok(UserType::Admin),
            _ => Err(format!("Unknown user type: {}", s)),
        }
    }
}

/// Directory entry used to target group broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub user_type: UserType,
    pub is_active: bool,
}

/// Everything one report commit writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct ReportCommit {
    /// Report row to insert or overwrite.
    pub report: Report,
    /// `true` inserts a new row; `false` overwrites the existing row in place.
    pub is_new: bool,
    /// Special notes to insert.
    pub created_notes: Vec<SpecialNote>,
    /// Existing special notes to overwrite (appended or resolved).
    pub updated_notes: Vec<SpecialNote>,
}

// ============================================================================
// Store contracts
// ============================================================================

/// Visits, recipients and their checklist/care-note children.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Create a recipient.
    async fn create_recipient(&self, recipient: &Recipient) -> StorageResult<()>;
    /// Get a recipient by ID.
    async fn get_recipient(&self, id: &str) -> StorageResult<Option<Recipient>>;
    /// Create a visit.
    async fn create_visit(&self, visit: &Visit) -> StorageResult<()>;
    /// Get a visit by ID.
    async fn get_visit(&self, id: &str) -> StorageResult<Option<Visit>>;
    /// Completed visits of a recipient whose timestamp is in `[from, until)`.
    async fn list_completed_visits(
        &self,
        recipient_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<Visit>>;
    /// Record a checklist response.
    async fn add_checklist_response(&self, response: &ChecklistResponse) -> StorageResult<()>;
    /// All checklist responses of a visit.
    async fn get_visit_responses(&self, visit_id: &str) -> StorageResult<Vec<ChecklistResponse>>;
    /// Record a care note.
    async fn add_care_note(&self, note: &CareNote) -> StorageResult<()>;
    /// All care notes of a visit.
    async fn get_visit_care_notes(&self, visit_id: &str) -> StorageResult<Vec<CareNote>>;
}

/// Checklist question catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace a question by key.
    async fn upsert_question(&self, question: &ChecklistQuestion) -> StorageResult<()>;
    /// Load the full catalog.
    async fn load_catalog(&self) -> StorageResult<QuestionCatalog>;
}

/// Reports, special notes and feedback.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Get a report by ID.
    async fn get_report(&self, id: &str) -> StorageResult<Option<Report>>;
    /// Get the report of a visit.
    async fn get_report_by_visit(&self, visit_id: &str) -> StorageResult<Option<Report>>;
    /// Atomically write a report and its special-note mutations.
    async fn commit_report(&self, commit: &ReportCommit) -> StorageResult<()>;
    /// Update a report's status.
    async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;
    /// Reports created at or after `since`.
    async fn list_reports_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<Report>>;
    /// Get a special note by ID.
    async fn get_special_note(&self, id: &str) -> StorageResult<Option<SpecialNote>>;
    /// Unresolved special notes of a recipient.
    async fn list_open_special_notes(&self, recipient_id: &str) -> StorageResult<Vec<SpecialNote>>;
    /// Resolved notes of a recipient that recorded `visit_id` or were observed
    /// or resolved at or after `at`.
    async fn list_resolved_special_notes_covering(
        &self,
        recipient_id: &str,
        visit_id: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Vec<SpecialNote>>;
    /// Most recent special notes of a recipient, newest first.
    async fn list_special_notes(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SpecialNote>>;
    /// Record guardian feedback.
    async fn create_feedback(&self, feedback: &Feedback) -> StorageResult<()>;
    /// Feedback submitted on a report.
    async fn list_report_feedback(&self, report_id: &str) -> StorageResult<Vec<Feedback>>;
}

/// Weekly checklist score records.
#[async_trait]
pub trait WeeklyScoreStore: Send + Sync {
    /// Replace-on-conflict write keyed by `(recipient_id, week_start)`.
    async fn upsert_weekly_score(&self, score: &WeeklyChecklistScore) -> StorageResult<()>;
    /// Get the record of one week.
    async fn get_weekly_score(
        &self,
        recipient_id: &str,
        week_start: NaiveDate,
    ) -> StorageResult<Option<WeeklyChecklistScore>>;
    /// Records with `from <= week_start <= until`, ascending.
    async fn list_weekly_scores(
        &self,
        recipient_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> StorageResult<Vec<WeeklyChecklistScore>>;
    /// Remove the record of one week.
    async fn delete_weekly_score(&self, recipient_id: &str, week_start: NaiveDate)
        -> StorageResult<()>;
}

/// Notification rows.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Create a notification.
    async fn create_notification(&self, notification: &Notification) -> StorageResult<()>;
    /// Get a notification by ID.
    async fn get_notification(&self, id: &str) -> StorageResult<Option<Notification>>;
    /// Flip `is_read` and set `read_at` if still unread. Returns whether a row changed.
    async fn mark_notification_read(&self, id: &str, read_at: DateTime<Utc>) -> StorageResult<bool>;
    /// Notifications of a receiver, newest first.
    async fn list_notifications(
        &self,
        receiver_id: &str,
        unread_only: bool,
    ) -> StorageResult<Vec<Notification>>;
    /// Count unread notifications of a receiver.
    async fn count_unread(&self, receiver_id: &str) -> StorageResult<u64>;
}

/// User directory used for broadcast targeting.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Insert or replace a user.
    async fn upsert_user(&self, user: &User) -> StorageResult<()>;
    /// Active users, optionally restricted to one type.
    async fn list_active_users(&self, user_type: Option<UserType>) -> StorageResult<Vec<User>>;
}

/// The full store the engine runs against.
pub trait Storage:
    VisitStore + CatalogStore + ReportStore + WeeklyScoreStore + NotificationStore + DirectoryStore
{
}

impl<T> Storage for T where
    T: VisitStore
        + CatalogStore
        + ReportStore
        + WeeklyScoreStore
        + NotificationStore
        + DirectoryStore
{
}
