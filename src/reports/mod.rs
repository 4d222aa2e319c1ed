//! Care reports and their lifecycle.
//!
//! A report is generated once per completed visit and moves
//! `generated → read → reviewed`. Regeneration is a transition from any state
//! back to `generated` that keeps the report's identity.

mod keywords;
mod orchestrator;

pub use keywords::{trending_keywords, KeywordCount};
pub use orchestrator::{DeliveryReport, NotificationOutcome, ReportOrchestrator, ReportOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generator::GeneratedContent;

/// Resting state of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Generated,
    Read,
    Reviewed,
}

/// Events that move a report between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTransition {
    /// The guardian opened the report.
    Read,
    /// Someone explicitly reviewed the report.
    Review,
    /// Content was regenerated.
    Regenerate,
}

impl ReportStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Generated => "generated",
            ReportStatus::Read => "read",
            ReportStatus::Reviewed => "reviewed",
        }
    }

    /// The state after `transition`.
    ///
    /// `read` and `reviewed` never revert except through regeneration.
    pub fn apply(self, transition: ReportTransition) -> ReportStatus {
        match (self, transition) {
            (_, ReportTransition::Regenerate) => ReportStatus::Generated,
            (_, ReportTransition::Review) => ReportStatus::Reviewed,
            (ReportStatus::Generated, ReportTransition::Read) => ReportStatus::Read,
            (current, ReportTransition::Read) => current,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // "regenerated" was once stored as a status.
            "generated" | "regenerated" => Ok(ReportStatus::Generated),
            "read" => Ok(ReportStatus::Read),
            "reviewed" => Ok(ReportStatus::Reviewed),
            _ => Err(format!("Unknown report status: {}", s)),
        }
    }
}

/// Generated narrative report for one completed visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    /// Unique: one report per visit.
    pub visit_id: String,
    pub keywords: Vec<String>,
    pub content: String,
    pub ai_comment: String,
    pub status: ReportStatus,
    pub regeneration_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Create a freshly generated report for a visit.
    pub fn new(visit_id: impl Into<String>, generated: GeneratedContent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            visit_id: visit_id.into(),
            keywords: generated.keywords,
            content: generated.content,
            ai_comment: generated.ai_comment,
            status: ReportStatus::Generated,
            regeneration_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace content in place and return to `generated`.
    pub fn regenerate(&mut self, generated: GeneratedContent) {
        self.keywords = generated.keywords;
        self.content = generated.content;
        self.ai_comment = generated.ai_comment;
        self.status = self.status.apply(ReportTransition::Regenerate);
        self.regeneration_count += 1;
        self.updated_at = Utc::now();
    }
}

/// Review state of guardian feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Reviewed,
    Implemented,
}

impl std::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackStatus::Pending => write!(f, "pending"),
            FeedbackStatus::Reviewed => write!(f, "reviewed"),
            FeedbackStatus::Implemented => write!(f, "implemented"),
        }
    }
}

impl std::str::FromStr for FeedbackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FeedbackStatus::Pending),
            "reviewed" => Ok(FeedbackStatus::Reviewed),
            "implemented" => Ok(FeedbackStatus::Implemented),
            _ => Err(format!("Unknown feedback status: {}", s)),
        }
    }
}

/// A guardian's response to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub report_id: String,
    pub guardian_id: String,
    pub message: String,
    pub requirements: Option<String>,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    /// Create pending feedback.
    pub fn new(
        report_id: impl Into<String>,
        guardian_id: impl Into<String>,
        message: impl Into<String>,
        requirements: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            report_id: report_id.into(),
            guardian_id: guardian_id.into(),
            message: message.into(),
            requirements,
            status: FeedbackStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> GeneratedContent {
        GeneratedContent {
            keywords: vec!["calm".to_string()],
            content: text.to_string(),
            ai_comment: String::new(),
        }
    }

    #[test]
    fn test_transitions() {
        use ReportStatus::*;
        use ReportTransition as T;

        assert_eq!(Generated.apply(T::Read), Read);
        assert_eq!(Read.apply(T::Read), Read);
        assert_eq!(Reviewed.apply(T::Read), Reviewed);
        assert_eq!(Generated.apply(T::Review), Reviewed);
        assert_eq!(Read.apply(T::Review), Reviewed);
        assert_eq!(Reviewed.apply(T::Regenerate), Generated);
        assert_eq!(Read.apply(T::Regenerate), Generated);
    }

    #[test]
    fn test_legacy_regenerated_reads_as_generated() {
        assert_eq!("regenerated".parse::<ReportStatus>(), Ok(ReportStatus::Generated));
        assert_eq!("REVIEWED".parse::<ReportStatus>(), Ok(ReportStatus::Reviewed));
        assert!("archived".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn test_regenerate_keeps_identity() {
        let mut report = Report::new("visit-1", content("first"));
        report.status = ReportStatus::Reviewed;
        let id = report.id.clone();
        let created_at = report.created_at;

        report.regenerate(content("second"));

        assert_eq!(report.id, id);
        assert_eq!(report.created_at, created_at);
        assert_eq!(report.content, "second");
        assert_eq!(report.status, ReportStatus::Generated);
        assert_eq!(report.regeneration_count, 1);
    }

    #[test]
    fn test_report_serialization_shape() {
        let report = Report::new("visit-1", content("body"));
        let json = serde_json::to_value(&report).unwrap();

        for field in ["id", "visit_id", "keywords", "content", "status", "created_at"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["status"], "generated");
    }
}
