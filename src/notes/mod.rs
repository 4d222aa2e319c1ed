//! Special-note detection.
//!
//! - [`NoteRule`] / [`Trigger`]: configurable rule set keyed by note type
//! - [`SpecialNoteDetector`]: evaluates rules over one visit and reconciles the
//!   results against a recipient's open notes

mod detector;
mod rules;

pub use detector::*;
pub use rules::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered urgency of a special note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Low => "low",
            PriorityLevel::Medium => "medium",
            PriorityLevel::High => "high",
            PriorityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(PriorityLevel::Low),
            "medium" => Ok(PriorityLevel::Medium),
            "high" => Ok(PriorityLevel::High),
            "critical" => Ok(PriorityLevel::Critical),
            _ => Err(format!("Unknown priority level: {}", s)),
        }
    }
}

/// A detected, potentially clinically relevant observation requiring follow-up.
///
/// At most one unresolved note exists per `(recipient_id, note_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialNote {
    pub id: String,
    pub recipient_id: String,
    /// Visit that first triggered the note.
    pub visit_id: String,
    pub note_type: String,
    pub short_summary: String,
    pub detailed_content: String,
    pub priority_level: PriorityLevel,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Most recent visit that triggered or retriggered the note.
    pub last_visit_id: String,
    /// Timestamp of `last_visit_id`.
    pub last_observed_at: DateTime<Utc>,
}

impl SpecialNote {
    /// Open a new note from a triggered draft.
    pub fn open(recipient_id: &str, visit_id: &str, observed_at: DateTime<Utc>, draft: &NoteDraft) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            visit_id: visit_id.to_string(),
            note_type: draft.note_type.clone(),
            short_summary: draft.summary.clone(),
            detailed_content: detail_line(observed_at, &draft.detail),
            priority_level: draft.priority,
            is_resolved: false,
            created_at: observed_at,
            resolved_at: None,
            last_visit_id: visit_id.to_string(),
            last_observed_at: observed_at,
        }
    }
}

pub(crate) fn detail_line(at: DateTime<Utc>, detail: &str) -> String {
    format!("[{}] {}", at.format("%Y-%m-%d"), detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(PriorityLevel::Low < PriorityLevel::Medium);
        assert!(PriorityLevel::Medium < PriorityLevel::High);
        assert!(PriorityLevel::High < PriorityLevel::Critical);
        assert_eq!(PriorityLevel::High.max(PriorityLevel::Low), PriorityLevel::High);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("CRITICAL".parse::<PriorityLevel>(), Ok(PriorityLevel::Critical));
        assert!("urgent".parse::<PriorityLevel>().is_err());
    }
}
