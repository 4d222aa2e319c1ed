use serde::{Deserialize, Serialize};
use std::path::Path;

use super::PriorityLevel;
use crate::error::{AppError, AppResult};

/// Condition under which a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Any keyword appears (case-insensitive, whole words) in a care note,
    /// a text answer or a response note.
    Keywords {
        keywords: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<PriorityLevel>,
    },
    /// One of the options was selected for the question.
    OptionSelected {
        question_key: String,
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<PriorityLevel>,
    },
    /// The numeric answer to the question falls outside `[min, max]`.
    NumericOutside {
        question_key: String,
        min: f64,
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<PriorityLevel>,
    },
}

impl Trigger {
    /// Priority this trigger raises the note to when it matches.
    pub fn priority(&self) -> Option<PriorityLevel> {
        match self {
            Trigger::Keywords { priority, .. }
            | Trigger::OptionSelected { priority, .. }
            | Trigger::NumericOutside { priority, .. } => *priority,
        }
    }
}

/// Raise priority once enough distinct signals match in one visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub min_matches: usize,
    pub priority: PriorityLevel,
}

/// Rule mapping a note type to its trigger conditions and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRule {
    pub note_type: String,
    /// Human-readable headline of the note.
    pub summary: String,
    /// Fires when any trigger matches.
    pub triggers: Vec<Trigger>,
    pub priority: PriorityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
}

impl NoteRule {
    /// Create a rule with no triggers.
    pub fn new(note_type: impl Into<String>, summary: impl Into<String>, priority: PriorityLevel) -> Self {
        Self {
            note_type: note_type.into(),
            summary: summary.into(),
            triggers: Vec::new(),
            priority,
            escalation: None,
        }
    }

    /// Fire on any of the keywords.
    pub fn on_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.push(Trigger::Keywords {
            keywords: keywords.into_iter().map(Into::into).collect(),
            priority: None,
        });
        self
    }

    /// Fire when one of the options is selected, optionally raising priority.
    pub fn on_options<I, S>(
        mut self,
        question_key: impl Into<String>,
        options: I,
        priority: Option<PriorityLevel>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.push(Trigger::OptionSelected {
            question_key: question_key.into(),
            options: options.into_iter().map(Into::into).collect(),
            priority,
        });
        self
    }

    /// Fire when a numeric answer is outside `[min, max]`.
    pub fn on_numeric_outside(mut self, question_key: impl Into<String>, min: f64, max: f64) -> Self {
        self.triggers.push(Trigger::NumericOutside {
            question_key: question_key.into(),
            min,
            max,
            priority: None,
        });
        self
    }

    /// Escalate once `min_matches` signals match.
    pub fn escalate_at(mut self, min_matches: usize, priority: PriorityLevel) -> Self {
        self.escalation = Some(Escalation { min_matches, priority });
        self
    }
}

/// Load a rule set from a JSON file.
pub fn load_rules(path: &Path) -> AppResult<Vec<NoteRule>> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::Config {
        message: format!("Failed to read note rules {}: {}", path.display(), e),
    })?;
    parse_rules(&raw)
}

/// Parse a rule set from JSON.
pub fn parse_rules(raw: &str) -> AppResult<Vec<NoteRule>> {
    let rules: Vec<NoteRule> = serde_json::from_str(raw).map_err(|e| AppError::Config {
        message: format!("Invalid note rules: {}", e),
    })?;

    for rule in &rules {
        if rule.note_type.trim().is_empty() {
            return Err(AppError::validation("note_type", "cannot be empty"));
        }
        if rule.triggers.is_empty() {
            return Err(AppError::validation(
                "triggers",
                format!("rule {} has no triggers", rule.note_type),
            ));
        }
    }

    Ok(rules)
}

/// Default rule set, aligned with the default checklist catalog.
pub fn default_rules() -> Vec<NoteRule> {
    use PriorityLevel::{Critical, High, Medium};

    vec![
        NoteRule::new("meal_refusal", "Poor food intake", Medium)
            .on_options("meal_amount", ["minimal_meal"], None)
            .on_keywords(["refused to eat", "skipped meal", "no appetite"])
            .escalate_at(2, High),
        NoteRule::new("cognitive_decline", "Marked cognitive decline", High)
            .on_options("memory_cognitive_state", ["severe_memory_loss"], None)
            .on_options("family_recognition", ["poor_recognition"], None)
            .escalate_at(2, Critical),
        NoteRule::new("agitation", "Severe agitation or aggression", High)
            .on_options("behavior_emotion_change", ["severe_agitation"], None)
            .on_keywords(["aggressive", "hit", "shouting"]),
        NoteRule::new("medication_adherence", "Medication not taken reliably", Medium)
            .on_options(
                "medication_insulin_management",
                ["often_missed", "needs_assistance"],
                None,
            )
            .on_options("medication_compliance", ["poor_compliance", "side_effects"], None)
            .escalate_at(2, High),
        NoteRule::new("foot_wound", "Foot wound found", Medium)
            .on_options("foot_condition", ["minor_wounds"], None)
            .on_options("foot_condition", ["serious_wounds"], Some(Critical)),
        NoteRule::new("cardiovascular_symptoms", "Cardiovascular symptoms", High)
            .on_options("blood_pressure_symptoms", ["shortness_of_breath"], None)
            .on_keywords(["chest pain", "short of breath", "chest tightness"]),
        NoteRule::new("edema", "Swelling or weight change", Medium)
            .on_options("edema_weight_change", ["noticeable_edema"], None)
            .on_options("edema_weight_change", ["severe_edema"], Some(High)),
        NoteRule::new("fall_risk", "Fall or near fall reported", High)
            .on_keywords(["fall", "fell", "fallen", "slipped", "tripped"]),
        NoteRule::new("pain", "Pain reported", Medium).on_keywords(["pain", "hurts", "aching"]),
    ]
}
