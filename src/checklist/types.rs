use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a checklist question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Exactly one option is selected.
    SingleChoice,
    /// Any number of options may be selected.
    MultiChoice,
    /// Free text, recorded but never scored.
    FreeText,
    /// A number mapped through the question's scale.
    Numeric,
    /// A single choice plus a free-text elaboration.
    Mixed,
}

impl AnswerKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::SingleChoice => "single_choice",
            AnswerKind::MultiChoice => "multi_choice",
            AnswerKind::FreeText => "free_text",
            AnswerKind::Numeric => "numeric",
            AnswerKind::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnswerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_choice" => Ok(AnswerKind::SingleChoice),
            "multi_choice" | "multiple_choice" => Ok(AnswerKind::MultiChoice),
            "free_text" | "text" => Ok(AnswerKind::FreeText),
            "numeric" | "number" => Ok(AnswerKind::Numeric),
            "mixed" => Ok(AnswerKind::Mixed),
            _ => Err(format!("Unknown answer kind: {}", s)),
        }
    }
}

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Stable option identifier (the stored answer value).
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Score awarded when selected.
    pub score: f64,
}

/// A closed interval of numeric answers and the score it maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleBand {
    pub min: f64,
    pub max: f64,
    pub score: f64,
}

/// Question-specific mapping from numeric answers to scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericScale {
    pub bands: Vec<ScaleBand>,
}

impl NumericScale {
    /// Score for a value, or `None` when no band contains it.
    pub fn score_for(&self, value: f64) -> Option<f64> {
        self.bands
            .iter()
            .find(|band| value >= band.min && value <= band.max)
            .map(|band| band.score)
    }

    /// Highest score any band awards.
    pub fn max_score(&self) -> f64 {
        self.bands.iter().map(|b| b.score).fold(0.0, f64::max)
    }

    /// Midpoint between the lowest and highest band score.
    pub fn midpoint(&self) -> f64 {
        midpoint(self.bands.iter().map(|b| b.score))
    }
}

/// Checklist reference data. Created by catalog configuration, never by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistQuestion {
    /// Stable question key.
    pub key: String,
    /// Category label used for breakdowns.
    pub category: String,
    /// Question text shown to caregivers.
    pub text: String,
    /// How the question is answered.
    pub kind: AnswerKind,
    /// Ordered options (choice and mixed questions).
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Scale for numeric questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<NumericScale>,
    /// Contribution multiplier.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl ChecklistQuestion {
    /// Create a question with no options and weight 1.0.
    pub fn new(
        key: impl Into<String>,
        category: impl Into<String>,
        text: impl Into<String>,
        kind: AnswerKind,
    ) -> Self {
        Self {
            key: key.into(),
            category: category.into(),
            text: text.into(),
            kind,
            options: Vec::new(),
            scale: None,
            weight: default_weight(),
        }
    }

    /// Append an option.
    pub fn with_option(mut self, id: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        self.options.push(QuestionOption {
            id: id.into(),
            label: label.into(),
            score,
        });
        self
    }

    /// Set the numeric scale.
    pub fn with_scale(mut self, scale: NumericScale) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Look up an option by id.
    pub fn option(&self, id: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Midpoint between the lowest and highest option score.
    pub fn option_midpoint(&self) -> f64 {
        midpoint(self.options.iter().map(|o| o.score))
    }
}

fn midpoint(scores: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = scores.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });
    if min.is_finite() && max.is_finite() {
        (min + max) / 2.0
    } else {
        0.0
    }
}

/// Raw answer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Boolean(bool),
    Numeric(f64),
    Text(String),
    Options(BTreeSet<String>),
}

impl AnswerValue {
    /// Convenience constructor for a single selected option.
    pub fn option(id: impl Into<String>) -> Self {
        AnswerValue::Options(BTreeSet::from([id.into()]))
    }

    /// Convenience constructor for several selected options.
    pub fn options<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Options(ids.into_iter().map(Into::into).collect())
    }
}

/// One visit's answer to one question. Immutable once the visit completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistResponse {
    pub visit_id: String,
    pub question_key: String,
    pub answer: AnswerValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ChecklistResponse {
    /// Create a response without a note.
    pub fn new(visit_id: impl Into<String>, question_key: impl Into<String>, answer: AnswerValue) -> Self {
        Self {
            visit_id: visit_id.into(),
            question_key: question_key.into(),
            answer,
            note: None,
        }
    }

    /// Attach a free-text note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_kind_round_trips_legacy_names() {
        assert_eq!("multiple_choice".parse::<AnswerKind>(), Ok(AnswerKind::MultiChoice));
        assert_eq!("text".parse::<AnswerKind>(), Ok(AnswerKind::FreeText));
        assert_eq!("number".parse::<AnswerKind>(), Ok(AnswerKind::Numeric));
        assert!("essay".parse::<AnswerKind>().is_err());
    }

    #[test]
    fn test_answer_value_serializes_tagged() {
        let json = serde_json::to_value(AnswerValue::option("full_meal")).unwrap();
        assert_eq!(json["type"], "options");
        assert_eq!(json["value"][0], "full_meal");

        let json = serde_json::to_value(AnswerValue::Boolean(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "boolean", "value": true}));
    }

    #[test]
    fn test_scale_lookup_and_midpoint() {
        let scale = NumericScale {
            bands: vec![
                ScaleBand { min: 70.0, max: 130.0, score: 3.0 },
                ScaleBand { min: 131.0, max: 180.0, score: 1.0 },
            ],
        };
        assert_eq!(scale.score_for(100.0), Some(3.0));
        assert_eq!(scale.score_for(300.0), None);
        assert_eq!(scale.max_score(), 3.0);
        assert_eq!(scale.midpoint(), 2.0);
    }

    #[test]
    fn test_option_midpoint_without_options_is_zero() {
        let q = ChecklistQuestion::new("favorite_food", "meal", "Favorite food?", AnswerKind::FreeText);
        assert_eq!(q.option_midpoint(), 0.0);
    }
}
