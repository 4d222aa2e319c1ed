//! Per-visit checklist scoring.
//!
//! Every answered question contributes `score × weight` to the visit total and
//! `max achievable × weight` to the visit maximum. Answers that cannot be mapped
//! to a score are replaced by the scale midpoint and flag the result as partial;
//! responses pointing at unknown questions are skipped and counted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::catalog::QuestionCatalog;
use super::types::{AnswerKind, AnswerValue, ChecklistQuestion, ChecklistResponse};
use crate::config::ScoringConfig;

/// Score of a single visit. Derived data, recomputable at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitScore {
    pub visit_id: String,
    pub total_score: f64,
    pub max_possible: f64,
    /// Percentage of the maximum, 0-100 with two decimals.
    pub score_percentage: f64,
    pub category_breakdown: BTreeMap<String, f64>,
    pub answered: usize,
    pub skipped: usize,
    pub partial: bool,
}

impl VisitScore {
    /// An empty score for a visit with no scorable responses.
    pub fn empty(visit_id: impl Into<String>) -> Self {
        Self {
            visit_id: visit_id.into(),
            total_score: 0.0,
            max_possible: 0.0,
            score_percentage: 0.0,
            category_breakdown: BTreeMap::new(),
            answered: 0,
            skipped: 0,
            partial: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResponseScore {
    score: f64,
    max: f64,
    partial: bool,
}

impl ResponseScore {
    fn exact(score: f64, max: f64) -> Self {
        Self { score, max, partial: false }
    }

    fn substituted(score: f64, max: f64) -> Self {
        Self { score, max, partial: true }
    }
}

/// Stateless checklist scorer.
#[derive(Debug, Clone, Default)]
pub struct ChecklistScorer {
    policy: ScoringConfig,
}

impl ChecklistScorer {
    /// Create a scorer with the given scoring policy.
    pub fn new(policy: ScoringConfig) -> Self {
        Self { policy }
    }

    /// Score one visit's responses against the catalog.
    pub fn score(
        &self,
        visit_id: &str,
        catalog: &QuestionCatalog,
        responses: &[ChecklistResponse],
    ) -> VisitScore {
        let mut result = VisitScore::empty(visit_id);
        let mut seen: HashSet<&str> = HashSet::new();

        for response in responses {
            let Some(question) = catalog.get(&response.question_key) else {
                debug!(
                    visit_id = %visit_id,
                    question_key = %response.question_key,
                    "Skipping response for unknown question"
                );
                result.skipped += 1;
                continue;
            };

            if !seen.insert(response.question_key.as_str()) {
                debug!(
                    visit_id = %visit_id,
                    question_key = %response.question_key,
                    "Skipping duplicate response"
                );
                result.skipped += 1;
                continue;
            }

            let scored = self.score_response(question, response);
            let contribution = scored.score * question.weight;

            result.answered += 1;
            result.total_score += contribution;
            result.max_possible += scored.max * question.weight;
            result.partial |= scored.partial;
            *result
                .category_breakdown
                .entry(question.category.clone())
                .or_insert(0.0) += contribution;
        }

        result.score_percentage = percentage(result.total_score, result.max_possible);
        result
    }

    fn score_response(&self, question: &ChecklistQuestion, response: &ChecklistResponse) -> ResponseScore {
        let mut scored = match question.kind {
            AnswerKind::FreeText => ResponseScore::exact(0.0, 0.0),
            AnswerKind::Numeric => score_numeric(question, &response.answer),
            AnswerKind::SingleChoice | AnswerKind::Mixed => {
                score_choice(question, &response.answer, best_option(question))
            }
            AnswerKind::MultiChoice => {
                let max = question.options.iter().map(|o| o.score.max(0.0)).sum();
                score_choice(question, &response.answer, max)
            }
        };

        if question.kind == AnswerKind::Mixed && self.policy.mixed_text_credit > 0.0 {
            scored.max += self.policy.mixed_text_credit;
            let has_text = response
                .note
                .as_deref()
                .map(|n| !n.trim().is_empty())
                .unwrap_or(false);
            if has_text {
                scored.score += self.policy.mixed_text_credit;
            }
        }

        scored
    }
}

fn best_option(question: &ChecklistQuestion) -> f64 {
    question.options.iter().map(|o| o.score).fold(0.0, f64::max)
}

fn score_choice(question: &ChecklistQuestion, answer: &AnswerValue, max: f64) -> ResponseScore {
    let midpoint = question.option_midpoint();
    let lookup = |id: &str| question.option(id.trim()).map(|o| o.score);

    match answer {
        AnswerValue::Options(ids) => {
            let mut total = 0.0;
            let mut partial = false;
            for id in ids {
                match lookup(id.as_str()) {
                    Some(score) => total += score,
                    None => {
                        total += midpoint;
                        partial = true;
                    }
                }
            }
            ResponseScore { score: total, max, partial }
        }
        AnswerValue::Text(id) => match lookup(id.as_str()) {
            Some(score) => ResponseScore::exact(score, max),
            None => ResponseScore::substituted(midpoint, max),
        },
        AnswerValue::Boolean(flag) => {
            let candidates: [&str; 2] = if *flag { ["yes", "true"] } else { ["no", "false"] };
            match candidates.iter().find_map(|id| lookup(*id)) {
                Some(score) => ResponseScore::exact(score, max),
                None => ResponseScore::substituted(midpoint, max),
            }
        }
        AnswerValue::Numeric(_) => ResponseScore::substituted(midpoint, max),
    }
}

fn score_numeric(question: &ChecklistQuestion, answer: &AnswerValue) -> ResponseScore {
    let Some(scale) = question.scale.as_ref() else {
        return ResponseScore::substituted(0.0, 0.0);
    };
    let max = scale.max_score();

    let value = match answer {
        AnswerValue::Numeric(value) => Some(*value),
        AnswerValue::Text(raw) => raw.trim().parse::<f64>().ok(),
        AnswerValue::Boolean(_) | AnswerValue::Options(_) => None,
    };

    match value.and_then(|v| scale.score_for(v)) {
        Some(score) => ResponseScore::exact(score, max),
        None => ResponseScore::substituted(scale.midpoint(), max),
    }
}

/// `total / max × 100` clamped to 0-100 and rounded to two decimals; 0 when `max` is 0.
pub fn percentage(total: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    round2((total / max * 100.0).clamp(0.0, 100.0))
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
