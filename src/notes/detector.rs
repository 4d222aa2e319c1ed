use serde::Serialize;
use tracing::debug;

use super::rules::{NoteRule, Trigger};
use super::{detail_line, PriorityLevel, SpecialNote};
use crate::checklist::{AnswerValue, ChecklistResponse};
use crate::storage::{CareNote, Visit};

const SUMMARY_MAX_CHARS: usize = 120;

/// A triggered rule's proposed note content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteDraft {
    pub note_type: String,
    pub summary: String,
    pub detail: String,
    pub priority: PriorityLevel,
    /// Number of distinct signals that matched.
    pub matches: usize,
}

/// Outcome of one rule over one visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluation {
    pub note_type: String,
    /// `Some` when the rule fired.
    pub draft: Option<NoteDraft>,
}

/// Special-note mutations produced by one visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteChanges {
    pub created: Vec<SpecialNote>,
    pub appended: Vec<SpecialNote>,
    pub resolved: Vec<SpecialNote>,
}

impl NoteChanges {
    /// Whether this visit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.appended.is_empty() && self.resolved.is_empty()
    }

    /// Existing notes to overwrite, appended and resolved alike.
    pub fn updated(&self) -> Vec<SpecialNote> {
        self.appended.iter().chain(self.resolved.iter()).cloned().collect()
    }
}

/// Evaluates note rules over a visit and reconciles them with open notes.
#[derive(Debug, Clone)]
pub struct SpecialNoteDetector {
    rules: Vec<NoteRule>,
}

impl SpecialNoteDetector {
    /// Create a detector over a rule set.
    pub fn new(rules: Vec<NoteRule>) -> Self {
        Self { rules }
    }

    /// The rule set.
    pub fn rules(&self) -> &[NoteRule] {
        &self.rules
    }

    /// Evaluate every rule against one visit's notes and answers.
    pub fn evaluate(&self, responses: &[ChecklistResponse], care_notes: &[CareNote]) -> Vec<RuleEvaluation> {
        let texts = collect_texts(responses, care_notes);

        self.rules
            .iter()
            .map(|rule| RuleEvaluation {
                note_type: rule.note_type.clone(),
                draft: evaluate_rule(rule, responses, &texts),
            })
            .collect()
    }

    /// Evaluate a visit and reconcile the outcome with the recipient's notes.
    ///
    /// - triggered, no open note: a new note is opened
    /// - triggered, open note: the visit's detail is appended to it
    /// - not triggered, open note: the note is resolved at the visit timestamp
    ///
    /// Visits older than an open note's last observation, and the visit already
    /// recorded on it, leave that note untouched. A resolved note that already
    /// accounts for the visit keeps its type from being opened again.
    pub fn detect(
        &self,
        visit: &Visit,
        responses: &[ChecklistResponse],
        care_notes: &[CareNote],
        known_notes: &[SpecialNote],
    ) -> NoteChanges {
        let evaluations = self.evaluate(responses, care_notes);
        reconcile(visit, &evaluations, known_notes)
    }
}

impl Default for SpecialNoteDetector {
    fn default() -> Self {
        Self::new(super::rules::default_rules())
    }
}

/// Apply rule evaluations of one visit to the recipient's notes.
///
/// `known_notes` holds the open notes and may hold resolved ones; resolved
/// notes only decide whether a triggered type may be opened again.
pub fn reconcile(visit: &Visit, evaluations: &[RuleEvaluation], known_notes: &[SpecialNote]) -> NoteChanges {
    let observed_at = visit.timestamp();
    let mut changes = NoteChanges::default();

    for evaluation in evaluations {
        let open = known_notes
            .iter()
            .filter(|n| !n.is_resolved && n.note_type == evaluation.note_type)
            .min_by_key(|n| n.created_at);

        let Some(existing) = open else {
            let Some(draft) = &evaluation.draft else {
                continue;
            };
            let covering = known_notes
                .iter()
                .find(|n| n.is_resolved && n.note_type == evaluation.note_type && covers(n, visit));
            match covering {
                Some(resolved) => debug!(
                    note_id = %resolved.id,
                    visit_id = %visit.id,
                    "Visit already covered by a resolved note, not reopening"
                ),
                None => changes
                    .created
                    .push(SpecialNote::open(&visit.recipient_id, &visit.id, observed_at, draft)),
            }
            continue;
        };

        if existing.last_visit_id == visit.id || observed_at < existing.last_observed_at {
            debug!(
                note_id = %existing.id,
                visit_id = %visit.id,
                "Visit already recorded or older than note, leaving note unchanged"
            );
            continue;
        }

        let mut note = existing.clone();
        match &evaluation.draft {
            Some(draft) => {
                note.detailed_content.push('\n');
                note.detailed_content.push_str(&detail_line(observed_at, &draft.detail));
                note.priority_level = note.priority_level.max(draft.priority);
                note.last_visit_id = visit.id.clone();
                note.last_observed_at = observed_at;
                changes.appended.push(note);
            }
            None => {
                note.is_resolved = true;
                note.resolved_at = Some(observed_at);
                changes.resolved.push(note);
            }
        }
    }

    changes
}

/// Whether a note already accounts for a visit: it recorded the visit, or it
/// was observed or resolved at or after the visit timestamp.
fn covers(note: &SpecialNote, visit: &Visit) -> bool {
    let at = visit.timestamp();
    note.visit_id == visit.id
        || note.last_visit_id == visit.id
        || note.last_observed_at >= at
        || note.resolved_at.is_some_and(|resolved_at| resolved_at >= at)
}

/// A searchable piece of visit text and where it came from.
struct SourceText {
    source: String,
    lowered: String,
    original: String,
}

fn collect_texts(responses: &[ChecklistResponse], care_notes: &[CareNote]) -> Vec<SourceText> {
    let mut texts = Vec::new();
    let mut push = |source: String, text: &str| {
        if !text.trim().is_empty() {
            texts.push(SourceText {
                source,
                lowered: text.to_lowercase(),
                original: text.trim().to_string(),
            });
        }
    };

    for note in care_notes {
        push(format!("care note ({})", note.note_type), &note.content);
    }
    for response in responses {
        if let AnswerValue::Text(text) = &response.answer {
            push(response.question_key.clone(), text);
        }
        if let Some(note) = &response.note {
            push(format!("{} note", response.question_key), note);
        }
    }

    texts
}

fn evaluate_rule(rule: &NoteRule, responses: &[ChecklistResponse], texts: &[SourceText]) -> Option<NoteDraft> {
    let mut evidence: Vec<String> = Vec::new();
    let mut priority = rule.priority;

    for trigger in &rule.triggers {
        let found = match trigger {
            Trigger::Keywords { keywords, .. } => match_keywords(keywords, texts),
            Trigger::OptionSelected {
                question_key,
                options,
                ..
            } => match_options(question_key, options, responses),
            Trigger::NumericOutside {
                question_key,
                min,
                max,
                ..
            } => match_numeric(question_key, *min, *max, responses),
        };

        if found.is_empty() {
            continue;
        }
        if let Some(raised) = trigger.priority() {
            priority = priority.max(raised);
        }
        for item in found {
            if !evidence.contains(&item) {
                evidence.push(item);
            }
        }
    }

    if evidence.is_empty() {
        return None;
    }

    if let Some(escalation) = &rule.escalation {
        if evidence.len() >= escalation.min_matches {
            priority = priority.max(escalation.priority);
        }
    }

    Some(NoteDraft {
        note_type: rule.note_type.clone(),
        summary: truncate(&format!("{}: {}", rule.summary, evidence[0]), SUMMARY_MAX_CHARS),
        detail: evidence.join("; "),
        priority,
        matches: evidence.len(),
    })
}

fn match_keywords(keywords: &[String], texts: &[SourceText]) -> Vec<String> {
    texts
        .iter()
        .filter(|text| {
            keywords
                .iter()
                .any(|k| contains_phrase(&text.lowered, &k.to_lowercase()))
        })
        .map(|text| format!("{}: \"{}\"", text.source, text.original))
        .collect()
}

fn match_options(question_key: &str, options: &[String], responses: &[ChecklistResponse]) -> Vec<String> {
    responses
        .iter()
        .filter(|r| r.question_key == question_key)
        .flat_map(|r| selected_options(&r.answer))
        .filter(|selected| options.iter().any(|o| o == selected))
        .map(|selected| format!("{} = {}", question_key, selected))
        .collect()
}

fn match_numeric(question_key: &str, min: f64, max: f64, responses: &[ChecklistResponse]) -> Vec<String> {
    responses
        .iter()
        .filter(|r| r.question_key == question_key)
        .filter_map(|r| match &r.answer {
            AnswerValue::Numeric(v) => Some(*v),
            AnswerValue::Text(raw) => raw.trim().parse::<f64>().ok(),
            AnswerValue::Boolean(_) | AnswerValue::Options(_) => None,
        })
        .filter(|v| *v < min || *v > max)
        .map(|v| format!("{} = {} (expected {}-{})", question_key, v, min, max))
        .collect()
}

fn selected_options(answer: &AnswerValue) -> Vec<String> {
    match answer {
        AnswerValue::Options(ids) => ids.iter().cloned().collect(),
        AnswerValue::Text(id) => vec![id.trim().to_string()],
        AnswerValue::Boolean(_) | AnswerValue::Numeric(_) => Vec::new(),
    }
}

/// Whole-word, already-lowercased phrase search.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::default_rules;
    use chrono::{Duration, TimeZone, Utc};

    fn visit_at(id: &str, day: u32) -> Visit {
        let start = Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap();
        let mut visit = Visit::new("recipient-1", "caregiver-1", start).completed_at(start + Duration::hours(3));
        visit.id = id.to_string();
        visit
    }

    fn detector() -> SpecialNoteDetector {
        SpecialNoteDetector::new(default_rules())
    }

    fn meal(option: &str, visit_id: &str) -> ChecklistResponse {
        ChecklistResponse::new(visit_id, "meal_amount", AnswerValue::option(option))
    }

    #[test]
    fn test_option_trigger_creates_note() {
        let visit = visit_at("v1", 13);
        let changes = detector().detect(&visit, &[meal("minimal_meal", "v1")], &[], &[]);

        assert_eq!(changes.created.len(), 1);
        let note = &changes.created[0];
        assert_eq!(note.note_type, "meal_refusal");
        assert_eq!(note.priority_level, PriorityLevel::Medium);
        assert!(note.short_summary.starts_with("Poor food intake"));
        assert!(note.detailed_content.contains("meal_amount = minimal_meal"));
        assert_eq!(note.created_at, visit.timestamp());
    }

    #[test]
    fn test_escalation_on_multiple_signals() {
        let visit = visit_at("v1", 13);
        let notes = vec![CareNote::new("v1", "health_observation", "She refused to eat lunch again.")];

        let changes = detector().detect(&visit, &[meal("minimal_meal", "v1")], &notes, &[]);

        let note = changes.created.iter().find(|n| n.note_type == "meal_refusal").unwrap();
        assert_eq!(note.priority_level, PriorityLevel::High);
    }

    #[test]
    fn test_trigger_priority_override() {
        let visit = visit_at("v1", 13);
        let responses = vec![ChecklistResponse::new(
            "v1",
            "foot_condition",
            AnswerValue::option("serious_wounds"),
        )];

        let changes = detector().detect(&visit, &responses, &[], &[]);

        assert_eq!(changes.created[0].priority_level, PriorityLevel::Critical);
    }

    #[test]
    fn test_keyword_match_is_whole_word() {
        assert!(contains_phrase("he fell near the bed", "fell"));
        assert!(contains_phrase("fell.", "fell"));
        assert!(!contains_phrase("a fellow resident visited", "fell"));
        assert!(contains_phrase("complained of chest pain today", "chest pain"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn test_retrigger_appends_instead_of_duplicating() {
        let first = visit_at("v1", 13);
        let opened = detector().detect(&first, &[meal("minimal_meal", "v1")], &[], &[]).created;

        let second = visit_at("v2", 14);
        let changes = detector().detect(&second, &[meal("minimal_meal", "v2")], &[], &opened);

        assert!(changes.created.is_empty());
        assert_eq!(changes.appended.len(), 1);
        let note = &changes.appended[0];
        assert_eq!(note.id, opened[0].id);
        assert_eq!(note.detailed_content.lines().count(), 2);
        assert_eq!(note.last_visit_id, "v2");
    }

    #[test]
    fn test_no_longer_triggering_resolves_at_visit_time() {
        let first = visit_at("v1", 13);
        let opened = detector().detect(&first, &[meal("minimal_meal", "v1")], &[], &[]).created;

        let later = visit_at("v2", 15);
        let changes = detector().detect(&later, &[meal("full_meal", "v2")], &[], &opened);

        assert_eq!(changes.resolved.len(), 1);
        let note = &changes.resolved[0];
        assert!(note.is_resolved);
        assert_eq!(note.resolved_at, Some(later.timestamp()));
    }

    #[test]
    fn test_older_or_same_visit_leaves_note_alone() {
        let current = visit_at("v2", 15);
        let opened = detector().detect(&current, &[meal("minimal_meal", "v2")], &[], &[]).created;

        let older = visit_at("v1", 13);
        assert!(detector().detect(&older, &[meal("full_meal", "v1")], &[], &opened).is_empty());

        let rerun = detector().detect(&current, &[meal("minimal_meal", "v2")], &[], &opened);
        assert!(rerun.is_empty());
    }

    #[test]
    fn test_resolved_note_is_not_reopened_by_covered_visit() {
        let first = visit_at("v1", 13);
        let opened = detector().detect(&first, &[meal("minimal_meal", "v1")], &[], &[]).created;
        let second = visit_at("v2", 15);
        let resolved = detector().detect(&second, &[meal("full_meal", "v2")], &[], &opened).resolved;

        let rerun = detector().detect(&first, &[meal("minimal_meal", "v1")], &[], &resolved);
        assert!(rerun.is_empty());

        let earlier = visit_at("v0", 10);
        let backfill = detector().detect(&earlier, &[meal("minimal_meal", "v0")], &[], &resolved);
        assert!(backfill.created.is_empty());
    }

    #[test]
    fn test_new_occurrence_after_resolution_opens_note() {
        let first = visit_at("v1", 13);
        let opened = detector().detect(&first, &[meal("minimal_meal", "v1")], &[], &[]).created;
        let second = visit_at("v2", 15);
        let resolved = detector().detect(&second, &[meal("full_meal", "v2")], &[], &opened).resolved;

        let third = visit_at("v3", 17);
        let changes = detector().detect(&third, &[meal("minimal_meal", "v3")], &[], &resolved);

        assert_eq!(changes.created.len(), 1);
        assert_ne!(changes.created[0].id, resolved[0].id);
        assert_eq!(changes.created[0].visit_id, "v3");
    }

    #[test]
    fn test_numeric_outside_trigger() {
        let rule = NoteRule::new("glucose", "Glucose out of range", PriorityLevel::High)
            .on_numeric_outside("blood_sugar", 70.0, 180.0);
        let detector = SpecialNoteDetector::new(vec![rule]);

        let low = vec![ChecklistResponse::new("v", "blood_sugar", AnswerValue::Numeric(55.0))];
        let normal = vec![ChecklistResponse::new("v", "blood_sugar", AnswerValue::Text("120".into()))];

        assert!(detector.evaluate(&low, &[])[0].draft.is_some());
        assert!(detector.evaluate(&normal, &[])[0].draft.is_none());
    }

    #[test]
    fn test_summary_is_truncated() {
        let long = "a".repeat(500);
        assert_eq!(truncate(&long, SUMMARY_MAX_CHARS).chars().count(), SUMMARY_MAX_CHARS);
        assert_eq!(truncate("short", SUMMARY_MAX_CHARS), "short");
    }
}
