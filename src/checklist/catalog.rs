//! Question catalog and the built-in default checklist.

use std::collections::BTreeMap;

use super::types::{AnswerKind, ChecklistQuestion};

/// Immutable set of checklist questions keyed by question key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionCatalog {
    questions: BTreeMap<String, ChecklistQuestion>,
}

impl QuestionCatalog {
    /// Build a catalog; later questions replace earlier ones with the same key.
    pub fn from_questions(questions: impl IntoIterator<Item = ChecklistQuestion>) -> Self {
        Self {
            questions: questions.into_iter().map(|q| (q.key.clone(), q)).collect(),
        }
    }

    /// Look up a question by key.
    pub fn get(&self, key: &str) -> Option<&ChecklistQuestion> {
        self.questions.get(key)
    }

    /// Iterate questions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ChecklistQuestion> {
        self.questions.values()
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the catalog has no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Four-option question scored 3 (best) down to 0 (worst), in display order.
fn graded(
    key: &str,
    category: &str,
    text: &str,
    kind: AnswerKind,
    options: [(&str, &str); 4],
) -> ChecklistQuestion {
    options
        .iter()
        .enumerate()
        .fold(ChecklistQuestion::new(key, category, text, kind), |q, (i, (id, label))| {
            q.with_option(*id, *label, (3 - i) as f64)
        })
}

/// The default catalog: common questions plus dementia, diabetes and hypertension follow-ups.
pub fn default_catalog() -> QuestionCatalog {
    use AnswerKind::{FreeText, Mixed, SingleChoice};

    let questions = vec![
        // Common
        graded(
            "meal_amount",
            "meal_nutrition",
            "How was the meal today?",
            SingleChoice,
            [
                ("full_meal", "Ate all meals as usual"),
                ("normal_meal", "Ate about 70-80% of usual"),
                ("light_meal", "Ate about half of usual"),
                ("minimal_meal", "Barely ate"),
            ],
        ),
        ChecklistQuestion::new(
            "favorite_food",
            "meal_nutrition",
            "Any food especially enjoyed?",
            FreeText,
        ),
        ChecklistQuestion::new(
            "refused_food",
            "meal_nutrition",
            "Any food refused?",
            FreeText,
        ),
        ChecklistQuestion::new(
            "meal_assistance",
            "meal_nutrition",
            "How much help was needed while eating?",
            SingleChoice,
        )
        .with_option("independent", "Independent", 2.0)
        .with_option("partial_help", "Partial help", 1.0)
        .with_option("full_help", "Full help", 0.0),
        // Dementia
        graded(
            "memory_cognitive_state",
            "memory_cognition",
            "How were memory and cognition today?",
            Mixed,
            [
                ("normal_memory", "Remembered as usual"),
                ("occasional_confusion", "Occasionally confused"),
                ("frequent_confusion", "Frequently confused"),
                ("severe_memory_loss", "Barely remembered"),
            ],
        ),
        graded(
            "family_recognition",
            "memory_cognition",
            "How well were family and others recognized?",
            Mixed,
            [
                ("recognizes_all", "Recognized everyone"),
                ("recognizes_family_mostly", "Recognized family, sometimes confused"),
                ("occasional_family_confusion", "Sometimes did not recognize family"),
                ("poor_recognition", "Mostly did not recognize"),
            ],
        ),
        graded(
            "behavior_emotion_change",
            "behavior_emotion",
            "Any change in behavior or emotion?",
            Mixed,
            [
                ("stable", "Stable as usual"),
                ("mild_anxiety", "Slightly anxious"),
                ("frequent_agitation", "Frequently agitated or repetitive"),
                ("severe_agitation", "Severely agitated or aggressive"),
            ],
        ),
        graded(
            "daily_living_activities",
            "daily_living",
            "How were daily activities (toilet, dressing)?",
            Mixed,
            [
                ("mostly_independent", "Mostly independent"),
                ("some_assistance", "Needed some help"),
                ("much_assistance", "Needed much help"),
                ("full_assistance", "Needed help with almost everything"),
            ],
        ),
        // Diabetes
        graded(
            "blood_sugar_management",
            "blood_sugar",
            "How is blood sugar being managed?",
            Mixed,
            [
                ("well_managed", "Measured and managed regularly"),
                ("occasionally_measured", "Measured occasionally, mostly stable"),
                ("often_forgets", "Often forgets to measure"),
                ("difficult_to_measure", "Has difficulty measuring"),
            ],
        ),
        graded(
            "medication_insulin_management",
            "medication",
            "How was diabetes medication or insulin handled?",
            Mixed,
            [
                ("on_time", "Taken on time"),
                ("slightly_delayed", "Sometimes late but taken"),
                ("often_missed", "Often missed or refused"),
                ("needs_assistance", "Cannot manage without help"),
            ],
        ),
        graded(
            "foot_condition",
            "foot_check",
            "How are the feet, any wounds?",
            Mixed,
            [
                ("clean_normal", "Clean, no problems"),
                ("dry_callus", "Slightly dry or calloused"),
                ("minor_wounds", "Small wounds or blisters"),
                ("serious_wounds", "Inflammation or serious wounds"),
            ],
        ),
        graded(
            "diet_sugar_control",
            "diet",
            "How was the diabetic diet and sugar control?",
            Mixed,
            [
                ("good_diet_control", "Kept the diet well"),
                ("mostly_controlled", "Mostly kept, occasional sweets"),
                ("frequent_sweet_foods", "Often wanted or ate sweets"),
                ("difficult_diet_control", "Diet control is difficult"),
            ],
        ),
        // Hypertension
        graded(
            "blood_pressure_symptoms",
            "blood_pressure",
            "How were blood pressure and related symptoms?",
            Mixed,
            [
                ("stable_no_symptoms", "Stable, no symptoms"),
                ("occasional_headache", "Occasional headache or dizziness"),
                ("frequent_headache", "Frequent headaches"),
                ("shortness_of_breath", "Shortness of breath or chest tightness"),
            ],
        ),
        graded(
            "medication_compliance",
            "medication",
            "How is blood pressure medication being taken?",
            Mixed,
            [
                ("regular_compliance", "Taken regularly every day"),
                ("mostly_compliant", "Occasionally missed"),
                ("poor_compliance", "Often forgotten or refused"),
                ("side_effects", "Difficult due to side effects"),
            ],
        ),
        graded(
            "diet_lifestyle",
            "diet",
            "How were salt intake and lifestyle?",
            Mixed,
            [
                ("good_low_salt_diet", "Kept a low-salt diet"),
                ("mostly_controlled", "Mostly kept, occasional salty food"),
                ("prefers_salty_foods", "Often prefers salty food"),
                ("difficult_diet_control", "Diet control is difficult"),
            ],
        ),
        graded(
            "edema_weight_change",
            "edema_weight",
            "Any swelling or weight change?",
            Mixed,
            [
                ("no_change", "No change or swelling"),
                ("mild_ankle_edema", "Mild ankle swelling"),
                ("noticeable_edema", "Noticeable swelling or weight gain"),
                ("severe_edema", "Severe, uncomfortable swelling"),
            ],
        ),
    ];

    QuestionCatalog::from_questions(questions)
}
