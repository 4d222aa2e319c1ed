use serde::{Deserialize, Serialize};

use crate::checklist::{ChecklistResponse, VisitScore};
use crate::error::{GeneratorError, GeneratorResult};
use crate::storage::{CareNote, Recipient, Visit};

/// Message in a Langbase conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    pub name: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl PipeRequest {
    /// Create a non-streaming pipe request
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
}

/// Everything the generator sees about one completed visit.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub visit: Visit,
    pub recipient: Recipient,
    pub responses: Vec<ChecklistResponse>,
    pub care_notes: Vec<CareNote>,
    pub score: VisitScore,
}

impl GenerationRequest {
    /// Build the user message payload.
    pub fn to_prompt_input(&self) -> GeneratorResult<String> {
        #[derive(Serialize)]
        struct PromptInput<'a> {
            recipient_name: &'a str,
            visit_start: String,
            visit_end: Option<String>,
            score_percentage: f64,
            category_breakdown: &'a std::collections::BTreeMap<String, f64>,
            responses: &'a [ChecklistResponse],
            care_notes: Vec<(&'a str, &'a str)>,
        }

        let input = PromptInput {
            recipient_name: &self.recipient.name,
            visit_start: self.visit.start_time.to_rfc3339(),
            visit_end: self.visit.end_time.map(|t| t.to_rfc3339()),
            score_percentage: self.score.score_percentage,
            category_breakdown: &self.score.category_breakdown,
            responses: &self.responses,
            care_notes: self
                .care_notes
                .iter()
                .map(|n| (n.note_type.as_str(), n.content.as_str()))
                .collect(),
        };

        serde_json::to_string_pretty(&input).map_err(|e| GeneratorError::InvalidResponse {
            message: format!("Failed to serialize visit context: {}", e),
        })
    }
}

/// Generated report text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub ai_comment: String,
}

impl GeneratedContent {
    /// Parse generated content from pipe completion text.
    pub fn from_completion(completion: &str) -> GeneratorResult<Self> {
        let json = extract_json_from_completion(completion)
            .map_err(|message| GeneratorError::InvalidResponse { message })?;

        let mut parsed: GeneratedContent =
            serde_json::from_str(json).map_err(|e| GeneratorError::InvalidResponse {
                message: format!("Failed to parse report JSON: {}", e),
            })?;

        parsed.keywords = parsed
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        parsed.content = parsed.content.trim().to_string();
        parsed.ai_comment = parsed.ai_comment.trim().to_string();

        if parsed.content.is_empty() {
            return Err(GeneratorError::InvalidResponse {
                message: "Report content is empty".to_string(),
            });
        }

        Ok(parsed)
    }
}

/// Extract JSON from a completion that may be wrapped in markdown fences.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    for fence in ["```json", "```"] {
        if let Some(rest) = completion.split_once(fence).map(|(_, rest)| rest) {
            return rest
                .split("```")
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("Found {} block but content was empty", fence));
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}
