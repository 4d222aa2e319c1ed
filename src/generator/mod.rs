//! Report content generation.
//!
//! [`ContentGenerator`] is the seam the orchestrator calls; [`LangbaseGenerator`]
//! is the shipped implementation over the Langbase pipes API.

mod client;
mod types;

pub use client::LangbaseGenerator;
pub use types::{GeneratedContent, GenerationRequest, Message, MessageRole, PipeRequest, PipeResponse};

use async_trait::async_trait;

use crate::error::GeneratorResult;

/// Produces report text for one completed visit.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate keywords, body and follow-up comment for a visit.
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<GeneratedContent>;
}
