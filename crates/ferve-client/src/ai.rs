use std::future::Future;
use thiserror::Error;
use tracing::warn;

pub const AI_UNAVAILABLE_MESSAGE: &str =
    "Error: could not reach the neural core (API error).";
pub const MOCK_ARCHITECTURE_REPLY: &str = "Mock Architecture: [LNN] <-> [Mesh] <-> [Brain]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("ai service unavailable: {0}")]
    Unavailable(String),
    #[error("ai service returned an empty reply")]
    EmptyReply,
}

/// External text generation service. One async call, may fail.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, AiError>> + Send;
}

/// Offline generator with a canned reply.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    reply: Result<String, AiError>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::replying(MOCK_ARCHITECTURE_REPLY)
    }
}

impl MockGenerator {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
        }
    }

    pub fn failing(err: AiError) -> Self {
        Self { reply: Err(err) }
    }
}

impl TextGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
        self.reply.clone()
    }
}

/// Never fails: errors and blank replies become [`AI_UNAVAILABLE_MESSAGE`].
pub async fn generate_or_sentinel<G: TextGenerator>(generator: &G, prompt: &str) -> String {
    match generator.generate(prompt).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!(event = "ai_generate_error", error = %AiError::EmptyReply);
            AI_UNAVAILABLE_MESSAGE.to_string()
        }
        Err(err) => {
            warn!(event = "ai_generate_error", error = %err);
            AI_UNAVAILABLE_MESSAGE.to_string()
        }
    }
}
