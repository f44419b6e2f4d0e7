//! External model services.
//!
//! The pipeline consumes two capabilities: text → embedding vector and
//! prompt → text (optionally streamed). Both sit behind [`LlmClient`] so
//! tests can substitute in-process doubles.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::PipelineError;

/// A chat prompt: system instruction plus user turn.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Chat completion (non-streaming).
    ///
    /// `api_key` overrides the process-wide default for this call only.
    async fn chat(&self, prompt: ChatPrompt, api_key: Option<&str>)
        -> Result<String, PipelineError>;

    /// Chat completion (streaming). Text deltas arrive in generation order;
    /// dropping the receiver cancels consumption.
    async fn stream_chat(
        &self,
        prompt: ChatPrompt,
        api_key: Option<&str>,
    ) -> Result<mpsc::Receiver<Result<String, PipelineError>>, PipelineError>;

    /// Embed each input text; order of outputs matches inputs.
    async fn embed(
        &self,
        inputs: &[String],
        api_key: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, PipelineError>;
}
