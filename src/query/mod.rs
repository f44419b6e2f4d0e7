//! Retrieval-augmented query engine.
//!
//! Retrieves owner-scoped chunks, assembles a grounded prompt, invokes the
//! generation service, and decides whether the answer is grounded enough to
//! carry source attributions.

pub mod prompt;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::errors::PipelineError;
use crate::llm::{ChatPrompt, LlmClient};
use crate::store::{ContentType, SearchFilter, SearchHit, VectorStoreGateway};
use prompt::NO_RELEVANT_INFORMATION;

/// Per-query knobs, all optional on the wire.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub max_results: usize,
    pub score_threshold: f32,
    pub include_metadata: bool,
    pub content_type: Option<ContentType>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: 4,
            score_threshold: 0.7,
            include_metadata: true,
            content_type: None,
        }
    }
}

/// One cited source chunk in a response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

/// A complete (non-streaming) answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Units of a streaming answer. Tokens arrive in generation order; the
/// sources event, when grounded, follows the last token.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    Token(String),
    Sources(Vec<SourceRef>),
}

#[derive(Clone)]
pub struct QueryEngine {
    gateway: Arc<VectorStoreGateway>,
    llm: Arc<dyn LlmClient>,
}

impl QueryEngine {
    pub fn new(gateway: Arc<VectorStoreGateway>, llm: Arc<dyn LlmClient>) -> Self {
        Self { gateway, llm }
    }

    /// Answer `question` from the owner's stored content.
    ///
    /// Returns the fixed insufficiency answer with empty sources (without
    /// calling the generation service) when nothing relevant is retrieved.
    pub async fn answer(
        &self,
        question: &str,
        owner_id: &str,
        options: &QueryOptions,
        api_key: Option<&str>,
    ) -> Result<QueryAnswer, PipelineError> {
        let hits = self.retrieve(question, owner_id, options, api_key).await?;

        if hits.is_empty() {
            return Ok(QueryAnswer {
                answer: NO_RELEVANT_INFORMATION.to_string(),
                sources: Vec::new(),
            });
        }

        let chat_prompt = grounded_prompt(question, &hits);
        let answer = self
            .llm
            .chat(chat_prompt, api_key)
            .await
            .map_err(|err| PipelineError::QueryFailed {
                stage: "generation",
                message: err.to_string(),
            })?;

        // Sources only attach to answers the model itself considers grounded.
        let sources = if prompt::is_insufficient(&answer) {
            Vec::new()
        } else {
            to_sources(&hits, options.include_metadata)
        };

        Ok(QueryAnswer { answer, sources })
    }

    /// Streaming variant: same retrieval, but generation arrives as ordered
    /// text deltas. Failures become a single terminal error-text event
    /// instead of an `Err`, since partial output may already be delivered.
    pub async fn answer_stream(
        &self,
        question: String,
        owner_id: String,
        options: QueryOptions,
        api_key: Option<String>,
    ) -> mpsc::Receiver<AnswerEvent> {
        let (tx, rx) = mpsc::channel(32);
        let engine = self.clone();

        tokio::spawn(async move {
            let hits = match engine
                .retrieve(&question, &owner_id, &options, api_key.as_deref())
                .await
            {
                Ok(hits) => hits,
                Err(err) => {
                    let _ = tx.send(AnswerEvent::Token(format!("Error: {err}"))).await;
                    return;
                }
            };

            if hits.is_empty() {
                let _ = tx
                    .send(AnswerEvent::Token(NO_RELEVANT_INFORMATION.to_string()))
                    .await;
                let _ = tx.send(AnswerEvent::Sources(Vec::new())).await;
                return;
            }

            let chat_prompt = grounded_prompt(&question, &hits);
            let mut stream = match engine.llm.stream_chat(chat_prompt, api_key.as_deref()).await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send(AnswerEvent::Token(format!("Error: {err}"))).await;
                    return;
                }
            };

            let mut full_answer = String::new();
            while let Some(item) = stream.recv().await {
                match item {
                    Ok(delta) => {
                        full_answer.push_str(&delta);
                        if tx.send(AnswerEvent::Token(delta)).await.is_err() {
                            // Consumer stopped pulling.
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(AnswerEvent::Token(format!("Error: {err}"))).await;
                        return;
                    }
                }
            }

            let sources = if prompt::is_insufficient(&full_answer) {
                Vec::new()
            } else {
                to_sources(&hits, options.include_metadata)
            };
            let _ = tx.send(AnswerEvent::Sources(sources)).await;
        });

        rx
    }

    async fn retrieve(
        &self,
        question: &str,
        owner_id: &str,
        options: &QueryOptions,
        api_key: Option<&str>,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let filter = SearchFilter {
            owner_id: owner_id.to_string(),
            document_id: None,
            content_type: options.content_type,
        };

        let mut hits = self
            .gateway
            .search(question, &filter, options.max_results, api_key)
            .await
            .map_err(|err| PipelineError::QueryFailed {
                stage: "search",
                message: err.to_string(),
            })?;

        hits.retain(|hit| hit.score >= options.score_threshold);
        Ok(hits)
    }
}

fn grounded_prompt(question: &str, hits: &[SearchHit]) -> ChatPrompt {
    let context = prompt::build_context(hits);
    ChatPrompt {
        system: prompt::SYSTEM_PROMPT.to_string(),
        user: prompt::build_user_prompt(question, &context),
    }
}

fn to_sources(hits: &[SearchHit], include_metadata: bool) -> Vec<SourceRef> {
    hits.iter()
        .map(|hit| SourceRef {
            document_id: hit.chunk.document_id,
            title: hit.document_title.clone(),
            content: hit.chunk.content.clone(),
            score: hit.score,
            chunk_index: include_metadata.then_some(hit.chunk.chunk_index),
            page_url: include_metadata
                .then(|| hit.chunk.page.as_ref().map(|p| p.page_url.clone()))
                .flatten(),
            page_title: include_metadata
                .then(|| hit.chunk.page.as_ref().map(|p| p.page_title.clone()))
                .flatten(),
        })
        .collect()
}
