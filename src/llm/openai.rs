//! OpenAI-compatible HTTP client.
//!
//! Works against any service exposing `/v1/chat/completions` and
//! `/v1/embeddings` with the OpenAI wire shape (OpenAI itself, LM Studio,
//! vLLM, llama.cpp server).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{ChatPrompt, LlmClient};
use crate::core::errors::PipelineError;

#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    default_api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        default_api_key: Option<String>,
        chat_model: String,
        embedding_model: String,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_api_key,
            chat_model,
            embedding_model,
            client: Client::new(),
        }
    }

    /// Resolution order: per-request key, else the process-wide default.
    fn resolve_key<'a>(&'a self, api_key: Option<&'a str>) -> Option<&'a str> {
        api_key.or(self.default_api_key.as_deref())
    }

    fn request(&self, path: &str, api_key: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(key) = self.resolve_key(api_key) {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn chat_body(&self, prompt: &ChatPrompt, stream: bool) -> Value {
        json!({
            "model": self.chat_model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "stream": stream,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        prompt: ChatPrompt,
        api_key: Option<&str>,
    ) -> Result<String, PipelineError> {
        let res = self
            .request("/v1/chat/completions", api_key)
            .json(&self.chat_body(&prompt, false))
            .send()
            .await
            .map_err(|err| PipelineError::Generation(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "chat completion returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| PipelineError::Generation(err.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(content)
    }

    async fn stream_chat(
        &self,
        prompt: ChatPrompt,
        api_key: Option<&str>,
    ) -> Result<mpsc::Receiver<Result<String, PipelineError>>, PipelineError> {
        let res = self
            .request("/v1/chat/completions", api_key)
            .json(&self.chat_body(&prompt, true))
            .send()
            .await
            .map_err(|err| PipelineError::Generation(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "chat stream returned {status}: {text}"
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for line in drain_complete_lines(&mut buffer) {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }
                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(event) = serde_json::from_str::<Value>(data) {
                                    if let Some(delta) =
                                        event["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !delta.is_empty()
                                            && tx.send(Ok(delta.to_string())).await.is_err()
                                        {
                                            // Receiver dropped: consumer cancelled.
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx
                            .send(Err(PipelineError::Generation(err.to_string())))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        api_key: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let res = self
            .request("/v1/embeddings", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Embedding(format!(
                "embedding request returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;

        let data = payload["data"]
            .as_array()
            .ok_or_else(|| PipelineError::Embedding("missing data array".to_string()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let values = entry["embedding"]
                .as_array()
                .ok_or_else(|| PipelineError::Embedding("missing embedding values".to_string()))?;
            vectors.push(
                values
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .map(|v| v as f32)
                    .collect(),
            );
        }

        if vectors.len() != inputs.len() {
            return Err(PipelineError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Split off every complete line, leaving any trailing partial line in the
/// buffer. An SSE line can straddle two network chunks.
fn drain_complete_lines(buffer: &mut String) -> Vec<String> {
    let Some(last_newline) = buffer.rfind('\n') else {
        return Vec::new();
    };
    let rest = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, rest);
    complete.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_overrides_default() {
        let client = OpenAiClient::new(
            "http://localhost:8080/".into(),
            Some("default-key".into()),
            "chat".into(),
            "embed".into(),
        );
        assert_eq!(client.resolve_key(Some("request-key")), Some("request-key"));
        assert_eq!(client.resolve_key(None), Some("default-key"));

        let without_default =
            OpenAiClient::new("http://localhost".into(), None, "c".into(), "e".into());
        assert_eq!(without_default.resolve_key(None), None);
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut buffer = String::new();

        buffer.push_str("data: {\"choices\":");
        assert!(drain_complete_lines(&mut buffer).is_empty());

        buffer.push_str("[]}\ndata: partial");
        assert_eq!(
            drain_complete_lines(&mut buffer),
            vec!["data: {\"choices\":[]}"]
        );
        assert_eq!(buffer, "data: partial");

        buffer.push('\n');
        assert_eq!(drain_complete_lines(&mut buffer), vec!["data: partial"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::new(
            "http://localhost:8080///".into(),
            None,
            "c".into(),
            "e".into(),
        );
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
