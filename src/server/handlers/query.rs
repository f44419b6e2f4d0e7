use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;

use crate::core::ApiError;
use crate::query::{AnswerEvent, QueryOptions};
use crate::server::auth;
use crate::state::AppState;
use crate::store::ContentType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    pub question: String,
    pub max_results: Option<usize>,
    pub score_threshold: Option<f32>,
    pub include_metadata: Option<bool>,
    pub filter: Option<QueryFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub content_type: Option<ContentType>,
}

impl QueryBody {
    fn validate(&self) -> Result<(), ApiError> {
        if self.question.trim().is_empty() {
            return Err(ApiError::BadRequest("question must not be empty".into()));
        }
        Ok(())
    }

    fn options(&self) -> QueryOptions {
        let defaults = QueryOptions::default();
        QueryOptions {
            max_results: self.max_results.unwrap_or(defaults.max_results),
            score_threshold: self.score_threshold.unwrap_or(defaults.score_threshold),
            include_metadata: self.include_metadata.unwrap_or(defaults.include_metadata),
            content_type: self.filter.as_ref().and_then(|f| f.content_type),
        }
    }
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let api_key = auth::api_key_override(&headers);
    body.validate()?;

    let options = body.options();
    let result = state
        .query
        .answer(&body.question, &owner_id, &options, api_key.as_deref())
        .await?;

    Ok(Json(json!({
        "answer": result.answer,
        "sources": result.sources,
        "query": body.question,
        "timestamp": Utc::now(),
    })))
}

pub async fn query_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let api_key = auth::api_key_override(&headers);
    body.validate()?;

    let options = body.options();
    let rx = state
        .query
        .answer_stream(body.question, owner_id, options, api_key)
        .await;

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let sse = match event {
            AnswerEvent::Token(text) => Event::default().event("token").data(text),
            AnswerEvent::Sources(sources) => {
                let payload = serde_json::to_string(&sources).unwrap_or_else(|_| "[]".into());
                Event::default().event("sources").data(payload)
            }
        };
        Some((Ok::<_, Infallible>(sse), rx))
    });

    Ok(Sse::new(events))
}
