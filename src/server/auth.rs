use axum::http::HeaderMap;

use crate::core::ApiError;

/// Header carrying the caller's identity. The upstream proxy is trusted to
/// have authenticated the user before the request reaches this service.
pub const USER_HEADER: &str = "x-user-id";

/// Optional per-request LLM credential override.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Extracts the owner id from the request headers, rejecting requests that
/// carry no identity. Every document and query route goes through this.
pub fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or(ApiError::Unauthorized)
}

/// Reads the per-request API key override, if one was supplied.
pub fn api_key_override(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
