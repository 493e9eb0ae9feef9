/*!
 * HTTP Helpers
 * Client construction and status mapping shared by the service clients
 */

use super::types::{LookupError, LookupResult};
use crate::core::limits::USER_AGENT;
use reqwest::{Response, StatusCode};
use std::time::Duration;

/// Pooled async client with the crate user agent and a per-request timeout
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()
}

/// Join a base URL and a relative path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pass successful responses through; map everything else onto [`LookupError`]
pub async fn error_for_status(response: Response) -> LookupResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => LookupError::NotFound(if body.is_empty() { url } else { body }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LookupError::Unauthorized(body),
        _ => LookupError::Status {
            status: status.as_u16(),
            body,
        },
    })
}
