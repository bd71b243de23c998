use crate::api::{CustomerRecord, EventType, EventTypeQuery, RowReference};
use crate::credential::CredentialDescriptor;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;

mod calendly;
mod sheets;

pub use calendly::CalendlyAdapter;
pub use sheets::SheetsAdapter;

const MAX_PROVIDER_MESSAGE_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },
    #[error("{backend} backend rejected credentials (http {status}): {message}")]
    Auth {
        backend: &'static str,
        status: u16,
        message: String,
    },
    #[error("{backend} backend rate limited the request: {message}")]
    RateLimited {
        backend: &'static str,
        retry_after_secs: Option<u64>,
        message: String,
    },
    #[error(
        "{backend} backend error{}: {message}",
        .status.map(|s| format!(" (http {s})")).unwrap_or_default()
    )]
    Backend {
        backend: &'static str,
        status: Option<u16>,
        message: String,
    },
}

#[async_trait]
pub trait SpreadsheetBackend: Send + Sync {
    /// Appends one row. Not idempotent: identical records produce distinct rows.
    async fn append_record(&self, record: &CustomerRecord) -> Result<RowReference, AdapterError>;
}

#[async_trait]
pub trait SchedulingBackend: Send + Sync {
    /// Returns every event type for the organization, all pages drained.
    async fn list_event_types(&self, query: &EventTypeQuery)
    -> Result<Vec<EventType>, AdapterError>;

    fn default_organization(&self) -> Option<&str> {
        None
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("crm-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn transport_error(
    backend: &'static str,
    err: &reqwest::Error,
    secret: &CredentialDescriptor,
) -> AdapterError {
    let message = secret.scrub(&err.to_string());
    if err.is_decode() || err.is_builder() {
        return AdapterError::Backend {
            backend,
            status: None,
            message,
        };
    }
    AdapterError::Unavailable { backend, message }
}

pub(crate) fn status_error(
    backend: &'static str,
    status: reqwest::StatusCode,
    headers: &HeaderMap,
    body: &str,
    secret: &CredentialDescriptor,
) -> AdapterError {
    let message = secret.scrub(&provider_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    }));
    match status.as_u16() {
        401 | 403 => AdapterError::Auth {
            backend,
            status: status.as_u16(),
            message,
        },
        429 => AdapterError::RateLimited {
            backend,
            retry_after_secs: retry_after_secs(headers),
            message,
        },
        502..=504 => AdapterError::Unavailable { backend, message },
        code => AdapterError::Backend {
            backend,
            status: Some(code),
            message,
        },
    }
}

/// `Retry-After` in delta-seconds, falling back to `X-RateLimit-Reset`.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    ["retry-after", "x-ratelimit-reset"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    })
}

/// Google (`error.message`) and Calendly (`message`, `title`) error bodies;
/// anything else is passed through, truncated.
pub(crate) fn provider_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("message"),
            value.get("title"),
            value.get("error"),
        ];
        if let Some(msg) = candidates
            .into_iter()
            .flatten()
            .find_map(serde_json::Value::as_str)
        {
            return Some(truncate_chars(msg, MAX_PROVIDER_MESSAGE_CHARS));
        }
    }
    Some(truncate_chars(trimmed, MAX_PROVIDER_MESSAGE_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderValue;

    fn secret() -> CredentialDescriptor {
        CredentialDescriptor::new("tok_live_0123456789abcdef", "env TEST_TOKEN")
    }

    #[test]
    fn unauthorized_and_forbidden_map_to_auth() {
        for code in [401u16, 403] {
            let err = status_error(
                "scheduling",
                StatusCode::from_u16(code).expect("status"),
                &HeaderMap::new(),
                r#"{"title":"Unauthenticated","message":"The access token is invalid"}"#,
                &secret(),
            );
            assert_eq!(
                err,
                AdapterError::Auth {
                    backend: "scheduling",
                    status: code,
                    message: "The access token is invalid".to_string()
                }
            );
        }
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("17"));
        let err = status_error(
            "scheduling",
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            "",
            &secret(),
        );
        match err {
            AdapterError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(17)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ratelimit_reset_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("42"));
        assert_eq!(retry_after_secs(&headers), Some(42));
        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(retry_after_secs(&headers), Some(3));
    }

    #[test]
    fn google_error_body_is_unwrapped_and_scrubbed() {
        let body = r#"{"error":{"code":400,"message":"Unable to parse range: tok_live_0123456789abcdef","status":"INVALID_ARGUMENT"}}"#;
        let err = status_error(
            "spreadsheet",
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            body,
            &secret(),
        );
        let AdapterError::Backend {
            status, message, ..
        } = err
        else {
            panic!("expected backend error");
        };
        assert_eq!(status, Some(400));
        assert!(message.starts_with("Unable to parse range: "));
        assert!(!message.contains("tok_live_0123456789abcdef"));
    }

    #[test]
    fn gateway_errors_are_unavailable() {
        let err = status_error(
            "spreadsheet",
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            "<html>down</html>",
            &secret(),
        );
        assert!(matches!(err, AdapterError::Unavailable { .. }));
    }

    #[test]
    fn long_plain_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let msg = provider_message(&body).expect("message");
        assert_eq!(msg.chars().count(), MAX_PROVIDER_MESSAGE_CHARS + 1);
        assert!(provider_message("   ").is_none());
    }
}
