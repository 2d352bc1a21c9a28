//! Response shaping for admission decisions: quota headers, the block
//! message template and the human duration phrase.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::escalation::DAY_MS;

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota headers attached to every counted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Unix milliseconds at which the window or block clears.
    pub reset_at: u64,
    /// Seconds until retry is permitted; present only on rejections.
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(ceil_secs(self.reset_at)));
        if let Some(secs) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
    }
}

/// Body template used for 429 responses.
///
/// A `Template` carries arbitrary extra fields; on rejection its `message`
/// field is replaced with the rendered block phrase and `retryAfter` is
/// added. A `Text` message is returned verbatim as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockMessage {
    Text(String),
    Template(Value),
}

impl Default for BlockMessage {
    fn default() -> Self {
        BlockMessage::Template(json!({
            "success": false,
            "message": "Too many requests. You are temporarily blocked.",
        }))
    }
}

impl BlockMessage {
    /// Render the 429 body for a block lasting `duration_ms` more
    /// milliseconds.
    pub fn render(&self, duration_ms: u64) -> Value {
        match self {
            BlockMessage::Text(text) => Value::String(text.clone()),
            BlockMessage::Template(template) => {
                let mut body = template.clone();
                if let Some(object) = body.as_object_mut() {
                    object.insert(
                        "message".to_string(),
                        Value::String(format!(
                            "Too many requests. You are blocked for {}.",
                            format_duration(duration_ms)
                        )),
                    );
                    object.insert("retryAfter".to_string(), json!(ceil_secs(duration_ms)));
                }
                body
            }
        }
    }
}

/// Build the full 429 response for a rejected request.
pub fn too_many_requests(
    limit: u32,
    unblock_at: u64,
    retry_ms: u64,
    message: &BlockMessage,
) -> Response {
    let headers = RateLimitHeaders {
        limit,
        remaining: 0,
        reset_at: unblock_at,
        retry_after: Some(ceil_secs(retry_ms)),
    };

    let mut response =
        (StatusCode::TOO_MANY_REQUESTS, Json(message.render(retry_ms))).into_response();
    headers.apply(response.headers_mut());
    response
}

/// Human phrase for a block duration, largest unit first. Durations of a
/// week or more snap to the ladder's fixed steps.
pub fn format_duration(duration_ms: u64) -> String {
    let days = duration_ms / DAY_MS;
    if days >= 365 {
        return "1 year".to_string();
    }
    if days >= 30 {
        return "30 days".to_string();
    }
    if days >= 7 {
        return "7 days".to_string();
    }
    if days >= 1 {
        return format!("{} day{}", days, plural(days));
    }

    let hours = duration_ms / (60 * 60 * 1000);
    if hours >= 1 {
        return format!("{} hour{}", hours, plural(hours));
    }

    let minutes = duration_ms / (60 * 1000);
    format!("{} minute{}", minutes, plural(minutes))
}

fn plural(n: u64) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
