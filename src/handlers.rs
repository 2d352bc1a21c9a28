use std::sync::OnceLock;
use std::time::Instant;

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::rate_limiter::epoch_ms;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record process start for the health uptime report. Idempotent.
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Landing route, useful for smoke-checking the gate.
pub async fn home() -> impl IntoResponse {
    Json(json!({
        "server": "Active",
        "success": true,
        "status": 200,
        "message": "This is Home Route.",
        "timestamp": epoch_ms(),
    }))
}

/// Service liveness probe.
pub async fn health() -> impl IntoResponse {
    let uptime = STARTED_AT
        .get()
        .map(|started| started.elapsed().as_secs())
        .unwrap_or(0);

    Json(json!({
        "status": "OK",
        "timestamp": epoch_ms(),
        "uptime": uptime,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_home_payload() {
        let body = body_json(home().await.into_response()).await;
        assert_eq!(body["server"], "Active");
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], 200);
        assert_eq!(body["message"], "This is Home Route.");
        assert!(body["timestamp"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_health_payload() {
        mark_started();
        let body = body_json(health().await.into_response()).await;
        assert_eq!(body["status"], "OK");
        assert!(body["uptime"].as_u64().is_some());
    }
}
