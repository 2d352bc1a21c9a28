//! Axum middleware gate in front of the routed handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::trace;
use uuid::Uuid;

use crate::rate_limiter::{Admission, ProgressiveRateLimiter};
use crate::response::{self, RateLimitHeaders};

/// Records which limiter instances already counted this request, so
/// re-mounting the same limiter deeper in the pipeline does not double
/// count while stacked distinct limiters still each count once.
#[derive(Debug, Clone, Default)]
pub struct AdmissionMarks(HashSet<Uuid>);

impl AdmissionMarks {
    fn contains(&self, id: Uuid) -> bool {
        self.0.contains(&id)
    }
}

/// Admission gate. Mount with `middleware::from_fn_with_state`.
pub async fn rate_limit(
    State(limiter): State<Arc<ProgressiveRateLimiter>>,
    mut request: Request,
    next: Next,
) -> Response {
    if limiter.should_skip(&request) {
        return next.run(request).await;
    }

    let id = limiter.instance_id();
    if request
        .extensions()
        .get::<AdmissionMarks>()
        .is_some_and(|marks| marks.contains(id))
    {
        trace!("request already counted by this limiter");
        return next.run(request).await;
    }
    match request.extensions_mut().get_mut::<AdmissionMarks>() {
        Some(marks) => {
            marks.0.insert(id);
        }
        None => {
            request
                .extensions_mut()
                .insert(AdmissionMarks(HashSet::from([id])));
        }
    }

    let key = limiter.key_for(&request);
    let config = limiter.config();

    match limiter.admit(&key) {
        Admission::Allowed { remaining, reset_at } => {
            let headers = RateLimitHeaders {
                limit: config.max_requests,
                remaining,
                reset_at,
                retry_after: None,
            };
            let mut response = next.run(request).await;
            // a limiter deeper in the stack may have rejected the request;
            // its block headers must not be replaced with this window's
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                headers.apply(response.headers_mut());
            }
            response
        }
        Admission::Limited { retry_ms, unblock_at } => {
            response::too_many_requests(config.max_requests, unblock_at, retry_ms, &config.message)
        }
    }
}
