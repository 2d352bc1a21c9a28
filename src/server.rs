use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cleanup::spawn_sweeper;
use crate::config::Config;
use crate::error::Result;
use crate::handlers;
use crate::middleware::rate_limit;
use crate::rate_limiter::ProgressiveRateLimiter;

pub struct Server {
    config: Config,
    limiter: Arc<ProgressiveRateLimiter>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let limiter = Arc::new(ProgressiveRateLimiter::new(config.limiter()));
        handlers::mark_started();
        Self { config, limiter }
    }

    pub fn app(&self) -> Router {
        create_app(self.limiter.clone())
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("rategate listening on {}", self.config.bind_addr);

        let sweeper = spawn_sweeper(self.limiter.clone(), self.config.cleanup_interval());

        axum::serve(
            listener,
            self.app()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        sweeper.shutdown();
        tracing::info!("rategate stopped");

        Ok(())
    }
}

/// Router with the admission gate layered in front of every route.
pub fn create_app(limiter: Arc<ProgressiveRateLimiter>) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(limiter, rate_limit)),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiterConfig;
    use crate::response::HEADER_LIMIT;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app(max_requests: u32) -> Router {
        let limiter = Arc::new(ProgressiveRateLimiter::new(RateLimiterConfig {
            max_requests,
            ..Default::default()
        }));
        create_app(limiter)
    }

    #[tokio::test]
    async fn test_home_served_through_the_gate() {
        let app = test_app(15);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(HEADER_LIMIT).unwrap(), "15");
    }

    #[tokio::test]
    async fn test_health_route_is_counted_too() {
        let app = test_app(15);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(HEADER_LIMIT).is_some());
    }
}
