pub mod cleanup;
pub mod config;
pub mod error;
pub mod escalation;
pub mod handlers;
pub mod key_generator;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use key_generator::KeyStrategy;
pub use rate_limiter::{Admission, ProgressiveRateLimiter, RateLimiterConfig};
pub use response::BlockMessage;
pub use server::create_app;
