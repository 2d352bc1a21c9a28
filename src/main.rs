use anyhow::Result;
use clap::Parser;
use rategate::config::Config;
use rategate::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Progressive rate limiting gateway.
#[derive(Parser, Debug)]
#[command(name = "rategate", version, about)]
struct Args {
    /// Bind address, overriding BIND_ADDR
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Requests allowed per window, overriding RATE_LIMIT_MAX_REQUESTS
    #[arg(long)]
    max_requests: Option<u32>,

    /// Window length in milliseconds, overriding RATE_LIMIT_WINDOW_MS
    #[arg(long)]
    window_ms: Option<u64>,

    /// First-violation block in milliseconds, overriding RATE_LIMIT_INITIAL_BLOCK_MS
    #[arg(long)]
    initial_block_ms: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(max_requests) = self.max_requests {
            config.max_requests = max_requests;
        }
        if let Some(window_ms) = self.window_ms {
            config.window_ms = window_ms;
        }
        if let Some(initial_block_ms) = self.initial_block_ms {
            config.initial_block_ms = initial_block_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    args.apply(&mut config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rategate={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rategate service");
    tracing::info!(
        "Configuration: bind_addr={}, window_ms={}, max_requests={}, initial_block_ms={}",
        config.bind_addr,
        config.window_ms,
        config.max_requests,
        config.initial_block_ms
    );

    Server::new(config).run().await?;

    Ok(())
}
