use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server socket could not be bound or served.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
