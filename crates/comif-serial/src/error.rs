/// Errors raised while loading or validating a [`crate::SerialConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for this schema.
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the interface cannot work with.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
