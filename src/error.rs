use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlphaMinerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Malformed formula: {0}")]
    MalformedFormula(String),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Internal invariant violated: {0}")]
    Internal(String),

    #[error("Data loading error: {0}")]
    DataLoading(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl AlphaMinerError {
    /// Errors caused by the caller's inputs rather than by the engine itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownFeature(_)
                | Self::MalformedFormula(_)
                | Self::ShapeMismatch { .. }
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AlphaMinerError>;
