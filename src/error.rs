use thiserror::Error;

pub type TraderResult<T> = Result<T, TraderError>;

#[derive(Debug, Error)]
pub enum TraderError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Closed classification of every error the crate can surface.
///
/// Callers use this to tell fatal conditions apart from recoverable ones
/// without matching on the full error tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required OHLCV input column is absent.
    MissingColumn,
    /// Not enough rows to run a single episode.
    InsufficientData,
    /// A checkpoint could not be written or read back.
    CheckpointIo,
    /// A configuration value is out of its valid range.
    InvalidConfig,
    /// Anything else (invariant violations, shape mismatches, data frame failures).
    Internal,
}

impl TraderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Data(DataError::MissingColumn(_)) => ErrorKind::MissingColumn,
            Self::Data(DataError::InsufficientData { .. }) => ErrorKind::InsufficientData,
            Self::Io(_) => ErrorKind::CheckpointIo,
            Self::Env(EnvError::InvalidConfig(_)) | Self::Agent(AgentError::InvalidConfig(_)) => {
                ErrorKind::InvalidConfig
            }
            _ => ErrorKind::Internal,
        }
    }

    /// `true` when the caller can reasonably continue (e.g. train from fresh
    /// weights after a failed checkpoint load).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InsufficientData | ErrorKind::CheckpointIo
        )
    }
}

/// Errors occurring within agent logic or execution.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    #[error("Network shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Unknown action index: {0}")]
    UnknownAction(usize),
}

/// Errors related to input tables and derived features.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing required column: '{0}'")]
    MissingColumn(String),

    #[error("Insufficient data: {rows} rows available, at least {required} required")]
    InsufficientData { rows: usize, required: usize },

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to the environment configuration and execution loop.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid environment state: {0}")]
    InvalidState(String),

    #[error("Invalid environment configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to encode configuration")]
    Encoding(#[from] postcard::Error),

    #[error("Progress bar error")]
    ProgressBar(#[from] indicatif::style::TemplateError),
}

/// Errors related to checkpoint files and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization failed")]
    Postcard(#[from] postcard::Error),

    #[error("Checkpoint error at '{path}': {msg}")]
    Checkpoint { path: String, msg: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classifies_fatal_and_recoverable() {
        let missing: TraderError = DataError::MissingColumn("close".to_string()).into();
        assert_eq!(missing.kind(), ErrorKind::MissingColumn);
        assert!(!missing.is_recoverable());

        let short: TraderError = DataError::InsufficientData {
            rows: 10,
            required: 62,
        }
        .into();
        assert_eq!(short.kind(), ErrorKind::InsufficientData);
        assert!(short.is_recoverable());

        let ckpt: TraderError = IoError::Checkpoint {
            path: "/tmp/x".to_string(),
            msg: "missing".to_string(),
        }
        .into();
        assert_eq!(ckpt.kind(), ErrorKind::CheckpointIo);
        assert!(ckpt.is_recoverable());

        let cfg: TraderError = EnvError::InvalidConfig("window".to_string()).into();
        assert_eq!(cfg.kind(), ErrorKind::InvalidConfig);

        let broken: TraderError = SystemError::InvariantViolation("close".to_string()).into();
        assert_eq!(broken.kind(), ErrorKind::Internal);
        assert!(!broken.is_recoverable());
    }
}
