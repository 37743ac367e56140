use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not initialized: run 'conductor init'")]
    NotInitialized,

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("invalid type for '{field}': expected {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("invalid value '{value}' for '{field}': expected one of {allowed}")]
    InvalidValue {
        field: String,
        value: String,
        allowed: String,
    },

    #[error("invalid time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("invalid weekday '{0}'")]
    InvalidWeekday(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("engine path not configured: set engine.path in .conductor/config.yaml")]
    EngineNotConfigured,

    #[error("malformed engine document {file}: {reason}")]
    MalformedDocument { file: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// The parameter name a validation failure refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            CoreError::InvalidType { field, .. } | CoreError::InvalidValue { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
