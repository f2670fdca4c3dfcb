use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("preconditions not met:\n  - {}", .0.join("\n  - "))]
    PreconditionFailure(Vec<String>),

    #[error("secret '{name}' is missing or empty for environment '{environment}'")]
    SecretResolution { name: String, environment: String },

    #[error("{tool} failed: {message}")]
    ExternalCall { tool: String, message: String },

    #[error("could not parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl DeckError {
    pub fn external(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCall {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;
