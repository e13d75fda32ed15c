use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Translation error: {0}")]
    Translation(String),

    #[error("No LLM provider is configured")]
    TranslationUnavailable,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;
