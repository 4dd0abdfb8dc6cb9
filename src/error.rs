use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodscribeError {
    #[error("Episode not found: {0}")]
    EpisodeNotFound(u64),

    #[error("Episode {0} has no transcript cues")]
    NoCues(u64),

    #[error("Unknown workflow stage value: {0}")]
    UnknownStage(u8),

    #[error("API error ({status}): {body}")]
    ApiStatus { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),

    #[error("Batch failed: {0}")]
    BatchFailed(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid subtitle file: {0}")]
    Subtitle(String),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PodscribeError {
    /// Whether retrying the same call may succeed.
    ///
    /// Rate limits, server errors, transport failures and unusable response
    /// bodies are transient. Other 4xx statuses are not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PodscribeError::ApiStatus { status, .. } => *status == 429 || *status >= 500,
            PodscribeError::Http(_) | PodscribeError::MalformedResponse(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PodscribeError>;
