use crate::core::models::WorkflowStep;

/// Failure talking to the data or generation service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network, DNS, TLS or timeout failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("please enter a description")]
    EmptyPrompt,

    #[error("please provide the story text")]
    EmptyStory,

    #[error("generation in progress")]
    GenerationInProgress,

    #[error("generation cancelled")]
    GenerationCancelled,

    #[error("batch generation in progress")]
    BatchInProgress,

    #[error("not available at the {actual} step (needs {expected})")]
    WrongStep {
        expected: WorkflowStep,
        actual: WorkflowStep,
    },

    #[error("no scene at index {0}")]
    SceneOutOfRange(usize),

    #[error("no layer with id {0}")]
    UnknownLayer(i64),

    #[error("{context}: {source}")]
    Api {
        context: &'static str,
        #[source]
        source: ApiError,
    },
}

impl StudioError {
    pub fn api(context: &'static str, source: ApiError) -> Self {
        StudioError::Api { context, source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StudioError::EmptyPrompt | StudioError::EmptyStory)
    }

    /// Human-readable message for the error indicator.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::Api { context, source } => format!("{}: {}", context, source.user_message()),
            other => other.to_string(),
        }
    }
}

pub type StudioResult<T> = std::result::Result<T, StudioError>;
