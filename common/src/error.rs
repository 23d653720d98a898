use async_openai::error::OpenAIError;
use thiserror::Error;

/// Uniform failure of a single call to a third-party API.
///
/// `status` carries the upstream HTTP status when there was one; transport
/// failures and timeouts leave it empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("external call failed (status {}): {message}", display_status(.status))]
pub struct ExternalCallError {
    pub status: Option<u16>,
    pub message: String,
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl ExternalCallError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    pub fn timed_out(operation: &str, after: std::time::Duration) -> Self {
        Self::new(
            None,
            format!("{operation} timed out after {}ms", after.as_millis()),
        )
    }

    /// Gateway-class upstream failures that are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self.status, Some(502..=504))
    }
}

impl From<reqwest::Error> for ExternalCallError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Status reported for OpenAI error bodies that carry neither a `type` nor a
/// `code`. The SDK only builds those from 5xx responses, and it drops the
/// actual status code on the way.
const OPENAI_SERVER_ERROR_STATUS: u16 = 502;

impl From<OpenAIError> for ExternalCallError {
    fn from(err: OpenAIError) -> Self {
        let status = match &err {
            OpenAIError::Reqwest(inner) => inner.status().map(|s| s.as_u16()),
            OpenAIError::ApiError(api) if api.r#type.is_none() && api.code.is_none() => {
                Some(OPENAI_SERVER_ERROR_STATUS)
            }
            _ => None,
        };
        Self::new(status, err.to_string())
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("External call error: {0}")]
    External(#[from] ExternalCallError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Selection error: {0}")]
    Selection(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// The upstream failure behind this error, if it came from a capability call.
    pub fn as_external(&self) -> Option<&ExternalCallError> {
        match self {
            AppError::External(err) => Some(err),
            _ => None,
        }
    }
}
