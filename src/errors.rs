use http::StatusCode;
use serde::Deserialize;

/// Message shown to the operator when a scanned quantity matches no visible slot.
pub const MATERIAL_NOT_FOUND_MESSAGE: &str = "material not found in order";

/// Error body returned by the WCS/IWMS services.
///
/// The `message` field is either a single string or a list of validation
/// messages, depending on which service produced it.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<ErrorMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    Single(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    fn into_text(self) -> String {
        match self {
            ErrorMessage::Single(msg) => msg,
            ErrorMessage::Many(msgs) => msgs.join("; "),
        }
    }
}

impl ErrorBody {
    /// Extracts the server-provided message from a raw response body, if any.
    pub fn message_from(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        parsed
            .message
            .map(ErrorMessage::into_text)
            .or(parsed.error)
            .filter(|msg| !msg.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Builds an API error from a non-success status and its raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = ErrorBody::message_from(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string()
        });

        match status {
            StatusCode::UNAUTHORIZED => ServiceError::Unauthorized(message),
            StatusCode::NOT_FOUND => ServiceError::NotFound(message),
            _ => ServiceError::Api { status, message },
        }
    }

    /// Convenience constructor for the scan-level "not found in order" warning.
    pub fn material_not_found() -> Self {
        ServiceError::NotFound(MATERIAL_NOT_FOUND_MESSAGE.to_string())
    }

    /// Returns the HTTP status associated with this error, when one is known.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(err) => err.status(),
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            Self::NotFound(_) => Some(StatusCode::NOT_FOUND),
            Self::ValidationError(_) | Self::InvalidInput(_) => Some(StatusCode::BAD_REQUEST),
            Self::SerializationError(_) | Self::ConfigError(_) | Self::Io(_) | Self::Other(_) => {
                None
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Text surfaced to the operator: the server-provided message when there is
    /// one, otherwise the transport error message.
    pub fn operator_message(&self) -> String {
        match self {
            Self::Api { message, .. }
            | Self::Unauthorized(message)
            | Self::NotFound(message)
            | Self::ValidationError(message)
            | Self::InvalidInput(message) => message.clone(),
            Self::Transport(err) if err.is_timeout() => "Request timed out".to_string(),
            Self::Transport(err) => err.to_string(),
            _ => self.to_string(),
        }
    }
}
