use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the identity and document services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ApiError {
    /// Short machine code: the message up to the first `" : "` detail
    /// separator, e.g. `INVALID_PASSWORD`.
    pub fn short_code(&self) -> &str {
        self.message
            .split(" : ")
            .next()
            .unwrap_or_default()
            .trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{message}")]
    InteractiveAuthFailure {
        code: Option<String>,
        message: String,
    },
    #[error("sign-out failed: {message}")]
    SignOutFailure { message: String },
}

impl AuthError {
    pub fn interactive(message: impl Into<String>) -> Self {
        Self::InteractiveAuthFailure {
            code: None,
            message: message.into(),
        }
    }

    pub fn interactive_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InteractiveAuthFailure {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn sign_out(message: impl Into<String>) -> Self {
        Self::SignOutFailure {
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::InteractiveAuthFailure { code, .. } => code.as_deref(),
            Self::SignOutFailure { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InteractiveAuthFailure { message, .. } | Self::SignOutFailure { message } => {
                message
            }
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(value: ApiError) -> Self {
        let code = value.short_code().to_string();
        Self::InteractiveAuthFailure {
            code: (!code.is_empty()).then_some(code),
            message: value.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch collection '{collection}': {message}")]
pub struct FetchError {
    pub collection: String,
    pub message: String,
}

impl FetchError {
    pub fn new(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            message: message.into(),
        }
    }
}
