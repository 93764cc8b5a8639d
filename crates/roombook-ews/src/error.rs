//! EWS-specific error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EwsError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Item has no id")]
    MissingItemId,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server busy, back off for {back_off_ms} ms")]
    ServerBusy { back_off_ms: u64 },

    #[error("EWS error {code}: {message}")]
    ResponseError { code: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EwsError {
    /// User-friendly error message for API responses.
    pub fn user_message(&self) -> String {
        match self {
            Self::ItemNotFound(_) => "Booking not found".to_string(),
            Self::MissingItemId => "Booking has no identifier".to_string(),
            Self::Unauthorized => "The calendar service rejected our credentials".to_string(),
            Self::ServerBusy { .. } => "The calendar service is busy. Please retry.".to_string(),
            Self::ResponseError { code, .. } => format!("Calendar service error: {}", code),
            Self::InvalidResponse(_) => "Unexpected response from the calendar service".to_string(),
            Self::Http(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerBusy { .. } => true,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound(_))
    }
}
