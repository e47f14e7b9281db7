use thiserror::Error;

/// Errors raised by the messaging client.
/// None of them is fatal; callers degrade to an empty or stale view.
#[derive(Debug, Error)]
pub enum MessagingError {
    // ── Session errors ───────────────────────────────────────────────────────
    #[error("No user is logged in")]
    IdentityMissing,

    #[error("No conversation is selected")]
    NoConversationSelected,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── Network errors ───────────────────────────────────────────────────────
    #[error("Request to {endpoint} failed: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {endpoint} returned status {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Message backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid message payload: {message}")]
    InvalidPayload { message: String },

    // ── Send errors ──────────────────────────────────────────────────────────
    #[error("Failed to send message: {source}")]
    SendFailed {
        /// The text that did not go out, kept so the caller can offer a retry.
        text: String,
        #[source]
        source: Box<MessagingError>,
    },

    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("Invalid value '{value}' for {key}")]
    InvalidConfig { key: String, value: String },
}

impl MessagingError {
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        MessagingError::RequestFailed { endpoint: endpoint.into(), source }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        MessagingError::Unavailable { message: message.into() }
    }

    pub fn is_identity_missing(&self) -> bool {
        matches!(self, MessagingError::IdentityMissing)
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            MessagingError::RequestFailed { .. }
                | MessagingError::UnexpectedStatus { .. }
                | MessagingError::Unavailable { .. }
                | MessagingError::Decode { .. }
                | MessagingError::InvalidPayload { .. }
        )
    }

    pub fn is_send_failed(&self) -> bool {
        matches!(self, MessagingError::SendFailed { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, MessagingError::EmptyField { .. })
    }

    /// Text of a failed send, if this error carries one.
    pub fn retry_text(&self) -> Option<&str> {
        match self {
            MessagingError::SendFailed { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_failed_keeps_text_and_cause() {
        let err = MessagingError::SendFailed {
            text: "hello".to_string(),
            source: Box::new(MessagingError::unavailable("offline")),
        };
        assert!(err.is_send_failed());
        assert!(!err.is_network());
        assert_eq!(err.retry_text(), Some("hello"));
        assert_eq!(
            err.to_string(),
            "Failed to send message: Message backend unavailable: offline"
        );
    }

    #[test]
    fn network_family() {
        let status = MessagingError::UnexpectedStatus {
            endpoint: "/messages".to_string(),
            status: 502,
        };
        assert!(status.is_network());
        assert!(!MessagingError::IdentityMissing.is_network());
        assert!(MessagingError::IdentityMissing.is_identity_missing());
    }
}
