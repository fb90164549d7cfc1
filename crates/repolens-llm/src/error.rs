use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("authentication rejected by {provider}")]
    Auth { provider: String },

    #[error("{provider} did not respond within {}ms", .timeout.as_millis())]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider} request failed with status {status}")]
    Api { provider: String, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether another attempt has a chance of succeeding.
    ///
    /// Auth failures, malformed payloads and unsupported operations are final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited | Self::Unavailable | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Unavailable.is_retryable());
        assert!(
            LlmError::Timeout {
                provider: "openai".into(),
                timeout: Duration::from_secs(1),
            }
            .is_retryable()
        );
    }

    #[test]
    fn final_errors_are_not_retryable() {
        assert!(
            !LlmError::Auth {
                provider: "openai".into()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::EmbedUnsupported {
                provider: "mock".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::Other("boom".into()).is_retryable());
    }

    #[test]
    fn timeout_message_reports_millis() {
        let err = LlmError::Timeout {
            provider: "openai".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "openai did not respond within 1500ms");
    }
}
