use async_trait::async_trait;
use thiserror::Error;

/// Raw outcome of one remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// HTTP status code
    pub status: u16,
    /// Text of the first candidate's first part, if any
    pub text: Option<String>,
    /// First candidate's finish reason (e.g., "STOP", "SAFETY")
    pub finish_reason: Option<String>,
    /// Response body for non-2xx statuses
    pub error_body: Option<String>,
}

impl Generation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status: 200,
            text: Some(text.into()),
            finish_reason: Some("STOP".to_string()),
            error_body: None,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            text: None,
            finish_reason: None,
            error_body: Some(body.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_safety_blocked(&self) -> bool {
        self.finish_reason.as_deref() == Some("SAFETY")
    }

    /// Non-empty text of a successful, unblocked generation
    pub fn usable_text(&self) -> Option<&str> {
        if !self.is_success() || self.is_safety_blocked() {
            return None;
        }
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "{}")
    }
}

/// A single remote call failed before producing an HTTP status
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// A remote text-generation service addressed by model id
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Whether an API credential is available; callers fail fast when it is not
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate_content(&self, model: &str, prompt: &str)
        -> Result<Generation, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_text() {
        assert_eq!(Generation::ok(" hi ").usable_text(), Some("hi"));
        assert_eq!(Generation::ok("").usable_text(), None);
        assert_eq!(Generation::ok("{}").usable_text(), None);
        assert_eq!(Generation::status(429, "quota").usable_text(), None);

        let blocked = Generation {
            finish_reason: Some("SAFETY".to_string()),
            ..Generation::ok("partial")
        };
        assert!(blocked.is_safety_blocked());
        assert_eq!(blocked.usable_text(), None);
    }
}
