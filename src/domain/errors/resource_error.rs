//! Failures produced while obtaining or binding a resource.

use thiserror::Error;

/// Resource pipeline error variants.
///
/// None of these reach the caller of the engine: they are logged and the
/// request continues with a null payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ResourceError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    #[error("out of memory while {stage}")]
    OutOfMemory { stage: String },

    #[error("failed to bind resource: {message}")]
    Bind { message: String },
}

impl ResourceError {
    /// Creates fetch error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates out-of-memory error.
    #[must_use]
    pub fn out_of_memory(stage: impl Into<String>) -> Self {
        Self::OutOfMemory {
            stage: stage.into(),
        }
    }

    /// Creates bind error.
    #[must_use]
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Returns whether memory ran out.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_url() {
        let err = ResourceError::fetch("http://img/a.png", "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to fetch http://img/a.png: connection refused"
        );
    }

    #[test]
    fn test_out_of_memory_detection() {
        assert!(ResourceError::out_of_memory("decoding").is_out_of_memory());
        assert!(!ResourceError::decode("u", "bad header").is_out_of_memory());
    }
}
