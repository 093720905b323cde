//! Value types describing a command's progress through the pipeline.

/// Monotonic request identifier. Higher ids are more recent and win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Which half of a command runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Classification or download, on a worker thread.
    #[default]
    Start,
    /// Binding, on the dispatcher.
    End,
}

/// Result of a command's start phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The collaborator provides the resource itself.
    Local,
    /// The resource was found in the cache.
    CacheHit,
    /// No resource key and no placeholder was applied.
    NullNoTemporary,
    /// No resource key, a placeholder is already showing.
    NullTemporary,
    /// A download command took over.
    NotInCache,
    /// A download command obtained a payload, or failed to.
    Downloaded {
        /// Whether a payload is available.
        success: bool,
    },
}

impl Classification {
    /// Returns true if the classification ends without a resource.
    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(
            self,
            Self::NullNoTemporary | Self::NullTemporary | Self::Downloaded { success: false }
        )
    }

    /// Returns true if the start phase hands the request to another command.
    #[must_use]
    pub const fn is_handoff(self) -> bool {
        matches!(self, Self::NotInCache)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::CacheHit => write!(f, "cache-hit"),
            Self::NullNoTemporary => write!(f, "null"),
            Self::NullTemporary => write!(f, "null-temporary"),
            Self::NotInCache => write!(f, "not-in-cache"),
            Self::Downloaded { success: true } => write!(f, "downloaded"),
            Self::Downloaded { success: false } => write!(f, "download-failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Classification::Local, false ; "local")]
    #[test_case(Classification::CacheHit, false ; "cache_hit")]
    #[test_case(Classification::NullNoTemporary, true ; "null")]
    #[test_case(Classification::NullTemporary, true ; "null_temporary")]
    #[test_case(Classification::Downloaded { success: true }, false ; "downloaded")]
    #[test_case(Classification::Downloaded { success: false }, true ; "download_failed")]
    fn test_is_null(classification: Classification, expected: bool) {
        assert_eq!(classification.is_null(), expected);
    }

    #[test]
    fn test_command_ids_order_by_recency() {
        assert!(CommandId(2) > CommandId(1));
    }
}
