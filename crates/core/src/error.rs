//! Error types for source queries and target resolution

use crate::ambiguity::Ambiguity;
use std::time::Duration;
use thiserror::Error;

/// Errors a process table, socket table or service manager can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Process not found (never existed, or exited before it could be read)
    #[error("Process {pid} not found")]
    ProcessNotFound { pid: u32 },

    /// Access denied by the OS
    #[error("Access denied to {what}")]
    AccessDenied { what: String },

    /// The collaborator could not be queried at all
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    /// The collaborator did not answer in time
    #[error("{collaborator} timed out after {after:?}")]
    Timeout {
        collaborator: &'static str,
        after: Duration,
    },

    /// Output could not be understood
    #[error("Failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
}

impl SourceError {
    pub fn unavailable(collaborator: &'static str, reason: impl ToString) -> Self {
        SourceError::Unavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }

    pub fn parse(what: &'static str, detail: impl ToString) -> Self {
        SourceError::Parse {
            what,
            detail: detail.to_string(),
        }
    }

    /// Check if this is an access denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, SourceError::AccessDenied { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::ProcessNotFound { .. })
    }
}

/// Result type for source queries
pub type SourceResult<T> = Result<T, SourceError>;

/// Terminal failures of target resolution
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    /// The raw value does not parse for its target kind
    #[error("Invalid {kind}: {value:?} ({reason})")]
    InvalidTarget {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Nothing matched
    #[error("No process found for {target}")]
    NotFound { target: String },

    /// Two or more live candidates; the caller must pick one by PID
    #[error("{} processes match {}", .0.candidates.len(), .0.target)]
    Ambiguous(Ambiguity),

    /// Listeners exist on the port but none could be attributed to a process
    #[error("Port {port} is in use but its owning process could not be determined")]
    OwnerNotDetected { port: u16 },

    /// A collaborator with no fallback could not be queried
    #[error("{0}")]
    SourceUnavailable(SourceError),
}

impl ResolveError {
    /// Process exit code the CLI uses for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::NotFound { .. } => 2,
            ResolveError::OwnerNotDetected { .. } => 3,
            ResolveError::SourceUnavailable(err) if err.is_access_denied() => 3,
            ResolveError::SourceUnavailable(_) => 1,
            ResolveError::InvalidTarget { .. } => 4,
            ResolveError::Ambiguous(_) => 5,
        }
    }

    /// True when retrying with elevated privileges might produce an answer
    pub fn needs_privileges(&self) -> bool {
        match self {
            ResolveError::OwnerNotDetected { .. } => true,
            ResolveError::SourceUnavailable(err) => err.is_access_denied(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found = ResolveError::NotFound {
            target: "port 9".into(),
        };
        assert_eq!(not_found.exit_code(), 2);
        assert_eq!(ResolveError::OwnerNotDetected { port: 80 }.exit_code(), 3);
        assert_eq!(
            ResolveError::SourceUnavailable(SourceError::AccessDenied {
                what: "/proc".into()
            })
            .exit_code(),
            3
        );
        assert_eq!(
            ResolveError::SourceUnavailable(SourceError::unavailable("ps", "missing")).exit_code(),
            1
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            SourceError::ProcessNotFound { pid: 42 }.to_string(),
            "Process 42 not found"
        );
        assert!(ResolveError::OwnerNotDetected { port: 22 }.needs_privileges());
        assert!(!ResolveError::NotFound { target: "x".into() }.needs_privileges());
    }
}
