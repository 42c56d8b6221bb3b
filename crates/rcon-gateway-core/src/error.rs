//! Error types for the RCON gateway

use thiserror::Error;

/// Result type for RCON gateway operations
pub type Result<T> = std::result::Result<T, RconError>;

/// RCON gateway error types
///
/// Variants carry their detail as strings so the whole enum stays `Clone`,
/// which the shared command outcome cell requires.
#[derive(Debug, Clone, Error)]
pub enum RconError {
    /// The server rejected the RCON password during authentication
    #[error("incorrect RCON password")]
    IncorrectPassword,

    /// Transport-level failure after the retry budget was exhausted
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A socket operation exceeded the configured timeout
    #[error("socket operation timed out: {0}")]
    Timeout(String),

    /// Transient transport error
    #[error("connection error: {0}")]
    Connection(String),

    /// Short read or malformed frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered an in-session command with request id -1
    #[error("RCON session is no longer authenticated")]
    AuthLost,

    /// Submission after shutdown began, or a command force-failed during it
    #[error("worker pool is shutting down")]
    PoolShuttingDown,

    /// The dependency graph of a job contains a cycle
    #[error("cycle detected in command dependencies")]
    CycleDetected,

    /// Two commands in a job share a nonzero id
    #[error("duplicate command id {0}")]
    DuplicateId(i32),

    /// A job references a dependency id that is not part of the job
    #[error("dependency on unknown command id {0}")]
    UnknownDependency(i32),

    /// `send_command` was called on a closed connection
    #[error("client is disconnected")]
    Disconnected,
}

impl RconError {
    /// Whether a worker should fail the current command and reconnect,
    /// rather than treat the error as fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RconError::Timeout(_)
                | RconError::Connection(_)
                | RconError::Protocol(_)
                | RconError::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_trigger_reconnect() {
        assert!(RconError::Timeout("read".into()).is_transient());
        assert!(RconError::Connection("reset".into()).is_transient());
        assert!(RconError::Protocol("short read".into()).is_transient());
        assert!(RconError::Disconnected.is_transient());

        assert!(!RconError::IncorrectPassword.is_transient());
        assert!(!RconError::AuthLost.is_transient());
        assert!(!RconError::PoolShuttingDown.is_transient());
        assert!(!RconError::CycleDetected.is_transient());
    }
}
