//! Failure taxonomy for a rate-limit conversation.

use thiserror::Error;

use crate::ipc::framing::FrameError;
use crate::models::RateLimits;

/// The single terminal result of a session.
pub type SessionOutcome = Result<RateLimits, IpcError>;

/// Why a conversation with the agent failed.
///
/// Every variant is terminal; a session produces at most one. The `Display`
/// text is the human-readable failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    /// The agent process could not be started or waited on.
    #[error("failed to start agent: {0}")]
    Spawn(String),

    /// Malformed or incomplete response on a live channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The agent answered with a JSON-RPC error object.
    #[error("{method} failed: {message} (code {code})")]
    Application {
        method: &'static str,
        code: i64,
        message: String,
    },

    /// The payload decoded but did not have the expected shape.
    #[error("invalid rate limit payload: {0}")]
    ShapeValidation(String),

    /// The agent exited before the conversation completed.
    #[error("agent exited with {}", describe_exit_code(.code))]
    ProcessExit { code: Option<i32> },

    /// The whole conversation exceeded its time budget.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// A single stdout line grew past the framing limit.
    #[error("agent output line exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// The caller cancelled the conversation.
    #[error("cancelled")]
    Cancelled,
}

fn describe_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl From<FrameError> for IpcError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::TooLarge { limit } => IpcError::FrameTooLarge { limit },
        }
    }
}
