//! Runtime configuration.
//!
//! Only one knob comes from the environment: `CXRESET_TIMEOUT_MS`, the time
//! budget for the whole conversation. Bad values never fail startup; they
//! fall back to the default.

use std::time::Duration;

use tracing::debug;

use crate::ipc::DEFAULT_MAX_LINE_BYTES;
use crate::rpc::ClientInfo;

/// Environment variable holding the conversation timeout in milliseconds.
pub const TIMEOUT_ENV_VAR: &str = "CXRESET_TIMEOUT_MS";

pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
pub const MAX_TIMEOUT_MS: u64 = 10_000;

/// Executable looked up on `PATH`.
pub const DEFAULT_AGENT_PROGRAM: &str = "codex";
pub const DEFAULT_AGENT_SUBCOMMAND: &str = "app-server";

/// Everything a [`RateLimitClient`](crate::RateLimitClient) needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Agent executable.
    pub program: String,
    /// Arguments passed to the agent.
    pub args: Vec<String>,
    /// Budget for the entire two-call conversation.
    pub timeout: Duration,
    /// Longest stdout line accepted from the agent.
    pub max_line_bytes: usize,
    pub client_info: ClientInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            args: vec![DEFAULT_AGENT_SUBCOMMAND.to_string()],
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            client_info: ClientInfo::default(),
        }
    }
}

impl Config {
    /// Defaults plus the timeout from [`TIMEOUT_ENV_VAR`].
    pub fn from_env() -> Self {
        Self {
            timeout: timeout_from_env(),
            ..Self::default()
        }
    }

    pub fn with_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timeout directly. Unlike the environment variable this is
    /// not clamped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Timeout in whole milliseconds, saturating at `u64::MAX`.
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Read [`TIMEOUT_ENV_VAR`] and resolve it with [`parse_timeout`].
pub fn timeout_from_env() -> Duration {
    parse_timeout(std::env::var(TIMEOUT_ENV_VAR).ok().as_deref())
}

/// Resolve a raw timeout setting.
///
/// Missing, blank, non-numeric and non-finite values yield the default.
/// Numeric values are clamped to `[DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS]`.
pub fn parse_timeout(raw: Option<&str>) -> Duration {
    let default = Duration::from_millis(DEFAULT_TIMEOUT_MS);

    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };

    match raw.parse::<f64>() {
        Ok(millis) if millis.is_finite() => {
            let clamped = millis.clamp(DEFAULT_TIMEOUT_MS as f64, MAX_TIMEOUT_MS as f64);
            Duration::from_millis(clamped as u64)
        }
        _ => {
            debug!(value = raw, "ignoring invalid {}", TIMEOUT_ENV_VAR);
            default
        }
    }
}
