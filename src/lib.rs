//! cxreset Library
//!
//! Queries a locally installed Codex agent for its rate-limit status and
//! renders it as a one-line status string:
//!
//! - `ipc` - the stdio JSON-RPC conversation with `codex app-server`
//! - `rpc` - request/response wire types
//! - `models` - rate-limit windows and payload validation
//! - `config` - timeout and agent command configuration
//! - `format` - status-bar rendering
//!
//! # Example
//!
//! ```ignore
//! use cxreset::{format, Config, RateLimitClient};
//!
//! let line = match RateLimitClient::new(Config::from_env()).fetch().await {
//!     Ok(limits) => format::render(&format::reset_times(&limits, chrono::Utc::now())),
//!     Err(_) => format::FALLBACK_OUTPUT.to_string(),
//! };
//! println!("{line}");
//! ```

pub mod config;
pub mod format;
pub mod ipc;
pub mod models;
pub mod rpc;

pub use config::Config;
pub use ipc::{IpcError, RateLimitClient, SessionOutcome};
pub use models::{RateLimitWindow, RateLimits};
