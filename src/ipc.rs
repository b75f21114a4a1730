//! Rate-limit conversation with the Codex app-server over stdio.
//!
//! This module is the core of the crate: it drives a freshly spawned agent
//! through a two-call JSON-RPC exchange and produces exactly one outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      stdin / stdout       ┌──────────────────┐
//! │ RateLimitClient │  ◄──────────────────────► │ codex app-server │
//! │  (tokio driver) │    newline-delimited JSON │   (child proc)   │
//! └────────┬────────┘                           └──────────────────┘
//!          │ SessionEvent / SessionAction
//! ┌────────▼────────┐
//! │     Session     │  framing, dispatch, validation, settlement
//! └─────────────────┘
//! ```
//!
//! # Protocol
//!
//! ```text
//! -> {"method":"initialize","id":1,"params":{"clientInfo":{...},"capabilities":{}}}
//! <- {"id":1,"result":{...}}
//! -> {"method":"account/rateLimits/read","id":2}
//! <- {"id":2,"result":{"rateLimits":{"primary":{...},"secondary":{...}}}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cxreset::ipc::RateLimitClient;
//! use cxreset::Config;
//!
//! let limits = RateLimitClient::new(Config::from_env()).fetch().await?;
//! ```

mod client;
mod error;
pub mod framing;
pub mod session;

pub use client::RateLimitClient;
pub use error::{IpcError, SessionOutcome};
pub use framing::{FrameError, FrameOverflow, LineFramer, DEFAULT_MAX_LINE_BYTES};
pub use session::{Phase, Session, SessionAction, SessionEvent, Termination};
