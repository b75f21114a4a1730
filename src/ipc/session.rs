//! The rate-limit conversation as an explicit state machine.
//!
//! A [`Session`] owns no I/O. The driver in [`crate::ipc::client`] feeds it
//! [`SessionEvent`]s from its event sources (stdout data, process error,
//! process exit, timer, cancellation) and executes the [`SessionAction`]s
//! it returns. Every event goes through [`Session::handle`], and every
//! terminal transition goes through one settle step, so exactly one outcome
//! and at most one termination request are ever produced.
//!
//! # Phases
//!
//! ```text
//! Starting --start()--> AwaitingInit --id=1 ok--> AwaitingRateLimits --id=2 ok--> Settled(Ok)
//!                            |                            |
//!                            +----------- any failure ----+--------------------> Settled(Err)
//! ```

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace};

use crate::ipc::error::{IpcError, SessionOutcome};
use crate::ipc::framing::LineFramer;
use crate::models::{
    validate_window, RateLimits, EXPECTED_PRIMARY_WINDOW_MINS, EXPECTED_SECONDARY_WINDOW_MINS,
};
use crate::rpc::{
    ClientInfo, RpcRequest, RpcResponse, INITIALIZE_METHOD, INITIALIZE_REQUEST_ID,
    RATE_LIMITS_METHOD, RATE_LIMITS_REQUEST_ID,
};

/// Where the conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    AwaitingInit,
    AwaitingRateLimits,
    Settled,
}

/// Something that happened to the agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chunk of stdout, in stream order.
    Output(Vec<u8>),
    /// Reading stdout failed.
    ReadFailed(String),
    /// The process could not be spawned or waited on.
    ProcessError(String),
    /// The process exited and its stdout is drained.
    ProcessExit(Option<i32>),
    /// The conversation timer elapsed.
    TimerFired,
    /// The caller aborted the conversation.
    Cancelled,
}

/// How the agent should be stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM; the conversation concluded on its own terms.
    Graceful,
    /// SIGKILL; the agent is unresponsive or the caller gave up.
    Forced,
}

/// Work the driver must perform on behalf of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Write this newline-terminated line to the agent's stdin.
    Write(String),
    /// Stop the agent process.
    Terminate(Termination),
}

/// State of one `initialize` + `account/rateLimits/read` conversation.
#[derive(Debug)]
pub struct Session {
    phase: Phase,
    framer: LineFramer,
    client_info: ClientInfo,
    timeout: Duration,
    outcome: Option<SessionOutcome>,
}

impl Session {
    /// Create a session. `timeout` is only used to describe a timeout
    /// failure; the driver owns the timer itself.
    pub fn new(client_info: ClientInfo, framer: LineFramer, timeout: Duration) -> Self {
        Self {
            phase: Phase::Starting,
            framer,
            client_info,
            timeout,
            outcome: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Settled
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Consume the session and return its outcome.
    ///
    /// A session dropped before settling reports a protocol error rather
    /// than panicking.
    pub fn into_outcome(self) -> SessionOutcome {
        self.outcome.unwrap_or_else(|| {
            Err(IpcError::Protocol(
                "conversation ended without an outcome".to_string(),
            ))
        })
    }

    /// Begin the conversation: emit the `initialize` request.
    pub fn start(&mut self) -> Vec<SessionAction> {
        if self.phase != Phase::Starting {
            return Vec::new();
        }

        match RpcRequest::initialize(&self.client_info).to_line() {
            Ok(line) => {
                self.phase = Phase::AwaitingInit;
                vec![SessionAction::Write(line)]
            }
            Err(e) => self.settle(
                Err(IpcError::Protocol(format!(
                    "failed to encode initialize request: {e}"
                ))),
                Some(Termination::Forced),
            ),
        }
    }

    /// Single transition function for every event source.
    ///
    /// Once settled, all further events are ignored and yield no actions.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if self.is_settled() {
            trace!(?event, "ignoring event after settlement");
            return Vec::new();
        }

        match event {
            SessionEvent::Output(chunk) => self.on_output(&chunk),
            SessionEvent::ReadFailed(reason) => self.settle(
                Err(IpcError::Protocol(format!(
                    "failed to read agent output: {reason}"
                ))),
                Some(Termination::Forced),
            ),
            SessionEvent::ProcessError(reason) => self.settle(Err(IpcError::Spawn(reason)), None),
            SessionEvent::ProcessExit(code) => {
                self.settle(Err(IpcError::ProcessExit { code }), None)
            }
            SessionEvent::TimerFired => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                self.settle(Err(IpcError::Timeout(millis)), Some(Termination::Forced))
            }
            SessionEvent::Cancelled => {
                self.settle(Err(IpcError::Cancelled), Some(Termination::Forced))
            }
        }
    }

    fn on_output(&mut self, chunk: &[u8]) -> Vec<SessionAction> {
        let (lines, overflow) = match self.framer.push(chunk) {
            Ok(lines) => (lines, None),
            Err(overflow) => (overflow.lines, Some(overflow.error)),
        };

        let mut actions = Vec::new();
        for line in lines {
            if self.is_settled() {
                break;
            }
            actions.extend(self.on_line(&line));
        }
        // Lines completed before the oversized one still count.
        if let Some(e) = overflow {
            actions.extend(self.settle(Err(e.into()), Some(Termination::Forced)));
        }
        actions
    }

    fn on_line(&mut self, line: &str) -> Vec<SessionAction> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let message: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "skipping unparseable line from agent");
                return Vec::new();
            }
        };

        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            trace!("ignoring message without a numeric id");
            return Vec::new();
        };

        match (id, self.phase) {
            (INITIALIZE_REQUEST_ID, Phase::AwaitingInit) => self.on_initialize_reply(message),
            (RATE_LIMITS_REQUEST_ID, Phase::AwaitingRateLimits) => {
                self.on_rate_limits_reply(message)
            }
            _ => {
                debug!(id, phase = ?self.phase, "ignoring unexpected response");
                Vec::new()
            }
        }
    }

    fn on_initialize_reply(&mut self, message: Value) -> Vec<SessionAction> {
        let response = match decode_response(message, INITIALIZE_METHOD) {
            Ok(response) => response,
            Err(e) => return self.settle(Err(e), Some(Termination::Graceful)),
        };

        if let Some(error) = response.error {
            return self.settle(
                Err(IpcError::Application {
                    method: INITIALIZE_METHOD,
                    code: error.code,
                    message: error.message,
                }),
                Some(Termination::Graceful),
            );
        }

        if response.result.is_none() {
            return self.settle(
                Err(IpcError::Protocol(
                    "initialize response missing result".to_string(),
                )),
                Some(Termination::Graceful),
            );
        }

        match RpcRequest::read_rate_limits().to_line() {
            Ok(line) => {
                debug!("agent initialized, requesting rate limits");
                self.phase = Phase::AwaitingRateLimits;
                vec![SessionAction::Write(line)]
            }
            Err(e) => self.settle(
                Err(IpcError::Protocol(format!(
                    "failed to encode rate limits request: {e}"
                ))),
                Some(Termination::Graceful),
            ),
        }
    }

    fn on_rate_limits_reply(&mut self, message: Value) -> Vec<SessionAction> {
        let outcome = decode_response(message, RATE_LIMITS_METHOD).and_then(parse_rate_limits);
        self.settle(outcome, Some(Termination::Graceful))
    }

    /// The only path into [`Phase::Settled`].
    fn settle(
        &mut self,
        outcome: SessionOutcome,
        termination: Option<Termination>,
    ) -> Vec<SessionAction> {
        if self.is_settled() {
            return Vec::new();
        }
        self.phase = Phase::Settled;

        match &outcome {
            Ok(limits) => info!(
                primary_used = limits.primary.used_percent,
                has_secondary = limits.secondary.is_some(),
                "rate limits received"
            ),
            Err(e) => debug!(error = %e, "conversation failed"),
        }
        self.outcome = Some(outcome);

        termination.map(SessionAction::Terminate).into_iter().collect()
    }
}

fn decode_response(message: Value, method: &str) -> Result<RpcResponse, IpcError> {
    serde_json::from_value(message)
        .map_err(|e| IpcError::Protocol(format!("malformed {method} response: {e}")))
}

/// Apply the primary/secondary policy to an `account/rateLimits/read` reply.
fn parse_rate_limits(response: RpcResponse) -> SessionOutcome {
    if let Some(error) = response.error {
        return Err(IpcError::Application {
            method: RATE_LIMITS_METHOD,
            code: error.code,
            message: error.message,
        });
    }

    let rate_limits = response
        .result
        .as_ref()
        .and_then(|result| result.get("rateLimits"))
        .filter(|value| !value.is_null())
        .ok_or_else(|| IpcError::Protocol("rateLimits missing in response".to_string()))?;

    let primary = rate_limits
        .get("primary")
        .and_then(|raw| validate_window(raw, EXPECTED_PRIMARY_WINDOW_MINS))
        .ok_or_else(|| {
            IpcError::ShapeValidation("invalid or missing primary rate limit".to_string())
        })?;

    // Absent or null means no secondary window; anything else must validate.
    let secondary = match rate_limits.get("secondary") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            validate_window(raw, EXPECTED_SECONDARY_WINDOW_MINS).ok_or_else(|| {
                IpcError::ShapeValidation("invalid secondary rate limit".to_string())
            })?,
        ),
    };

    Ok(RateLimits { primary, secondary })
}
