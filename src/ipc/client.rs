//! Async driver that runs a [`Session`] against a real agent process.
//!
//! `RateLimitClient` spawns the agent with all three standard streams piped,
//! then multiplexes its event sources in one `tokio::select!` loop:
//!
//! - stdout chunks
//! - process exit, reported once stdout is drained
//! - the conversation timer
//! - a caller-supplied cancellation token
//!
//! Each wake-up becomes a [`SessionEvent`]; the resulting [`SessionAction`]s
//! are executed here. stderr is drained in the background and logged at
//! `trace`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::ipc::error::SessionOutcome;
use crate::ipc::framing::LineFramer;
use crate::ipc::session::{Session, SessionAction, SessionEvent, Termination};

/// Size of each stdout read.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long a terminated agent gets to exit before it is killed.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// Client for one-shot rate-limit queries against the agent.
///
/// Each call to [`fetch`](Self::fetch) spawns a fresh agent process, runs
/// the two-call conversation, and stops the process again.
///
/// # Example
///
/// ```ignore
/// use cxreset::{Config, RateLimitClient};
///
/// let client = RateLimitClient::new(Config::from_env());
/// match client.fetch().await {
///     Ok(limits) => println!("5h window at {}%", limits.primary.used_percent),
///     Err(e) => eprintln!("rate limits unavailable: {e}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitClient {
    config: Config,
}

impl RateLimitClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one conversation bounded by the configured timeout.
    pub async fn fetch(&self) -> SessionOutcome {
        self.fetch_with_cancel(CancellationToken::new()).await
    }

    /// Like [`fetch`](Self::fetch), but `cancel` aborts the conversation
    /// early with [`IpcError::Cancelled`](crate::ipc::IpcError::Cancelled).
    pub async fn fetch_with_cancel(&self, cancel: CancellationToken) -> SessionOutcome {
        let mut session = Session::new(
            self.config.client_info.clone(),
            LineFramer::with_limit(self.config.max_line_bytes),
            self.config.timeout,
        );

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                session.handle(SessionEvent::ProcessError(format!(
                    "{}: {}",
                    self.config.program, e
                )));
                return session.into_outcome();
            }
        };
        debug!(
            program = %self.config.program,
            pid = ?child.id(),
            "spawned agent"
        );

        let mut stdin = child.stdin.take();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }
        let Some(mut stdout) = child.stdout.take() else {
            session.handle(SessionEvent::ProcessError(
                "agent stdout was not captured".to_string(),
            ));
            reap(&mut child, true).await;
            return session.into_outcome();
        };

        let timer = tokio::time::sleep(self.config.timeout);
        tokio::pin!(timer);

        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let mut stdout_open = true;
        let mut exit_code: Option<Option<i32>> = None;

        let actions = session.start();
        apply(&mut child, &mut stdin, actions).await;

        while !session.is_settled() {
            let event = tokio::select! {
                read = stdout.read(&mut buf), if stdout_open => match read {
                    Ok(0) => {
                        stdout_open = false;
                        exit_code.map(SessionEvent::ProcessExit)
                    }
                    Ok(n) => Some(SessionEvent::Output(buf[..n].to_vec())),
                    Err(e) => Some(SessionEvent::ReadFailed(e.to_string())),
                },
                status = child.wait(), if exit_code.is_none() => match status {
                    Ok(status) => {
                        exit_code = Some(status.code());
                        if stdout_open {
                            None
                        } else {
                            Some(SessionEvent::ProcessExit(status.code()))
                        }
                    }
                    Err(e) => Some(SessionEvent::ProcessError(e.to_string())),
                },
                () = &mut timer => Some(SessionEvent::TimerFired),
                () = cancel.cancelled() => Some(SessionEvent::Cancelled),
            };

            if let Some(event) = event {
                let actions = session.handle(event);
                apply(&mut child, &mut stdin, actions).await;
            }
        }

        drop(stdin);
        if exit_code.is_none() {
            reap(&mut child, false).await;
        }

        session.into_outcome()
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

async fn apply(child: &mut Child, stdin: &mut Option<ChildStdin>, actions: Vec<SessionAction>) {
    for action in actions {
        match action {
            SessionAction::Write(line) => write_line(stdin, &line).await,
            SessionAction::Terminate(termination) => terminate(child, termination),
        }
    }
}

/// Write one line to the agent. The agent may already be gone, so write
/// errors are logged and dropped; the exit shows up as its own event.
async fn write_line(stdin: &mut Option<ChildStdin>, line: &str) {
    let Some(pipe) = stdin.as_mut() else {
        debug!("agent stdin already closed, dropping request");
        return;
    };

    let result = async {
        pipe.write_all(line.as_bytes()).await?;
        pipe.flush().await
    }
    .await;

    if let Err(e) = result {
        debug!(error = %e, "discarding write error on agent stdin");
        *stdin = None;
    }
}

fn terminate(child: &mut Child, termination: Termination) {
    let result = match termination {
        Termination::Graceful => send_sigterm(child),
        Termination::Forced => child.start_kill(),
    };
    if let Err(e) = result {
        debug!(error = %e, ?termination, "failed to signal agent");
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // No pid means the child has already been reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(std::io::Error::other)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

/// Wait for the agent to exit, killing it if it lingers past the grace
/// period. With `force`, kill immediately.
async fn reap(child: &mut Child, force: bool) {
    if force {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(REAP_GRACE, child.wait()).await {
        Ok(Ok(status)) => trace!(?status, "agent exited"),
        Ok(Err(e)) => debug!(error = %e, "failed to wait for agent"),
        Err(_) => {
            warn!("agent did not exit after termination, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let lines = drain_lines(BufReader::new(stderr)).await;
    trace!(lines, "agent stderr closed");
}

/// Log every line from `reader` until EOF and return how many were read.
///
/// Invalid UTF-8 is replaced rather than treated as the end of the stream,
/// so the agent never blocks on a full stderr pipe.
async fn drain_lines<R>(mut reader: R) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                let line = String::from_utf8_lossy(&buf);
                trace!(target: "cxreset::agent", "{}", line.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                trace!(error = %e, "stopped reading agent stderr");
                break;
            }
        }
    }
    count
}
