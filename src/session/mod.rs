//! Control-session client for the printer's TCP command port.
//!
//! A session is one exclusive conversation: log in, send each command and
//! wait for its acknowledgment, log out. Commands go out strictly one at a
//! time and a fixed settle delay separates an acknowledgment from the next
//! transmission, because the firmware acknowledges on receipt rather than on
//! completion of the physical move.
//!
//! Nothing here retries. Every failure is terminal for the session and the
//! socket is closed on every exit path.

pub mod command;
pub mod marker;

pub use command::{Command, LOGIN_FRAME, LOGOUT_FRAME};
pub use marker::{classify, Marker};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Timing for one control session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Upper bound for connecting, logging in, and each acknowledgment.
    pub step_timeout: Duration,
    /// Pause between an acknowledgment and the next command.
    pub settle_delay: Duration,
    /// How long to linger for the logout reply before closing anyway.
    pub logout_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(500),
            logout_grace: Duration::from_millis(300),
        }
    }
}

/// Outcome of one session. Produced once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub success: bool,
    /// Acknowledgment lines, one per acknowledged command, in submission order.
    pub responses: Vec<String>,
    pub error: Option<String>,
}

impl SessionResult {
    fn succeeded(responses: Vec<String>) -> Self {
        Self { success: true, responses, error: None }
    }

    fn failed(responses: Vec<String>, error: String) -> Self {
        Self { success: false, responses, error: Some(error) }
    }
}

/// Where the session state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    LoggingIn,
    Sending,
    AwaitingAck,
    LoggedOutClosing,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::LoggingIn => "login",
            SessionPhase::Sending => "sending",
            SessionPhase::AwaitingAck => "awaiting acknowledgment",
            SessionPhase::LoggedOutClosing => "logout",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Login timed out after {0:?}")]
    LoginTimeout(Duration),
    #[error("Timed out after {after:?} waiting for acknowledgment of '{command}'")]
    CommandTimeout { command: String, after: Duration },
    /// The printer's own error line, verbatim.
    #[error("{0}")]
    Device(String),
    #[error("Connection closed by printer during {0}")]
    Closed(SessionPhase),
    #[error("Command {0} is empty")]
    EmptyCommand(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `commands` in order against `host:port` inside one control session.
///
/// Callers must not overlap sessions against the same printer; the firmware
/// grants control to one client at a time.
pub async fn run_session(
    host: &str,
    port: u16,
    commands: &[Command],
    config: &SessionConfig,
) -> SessionResult {
    let span = tracing::info_span!("session", id = %Uuid::new_v4(), host, port);
    async move {
        tracing::info!("Starting control session with {} command(s)", commands.len());
        let mut responses = Vec::with_capacity(commands.len());
        match drive(host, port, commands, config, &mut responses).await {
            Ok(()) => {
                tracing::info!("Control session completed");
                SessionResult::succeeded(responses)
            }
            Err(e) => {
                tracing::warn!("Control session failed after {} ack(s): {}", responses.len(), e);
                SessionResult::failed(responses, e.to_string())
            }
        }
    }
    .instrument(span)
    .await
}

async fn drive(
    host: &str,
    port: u16,
    commands: &[Command],
    config: &SessionConfig,
    responses: &mut Vec<String>,
) -> Result<(), SessionError> {
    if let Some(index) = commands.iter().position(Command::is_empty) {
        return Err(SessionError::EmptyCommand(index + 1));
    }

    let addr = format!("{}:{}", host, port);
    let stream = match timeout(config.step_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SessionError::Connect { addr, source }),
        Err(_) => {
            let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
            return Err(SessionError::Connect { addr, source });
        }
    };
    tracing::debug!("Connected to {}", addr);

    let mut session = Session::new(stream, config.clone());
    let result = session.run(commands, responses).await;
    session.close().await;
    result
}

/// One live connection plus the phase it is in.
struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    phase: SessionPhase,
    config: SessionConfig,
}

impl Session {
    fn new(stream: TcpStream, config: SessionConfig) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            phase: SessionPhase::Connecting,
            config,
        }
    }

    async fn run(&mut self, commands: &[Command], responses: &mut Vec<String>) -> Result<(), SessionError> {
        self.login().await?;
        for command in commands {
            self.settle().await?;
            let ack = self.execute(command).await?;
            responses.push(ack);
        }
        self.logout().await;
        Ok(())
    }

    async fn login(&mut self) -> Result<(), SessionError> {
        self.phase = SessionPhase::LoggingIn;
        self.send(LOGIN_FRAME).await?;
        let deadline = Instant::now() + self.config.step_timeout;
        loop {
            let Some(line) = self.next_line(deadline).await? else {
                return Err(SessionError::LoginTimeout(self.config.step_timeout));
            };
            match classify(&line) {
                Marker::LoginSuccess => {
                    tracing::debug!("Logged in: {}", line);
                    return Ok(());
                }
                Marker::Error => return Err(SessionError::Device(line)),
                _ => tracing::trace!("Ignoring during login: {}", line),
            }
        }
    }

    /// Send one command and wait for the line that acknowledges it.
    async fn execute(&mut self, command: &Command) -> Result<String, SessionError> {
        self.phase = SessionPhase::Sending;
        self.send(&command.frame()).await?;
        self.phase = SessionPhase::AwaitingAck;
        let deadline = Instant::now() + self.config.step_timeout;
        loop {
            let Some(line) = self.next_line(deadline).await? else {
                return Err(SessionError::CommandTimeout {
                    command: command.to_string(),
                    after: self.config.step_timeout,
                });
            };
            match classify(&line) {
                Marker::Ack => {
                    tracing::debug!("'{}' acknowledged: {}", command, line);
                    return Ok(line);
                }
                Marker::Error => return Err(SessionError::Device(line)),
                _ => tracing::trace!("Ignoring while awaiting ack: {}", line),
            }
        }
    }

    /// Wait out the settle delay, draining trailing replies to the previous step.
    async fn settle(&mut self) -> Result<(), SessionError> {
        if self.config.settle_delay.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + self.config.settle_delay;
        while let Some(line) = self.next_line(deadline).await? {
            if classify(&line) == Marker::Error {
                return Err(SessionError::Device(line));
            }
            tracing::trace!("Drained: {}", line);
        }
        Ok(())
    }

    /// Best effort: a missing or failed logout never fails the session.
    async fn logout(&mut self) {
        self.phase = SessionPhase::LoggedOutClosing;
        if let Err(e) = self.send(LOGOUT_FRAME).await {
            tracing::warn!("Failed to send logout: {}", e);
            return;
        }
        let deadline = Instant::now() + self.config.logout_grace;
        loop {
            match self.next_line(deadline).await {
                Ok(Some(line)) if classify(&line) == Marker::LogoutSuccess => {
                    tracing::debug!("Logged out: {}", line);
                    return;
                }
                Ok(Some(line)) => tracing::trace!("Ignoring during logout: {}", line),
                Ok(None) => {
                    tracing::debug!("No logout reply within {:?}", self.config.logout_grace);
                    return;
                }
                Err(e) => {
                    tracing::debug!("Logout ended early: {}", e);
                    return;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!("Socket shutdown: {}", e);
        }
    }

    async fn send(&mut self, frame: &str) -> Result<(), SessionError> {
        tracing::debug!("TX: {}", frame.trim_end());
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next complete line, or `None` once `deadline` passes.
    async fn next_line(&mut self, deadline: Instant) -> Result<Option<String>, SessionError> {
        match timeout_at(deadline, self.lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let line = line.trim().to_string();
                tracing::debug!("RX: {}", line);
                Ok(Some(line))
            }
            Ok(Ok(None)) => Err(SessionError::Closed(self.phase)),
            Ok(Err(e)) => Err(SessionError::Io(e)),
        }
    }
}
