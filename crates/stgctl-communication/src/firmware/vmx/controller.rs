//! VMX Controller Driver
//!
//! Owns the serial session to a VMX stepping motor controller. Program
//! commands are queued in a [`CommandBuffer`] and sent as one payload;
//! immediate commands discard whatever is pending and go out on their own.
//! Completion of a running program is signalled by a single `^` byte.

use super::command::{
    Command, CommandFamily, ExecutionMode, Operation, StatusQuery, PROGRAM_COMPLETE, READY_CODE,
};
use super::program::CommandBuffer;
use crate::communication::SerialPort;
use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use stgctl_core::{Axis, ConnectionError, ControllerError, Error, Result};

/// Timing parameters for a VMX session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmxConfig {
    /// Wait between sending an immediate command and reading its reply
    pub response_delay: Duration,
    /// Wait after reset before enabling on-line mode
    pub settle_delay: Duration,
    /// Interval between ready checks during bring-up
    pub ready_poll_interval: Duration,
    /// Give up on bring-up after this long
    pub ready_timeout: Duration,
}

impl Default for VmxConfig {
    fn default() -> Self {
        Self {
            response_delay: Duration::from_millis(100),
            settle_delay: Duration::from_secs(1),
            ready_poll_interval: Duration::from_millis(100),
            ready_timeout: Duration::from_secs(5),
        }
    }
}

impl VmxConfig {
    /// Timing for a simulated controller that answers instantly
    pub fn instant() -> Self {
        Self {
            response_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ready_poll_interval: Duration::from_millis(1),
            ready_timeout: Duration::from_millis(500),
        }
    }
}

/// Last known controller mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Nothing sent yet
    #[default]
    Unknown,
    /// Jog mode requested
    Jogging,
    /// Reset requested
    Resetting,
    /// On-line mode enabled
    Online,
    /// Verify answered ready
    Ready,
    /// Bring-up gave up waiting for ready
    NotReady,
}

/// Result of dispatching a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command was added to the pending program
    Queued,
    /// Raw bytes the controller answered an immediate command with
    Response(Vec<u8>),
}

impl Reply {
    /// Raw reply bytes; empty for queued commands
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Queued => &[],
            Self::Response(bytes) => bytes,
        }
    }

    /// Reply decoded lossily with surrounding whitespace removed
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).trim().to_string()
    }
}

/// VMX controller session
pub struct Vmx {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    program: CommandBuffer,
    config: VmxConfig,
    state: DeviceState,
    echo: bool,
}

impl fmt::Debug for Vmx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vmx")
            .field("port_name", &self.port_name)
            .field("open", &self.port.is_some())
            .field("program", &self.program.payload())
            .field("state", &self.state)
            .field("echo", &self.echo)
            .finish()
    }
}

impl Vmx {
    /// Wrap an opened port without talking to the controller
    pub fn new(port: Box<dyn SerialPort>, config: VmxConfig) -> Self {
        let port_name = port.name();
        Self {
            port: Some(port),
            port_name,
            program: CommandBuffer::new(),
            config,
            state: DeviceState::Unknown,
            echo: false,
        }
    }

    /// Wrap an opened port and bring the controller on-line
    pub fn connect(port: Box<dyn SerialPort>, config: VmxConfig) -> Result<Self> {
        let mut vmx = Self::new(port, config);
        vmx.startup()?;
        Ok(vmx)
    }

    /// Name of the underlying port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Last known controller mode
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Whether echo was last switched on
    pub fn echo_enabled(&self) -> bool {
        self.echo
    }

    /// Session timing
    pub fn config(&self) -> &VmxConfig {
        &self.config
    }

    /// Commands queued but not yet sent
    pub fn program(&self) -> &CommandBuffer {
        &self.program
    }

    /// Whether the session still owns its port
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::from(ConnectionError::NotConnected))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.port.is_some() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    /// Queue or send a command
    ///
    /// Immediate-only commands are always sent immediately, whatever `mode`
    /// says. Sending immediately discards any pending program and flushes
    /// stale input before the command goes out.
    pub fn dispatch(&mut self, command: Command, mode: ExecutionMode) -> Result<Reply> {
        self.ensure_open()?;
        match mode.resolve(&command) {
            ExecutionMode::Queued => {
                self.program.append(&command)?;
                Ok(Reply::Queued)
            }
            ExecutionMode::Immediate => {
                if !self.program.is_empty() {
                    tracing::debug!("Discarding pending program '{}'", self.program);
                    self.program.clear();
                }
                self.port()?.clear_input()?;
                self.program.append(&command)?;
                self.send()?;
                if !self.config.response_delay.is_zero() {
                    thread::sleep(self.config.response_delay);
                }
                let response = self.read_available()?;
                tracing::trace!("{} -> {:?}", command, String::from_utf8_lossy(&response));
                Ok(Reply::Response(response))
            }
        }
    }

    /// Validate a raw token against a family and dispatch it queued
    pub fn append_token(&mut self, family: CommandFamily, token: &str) -> Result<Reply> {
        let command = Command::parse(family, token)?;
        self.dispatch(command, ExecutionMode::Queued)
    }

    /// Queue a program command
    pub fn queue(&mut self, command: Command) -> Result<&mut Self> {
        self.dispatch(command, ExecutionMode::Queued)?;
        Ok(self)
    }

    /// Send the pending program and clear it; an empty program sends nothing
    pub fn send(&mut self) -> Result<()> {
        self.ensure_open()?;
        let payload = self.program.take_payload();
        if payload.is_empty() {
            tracing::debug!("No pending commands to send");
            return Ok(());
        }
        tracing::debug!("Sending '{}'", payload);
        self.port()?.write(payload.as_bytes())?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let port = self.port()?;
        let mut response = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(e) if is_read_timeout(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(response)
    }

    /// Block until the running program reports completion
    ///
    /// Stale input is flushed first; any byte other than `^` is ignored.
    pub fn wait_for_complete(&mut self, timeout: Duration) -> Result<()> {
        let port = self.port()?;
        port.clear_input()?;
        let deadline = deadline_after(timeout);
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(1) if byte[0] == PROGRAM_COMPLETE => {
                    tracing::debug!("Program complete");
                    return Ok(());
                }
                Ok(1) => tracing::trace!("Ignoring byte {:?} while waiting", byte[0] as char),
                Ok(_) => thread::sleep(Duration::from_millis(1)),
                Err(e) if is_read_timeout(&e) => {}
                Err(e) => return Err(e.into()),
            }
            if expired(deadline) {
                return Err(ControllerError::CommandTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        }
    }

    /// Whether the controller answers verify with ready
    pub fn is_ready(&mut self) -> Result<bool> {
        Ok(self.verify()? == READY_CODE)
    }

    /// Bring the controller on-line and wait until it reports ready
    pub fn startup(&mut self) -> Result<()> {
        tracing::info!("Starting VMX on {}", self.port_name);
        self.jog()?;
        self.reset()?;
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }
        self.echo(true)?;

        let deadline = deadline_after(self.config.ready_timeout);
        loop {
            if self.is_ready()? {
                self.state = DeviceState::Ready;
                tracing::info!("VMX ready");
                return Ok(());
            }
            if expired(deadline) {
                self.state = DeviceState::NotReady;
                return Err(ControllerError::DeviceNotReady {
                    timeout_ms: self.config.ready_timeout.as_millis() as u64,
                }
                .into());
            }
            thread::sleep(self.config.ready_poll_interval);
        }
    }

    /// Queue `C`
    pub fn clear(&mut self) -> Result<&mut Self> {
        self.queue(Operation::Clear.into())
    }

    /// Queue `R`
    pub fn run(&mut self) -> Result<&mut Self> {
        self.queue(Operation::Run.into())
    }

    /// Queue `N`, making the current position the origin of all motors
    pub fn origin(&mut self) -> Result<&mut Self> {
        self.queue(Operation::Origin.into())
    }

    /// Queue an index move; a relative move of zero steps queues nothing
    pub fn move_index(&mut self, axis: Axis, idx: i64, relative: bool) -> Result<&mut Self> {
        if relative && idx == 0 {
            tracing::debug!("Skipping zero step move on {}", axis);
            return Ok(self);
        }
        let command = if relative {
            Command::IndexRelative { axis, steps: idx }
        } else {
            Command::IndexAbsolute { axis, position: idx }
        };
        self.queue(command)
    }

    /// Queue a move until the limit switch
    pub fn to_limit(&mut self, axis: Axis, positive: bool) -> Result<&mut Self> {
        self.queue(Command::IndexToLimit { axis, positive })
    }

    /// Queue a move back to the motor zero
    pub fn to_zero(&mut self, axis: Axis) -> Result<&mut Self> {
        self.queue(Command::IndexToZero { axis })
    }

    /// Queue making the current motor position its zero
    pub fn zero_position(&mut self, axis: Axis) -> Result<&mut Self> {
        self.queue(Command::SetZero { axis })
    }

    /// Queue a speed change in steps per second
    pub fn speed(&mut self, axis: Axis, speed: u32) -> Result<&mut Self> {
        self.queue(Command::SetSpeed { axis, speed })
    }

    /// Queue a pause, rounded to tenths of a second
    pub fn pause(&mut self, duration: Duration) -> Result<&mut Self> {
        let tenths = (duration.as_secs_f64() * 10.0).round() as u32;
        self.queue(Command::Pause { tenths })
    }

    /// Send any command on its own right now
    pub fn execute_now(&mut self, command: Command) -> Result<Reply> {
        self.dispatch(command, ExecutionMode::Immediate)
    }

    /// Reset the controller
    pub fn reset(&mut self) -> Result<()> {
        self.execute_now(Operation::Reset.into())?;
        self.state = DeviceState::Resetting;
        Ok(())
    }

    /// Enter jog mode
    pub fn jog(&mut self) -> Result<()> {
        self.execute_now(Operation::Jog.into())?;
        self.state = DeviceState::Jogging;
        Ok(())
    }

    /// Enter on-line mode with echo on or off
    pub fn echo(&mut self, enabled: bool) -> Result<()> {
        let op = if enabled {
            Operation::EchoOn
        } else {
            Operation::EchoOff
        };
        self.execute_now(op.into())?;
        self.echo = enabled;
        self.state = DeviceState::Online;
        Ok(())
    }

    /// Stop immediately
    pub fn kill(&mut self) -> Result<()> {
        self.execute_now(Operation::Kill.into()).map(|_| ())
    }

    /// Decelerate to a stop
    pub fn decel(&mut self) -> Result<()> {
        self.execute_now(Operation::Decelerate.into()).map(|_| ())
    }

    /// Record current positions; only meaningful while indexing
    pub fn record_position(&mut self) -> Result<()> {
        self.execute_now(Operation::RecordPosition.into()).map(|_| ())
    }

    /// Raw verify reply
    pub fn verify(&mut self) -> Result<Vec<u8>> {
        match self.execute_now(StatusQuery::Verify.into())? {
            Reply::Response(bytes) => Ok(bytes),
            Reply::Queued => Ok(Vec::new()),
        }
    }

    /// Live or recorded position of an axis
    ///
    /// Recorded positions exist only for X and Y.
    pub fn position(&mut self, axis: Axis, recorded: bool) -> Result<i64> {
        let query = StatusQuery::position(axis, recorded).ok_or_else(|| {
            Error::from(ControllerError::UnsupportedCommand {
                token: axis.to_string().to_lowercase(),
                family: CommandFamily::Status.to_string(),
            })
        })?;
        let reply = self.execute_now(query.into())?;
        parse_position(query.token(), reply.bytes())
    }

    /// Listing of the program stored on the controller
    pub fn list_program(&mut self) -> Result<String> {
        Ok(self.execute_now(StatusQuery::ListProgram.into())?.text())
    }

    /// Release the port; later operations fail with `NotConnected`
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if !self.program.is_empty() {
                tracing::debug!("Dropping unsent program '{}'", self.program);
                self.program.clear();
            }
            port.close()?;
            tracing::info!("Closed VMX on {}", self.port_name);
        }
        Ok(())
    }
}

impl Drop for Vmx {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close {}: {}", self.port_name, e);
        }
    }
}

/// Deadline `timeout` from now; `None` when it lies beyond what `Instant` can hold
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn is_read_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Decode a position reply such as `+00012\r` or `^-350`
pub fn parse_position(command: &str, reply: &[u8]) -> Result<i64> {
    let text = String::from_utf8_lossy(reply);
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().map_err(|_| {
        ControllerError::InvalidResponse {
            command: command.to_string(),
            response: text.to_string(),
        }
        .into()
    })
}
