//! Acquisition trigger signalling
//!
//! A [`Signaller`] starts and stops the remote data acquisition. The
//! [`TriggerSession`] guard pairs every start with exactly one stop, on
//! whatever path the guarded code leaves by.

use std::process::Command;
use stgctl_core::{Result, SignalError};
use stgctl_settings::SignalSettings;

/// Captured output of a signal command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Starts and stops remote acquisition
pub trait Signaller: Send {
    /// Signal acquisition start
    fn signal_start(&mut self) -> Result<SignalOutput>;

    /// Signal acquisition stop
    fn signal_stop(&mut self) -> Result<SignalOutput>;
}

/// Runs the trigger commands on a remote host through the system `ssh` client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSignaller {
    program: String,
    host: String,
    user: Option<String>,
    start_command: String,
    stop_command: String,
}

impl SshSignaller {
    /// Signaller for the configured host, user and commands
    pub fn new(settings: &SignalSettings) -> Self {
        Self {
            program: "ssh".to_string(),
            host: settings.host.clone(),
            user: settings.user.clone().filter(|u| !u.is_empty()),
            start_command: settings.start_command.clone(),
            stop_command: settings.stop_command.clone(),
        }
    }

    /// Use a different client executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the client for a remote command
    pub fn command_line(&self, remote: &str) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(user) = &self.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.push(self.host.clone());
        args.push(remote.to_string());
        args
    }

    fn run(&self, remote: &str) -> Result<SignalOutput> {
        tracing::debug!("Running '{}' on {}", remote, self.host);
        let output = Command::new(&self.program)
            .args(self.command_line(remote))
            .output()
            .map_err(|e| SignalError::Spawn {
                command: remote.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(SignalError::CommandFailed {
                command: remote.to_string(),
                status: output.status.code(),
                stderr,
            }
            .into());
        }
        Ok(SignalOutput { stdout, stderr })
    }
}

impl Signaller for SshSignaller {
    fn signal_start(&mut self) -> Result<SignalOutput> {
        let command = self.start_command.clone();
        self.run(&command)
    }

    fn signal_stop(&mut self) -> Result<SignalOutput> {
        let command = self.stop_command.clone();
        self.run(&command)
    }
}

/// Logs signals without running anything
#[derive(Debug, Clone, Default)]
pub struct DryRunSignaller;

impl Signaller for DryRunSignaller {
    fn signal_start(&mut self) -> Result<SignalOutput> {
        tracing::info!("Dry run: start signal");
        Ok(SignalOutput::default())
    }

    fn signal_stop(&mut self) -> Result<SignalOutput> {
        tracing::info!("Dry run: stop signal");
        Ok(SignalOutput::default())
    }
}

/// Active acquisition trigger
///
/// Signals start on [`TriggerSession::acquire`] and stop exactly once, on
/// [`TriggerSession::release`] or when dropped. A failed start still sends
/// the stop before the start error is returned. Stop failures are logged.
pub struct TriggerSession<'a> {
    signaller: &'a mut dyn Signaller,
    released: bool,
}

impl<'a> TriggerSession<'a> {
    /// Signal start and hold the trigger
    pub fn acquire(signaller: &'a mut dyn Signaller) -> Result<Self> {
        let mut session = Self {
            signaller,
            released: false,
        };
        tracing::info!("Sending start signal.");
        match session.signaller.signal_start() {
            Ok(output) => {
                tracing::debug!("Signal returned\n {}", output.stdout);
                Ok(session)
            }
            Err(e) => {
                tracing::error!("Start signal failed: {}", e);
                session.stop();
                Err(e)
            }
        }
    }

    /// Signal stop now
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::info!("Sending end signal.");
        match self.signaller.signal_stop() {
            Ok(output) => tracing::debug!("Signal returned\n {}", output.stdout),
            Err(e) => tracing::error!("Stop signal failed: {}", e),
        }
    }
}

impl Drop for TriggerSession<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}
