// LabRib: Static routing controller for emulated router labs
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! SSH transport towards the devices.
//!
//! Every command runs through the system `ssh` client, sharing one control master per
//! destination.

use std::{io, process::Stdio, string::FromUtf8Error, time::Duration};

use itertools::Itertools;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    time::timeout,
};

use crate::config::SshConfig;

/// Connection towards a single destination.
///
/// All commands are started with
///
/// - `ControlMaster auto`
/// - `ControlPath` as configured (default: `/tmp/.ssh-%r@%h:%p`)
/// - `ControlPersist` as configured (default: `10m`)
/// - `BatchMode yes`
///
/// such that the first command starts the control master, and all later ones (show commands as well
/// as interactive shells) reuse it. The control master is the *transport* of the session and stays
/// alive until [`SshSession::close_master`] is called, or until `ControlPersist` expires.
///
/// Logging in must not require a password (`~/.ssh/config`, or the identity file of the lab
/// configuration).
#[derive(Debug, Clone)]
pub struct SshSession {
    destination: String,
    options: SshConfig,
}

impl SshSession {
    /// Connect to `destination`, and make sure that it is an EOS device by running `show hostname`.
    /// Gives up with [`SshError::Timeout`] after `connect_timeout`.
    pub async fn new(
        destination: impl Into<String>,
        options: SshConfig,
        connect_timeout: Duration,
    ) -> Result<Self, SshError> {
        let this = Self::detached(destination, options);
        log::trace!("[{}] connecting", this.destination);

        let hostname = match timeout(connect_timeout, this.run(&["show", "hostname"])).await {
            Ok(result) => result.map_err(|e| {
                log::error!("[{}] Cannot connect: {e}", this.destination);
                e
            })?,
            Err(_) => {
                log::error!("[{}] No answer within {connect_timeout:?}", this.destination);
                return Err(SshError::Timeout);
            }
        };

        if hostname.contains("Hostname:") {
            log::trace!("[{}] connected", this.destination);
            Ok(this)
        } else {
            Err(SshError::Handshake(hostname))
        }
    }

    /// Handle to `destination` that does not check the connection. Used to tear down the transport
    /// of an interrupted connection attempt.
    pub fn detached(destination: impl Into<String>, options: SshConfig) -> Self {
        Self {
            destination: destination.into(),
            options,
        }
    }

    /// The SSH destination.
    pub fn name(&self) -> &str {
        &self.destination
    }

    /// Command `ssh [options] <extra> <destination>`. The process is killed once the handle is
    /// dropped. Append the remote command with [`Command::arg`].
    pub fn command<S: AsRef<str>>(&self, extra: &[S]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-oControlMaster=auto")
            .arg(format!("-oControlPath={}", self.options.control_path))
            .arg(format!("-oControlPersist={}", self.options.control_persist))
            .arg("-oBatchMode=yes");
        if let Some(port) = self.options.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = self.options.identity_file.as_ref() {
            cmd.arg("-i").arg(identity);
        }
        cmd.args(extra.iter().map(AsRef::as_ref))
            .arg(&self.destination)
            .kill_on_drop(true);
        cmd
    }

    /// Command for an interactive channel. The pseudo-terminal (`-tt`) makes the device print its
    /// prompt after every command. stdin and stdout are piped.
    pub(crate) fn shell_command(&self) -> Command {
        let mut cmd = self.command(&["-tt"]);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }

    /// Run a single remote command and return its output. Fails if ssh exits with a non-zero
    /// code, or if anything is written to stderr.
    pub async fn run<S: AsRef<str>>(&self, remote: &[S]) -> Result<String, SshError> {
        let remote = remote.iter().map(AsRef::as_ref).join(" ");
        log::trace!("[{}] `{remote}`", self.destination);
        let output = self.command::<&str>(&[]).arg(&remote).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            let error = SshError::Failed {
                destination: self.destination.clone(),
                command: remote,
                code: output.status.code(),
                stderr,
            };
            log::debug!("{error}");
            return Err(error);
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    /// Close the control master of the destination (`ssh -O exit`), which disconnects every
    /// channel that still uses it. Succeeds if no control master is running.
    pub async fn close_master(&self) -> Result<(), SshError> {
        log::trace!("[{}] closing the control master", self.destination);
        let output = self.command(&["-O", "exit"]).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success()
            || stderr.contains("No such file or directory")
            || stderr.contains("No ControlPath")
        {
            Ok(())
        } else {
            Err(SshError::Failed {
                destination: self.destination.clone(),
                command: String::from("-O exit"),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// Read `stdout` until the last, unterminated line is a prompt according to `is_prompt`. Returns
/// everything before the prompt line, without carriage returns. Fails with
/// [`io::ErrorKind::TimedOut`] if no prompt shows up within `duration`, and with
/// [`io::ErrorKind::UnexpectedEof`] if the channel closes first.
pub(crate) async fn wait_prompt<R, F>(
    stdout: &mut R,
    duration: Duration,
    is_prompt: F,
) -> Result<String, io::Error>
where
    R: AsyncRead + Unpin,
    F: Fn(&str) -> bool,
{
    match timeout(duration, read_until_prompt(stdout, is_prompt)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("No prompt within {duration:?}");
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no prompt within {duration:?}"),
            ))
        }
    }
}

async fn read_until_prompt<R, F>(stdout: &mut R, is_prompt: F) -> Result<String, io::Error>
where
    R: AsyncRead + Unpin,
    F: Fn(&str) -> bool,
{
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let last_line = buffer
            .iter()
            .rposition(|c| *c == b'\n')
            .map_or(0, |p| p + 1);
        if is_prompt(String::from_utf8_lossy(&buffer[last_line..]).trim_end_matches('\r')) {
            buffer.truncate(last_line);
            return Ok(String::from_utf8_lossy(&buffer).replace('\r', ""));
        }
        if stdout.read_buf(&mut buffer).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "channel closed before the prompt",
            ));
        }
    }
}

/// Error of the SSH transport.
#[derive(Debug, Error)]
pub enum SshError {
    /// The device answered, but not like an EOS device.
    #[error("Unexpected answer to `show hostname`: {0}")]
    Handshake(String),
    /// No answer while connecting.
    #[error("Timeout while connecting")]
    Timeout,
    /// The ssh client could not be started, or its pipes broke.
    #[error("SSH client: {0}")]
    Client(#[from] io::Error),
    /// A remote command failed.
    #[error("`{command}` on {destination} failed (exit code {}): {stderr}", exit_code(.code))]
    Failed {
        /// SSH destination
        destination: String,
        /// The remote command
        command: String,
        /// Exit code of ssh, if it exited normally.
        code: Option<i32>,
        /// Everything written to stderr.
        stderr: String,
    },
    /// The output is not valid UTF-8.
    #[error("Output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| String::from("none"), |c| c.to_string())
}
