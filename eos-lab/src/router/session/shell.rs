// LabRib: Static routing controller for emulated router labs
// Copyright (C) 2023 The LabRib Authors
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

//! Abstraction of the EOS shell.

use std::{collections::BTreeMap, net::Ipv4Addr, process::ExitStatus, time::Duration};

use ipnet::Ipv4Net;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStdin, ChildStdout},
};

use crate::ssh::wait_prompt;

lazy_static! {
    static ref PROMPT_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*(\([A-Za-z0-9_.\-/]+\))?[>#] ?$").unwrap();
}

/// Check if a line printed by the device is an EOS prompt, like `r1>`, `r1#`, or
/// `r1(config)#`.
pub fn is_prompt(line: &str) -> bool {
    PROMPT_RE.is_match(line)
}

/// Check if the answer of the device to a command contains an error. EOS prefixes error messages
/// with `% `, like `% Invalid input` or `% Incomplete command`.
pub fn is_error_output(output: &str) -> bool {
    output.lines().any(|l| l.trim_start().starts_with("% "))
}

/// The `EosShell` represents an interactive SSH channel that is established with the router and
/// running the EOS CLI. To create such a shell, use [`super::EosSession::shell`].
///
/// The shell keeps track of whether it is in configuration mode. Dropping the shell kills the
/// channel.
pub struct EosShell {
    name: String,
    child: Child,
    stdout: ChildStdout,
    stdin: Option<ChildStdin>,
    cmd_timeout: Duration,
    config_mode: bool,
}

impl std::fmt::Debug for EosShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EosShell")
            .field("name", &self.name)
            .field("config_mode", &self.config_mode)
            .finish()
    }
}

impl EosShell {
    /// Create a new shell from a CommandChild. See `EosSession::shell` on how to call it. Make sure
    /// that the `tokio::process::Command` used to call this function has set `cmd.stdout(piped())`,
    /// `cmd.stdin(piped())`, and `cmd.kill_on_drop(true)`.
    ///
    /// This waits for the first prompt, enters the privileged mode and disables paging.
    pub(crate) async fn new(
        mut child: Child,
        name: String,
        cmd_timeout: Duration,
    ) -> Result<Self, EosShellError> {
        let stdin = child.stdin.take().ok_or(EosShellError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(EosShellError::MissingPipe("stdout"))?;

        let mut s = Self {
            name,
            child,
            stdout,
            stdin: Some(stdin),
            cmd_timeout,
            config_mode: false,
        };

        // wait for the login prompt
        wait_prompt(&mut s.stdout, s.cmd_timeout, is_prompt).await?;

        s.send_cmd_expect("enable", |s| !is_error_output(s)).await?;
        s.send_cmd_expect("terminal length 0", |s| !is_error_output(s))
            .await?;

        Ok(s)
    }

    /// Name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter the configuration mode using `configure terminal`.
    pub async fn configure_terminal(&mut self) -> Result<(), EosShellError> {
        self.send_cmd_expect("configure terminal", str::is_empty)
            .await?;
        self.config_mode = true;
        Ok(())
    }

    /// Leave the configuration mode using `end`.
    pub async fn end(&mut self) -> Result<(), EosShellError> {
        self.send_cmd_expect("end", str::is_empty).await?;
        self.config_mode = false;
        Ok(())
    }

    /// Write the configuration to the device. Lines that are empty or start with `!` are skipped.
    pub async fn configure(&mut self, conf: impl AsRef<str>) -> Result<(), EosShellError> {
        self.configure_terminal().await?;
        for line in conf.as_ref().lines() {
            let line = line.trim();
            // skip empty lines and lines with comments
            if line.is_empty() || line.starts_with('!') {
                continue;
            }
            self.send_cmd_expect(line, str::is_empty).await?;
        }
        self.end().await?;
        log::debug!("[{}] Configured", self.name());
        Ok(())
    }

    /// Turn each interface into an enabled routed port with the given address, see
    /// [`interface_config`].
    pub async fn configure_interfaces(
        &mut self,
        interfaces: &BTreeMap<String, Ipv4Net>,
    ) -> Result<(), EosShellError> {
        self.configure(interface_config(interfaces)).await
    }

    /// Add a static route using `ip route <prefix> <next-hop>`. The shell must be in configuration
    /// mode. Adding a route that already exists has no effect.
    pub async fn add_static_route(
        &mut self,
        prefix: Ipv4Net,
        next_hop: Ipv4Addr,
    ) -> Result<(), EosShellError> {
        if !self.config_mode {
            return Err(EosShellError::NotInConfigMode);
        }
        self.send_cmd_expect(format!("ip route {prefix} {next_hop}"), str::is_empty)
            .await
    }

    /// Copy the running configuration to the startup configuration using `write memory`. This
    /// may take longer than a regular command, so it has its own timeout.
    pub async fn write_memory(&mut self, duration: Duration) -> Result<(), EosShellError> {
        if self.config_mode {
            self.end().await?;
        }
        let output = self.send_cmd_timeout("write memory", duration).await?;
        if is_error_output(&output) {
            log::warn!("[{}] write memory failed:\n{}", self.name, output);
            Err(EosShellError::UnexpectedStdout(output))
        } else {
            log::debug!("[{}] Configuration saved", self.name);
            Ok(())
        }
    }

    /// Gracefully close the shell: leave the configuration mode, send `exit`, and wait until the
    /// channel terminates. This function does **not** bound the waiting time; wrap it into a
    /// timeout and call [`EosShell::kill`] if it does not finish.
    pub async fn exit(&mut self) -> Result<ExitStatus, EosShellError> {
        log::trace!("[{}] exit", self.name);
        if let Some(stdin) = self.stdin.as_mut() {
            if self.config_mode {
                stdin.write_all(b"end\n").await?;
                self.config_mode = false;
            }
            stdin.write_all(b"exit\n").await?;
            stdin.flush().await?;
        }
        // closing stdin signals EOF to the channel
        self.stdin = None;
        Ok(self.child.wait().await?)
    }

    /// Forcefully close the channel: close stdin and kill the local ssh process. The transport
    /// (control master) stays alive.
    pub fn kill(&mut self) -> Result<(), EosShellError> {
        log::trace!("[{}] kill the channel", self.name);
        self.stdin = None;
        match self.child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => Ok(self.child.start_kill()?),
        }
    }

    /// Send a command and wait for the next prompt. Returns the answer of the device, without the
    /// echo of the command itself.
    async fn send_cmd_timeout(
        &mut self,
        cmd: impl AsRef<str>,
        duration: Duration,
    ) -> Result<String, EosShellError> {
        let cmd = cmd.as_ref().trim();
        log::trace!("[{}] {}", self.name, cmd);
        let stdin = self.stdin.as_mut().ok_or(EosShellError::Closed)?;
        stdin.write_all(cmd.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        let output = wait_prompt(&mut self.stdout, duration, is_prompt).await?;
        Ok(strip_echo(&output, cmd))
    }

    /// Send a command and expect the given text to be printed out to stdout.
    async fn send_cmd_expect<F>(
        &mut self,
        cmd: impl AsRef<str>,
        exp: F,
    ) -> Result<(), EosShellError>
    where
        F: FnOnce(&str) -> bool,
    {
        let stdout = self.send_cmd_timeout(cmd, self.cmd_timeout).await?;
        if exp(&stdout) {
            Ok(())
        } else {
            log::warn!(
                "[{}] Unexpected stdout:{}",
                self.name,
                if stdout.is_empty() {
                    String::new()
                } else {
                    format!("\n{stdout}")
                }
            );
            Err(EosShellError::UnexpectedStdout(stdout))
        }
    }
}

/// Configuration of routed fabric interfaces:
///
/// ```text
/// interface Ethernet1
///    no switchport
///    ip address 10.0.1.1/30
///    no shutdown
/// !
/// ```
pub fn interface_config(interfaces: &BTreeMap<String, Ipv4Net>) -> String {
    interfaces
        .iter()
        .map(|(iface, addr)| {
            format!(
                "interface {iface}\n   no switchport\n   ip address {addr}\n   no shutdown\n!\n"
            )
        })
        .collect()
}

/// Remove the echo of the command (the first line, if it ends with the command) and surrounding
/// whitespace from the output of the device.
pub(crate) fn strip_echo(output: &str, cmd: &str) -> String {
    let output = output.trim_start_matches('\n');
    let rest = match output.split_once('\n') {
        Some((first, rest)) if first.trim_end().ends_with(cmd) => rest,
        None if output.trim_end().ends_with(cmd) => "",
        _ => output,
    };
    rest.trim().to_string()
}

/// Error type thrown by the EOS Shell
#[derive(Debug, Error)]
pub enum EosShellError {
    /// Expected no answer (or a specific answer), but got something else.
    #[error("Unexpected answer from the device:\n{0}")]
    UnexpectedStdout(String),
    /// IO Error occurred, most likely because the session broke down. This includes timeouts
    /// while waiting for the prompt.
    #[error("I/O Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The child process does not have a piped stream.
    #[error("The shell process has no piped {0}")]
    MissingPipe(&'static str),
    /// The shell was already closed.
    #[error("The shell is already closed")]
    Closed,
    /// A configuration command was sent outside of configuration mode.
    #[error("The shell is not in configuration mode")]
    NotInConfigMode,
}
