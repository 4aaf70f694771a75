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

use std::{io, time::Duration};

use eos_lab::{config::LabConfig, router::EosShellError};
use pretty_assertions::assert_eq;

use super::net;
use crate::{
    runtime::{lab::shell_error, DeviceError, ReconcileOptions, Step},
    ControllerOptions,
};

const CONFIG: &str = r#"
workers = 2
management_prefixes = ["mgmt"]
strict_links = false
fabric_pool = "10.1.0.0/16"

[timeouts]
command = 2.5
close = 1

[routers]
r1 = "172.20.20.11"
"#;

#[test]
fn options_from_config() {
    let config: LabConfig = CONFIG.parse().unwrap();
    assert_eq!(
        ReconcileOptions::from(&config),
        ReconcileOptions {
            workers: 2,
            open_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_millis(2500),
            persist_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(1),
        }
    );

    let options = ControllerOptions::from(&config);
    assert!(!options.strict_links);
    assert!(options.filter.is_management("Mgmt0"));
    assert!(!options.filter.is_management("Management1"));
    assert_eq!(options.fabric_pool, net("10.1.0.0/16"));
}

#[test]
fn shell_errors() {
    let rejected = EosShellError::UnexpectedStdout(String::from("% Invalid input"));
    assert!(matches!(
        shell_error(Step::InstallRoute, rejected),
        DeviceError::Rejected(output) if output == "% Invalid input"
    ));

    let timeout = EosShellError::IoError(io::Error::new(io::ErrorKind::TimedOut, "no prompt"));
    assert!(matches!(
        shell_error(Step::Persist, timeout),
        DeviceError::Timeout(Step::Persist)
    ));

    let broken = EosShellError::IoError(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
    assert!(matches!(
        shell_error(Step::InstallRoute, broken),
        DeviceError::Session(_)
    ));
    assert!(matches!(
        shell_error(Step::Close, EosShellError::Closed),
        DeviceError::Session(_)
    ));
}
