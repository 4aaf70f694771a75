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

use std::{collections::BTreeSet, path::Path, path::PathBuf, sync::Arc};

use clap::Parser;
use eos_lab::{config::LabConfig, EosLab};

use labrib::{
    addressing::FabricLink, runtime::collect::collect_telemetry, types::Telemetry, Controller,
    ControllerError, ControllerOptions, RouterId,
};
use serde::de::DeserializeOwned;

/// Install static routes on all routers of the lab, such that every router can reach every
/// subnet of the lab.
#[derive(Debug, Parser)]
struct Cli {
    /// The lab configuration (TOML).
    #[clap(long, short)]
    config: PathBuf,
    /// Read the discovery and addressing data from this JSON file instead of collecting it from
    /// the routers.
    #[clap(long, short)]
    input: Option<PathBuf>,
    /// Before computing the routes, address the fabric links listed in this JSON file (like
    /// `[["r1", "r2"], ["r2", "r3"]]`), and configure the interfaces on the routers.
    #[clap(long, short)]
    fabric: Option<PathBuf>,
    /// Only compute the addresses and routes and print them, without configuring any router.
    #[clap(long, short = 'n')]
    dry_run: bool,
    /// Number of routers to configure simultaneously. Overwrites the value of the configuration.
    #[clap(long, short)]
    workers: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();

    let args = Cli::parse();

    let mut config = LabConfig::from_file(&args.config)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
        config.validate()?;
    }

    let controller = Controller::new(ControllerOptions::from(&config));
    let lab = Arc::new(EosLab::new(config));
    let inventory: BTreeSet<RouterId> = lab.routers().map(RouterId::from).collect();

    let success = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            if let Some(path) = args.fabric.as_ref() {
                let links: Vec<FabricLink> = read_json(path)?;
                let addressing = controller.address_fabric(&inventory, &links)?;
                if args.dry_run {
                    println!("{}", serde_json::to_string_pretty(&addressing)?);
                } else {
                    let summary = controller.configure_fabric(lab.clone(), &addressing).await;
                    print!("{summary}");
                    if summary.failed_routers().next().is_some() {
                        return Ok(false);
                    }
                }
            }

            // routes are planned for the inventory, or for all routers present in the input file
            let (telemetry, routers) = match args.input.as_ref() {
                Some(path) => {
                    let telemetry: Telemetry = read_json(path)?;
                    let routers = telemetry.routers();
                    (telemetry, routers)
                }
                None => (collect_telemetry(lab.clone()).await?, inventory),
            };

            let pass = controller.compute(&telemetry, &routers)?;

            if args.dry_run {
                println!("{}", serde_json::to_string_pretty(&pass.plan)?);
                return Ok(true);
            }

            let summary = controller.apply(lab, pass.plan).await;
            print!("{summary}");
            let success = summary.failed_routers().next().is_none();
            Ok::<bool, ControllerError>(success)
        })?;

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

/// Read and parse a JSON file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ControllerError> {
    log::debug!("Reading {}", path.display());
    let content =
        std::fs::read_to_string(path).map_err(|e| ControllerError::Io(path.to_path_buf(), e))?;
    Ok(serde_json::from_str(&content)?)
}
