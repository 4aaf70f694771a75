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

//! The reconciler: install the planned routes on every router.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc, time::Duration};

use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

use super::{DeviceAccess, DeviceError, DeviceSession, ReconcileOptions, Step};
use crate::{
    plan::{RouteInstallationPlan, RouterPlan, SkippedRoute, StaticRoute},
    types::RouterId,
};

/// The state of the interaction with a single router. The states are ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// No session was opened.
    Idle,
    /// The session is open.
    SessionOpen,
    /// The session is in configuration mode.
    ConfigMode,
    /// All routes were sent.
    RoutesApplied,
    /// The configuration was persisted.
    Persisted,
    /// The session was closed.
    Closed,
}

/// Why a router could not be reconciled.
#[derive(Debug)]
pub enum RouterFailure {
    /// The session failed (or timed out) outside of a single route command.
    Session(DeviceError),
    /// The task configuring the router did not finish.
    Task(String),
}

impl fmt::Display for RouterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterFailure::Session(e) => write!(f, "{e}"),
            RouterFailure::Task(e) => write!(f, "task failed: {e}"),
        }
    }
}

/// Result of reconciling a single router.
#[derive(Debug)]
pub struct RouterReport {
    /// The router
    pub router: RouterId,
    /// The final state.
    pub state: SessionState,
    /// The furthest state that was reached before closing the session.
    pub progress: SessionState,
    /// Routes that were installed.
    pub installed: Vec<StaticRoute>,
    /// Routes that were rejected by the device.
    pub failed: Vec<(StaticRoute, DeviceError)>,
    /// Routes that were never sent because the session failed before.
    pub not_attempted: Vec<StaticRoute>,
    /// Subnets that were skipped while planning.
    pub skipped: Vec<SkippedRoute>,
    /// Failure of the entire router, if any.
    pub failure: Option<RouterFailure>,
    /// The configuration could not be persisted. The routes stay installed.
    pub persist_error: Option<DeviceError>,
    /// The session had to be closed forcefully.
    pub forced_close: bool,
}

impl RouterReport {
    /// Create an empty report in state `Idle`.
    fn new(router: RouterId, skipped: Vec<SkippedRoute>) -> Self {
        Self {
            router,
            state: SessionState::Idle,
            progress: SessionState::Idle,
            installed: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
            skipped,
            failure: None,
            persist_error: None,
            forced_close: false,
        }
    }

    /// Move to the next state.
    fn advance(&mut self, state: SessionState) {
        self.state = state;
        self.progress = self.progress.max(state);
    }

    /// Check if every planned route was installed and persisted.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
            && self.failed.is_empty()
            && self.not_attempted.is_empty()
            && self.persist_error.is_none()
    }
}

/// The result of a reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    /// Report of every router in the plan.
    routers: BTreeMap<RouterId, RouterReport>,
}

impl ReconcileSummary {
    /// Get the report of a router.
    pub fn get(&self, router: &RouterId) -> Option<&RouterReport> {
        self.routers.get(router)
    }

    /// Iterate over all reports.
    pub fn iter(&self) -> impl Iterator<Item = &RouterReport> {
        self.routers.values()
    }

    /// Number of routers that were processed.
    pub fn routers_processed(&self) -> usize {
        self.routers.len()
    }

    /// Number of routes that were installed.
    pub fn routes_installed(&self) -> usize {
        self.routers.values().map(|r| r.installed.len()).sum()
    }

    /// Number of subnets that were skipped while planning.
    pub fn routes_skipped(&self) -> usize {
        self.routers.values().map(|r| r.skipped.len()).sum()
    }

    /// Number of routes that were rejected or never sent.
    pub fn routes_failed(&self) -> usize {
        self.routers
            .values()
            .map(|r| r.failed.len() + r.not_attempted.len())
            .sum()
    }

    /// Iterate over all routers that failed entirely.
    pub fn failed_routers(&self) -> impl Iterator<Item = &RouterReport> {
        self.routers.values().filter(|r| r.failure.is_some())
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} routers processed, {} routes installed, {} skipped, {} failed",
            self.routers_processed(),
            self.routes_installed(),
            self.routes_skipped(),
            self.routes_failed(),
        )?;
        for r in self.routers.values() {
            writeln!(
                f,
                "  {}: {} installed ({:?}){}",
                r.router,
                r.installed.len(),
                r.progress,
                if r.forced_close { ", closed forcefully" } else { "" }
            )?;
            if let Some(failure) = r.failure.as_ref() {
                writeln!(f, "    failed: {failure}")?;
            }
            if let Some(e) = r.persist_error.as_ref() {
                writeln!(f, "    not persisted: {e}")?;
            }
            for s in r.skipped.iter() {
                writeln!(f, "    skipped {}: {}", s.prefix, s.reason)?;
            }
            for (route, e) in r.failed.iter() {
                writeln!(f, "    rejected {route}: {e}")?;
            }
            for route in r.not_attempted.iter() {
                writeln!(f, "    not sent {route}")?;
            }
        }
        Ok(())
    }
}

/// Installs a [`RouteInstallationPlan`] on the devices.
#[derive(Debug)]
pub struct Reconciler<A> {
    /// Access to the devices
    access: Arc<A>,
    /// Options
    options: ReconcileOptions,
}

impl<A: DeviceAccess> Reconciler<A> {
    /// Create a new reconciler.
    pub fn new(access: Arc<A>, options: ReconcileOptions) -> Self {
        Self { access, options }
    }

    /// Install the plan. Each router is handled by its own task, and at most `workers` routers are
    /// handled at the same time. A failing router does not affect the others. Routers without any
    /// route to install are not contacted.
    pub async fn run(&self, plan: RouteInstallationPlan) -> ReconcileSummary {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut jobs = JoinSet::new();
        let mut reports = BTreeMap::new();
        let mut pending = BTreeMap::new();

        for plan in plan {
            if plan.routes.is_empty() {
                log::debug!("[{}] Nothing to install", plan.router);
                let report = RouterReport::new(plan.router.clone(), plan.skipped);
                reports.insert(plan.router, report);
                continue;
            }
            pending.insert(plan.router.clone(), plan.clone());
            let access = self.access.clone();
            let semaphore = semaphore.clone();
            let options = self.options;
            jobs.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                reconcile_router(access.as_ref(), plan, &options).await
            });
        }

        while let Some(result) = jobs.join_next().await {
            match result {
                Ok(report) => {
                    pending.remove(&report.router);
                    reports.insert(report.router.clone(), report);
                }
                Err(e) => log::error!("Reconciliation task failed: {e}"),
            }
        }

        // tasks that panicked
        for (router, plan) in pending {
            let mut report = RouterReport::new(router.clone(), plan.skipped);
            report.not_attempted = plan.routes;
            report.failure = Some(RouterFailure::Task(String::from(
                "the task did not return a report",
            )));
            reports.insert(router, report);
        }

        let summary = ReconcileSummary { routers: reports };
        log::info!(
            "Reconciliation done: {} routers, {} routes installed, {} skipped, {} failed",
            summary.routers_processed(),
            summary.routes_installed(),
            summary.routes_skipped(),
            summary.routes_failed()
        );
        summary
    }
}

/// Await `fut`, but at most for `duration`.
pub(super) async fn bounded<T, F>(
    step: Step,
    duration: Duration,
    fut: F,
) -> Result<T, DeviceError>
where
    F: Future<Output = Result<T, DeviceError>>,
{
    timeout(duration, fut)
        .await
        .unwrap_or_else(|_| Err(DeviceError::Timeout(step)))
}

/// Open the session towards `router`. If opening does not finish in time, whatever the attempt
/// left behind is torn down forcefully, and the error is a [`DeviceError::Timeout`].
pub(super) async fn open<A: DeviceAccess>(
    access: &A,
    router: &RouterId,
    options: &ReconcileOptions,
) -> Result<A::Session, DeviceError> {
    match bounded(Step::Open, options.open_timeout, access.open(router)).await {
        Ok(s) => Ok(s),
        Err(e) => {
            log::error!("[{router}] Cannot open the session: {e}");
            if matches!(e, DeviceError::Timeout(_)) {
                let abort = access.abort_open(router);
                if let Err(e) = bounded(Step::CloseTransport, options.close_timeout, abort).await {
                    log::warn!("[{router}] {e}");
                }
            }
            Err(e)
        }
    }
}

/// Reconcile a single router: open the session, apply the routes, and close the session.
async fn reconcile_router<A: DeviceAccess>(
    access: &A,
    plan: RouterPlan,
    options: &ReconcileOptions,
) -> RouterReport {
    let RouterPlan {
        router,
        routes,
        skipped,
    } = plan;
    let mut report = RouterReport::new(router.clone(), skipped);

    log::info!("[{router}] Installing {} routes", routes.len());

    let mut session = match open(access, &router, options).await {
        Ok(s) => s,
        Err(e) => {
            report.forced_close = matches!(e, DeviceError::Timeout(_));
            report.not_attempted = routes;
            report.failure = Some(RouterFailure::Session(e));
            return report;
        }
    };
    report.advance(SessionState::SessionOpen);

    apply(&mut session, &router, routes, options, &mut report).await;

    report.forced_close = !release(&mut session, &router, options).await;
    report.state = SessionState::Closed;
    report
}

/// Send all routes and persist the configuration. Errors are written into the report.
async fn apply<S: DeviceSession>(
    session: &mut S,
    router: &RouterId,
    routes: Vec<StaticRoute>,
    options: &ReconcileOptions,
    report: &mut RouterReport,
) {
    let cmd_timeout = options.command_timeout;

    if let Err(e) = bounded(Step::EnterConfig, cmd_timeout, session.enter_config()).await {
        log::error!("[{router}] Cannot enter configuration mode: {e}");
        report.not_attempted = routes;
        report.failure = Some(RouterFailure::Session(e));
        return;
    }
    report.advance(SessionState::ConfigMode);

    let mut routes = routes.into_iter();
    for route in routes.by_ref() {
        match bounded(Step::InstallRoute, cmd_timeout, session.install_route(&route)).await {
            Ok(()) => {
                log::debug!("[{router}] Installed {route}");
                report.installed.push(route);
            }
            Err(DeviceError::Timeout(step)) => {
                // the session no longer answers. Don't send anything else.
                log::error!("[{router}] Timeout while installing {route}");
                report.not_attempted.push(route);
                report.not_attempted.extend(routes);
                report.failure = Some(RouterFailure::Session(DeviceError::Timeout(step)));
                return;
            }
            Err(e) => {
                log::warn!("[{router}] Cannot install {route}: {e}");
                report.failed.push((route, e));
            }
        }
    }
    report.advance(SessionState::RoutesApplied);

    if let Err(e) = bounded(Step::ExitConfig, cmd_timeout, session.exit_config()).await {
        log::error!("[{router}] Cannot leave configuration mode: {e}");
        report.failure = Some(RouterFailure::Session(e));
        return;
    }

    match bounded(Step::Persist, options.persist_timeout, session.persist()).await {
        Ok(()) => report.advance(SessionState::Persisted),
        Err(e) => {
            log::warn!("[{router}] Cannot persist the configuration: {e}");
            report.persist_error = Some(e);
        }
    }
}

/// Close the session. If the graceful close fails or does not finish in time, the channel and the
/// transport are closed forcefully, each on its own. Returns `true` if the graceful close
/// succeeded. Errors are only logged.
pub(super) async fn release<S: DeviceSession>(
    session: &mut S,
    router: &RouterId,
    options: &ReconcileOptions,
) -> bool {
    let close_timeout = options.close_timeout;
    match bounded(Step::Close, close_timeout, session.close()).await {
        Ok(()) => {
            log::debug!("[{router}] Session closed");
            true
        }
        Err(e) => {
            log::warn!("[{router}] Cannot close the session gracefully ({e}), forcing it closed");
            if let Err(e) =
                bounded(Step::CloseChannel, close_timeout, session.close_channel()).await
            {
                log::warn!("[{router}] {e}");
            }
            if let Err(e) =
                bounded(Step::CloseTransport, close_timeout, session.close_transport()).await
            {
                log::warn!("[{router}] {e}");
            }
            false
        }
    }
}
