// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Watches SIGINT and SIGTERM and feeds the shutdown coordinator. The
//! first signal initiates a graceful drain (no new volumes, in-flight
//! helpers terminated, mounts released, committed chunks kept). A second
//! signal aborts the process immediately; the rescue operator pressing
//! Ctrl-C twice means now.

use crate::shutdown::ShutdownCoordinator;

/// Run the signal watcher until the process exits.
///
/// Spawn this on the runtime right after the coordinator is created:
///
/// ```no_run
/// use diskharvest_bootstrap::{signals, shutdown::ShutdownCoordinator};
///
/// # async fn example() {
/// let coordinator = ShutdownCoordinator::default();
/// tokio::spawn(signals::watch(coordinator.clone()));
/// # }
/// ```
#[cfg(unix)]
pub async fn watch(coordinator: ShutdownCoordinator) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => tracing::warn!("received SIGINT"),
        _ = terminate.recv() => tracing::warn!("received SIGTERM"),
    }
    coordinator.initiate_shutdown();

    // Second signal: abort without waiting for the drain.
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    tracing::error!("second signal received, aborting immediately");
    std::process::exit(130);
}

#[cfg(not(unix))]
pub async fn watch(coordinator: ShutdownCoordinator) {
    if tokio::signal::ctrl_c().await.is_ok() {
        coordinator.initiate_shutdown();
    }
}
