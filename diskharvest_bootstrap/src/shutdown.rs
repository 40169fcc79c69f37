// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Graceful-drain machinery between the signal watcher and the worker
//! pool. On SIGINT/SIGTERM the coordinator cancels its token; workers poll
//! `is_cancelled()` between pipeline steps (they are synchronous threads,
//! so the non-blocking check is the primary interface), stop accepting new
//! volumes, terminate in-flight helper processes, and release their
//! mounts. The orchestrator then has a bounded grace period to finish
//! cleanup before the process force-exits.
//!
//! ## Usage
//!
//! ```rust
//! use diskharvest_bootstrap::shutdown::ShutdownCoordinator;
//! use std::time::Duration;
//!
//! let coordinator = ShutdownCoordinator::new(Duration::from_secs(10));
//! let token = coordinator.token();
//!
//! // worker thread:
//! if token.is_cancelled() {
//!     // stop pulling volumes, release the mount
//! }
//!
//! // signal task:
//! coordinator.initiate_shutdown();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period before helpers are killed (seconds).
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Clone-able cancellation token.
///
/// Cheap to hand to every worker thread; `is_cancelled()` is the fast path
/// for synchronous pipelines, `cancelled().await` serves async waiters.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Token that can never be cancelled, for tests and one-shot tools.
    pub fn never() -> Self {
        Self::new()
    }

    /// Cancel this token and wake all waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Non-blocking cancellation check.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Coordinates shutdown between the signal watcher and the run.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    shutdown_initiated: Arc<AtomicBool>,
    drained: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Token to hand to workers and infrastructure components.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Begin graceful shutdown: flag it, cancel every token.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!(
                grace_secs = self.grace_period.as_secs(),
                "initiating graceful shutdown"
            );
            self.token.cancel();
        }
    }

    /// Called by the orchestrator once all workers have released their
    /// mounts and exited.
    pub fn mark_drained(&self) {
        self.drained.notify_waiters();
    }

    /// Wait for the drain notification or the grace period, whichever
    /// comes first. Returns `true` on a clean drain.
    pub async fn wait_for_drain(&self) -> bool {
        if !self.is_shutting_down() {
            return true;
        }
        tokio::select! {
            _ = self.drained.notified() => {
                tracing::info!("workers drained cleanly");
                true
            }
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!("shutdown grace period expired with workers still busy");
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}
