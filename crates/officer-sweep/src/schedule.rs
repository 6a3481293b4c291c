use crate::directory::MembershipDirectory;
use crate::reconciler::Reconciler;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    WaitingForReady,
    Evaluating,
    Sleeping,
    Stopped,
}

/// Owner of a running sweep task. Dropping the handle also stops the loop.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<LoopState>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// False once the task has exited, including by a panic.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals shutdown and waits for the task. A sweep already in progress
    /// finishes first; a sleeping loop exits immediately.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "reconciliation task ended abnormally");
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Spawns the periodic sweep. The first pass runs as soon as `ready`
/// resolves, then one pass per `interval` until stopped.
pub fn start_reconciliation_loop<D, R>(
    reconciler: Arc<Reconciler<D>>,
    interval: Duration,
    ready: R,
) -> SweepHandle
where
    D: MembershipDirectory + 'static,
    R: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(LoopState::WaitingForReady);

    let task = tokio::spawn(async move {
        tokio::select! {
            _ = ready => {}
            _ = shutdown_requested(&mut shutdown_rx) => {
                state_tx.send_replace(LoopState::Stopped);
                info!("reconciliation stopped before first pass");
                return;
            }
        }

        info!(interval_secs = interval.as_secs(), "reconciliation loop running");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            state_tx.send_replace(LoopState::Evaluating);
            match AssertUnwindSafe(reconciler.run_pass()).catch_unwind().await {
                Ok(report) => info!(
                    checked = report.checked,
                    evicted = report.evicted,
                    failures = report.failures,
                    "reconciliation pass complete"
                ),
                Err(_) => error!("reconciliation pass panicked, retrying next interval"),
            }

            state_tx.send_replace(LoopState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }

        state_tx.send_replace(LoopState::Stopped);
        info!("reconciliation loop stopped");
    });

    SweepHandle {
        shutdown: shutdown_tx,
        state: state_rx,
        task,
    }
}
