/* Background worker tasks with cooperative stop.
 *
 * Each writer runs as its own `tokio::spawn`ed loop. The loop checks its
 * `StopSignal` once per iteration and while idling, never in the middle of a
 * hardware cascade, so `Worker::stop` returns only after the in-flight
 * iteration has finished. */

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/* Receiving side of a worker's stop request. */
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /* True once stop was requested or the owning `Worker` is gone. */
    pub fn should_stop(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /* Sleep for `delay`, waking early on a stop request.
     * Returns `false` when the worker should exit. */
    pub async fn sleep(&mut self, delay: Duration) -> bool {
        if self.should_stop() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.should_stop(),
            changed = self.rx.changed() => changed.is_ok() && !self.should_stop(),
        }
    }
}

/* Handle to a running worker task. */
pub struct Worker {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(body(StopSignal { rx }));
        info!("{name} started");

        Self {
            name,
            stop,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /* Request a stop and wait for the task to exit. Stopping a stopped
     * worker does nothing. */
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.stop.send_replace(true);
        if let Err(e) = task.await {
            warn!("{} ended abnormally: {e}", self.name);
        }
        info!("{} stopped", self.name);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop.send_replace(true);
        }
    }
}

/* Per-worker counters for diagnostics. Failures inside a worker loop have no
 * caller to return to; they end up here and in the log. */
#[derive(Debug, Default)]
pub struct WriterStats {
    applied: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl WriterStats {
    pub fn record_success(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, err: &dyn std::fmt::Display) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(err.to_string());
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
