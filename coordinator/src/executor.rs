//! Background execution of lifecycle transitions.
//!
//! Automatic transitions are submitted here so the cluster event dispatcher
//! never waits on a service starting up or draining. Submitted tasks are not
//! ordered relative to each other: a task submitted later may run first.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

use watchkeeper_common::{Result, WatcherError};

use crate::config::ExecutorConfig;

/// A unit of work handed to a [`BackgroundExecutor`].
pub type TransitionTask = BoxFuture<'static, ()>;

/// Runs transition tasks off the caller's thread.
pub trait BackgroundExecutor: Send + Sync {
    /// Submit a task. Returns without waiting for it to run.
    fn execute(&self, task: TransitionTask) -> Result<()>;
}

/// Executor that spawns onto a tokio runtime and bounds how many tasks
/// run at the same time.
pub struct BoundedExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    pending: Arc<Pending>,
    shutdown: AtomicBool,
}

struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when a task finishes or panics.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BoundedExecutor {
    /// Create an executor on the given runtime.
    pub fn new(handle: Handle, config: &ExecutorConfig) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(config.max_concurrent_transitions.max(1))),
            pending: Arc::new(Pending {
                count: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Create an executor on the current runtime.
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current(config: &ExecutorConfig) -> Self {
        Self::new(Handle::current(), config)
    }

    /// Number of submitted tasks that have not finished.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Wait until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.pending.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Refuse further submissions. Tasks already submitted still run.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl BackgroundExecutor for BoundedExecutor {
    fn execute(&self, task: TransitionTask) -> Result<()> {
        if self.is_shutdown() {
            return Err(WatcherError::ExecutorShutdown);
        }

        self.pending.count.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.pending.clone());
        let permits = self.permits.clone();

        self.handle.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                debug!("executor closed before transition could run");
                return;
            };
            task.await;
        });

        Ok(())
    }
}
