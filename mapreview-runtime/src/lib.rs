//! Tokio runtime wrapper owning the run-wide cancellation token.
//!
//! A crawl drives one browser session from a single task; the runtime exists
//! so the binary can block on that task, trip the token on Ctrl-C and still
//! give the task time to flush what it collected.

use anyhow::Result;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone)]
pub struct MapReviewHandle {
    inner: Handle,
    cancel: CancellationToken,
}

pub struct MapReviewRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl MapReviewRuntime {
    /// Build a multi-threaded runtime with all drivers enabled.
    ///
    /// ```
    /// use mapreview_runtime::MapReviewRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = MapReviewRuntime::build("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// let value = runtime.block_on(async { 2 + 2 });
    /// assert_eq!(value, 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);

        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }

        let runtime = builder.build()?;
        Ok(Self {
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    /// A cloned handle for spawning tasks and sharing cancellation.
    ///
    /// ```
    /// use mapreview_runtime::MapReviewRuntime;
    ///
    /// let runtime = MapReviewRuntime::build("handle-example", Some(1)).unwrap();
    /// assert!(!runtime.handle().cancellation().is_cancelled());
    /// ```
    pub fn handle(&self) -> MapReviewHandle {
        MapReviewHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run a future to completion on the runtime.
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel the run token when the process receives Ctrl-C.
    ///
    /// The crawl observes the token between steps and returns its partial
    /// results; a second Ctrl-C is left to the default handler.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(target: "crawl.run", "interrupt received, finishing current step");
                cancel.cancel();
            }
        });
    }

    /// Cancel outstanding work and shut the runtime down.
    ///
    /// ```
    /// use mapreview_runtime::MapReviewRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = MapReviewRuntime::build("shutdown-example", Some(1)).unwrap();
    /// let token = runtime.handle().cancellation();
    /// runtime.shutdown(Duration::from_millis(5));
    /// assert!(token.is_cancelled());
    /// ```
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl MapReviewHandle {
    /// Spawn a future onto the shared runtime.
    ///
    /// ```
    /// use mapreview_runtime::MapReviewRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = MapReviewRuntime::build("handle-doctest", Some(1)).unwrap();
    /// let task = runtime.handle().spawn(async { 21 * 2 });
    /// let result = runtime.block_on(async move { task.await.unwrap() });
    /// assert_eq!(result, 42);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// The run-wide cancellation token.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
