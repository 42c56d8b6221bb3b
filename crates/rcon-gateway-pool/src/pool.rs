//! The RCON worker pool
//!
//! N workers, each exclusively owning one authenticated connection, drain a
//! shared FIFO of commands. Shutdown is a staged state machine: in-flight
//! work drains within configured budgets before anything gets cancelled.
//! Whether a job that shutdown interrupted counts as failure is the
//! caller's call to make; the pool's promise is that every accepted command
//! settles and that shutdown finishes within its budgets.

use crate::config::{ConfigError, PhaseTimeout, PoolConfig};
use crate::queue::CommandQueue;
use crate::transport::{CommandTransport, Connect, RconConnector};
use crate::worker::{self, PoolState};
use rcon_gateway_core::{Command, RconError, Result, topological_sort};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, warn};

/// Worker pool backed by real RCON connections
pub type RconWorkerPool = WorkerPool<RconConnector>;

impl WorkerPool<RconConnector> {
    /// Build a pool whose workers dial the configured RCON server
    pub fn from_config(config: PoolConfig) -> std::result::Result<Self, ConfigError> {
        let connector = RconConnector::new(config.connection_config());
        Self::with_connector(config, connector)
    }
}

struct PoolInner<C: Connect> {
    config: PoolConfig,
    connector: Arc<C>,
    state: Arc<PoolState>,
    queue: Arc<CommandQueue>,
    workers: Mutex<JoinSet<()>>,
}

/// A pool of workers processing RCON commands
///
/// Cheap to clone; clones share the same queue, workers, and shutdown state.
pub struct WorkerPool<C: Connect> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connect> Clone for WorkerPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connect> WorkerPool<C> {
    /// Build a pool over a custom transport factory
    ///
    /// Rejects configurations the pool cannot run with, zero workers in
    /// particular.
    pub fn with_connector(config: PoolConfig, connector: C) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                connector: Arc::new(connector),
                state: Arc::new(PoolState::default()),
                queue: Arc::new(CommandQueue::new()),
                workers: Mutex::new(JoinSet::new()),
            }),
        })
    }

    /// Open all connections in parallel and spawn one worker per connection
    ///
    /// If any connection fails to authenticate, that error wins and the
    /// surviving connections are closed; any other connection failure
    /// propagates as-is.
    pub async fn start(&self) -> Result<()> {
        let worker_count = self.inner.config.worker_count;
        info!(worker_count, "starting RCON worker pool");

        let mut connects = JoinSet::new();
        for _ in 0..worker_count {
            let connector = Arc::clone(&self.inner.connector);
            connects.spawn(async move { connector.connect().await });
        }

        let mut transports = Vec::with_capacity(worker_count);
        let mut failure: Option<RconError> = None;
        while let Some(joined) = connects.join_next().await {
            match joined {
                Ok(Ok(transport)) => transports.push(transport),
                Ok(Err(error)) => {
                    // A rejected password trumps transport noise from the
                    // other connections.
                    if failure.is_none() || matches!(error, RconError::IncorrectPassword) {
                        failure = Some(error);
                    }
                }
                Err(join_error) => {
                    if failure.is_none() {
                        failure = Some(RconError::Connection(format!(
                            "connect task failed: {join_error}"
                        )));
                    }
                }
            }
        }

        if let Some(error) = failure {
            warn!("one or more workers failed to connect: {error}");
            for mut transport in transports {
                transport.disconnect().await;
            }
            return Err(error);
        }

        let mut workers = self.inner.workers.lock().await;
        for (worker_id, transport) in transports.into_iter().enumerate() {
            workers.spawn(worker::run(
                worker_id,
                transport,
                Arc::clone(&self.inner.queue),
                Arc::clone(&self.inner.state),
                self.inner.config.command_delay,
            ));
        }

        info!("all RCON workers connected");
        Ok(())
    }

    /// Queue a single command for processing
    pub fn submit(&self, command: Arc<Command>) -> Result<()> {
        if self.inner.state.pool_should_shutdown.load(Ordering::SeqCst) {
            return Err(RconError::PoolShuttingDown);
        }
        debug!(command = command.text(), "queueing RCON command");
        if !self.inner.queue.push(command) {
            return Err(RconError::PoolShuttingDown);
        }
        Ok(())
    }

    /// Queue a set of commands with dependencies
    ///
    /// The job is validated and topologically sorted first, so a dependent
    /// command can never sit ahead of its dependency in the queue, and the
    /// sorted batch is enqueued atomically with respect to other
    /// submissions.
    pub fn submit_job(&self, commands: &[Arc<Command>]) -> Result<()> {
        if self.inner.state.pool_should_shutdown.load(Ordering::SeqCst) {
            return Err(RconError::PoolShuttingDown);
        }
        let sorted = topological_sort(commands)?;
        debug!(count = sorted.len(), "queueing RCON job");
        if !self.inner.queue.push_all(sorted) {
            return Err(RconError::PoolShuttingDown);
        }
        Ok(())
    }

    /// Shut the pool down in phases
    ///
    /// 1. Reject new submissions.
    /// 2. Wait up to the grace period for the queue to drain.
    /// 3. Tell workers to stop, fail whatever never got dequeued, close the
    ///    queue.
    /// 4. Wait up to the await period for workers to exit on their own.
    /// 5. Cancel whatever is left and wait for the cancellations to land.
    ///
    /// Calling this a second time is a no-op.
    pub async fn shutdown(&self) {
        if self
            .inner
            .state
            .pool_should_shutdown
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        info!("shutting down RCON worker pool");

        match self.inner.config.grace_period {
            PhaseTimeout::Disabled => {}
            PhaseTimeout::Unbounded => self.inner.queue.join().await,
            PhaseTimeout::Bounded(limit) => {
                if time::timeout(limit, self.inner.queue.join()).await.is_err() {
                    warn!(
                        remaining = self.inner.queue.len(),
                        "grace period expired with commands still queued"
                    );
                }
            }
        }

        self.inner
            .state
            .worker_should_shutdown
            .store(true, Ordering::SeqCst);
        for command in self.inner.queue.close() {
            command.set_error(RconError::PoolShuttingDown);
        }

        let mut workers = self.inner.workers.lock().await;
        match self.inner.config.await_shutdown_period {
            PhaseTimeout::Disabled => {}
            PhaseTimeout::Unbounded => {
                while workers.join_next().await.is_some() {}
            }
            PhaseTimeout::Bounded(limit) => {
                let all_exited = async {
                    while workers.join_next().await.is_some() {}
                };
                if time::timeout(limit, all_exited).await.is_err() {
                    warn!("worker shutdown period expired, cancelling workers");
                }
            }
        }

        workers.abort_all();
        while workers.join_next().await.is_some() {}

        info!("RCON worker pool shutdown complete");
    }

    /// Run `body` against a started pool, shutting down on the way out
    ///
    /// The scoped lifecycle: `start` on entry, `shutdown` on exit however
    /// `body` fares. The body runs as its own task so that a panic inside it
    /// surfaces here as a join error; shutdown still runs, and the panic is
    /// rethrown afterwards.
    pub async fn scope<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce(WorkerPool<C>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.start().await?;
        let outcome = tokio::spawn(body(self.clone())).await;
        self.shutdown().await;
        match outcome {
            Ok(output) => Ok(output),
            // Nothing holds the body task's abort handle, so a join error
            // means the body panicked; cancellation is only possible while
            // the whole runtime is being torn down.
            Err(error) => match error.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(_) => Err(RconError::PoolShuttingDown),
            },
        }
    }
}
