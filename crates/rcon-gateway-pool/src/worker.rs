//! Worker main loop
//!
//! Each worker exclusively owns one connection and drains the shared queue
//! until told to stop. A connection error fails the current command only and
//! triggers a reconnect; nothing is ever re-sent, so delivery is at most
//! once.

use crate::queue::CommandQueue;
use crate::transport::CommandTransport;
use rcon_gateway_core::RconError;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Shutdown flags shared between the pool and its workers
///
/// Plain atomics: the pool writes, workers read, and a one-iteration delay
/// in observing a new value is tolerated.
#[derive(Default)]
pub(crate) struct PoolState {
    pub pool_should_shutdown: AtomicBool,
    pub worker_should_shutdown: AtomicBool,
}

pub(crate) async fn run<T: CommandTransport>(
    worker_id: usize,
    mut transport: T,
    queue: Arc<CommandQueue>,
    state: Arc<PoolState>,
    command_delay: Option<Duration>,
) {
    info!(worker_id, "worker starting");

    while !state.worker_should_shutdown.load(Ordering::Relaxed) {
        let Some(command) = queue.pop().await else {
            break;
        };

        for dependency in command.dependencies() {
            dependency.wait_settled().await;
        }

        match transport.send_command(command.text()).await {
            Ok(Some(response)) => {
                queue.task_done();
                command.set_result(response);
            }
            Ok(None) => {
                queue.task_done();
                warn!(worker_id, "session lost authentication, reconnecting");
                command.set_error(RconError::AuthLost);
                if !recover(worker_id, &mut transport).await {
                    break;
                }
                continue;
            }
            Err(error) if error.is_transient() => {
                queue.task_done();
                warn!(worker_id, "connection error, reconnecting: {error}");
                command.set_error(error);
                if !recover(worker_id, &mut transport).await {
                    break;
                }
                continue;
            }
            Err(error) => {
                queue.task_done();
                error!(worker_id, "unrecoverable send failure: {error}");
                command.set_error(error);
                break;
            }
        }

        if let Some(delay) = command_delay {
            time::sleep(delay).await;
        }
    }

    transport.disconnect().await;
    info!(worker_id, "worker shutdown complete");
}

/// Reconnect after a failed send
///
/// Returns false when the retry budget is spent or the password no longer
/// works; the worker then exits and leaves the rest of the pool serving.
async fn recover<T: CommandTransport>(worker_id: usize, transport: &mut T) -> bool {
    match transport.reconnect().await {
        Ok(()) => true,
        Err(error) => {
            error!(worker_id, "reconnect failed, stopping worker: {error}");
            false
        }
    }
}
