//! # rcon-gateway-pool
//!
//! Worker pool that serializes commands over pooled RCON connections.
//!
//! This crate provides:
//! - `WorkerPool` with the scoped start/shutdown lifecycle
//! - The shared command queue and worker loop
//! - The transport seam (`CommandTransport` / `Connect`)
//! - Pool configuration with environment loading

pub mod config;
pub mod pool;
pub mod queue;
pub mod transport;
mod worker;

pub use config::{ConfigError, PhaseTimeout, PoolConfig};
pub use pool::{RconWorkerPool, WorkerPool};
pub use queue::CommandQueue;
pub use transport::{CommandTransport, Connect, RconConnector};
