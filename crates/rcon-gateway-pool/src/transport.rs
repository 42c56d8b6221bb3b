//! Transport seam between the pool and the protocol client
//!
//! The worker loop only needs three operations from its connection, so they
//! live behind a trait: the real implementation is the RCON client's
//! [`Connection`], and tests drive the pool with scripted transports.

use async_trait::async_trait;
use rcon_gateway_client::{Connection, ConnectionConfig};
use rcon_gateway_core::Result;

/// One worker's exclusive view of its RCON connection
#[async_trait]
pub trait CommandTransport: Send {
    /// Send one command and collect the full response
    ///
    /// `Ok(None)` means the server no longer considers the session
    /// authenticated; the worker fails the command and reconnects.
    async fn send_command(&mut self, command: &str) -> Result<Option<String>>;

    /// Tear down and reestablish the connection, including auth
    async fn reconnect(&mut self) -> Result<()>;

    /// Best-effort close on worker exit
    async fn disconnect(&mut self);
}

#[async_trait]
impl CommandTransport for Connection {
    async fn send_command(&mut self, command: &str) -> Result<Option<String>> {
        Connection::send_command(self, command).await
    }

    async fn reconnect(&mut self) -> Result<()> {
        Connection::reconnect(self).await
    }

    async fn disconnect(&mut self) {
        Connection::disconnect(self).await;
    }
}

/// Factory that opens one transport per worker
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    type Transport: CommandTransport + 'static;

    /// Open and authenticate a fresh transport
    async fn connect(&self) -> Result<Self::Transport>;
}

/// Opens authenticated [`Connection`]s from a shared configuration
#[derive(Debug, Clone)]
pub struct RconConnector {
    config: ConnectionConfig,
}

impl RconConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connect for RconConnector {
    type Transport = Connection;

    async fn connect(&self) -> Result<Connection> {
        Connection::connect(self.config.clone()).await
    }
}
