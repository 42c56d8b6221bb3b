//! RCON connection management
//!
//! One authenticated TCP connection to the server, owned by exactly one
//! worker. Socket errors bubble up so the worker can decide to reconnect;
//! a mid-session authentication loss is reported as a `None` response
//! instead. Connections are long-lived, so the teardown/retry dance lives
//! here rather than in a scoped guard.

use crate::packet::{MAX_FRAME_LEN, PACKET_METADATA_LEN, Packet};
use rcon_gateway_core::{RconError, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, warn};

/// How many reconnection attempts a connection may burn before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// Keep retrying forever
    Infinite,
    /// Additional retries after the initial attempt; `Finite(0)` tries once
    Finite(u32),
}

impl RetryBudget {
    fn exhausted_by(self, attempts: u32) -> bool {
        match self {
            RetryBudget::Infinite => false,
            RetryBudget::Finite(retries) => attempts > retries,
        }
    }
}

/// Configuration for an RCON connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// RCON password
    pub password: String,
    /// RCON port on localhost
    pub port: u16,
    /// Bound on every socket operation; `None` waits indefinitely
    pub socket_timeout: Option<Duration>,
    /// Pause between reconnection attempts
    pub reconnect_pause: Duration,
    /// Retry budget for dialing
    pub retry_attempts: RetryBudget,
}

impl ConnectionConfig {
    pub fn new(password: impl Into<String>, port: u16) -> Self {
        Self {
            password: password.into(),
            port,
            socket_timeout: None,
            reconnect_pause: Duration::from_secs(5),
            retry_attempts: RetryBudget::Infinite,
        }
    }
}

/// An authenticated RCON connection
///
/// Single-producer, single-consumer: exactly one task may drive this at a
/// time, which the pool guarantees by giving each worker its own connection.
pub struct Connection {
    stream: Option<TcpStream>,
    // Monotonically increasing request id; -1 marks a closed connection.
    request_id: i32,
    config: ConnectionConfig,
}

impl Connection {
    /// Dial localhost and authenticate
    ///
    /// Transport errors are retried per the configured budget with the
    /// reconnect pause between attempts; a rejected password fails
    /// immediately with [`RconError::IncorrectPassword`].
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let stream = dial(&config).await?;
        let stream = authenticate(stream, &config).await?;
        info!(port = config.port, "RCON connection authenticated");

        Ok(Self {
            stream: Some(stream),
            request_id: 1,
            config,
        })
    }

    /// Send a command and collect its full response
    ///
    /// A command may produce arbitrarily many response packets with no end
    /// marker, so a dummy packet of unknown type is sent right behind it.
    /// The server answers the dummy with a single error packet, and since
    /// responses are ordered per connection, that reply is guaranteed to
    /// arrive after every part of the command's response.
    ///
    /// Returns `Ok(None)` when the server answers with request id -1,
    /// meaning the session is no longer authenticated.
    pub async fn send_command(&mut self, command: &str) -> Result<Option<String>> {
        if self.request_id == -1 {
            return Err(RconError::Disconnected);
        }
        let timeout = self.config.socket_timeout;
        let stream = self.stream.as_mut().ok_or(RconError::Disconnected)?;

        self.request_id += 1;
        let request_id = self.request_id;
        let terminator_id = request_id + 1000;

        debug!(request_id, command, "sending RCON command");
        write_frame(stream, &Packet::command(request_id, command), timeout).await?;
        write_frame(stream, &Packet::dummy(terminator_id), timeout).await?;

        let mut response = String::new();
        loop {
            let packet = read_frame(stream, timeout).await?;
            if packet.id == -1 {
                warn!(request_id, "server reports the session is unauthenticated");
                return Ok(None);
            }
            if packet.id == terminator_id {
                break;
            }
            if packet.id == request_id {
                response.push_str(&packet.body);
            } else {
                // Should not happen on a single-consumer connection.
                debug!(
                    request_id,
                    stray = packet.id,
                    "ignoring packet with unexpected request id"
                );
            }
        }

        Ok(Some(response))
    }

    /// Tear down the current socket and redo the dial + auth dance
    ///
    /// On success the request id counter restarts at 1.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect().await;

        let stream = dial(&self.config).await?;
        let stream = authenticate(stream, &self.config).await?;
        self.stream = Some(stream);
        self.request_id = 1;
        info!(port = self.config.port, "RCON connection reestablished");

        Ok(())
    }

    /// Best-effort close; later sends fail with [`RconError::Disconnected`]
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.shutdown().await {
                debug!("error while closing RCON socket: {error}");
            }
        }
        self.request_id = -1;
    }
}

async fn dial(config: &ConnectionConfig) -> Result<TcpStream> {
    let mut attempts: u32 = 0;
    loop {
        if attempts > 0 && !config.reconnect_pause.is_zero() {
            time::sleep(config.reconnect_pause).await;
        }

        // Localhost only: exposing RCON beyond loopback is not supported.
        let connect = TcpStream::connect(("localhost", config.port));
        let dialed = match config.socket_timeout {
            Some(limit) => match time::timeout(limit, connect).await {
                Ok(result) => result.map_err(|e| RconError::Connection(e.to_string())),
                Err(_) => Err(RconError::Timeout(format!(
                    "connect timed out after {}s",
                    limit.as_secs()
                ))),
            },
            None => connect
                .await
                .map_err(|e| RconError::Connection(e.to_string())),
        };

        match dialed {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                attempts += 1;
                if config.retry_attempts.exhausted_by(attempts) {
                    return Err(RconError::ConnectionFailed(format!(
                        "giving up after {attempts} attempts: {error}"
                    )));
                }
                warn!(attempts, port = config.port, "connection attempt failed: {error}");
            }
        }
    }
}

async fn authenticate(mut stream: TcpStream, config: &ConnectionConfig) -> Result<TcpStream> {
    write_frame(&mut stream, &Packet::auth(&config.password), config.socket_timeout).await?;

    // A single frame; the dummy-terminator trick applies to commands only.
    let response = read_frame(&mut stream, config.socket_timeout).await?;
    if response.id == -1 {
        let _ = stream.shutdown().await;
        return Err(RconError::IncorrectPassword);
    }

    Ok(stream)
}

async fn write_frame(stream: &mut TcpStream, packet: &Packet, limit: Option<Duration>) -> Result<()> {
    let frame = packet.encode();
    let result = match limit {
        Some(limit) => time::timeout(limit, stream.write_all(&frame))
            .await
            .map_err(|_| {
                RconError::Timeout(format!("write stalled for {}s", limit.as_secs()))
            })?,
        None => stream.write_all(&frame).await,
    };
    result.map_err(|e| RconError::Connection(format!("socket write failed: {e}")))
}

async fn read_frame(stream: &mut TcpStream, limit: Option<Duration>) -> Result<Packet> {
    let mut length_bytes = [0u8; 4];
    read_exact_timed(stream, &mut length_bytes, limit).await?;

    let length = i32::from_le_bytes(length_bytes);
    if length < PACKET_METADATA_LEN as i32 || length as usize > MAX_FRAME_LEN {
        return Err(RconError::Protocol(format!("invalid frame length {length}")));
    }

    let mut payload = vec![0u8; length as usize];
    read_exact_timed(stream, &mut payload, limit).await?;
    Packet::decode(&payload)
}

async fn read_exact_timed(
    stream: &mut TcpStream,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> Result<()> {
    let result = match limit {
        Some(limit) => time::timeout(limit, stream.read_exact(buf))
            .await
            .map_err(|_| {
                RconError::Timeout(format!("no response within {}s", limit.as_secs()))
            })?,
        None => stream.read_exact(buf).await,
    };

    match result {
        Ok(_) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            RconError::Protocol("server closed the connection mid-frame".into()),
        ),
        Err(error) => Err(RconError::Connection(format!("socket read failed: {error}"))),
    }
}
