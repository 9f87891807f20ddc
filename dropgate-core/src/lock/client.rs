//! Persistent lock session with the coordination service.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{self, TcpStream};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::lock::message::LockMessage;

/// Failures talking to the coordination service.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The hostname did not resolve or every resolved address refused the
    /// connection.
    #[error("failed to connect to coordination service {address}: {source}")]
    Connect {
        /// `host:port` being connected to.
        address: String,
        /// Resolver failure, or the failure from the last address tried.
        #[source]
        source: io::Error,
    },
    /// The service did not answer in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// `connect`, `acquire` or `release`.
        operation: &'static str,
        /// The deadline that passed.
        timeout: Duration,
    },
    /// The service closed or reset the connection mid-handshake.
    #[error("coordination service closed the connection during {operation}")]
    Closed {
        /// `acquire` or `release`.
        operation: &'static str,
    },
    /// `acquire` was called while this session already holds the lock.
    #[error("lock is already held by this session")]
    AlreadyHeld,
    /// `release` was called without a held lock.
    #[error("release called without holding the lock")]
    NotHeld,
    /// Any other transport failure.
    #[error("i/o error during {operation}: {source}")]
    Io {
        /// `acquire` or `release`.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Where the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No usable connection; the next call reconnects once.
    Disconnected,
    /// Connected, lock not held.
    Connected,
    /// Connected and holding the lock.
    Locked,
}

/// One connection to the coordination service, reused for the life of the
/// process.
///
/// Every handshake is bounded by the configured request timeout. A timeout
/// or transport failure drops the connection so a wedged exchange cannot
/// block the next one; the following call reconnects exactly once before
/// giving up.
#[derive(Debug)]
pub struct LockClient {
    address: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    stream: Option<TcpStream>,
    state: LockState,
}

impl LockClient {
    /// Connect to the service described by `config`.
    pub async fn connect(config: &LockConfig) -> Result<Self, LockError> {
        let mut client = Self::disconnected(config);
        client.reconnect().await?;
        Ok(client)
    }

    /// A session that will connect on first use.
    pub fn disconnected(config: &LockConfig) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            stream: None,
            state: LockState::Disconnected,
        }
    }

    /// Current session state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// The `host:port` this session talks to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ask for the lock and wait for the grant.
    pub async fn acquire(&mut self) -> Result<(), LockError> {
        if self.state == LockState::Locked {
            return Err(LockError::AlreadyHeld);
        }
        let reply = self.exchange(LockMessage::Acquire, "acquire").await?;
        debug!(address = %self.address, ?reply, "whitelist lock granted");
        self.state = LockState::Locked;
        Ok(())
    }

    /// Give the lock back and wait for the acknowledgment.
    pub async fn release(&mut self) -> Result<(), LockError> {
        if self.state != LockState::Locked {
            return Err(LockError::NotHeld);
        }
        let reply = self.exchange(LockMessage::Release, "release").await?;
        debug!(address = %self.address, ?reply, "whitelist lock released");
        self.state = LockState::Connected;
        Ok(())
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released after `f` finishes whatever it returns. A failed
    /// release is logged and does not discard `f`'s result, since the work was
    /// done under the lock.
    pub async fn with_lock<F, Fut, T>(&mut self, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await?;
        let value = f().await;
        if let Err(err) = self.release().await {
            warn!(address = %self.address, %err, "failed to release whitelist lock");
        }
        Ok(value)
    }

    async fn exchange(
        &mut self,
        message: LockMessage,
        operation: &'static str,
    ) -> Result<LockMessage, LockError> {
        if self.stream.is_none() {
            self.reconnect().await?;
        }
        let timeout = self.request_timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(LockError::Closed { operation });
        };

        let result = time::timeout(timeout, async {
            stream.write_all(&[message.to_byte()]).await?;
            let mut reply = [0u8; 1];
            stream.read_exact(&mut reply).await?;
            Ok::<u8, io::Error>(reply[0])
        })
        .await;

        match result {
            Ok(Ok(byte)) => Ok(LockMessage::from_reply(byte)),
            Ok(Err(source)) => {
                self.disconnect();
                if peer_dropped(&source) {
                    Err(LockError::Closed { operation })
                } else {
                    Err(LockError::Io { operation, source })
                }
            }
            Err(_elapsed) => {
                self.disconnect();
                Err(LockError::Timeout { operation, timeout })
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), LockError> {
        let stream = time::timeout(self.connect_timeout, open(&self.address))
            .await
            .map_err(|_| LockError::Timeout {
                operation: "connect",
                timeout: self.connect_timeout,
            })??;
        info!(address = %self.address, "connected to coordination service");
        self.stream = Some(stream);
        self.state = LockState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            warn!(address = %self.address, "dropping coordination service connection");
        }
        self.state = LockState::Disconnected;
    }
}

async fn open(address: &str) -> Result<TcpStream, LockError> {
    let candidates: Vec<SocketAddr> = net::lookup_host(address)
        .await
        .map_err(|source| LockError::Connect {
            address: address.to_string(),
            source,
        })?
        .collect();

    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for candidate in candidates {
        match TcpStream::connect(candidate).await {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(|source| LockError::Connect {
                    address: address.to_string(),
                    source,
                })?;
                return Ok(stream);
            }
            Err(err) => last_error = err,
        }
    }

    Err(LockError::Connect {
        address: address.to_string(),
        source: last_error,
    })
}

fn peer_dropped(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
