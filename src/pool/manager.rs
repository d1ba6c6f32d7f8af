//! Fixed-size pool of persistent `may_postgres` connections.
//!
//! Idle executors are parked on a bounded channel; checking one out is a
//! `recv_timeout`, returning it is a `send` from the guard's `Drop`.

use crate::connection::{connect, ConnectionError};
use crate::executor::PgExecutor;
use crate::pool::config::DatabaseConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::ops::Deref;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum PoolError {
    /// No connection became idle within the configured timeout
    Timeout(Duration),
    /// Opening a connection failed
    Connect(ConnectionError),
    /// `max_connections` was zero
    Empty,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Timeout(waited) => {
                write!(f, "no idle connection after {}ms", waited.as_millis())
            }
            PoolError::Connect(e) => write!(f, "connection failed: {e}"),
            PoolError::Empty => write!(f, "pool configured with zero connections"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<ConnectionError> for PoolError {
    fn from(err: ConnectionError) -> Self {
        PoolError::Connect(err)
    }
}

pub struct DbPool {
    url: String,
    idle_tx: Sender<PgExecutor>,
    idle_rx: Receiver<PgExecutor>,
    acquire_timeout: Duration,
    size: usize,
}

impl DbPool {
    /// Open `max_connections` connections up front.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, PoolError> {
        if config.max_connections == 0 {
            return Err(PoolError::Empty);
        }
        let (idle_tx, idle_rx) = bounded(config.max_connections);
        for _ in 0..config.max_connections {
            let executor = PgExecutor::new(connect(&config.url)?);
            // Capacity equals the number of sends, so this never blocks
            let _ = idle_tx.send(executor);
        }
        log::info!("opened {} database connection(s)", config.max_connections);

        Ok(Self {
            url: config.url.clone(),
            idle_tx,
            idle_rx,
            acquire_timeout: config.acquire_timeout(),
            size: config.max_connections,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    /// Check out a connection, replacing it first if it fails its health check.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, PoolError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        let executor = match self.idle_rx.recv_timeout(self.acquire_timeout) {
            Ok(executor) => executor,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return Err(PoolError::Timeout(self.acquire_timeout));
            }
        };

        let executor = match executor.check_health() {
            Ok(true) => executor,
            unhealthy => {
                log::warn!("replacing unhealthy pooled connection: {unhealthy:?}");
                match connect(&self.url) {
                    Ok(client) => PgExecutor::new(client),
                    Err(e) => {
                        // Park the old one again so the pool does not shrink
                        let _ = self.idle_tx.send(executor);
                        return Err(e.into());
                    }
                }
            }
        };

        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_connection_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledConnection {
            executor: Some(executor),
            pool: self,
        })
    }
}

/// A checked-out connection; goes back to the pool on drop.
pub struct PooledConnection<'a> {
    executor: Option<PgExecutor>,
    pool: &'a DbPool,
}

impl Deref for PooledConnection<'_> {
    type Target = PgExecutor;

    fn deref(&self) -> &PgExecutor {
        // Only `drop` takes the executor out
        self.executor.as_ref().unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(executor) = self.executor.take() {
            let _ = self.pool.idle_tx.send(executor);
        }
    }
}
