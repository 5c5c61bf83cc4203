// Copyright 2020 Joyent, Inc.

pub mod types;

use std::fmt::Result as FmtResult;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use slog::{debug, error, info, o, trace, warn, Drain, Logger};

use crate::connection::Connection;
use crate::connection_pool::types::{
    BalancerSignal, IdleEntry, PoolConfig, PoolData, PoolState, PoolStats,
    ProtectedData,
};
use crate::error::Error;

// Default maximum number of open connections
const DEFAULT_MAX_OPEN_SIZE: u32 = 50;
// Default lower watermark for the idle queue
const DEFAULT_MIN_IDLE_SIZE: u32 = 5;
// Default expiry for idle connections
const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(600);
// Interval between periodic balancer passes
const DEFAULT_BALANCE_INTERVAL: Duration = Duration::from_secs(5);
// Poll interval for claims waiting on an empty idle queue
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A pool of connections to a single backend service
pub struct ConnectionPool<C>
where
    C: Connection,
{
    protected_data: ProtectedData<C>,
    in_use: Arc<AtomicI32>,
    balancer_signal: BalancerSignal,
    balancer_thread: Mutex<Option<thread::JoinHandle<()>>>,
    config: Arc<PoolConfig>,
    log: Logger,
}

impl<C> Debug for ConnectionPool<C>
where
    C: Connection + Debug,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("ConnectionPool")
            .field("protected_data", &self.protected_data)
            .field("in_use", &self.in_use)
            .field("config", &self.config)
            .finish()
    }
}

impl<C> ConnectionPool<C>
where
    C: Connection,
{
    /// Create a new connection pool. The pool warms itself up by invoking
    /// `create_connection` synchronously until the idle queue reaches the
    /// lower watermark, then starts the balancer thread that maintains the
    /// queue for the life of the pool. A creation failure during warm-up
    /// aborts construction.
    pub fn new<F>(
        config: PoolConfig,
        mut create_connection: F,
    ) -> Result<Self, Error<C>>
    where
        F: FnMut(&PoolConfig) -> Result<C, C::Error> + Send + 'static,
    {
        let mut config = config.normalize();

        let logger = config
            .log
            .take()
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

        let config = Arc::new(config);

        let protected_data =
            ProtectedData::new(PoolData::new(config.max_open_size as usize));

        let mut pool_data = protected_data.pool_data_lock();
        for _ in 0..config.min_idle_size {
            match create_connection(&config) {
                Ok(conn) => pool_data.idle.push_back(IdleEntry::new(conn)),
                Err(e) => {
                    let err_msg = e.to_string();
                    error!(
                        logger,
                        "Failed to create connection during warm-up: {}",
                        err_msg
                    );
                    while let Some(entry) = pool_data.idle.pop_front() {
                        close_connection(&logger, entry.conn);
                    }
                    return Err(Error::Factory(err_msg));
                }
            }
        }
        info!(logger, "warmed up {} idle connections", pool_data.idle.len());
        drop(pool_data);

        let in_use = Arc::new(AtomicI32::new(0));
        let balancer_signal = BalancerSignal::new();

        // Spawn a thread to maintain the idle queue watermarks
        let protected_data_clone = protected_data.clone();
        let balancer_signal_clone = balancer_signal.clone();
        let in_use_clone = in_use.clone();
        let config_clone = config.clone();
        let balancer_log_clone = logger.clone();
        let balancer_thread = thread::spawn(move || {
            balancer_loop(
                config_clone,
                protected_data_clone,
                balancer_signal_clone,
                in_use_clone,
                balancer_log_clone,
                create_connection,
            )
        });

        Ok(ConnectionPool {
            protected_data,
            in_use,
            balancer_signal,
            balancer_thread: Mutex::new(Some(balancer_thread)),
            config,
            log: logger,
        })
    }

    /// Claim a connection from the pool, waiting up to `timeout` for one to
    /// become available. A timeout of `None` waits until an idle connection
    /// appears or the pool is closed.
    ///
    /// The returned connection is checked out to the caller, who must hand
    /// it back with [`put`](#method.put) when finished with it. That
    /// includes the connection carried inside [`Error::Open`]: a claimed
    /// connection that failed to open still belongs to the caller and the
    /// pool disposes of it once it is returned.
    pub fn get(&self, timeout: Option<Duration>) -> Result<C, Error<C>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pool_data = self.protected_data.pool_data_lock();

        loop {
            if pool_data.closed {
                return Err(Error::PoolClosed);
            }

            if let Some(entry) = pool_data.idle.pop_front() {
                if self.expired(&entry) {
                    // Aged out while idle. Discard it and keep waiting
                    // against the caller's original deadline.
                    drop(pool_data);
                    close_connection(&self.log, entry.conn);
                    pool_data = self.protected_data.pool_data_lock();
                    continue;
                }

                self.in_use.fetch_add(1, AtomicOrdering::Relaxed);
                drop(pool_data);

                let mut conn = entry.conn;
                if conn.is_open() {
                    return Ok(conn);
                }
                return match conn.open() {
                    Ok(()) => Ok(conn),
                    Err(e) => {
                        // The connection remains checked out. The caller
                        // must still return it with `put` so the pool can
                        // retire it safely.
                        let err = e.to_string();
                        warn!(
                            self.log,
                            "Failed to open claimed connection: {}", err
                        );
                        Err(Error::Open {
                            err,
                            connection: Some(conn),
                        })
                    }
                };
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::ClaimTimeout);
                    }
                    CLAIM_POLL_INTERVAL.min(deadline - now)
                }
                None => CLAIM_POLL_INTERVAL,
            };

            let wait_result =
                self.protected_data.condvar_wait(pool_data, wait);
            pool_data = wait_result.0;
            if wait_result.1 {
                // Waited out another poll interval with nothing to claim.
                // Nudge the balancer in case the queue needs a top-up.
                self.balancer_signal.notify();
            }
        }
    }

    /// Claim a connection from the pool without waiting. Returns `None` if
    /// the pool is closed or no usable idle connection is immediately
    /// available.
    pub fn try_get(&self) -> Option<C> {
        let mut pool_data = self.protected_data.pool_data_lock();

        loop {
            if pool_data.closed {
                return None;
            }

            let entry = pool_data.idle.pop_front()?;

            if self.expired(&entry) {
                drop(pool_data);
                close_connection(&self.log, entry.conn);
                pool_data = self.protected_data.pool_data_lock();
                continue;
            }

            self.in_use.fetch_add(1, AtomicOrdering::Relaxed);
            drop(pool_data);

            let mut conn = entry.conn;
            if conn.is_open() {
                return Some(conn);
            }
            match conn.open() {
                Ok(()) => return Some(conn),
                Err(e) => {
                    // There is no error channel here, so an unopenable
                    // connection is retired on the spot and the scan moves
                    // on to the next entry.
                    warn!(
                        self.log,
                        "Failed to open claimed connection: {}", e
                    );
                    self.in_use.fetch_sub(1, AtomicOrdering::Relaxed);
                    close_connection(&self.log, conn);
                    pool_data = self.protected_data.pool_data_lock();
                }
            }
        }
    }

    /// Return a checked out connection to the pool. Never blocks: if the
    /// idle queue is at capacity the connection is closed and shed instead
    /// of queued. A returned connection that no longer reports itself open
    /// is retired rather than queued for another claim. Once the pool is
    /// closed `put` closes the connection and returns [`Error::PoolClosed`].
    pub fn put(&self, conn: C) -> Result<(), Error<C>> {
        self.in_use.fetch_sub(1, AtomicOrdering::Relaxed);

        let mut pool_data = self.protected_data.pool_data_lock();

        if pool_data.closed {
            drop(pool_data);
            // The pool can no longer track the connection, so rather than
            // strand a live handle with the caller it is closed here.
            close_connection(&self.log, conn);
            return Err(Error::PoolClosed);
        }

        if !conn.is_open() {
            // Callers cannot destroy connections themselves, so a broken
            // one comes back through here and is retired. The balancer
            // replaces it on a following pass.
            drop(pool_data);
            debug!(
                self.log,
                "Discarding returned connection that is not open"
            );
            close_connection(&self.log, conn);
            return Ok(());
        }

        if (pool_data.idle.len() as u32) < self.config.max_open_size {
            pool_data.idle.push_back(IdleEntry::new(conn));
            drop(pool_data);
            self.protected_data.condvar_notify();
        } else {
            // Pressure valve: the queue is full, so shed the connection
            // instead of blocking the caller.
            drop(pool_data);
            close_connection(&self.log, conn);
        }

        Ok(())
    }

    /// Claim a connection wrapped in a guard that returns it to the pool
    /// automatically when dropped. If the claimed connection fails to open,
    /// `claim` returns it on the caller's behalf and surfaces
    /// [`Error::Open`] with an empty connection payload.
    pub fn claim(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PoolConnection<C>, Error<C>> {
        match self.get(timeout) {
            Ok(conn) => Ok(PoolConnection {
                pool: self,
                connection: Some(conn),
            }),
            Err(Error::Open {
                err,
                connection: Some(conn),
            }) => {
                // Hand the unopenable connection back on the caller's
                // behalf before surfacing the failure. put retires it.
                let _ = self.put(conn);
                Err(Error::Open {
                    err,
                    connection: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Close the connection pool in a graceful manner. Closing is
    /// idempotent and may be invoked from any thread holding a reference to
    /// the pool. The idle queue is drained and every drained connection is
    /// closed, claim waiters are woken so they observe the closed pool, and
    /// the caller is blocked until the balancer thread has exited.
    /// Connections currently checked out are not force-closed; they are
    /// disposed of when their holders return them with `put`.
    pub fn close(&self) {
        let mut pool_data = self.protected_data.pool_data_lock();
        if pool_data.closed {
            trace!(self.log, "close called on an already closed pool");
            return;
        }
        pool_data.closed = true;
        let drained: Vec<IdleEntry<C>> = pool_data.idle.drain(..).collect();
        drop(pool_data);

        info!(
            self.log,
            "closing connection pool; draining {} idle connections",
            drained.len()
        );

        // Wake claim waiters so they observe the closed flag, and the
        // balancer so it can exit
        self.protected_data.condvar_notify_all();
        self.balancer_signal.notify();

        for entry in drained {
            close_connection(&self.log, entry.conn);
        }

        let balancer_thread = self.balancer_thread.lock().unwrap().take();
        if let Some(handle) = balancer_thread {
            let _ = handle.join();
        }
        trace!(self.log, "close: joined balancer thread");
    }

    /// Report the connection counts of the pool, or `None` once the pool
    /// has been closed.
    pub fn stats(&self) -> Option<PoolStats> {
        let pool_data = self.protected_data.pool_data_lock();
        if pool_data.closed {
            return None;
        }

        // Both counts are read under the data lock so they form one
        // snapshot. A claim moving a connection out of the queue holds the
        // same lock and cannot land between the two reads.
        let idle = pool_data.idle.len() as u32;
        let used = self.in_use.load(AtomicOrdering::Relaxed).max(0) as u32;

        Some(PoolStats {
            idle_connections: idle.into(),
            in_use_connections: used.into(),
        })
    }

    /// Report the lifecycle state of the pool.
    pub fn state(&self) -> PoolState {
        if self.protected_data.pool_data_lock().closed {
            PoolState::Closed
        } else {
            PoolState::Running
        }
    }

    fn expired(&self, entry: &IdleEntry<C>) -> bool {
        if let Some(max_idle_time) = self.config.max_idle_time {
            if entry.idle_since.elapsed() > max_idle_time {
                debug!(self.log, "Discarding connection idle beyond expiry");
                return true;
            }
        }
        if let Some(max_life_time) = self.config.max_life_time {
            if entry.conn.is_overdue(max_life_time) {
                debug!(self.log, "Discarding overdue connection");
                return true;
            }
        }
        false
    }
}

impl<C> Drop for ConnectionPool<C>
where
    C: Connection,
{
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection claimed from the pool, returned to it on drop
pub struct PoolConnection<'a, C>
where
    C: Connection,
{
    pool: &'a ConnectionPool<C>,
    connection: Option<C>,
}

impl<'a, C> Drop for PoolConnection<'a, C>
where
    C: Connection,
{
    fn drop(&mut self) {
        match self.connection.take() {
            Some(conn) => {
                if let Err(e) = self.pool.put(conn) {
                    // The pool closed while this connection was out. put
                    // has already disposed of it, so there is nothing left
                    // to unwind here.
                    warn!(
                        self.pool.log,
                        "Could not return connection to the pool: {}", e
                    );
                }
            }
            None => {
                // If we arrive here then the connection is no longer
                // available and cannot be returned to the pool
                warn!(
                    self.pool.log,
                    "Connection is no longer available. Cannot return to \
                     pool."
                );
            }
        }
    }
}

impl<'a, C> Deref for PoolConnection<'a, C>
where
    C: Connection,
{
    type Target = C;

    fn deref(&self) -> &C {
        self.connection.as_ref().unwrap()
    }
}

impl<'a, C> DerefMut for PoolConnection<'a, C>
where
    C: Connection,
{
    fn deref_mut(&mut self) -> &mut C {
        self.connection.as_mut().unwrap()
    }
}

impl<'a, C> Debug for PoolConnection<'a, C>
where
    C: Connection + Debug,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("PoolConnection")
            .field("connection", &self.connection)
            .finish()
    }
}

fn close_connection<C>(log: &Logger, mut conn: C)
where
    C: Connection,
{
    if let Err(err) = conn.close() {
        warn!(
            log,
            "Failed to properly close connection. Reason: {}", err
        );
    }
}

fn balancer_loop<C, F>(
    config: Arc<PoolConfig>,
    protected_data: ProtectedData<C>,
    balancer_signal: BalancerSignal,
    in_use: Arc<AtomicI32>,
    log: Logger,
    mut create_connection: F,
) where
    C: Connection,
    F: FnMut(&PoolConfig) -> Result<C, C::Error>,
{
    let balance_interval = config
        .balance_interval
        .unwrap_or(DEFAULT_BALANCE_INTERVAL);

    loop {
        // Sleep until the next periodic pass or until a starved claim sends
        // a nudge, whichever comes first. The wake reason does not matter;
        // the pass re-evaluates the queue either way. The signal lock is
        // released before any pool work so nudges never block.
        let mut pending = balancer_signal.get_lock();
        if !*pending {
            pending = balancer_signal.condvar_wait(pending, balance_interval);
        }
        *pending = false;
        drop(pending);

        let mut pool_data = protected_data.pool_data_lock();
        if pool_data.closed {
            break;
        }

        let idled = pool_data.idle.len() as i32;
        let used = in_use.load(AtomicOrdering::Relaxed);

        if used + idled < config.max_open_size as i32
            && idled < config.min_idle_size as i32
        {
            // One step up toward the low watermark per pass
            drop(pool_data);
            debug!(
                log,
                "idle count {} below low watermark, creating a connection",
                idled
            );
            match create_connection(&config) {
                Ok(conn) => {
                    pool_data = protected_data.pool_data_lock();
                    if pool_data.closed {
                        // The pool closed while the connection was being
                        // created. It was never published, so dispose of it
                        // here and exit.
                        drop(pool_data);
                        close_connection(&log, conn);
                        break;
                    }
                    pool_data.idle.push_back(IdleEntry::new(conn));
                    drop(pool_data);
                    protected_data.condvar_notify();
                    info!(log, "Added connection to the idle queue");
                }
                Err(e) => {
                    // Not fatal. The next pass retries.
                    error!(log, "Failed to create connection: {}", e);
                }
            }
        } else if idled > config.max_idle_size as i32 {
            // One step down toward the high watermark per pass
            let entry = pool_data.idle.pop_front();
            drop(pool_data);
            debug!(
                log,
                "idle count {} above high watermark, closing a connection",
                idled
            );
            if let Some(entry) = entry {
                close_connection(&log, entry.conn);
            }
        } else {
            trace!(log, "idle queue within watermarks");
        }
    }

    trace!(log, "balancer_loop exiting");
}
