// Copyright 2019 Joyent, Inc.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};
use slog::Logger;

use crate::connection::Connection;
use crate::connection_pool::{
    DEFAULT_MAX_IDLE_TIME, DEFAULT_MAX_OPEN_SIZE, DEFAULT_MIN_IDLE_SIZE,
};

/// The connection counts for the connection pool
#[derive(Copy, Clone, Debug)]
pub struct PoolStats {
    /// The count of idle connections held by the pool
    pub idle_connections: ConnectionCount,
    /// The count of connections currently checked out by callers
    pub in_use_connections: ConnectionCount,
}

impl PoolStats {
    /// Create a new instance of `PoolStats`
    pub fn new() -> Self {
        PoolStats {
            idle_connections: ConnectionCount::from(0),
            in_use_connections: ConnectionCount::from(0),
        }
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The configuration for a sidepocket connection pool. This is required to
/// instantiate a new connection pool, and the pool passes a reference to it
/// back into the connection creation function on every invocation.
#[derive(Debug)]
pub struct PoolConfig {
    /// The address of the backend service, in whatever form the connection
    /// creation function expects.
    pub address: String,
    /// The user to present to the backend service. May be left empty when
    /// the backend does not authenticate.
    pub user: String,
    /// The password to present to the backend service. May be left empty
    /// when the backend does not authenticate.
    pub password: String,
    /// The lower watermark of the idle queue. The balancer adds one
    /// connection per pass while the idle count is below this value. Zero
    /// selects the default of 5. Values above `max_open_size` are clamped
    /// down to it.
    pub min_idle_size: u32,
    /// The upper watermark of the idle queue. The balancer closes one idle
    /// connection per pass while the idle count is above this value. Values
    /// below `min_idle_size` are clamped up to it.
    pub max_idle_size: u32,
    /// The maximum number of connections the pool will have open at once,
    /// idle and checked out combined. Zero selects the default of 50.
    pub max_open_size: u32,
    /// How long a connection may sit idle before a claim discards it rather
    /// than returning it. `None` or a zero duration disables the check. The
    /// `Default` configuration uses 600 seconds.
    pub max_idle_time: Option<Duration>,
    /// The maximum total age of a connection. A claim discards a connection
    /// that reports itself overdue against this value. `None` or a zero
    /// duration disables the check.
    pub max_life_time: Option<Duration>,
    /// An optional length for the period of the balancer's maintenance
    /// pass. If not specified the default is 5 seconds.
    pub balance_interval: Option<Duration>,
    /// An optional `slog` logger instance. If none is provided then the
    /// logging will fall back to using the
    /// [`slog-stdlog`](https://docs.rs/slog-stdlog) drain which is
    /// essentially the same as using the rust standard
    /// [`log`](https://docs.rs/log) crate.
    pub log: Option<Logger>,
}

impl PoolConfig {
    /// Apply the documented defaults and clamps. The pool constructor calls
    /// this once and the configuration is immutable afterwards.
    pub fn normalize(mut self) -> PoolConfig {
        if self.max_open_size == 0 {
            self.max_open_size = DEFAULT_MAX_OPEN_SIZE;
        }
        if self.min_idle_size == 0 {
            self.min_idle_size = DEFAULT_MIN_IDLE_SIZE;
        }
        if self.min_idle_size > self.max_open_size {
            self.min_idle_size = self.max_open_size;
        }
        // Keep the watermark band well formed so the balancer never has a
        // top-up target above its trim threshold.
        if self.max_idle_size < self.min_idle_size {
            self.max_idle_size = self.min_idle_size;
        }
        self.max_idle_time = zero_to_none(self.max_idle_time);
        self.max_life_time = zero_to_none(self.max_life_time);
        self.balance_interval = zero_to_none(self.balance_interval);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            address: String::new(),
            user: String::new(),
            password: String::new(),
            min_idle_size: 0,
            max_idle_size: 0,
            max_open_size: 0,
            max_idle_time: Some(DEFAULT_MAX_IDLE_TIME),
            max_life_time: None,
            balance_interval: None,
            log: None,
        }
    }
}

// A zero duration in the configuration means unset.
fn zero_to_none(d: Option<Duration>) -> Option<Duration> {
    match d {
        Some(d) if d == Duration::from_secs(0) => None,
        other => other,
    }
}

// Pairs an idle connection with the time it entered the idle queue. An entry
// is created on every enqueue and consumed on every dequeue, so `idle_since`
// always refers to the current stretch of idleness.
#[doc(hidden)]
#[derive(Debug)]
pub struct IdleEntry<C> {
    pub conn: C,
    pub idle_since: Instant,
}

impl<C> IdleEntry<C>
where
    C: Connection,
{
    #[doc(hidden)]
    pub fn new(conn: C) -> Self {
        IdleEntry {
            conn,
            idle_since: Instant::now(),
        }
    }
}

/// A newtype wrapper around u32 used for counts of connections maintained by
/// the connection pool.
#[derive(
    Add,
    AddAssign,
    Clone,
    Copy,
    Debug,
    Display,
    Eq,
    From,
    Into,
    Ord,
    PartialOrd,
    PartialEq,
    Sub,
    SubAssign,
)]
pub struct ConnectionCount(u32);

// The internal data structures used to manage the connection pool.
#[doc(hidden)]
#[derive(Debug)]
pub struct PoolData<C> {
    pub idle: VecDeque<IdleEntry<C>>,
    pub closed: bool,
}

impl<C> PoolData<C>
where
    C: Connection,
{
    #[doc(hidden)]
    pub fn new(max_size: usize) -> Self {
        PoolData {
            idle: VecDeque::with_capacity(max_size),
            closed: false,
        }
    }
}

// Protected access to the internal connection pool data structures
#[doc(hidden)]
#[derive(Debug)]
pub struct ProtectedData<C>(Arc<(Mutex<PoolData<C>>, Condvar)>);

impl<C> ProtectedData<C>
where
    C: Connection,
{
    pub fn new(pool_data: PoolData<C>) -> Self {
        ProtectedData(Arc::new((Mutex::new(pool_data), Condvar::new())))
    }

    pub fn pool_data_lock(&self) -> MutexGuard<PoolData<C>> {
        (self.0).0.lock().unwrap()
    }

    pub fn condvar_wait<'a>(
        &self,
        g: MutexGuard<'a, PoolData<C>>,
        timeout: Duration,
    ) -> (MutexGuard<'a, PoolData<C>>, bool) {
        let wait_result = (self.0).1.wait_timeout(g, timeout).unwrap();
        (wait_result.0, wait_result.1.timed_out())
    }

    pub fn condvar_notify(&self) {
        (self.0).1.notify_one()
    }

    pub fn condvar_notify_all(&self) {
        (self.0).1.notify_all()
    }
}

impl<C> Clone for ProtectedData<C>
where
    C: Connection,
{
    fn clone(&self) -> ProtectedData<C> {
        ProtectedData(Arc::clone(&self.0))
    }
}

// Internal data type used to wake the balancer thread ahead of its next
// periodic pass.
#[doc(hidden)]
#[derive(Debug, Default)]
pub struct BalancerSignal(Arc<(Mutex<bool>, Condvar)>);

impl BalancerSignal {
    #![allow(clippy::mutex_atomic)]
    pub fn new() -> Self {
        BalancerSignal(Arc::new((Mutex::new(false), Condvar::new())))
    }

    pub fn get_lock(&self) -> MutexGuard<bool> {
        (self.0).0.lock().unwrap()
    }

    pub fn condvar_wait<'a>(
        &self,
        g: MutexGuard<'a, bool>,
        timeout: Duration,
    ) -> MutexGuard<'a, bool> {
        let wait_result = (self.0).1.wait_timeout(g, timeout).unwrap();
        wait_result.0
    }

    // Request an early balancer pass. The signal mutex is only ever held
    // across flag reads and writes so this never blocks behind balancer
    // work.
    pub fn notify(&self) {
        let mut pending = self.get_lock();
        *pending = true;
        (self.0).1.notify_one();
    }
}

impl Clone for BalancerSignal {
    fn clone(&self) -> BalancerSignal {
        BalancerSignal(Arc::clone(&self.0))
    }
}

/// Sum type representing the current state of the connection pool. Possible
/// states are running or closed.
#[derive(Copy, Clone, Debug)]
pub enum PoolState {
    /// The pool is running and able to service connection claim requests.
    Running,
    /// The connection pool is closed and is no longer accepting connection
    /// claim requests.
    Closed,
}

impl fmt::Display for PoolState {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolState::Running => String::from("running").fmt(fmt),
            PoolState::Closed => String::from("closed").fmt(fmt),
        }
    }
}
