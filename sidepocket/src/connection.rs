// Copyright 2019 Joyent, Inc.

use std::error;
use std::time::Duration;

/// Sidepocket connection
///
/// The `Connection` trait defines the interface that must be implemented in
/// order to participate in a sidepocket connection pool. A connection need not
/// be limited to a TCP socket, but could be any logical notion of a connection
/// that implements the `Connection` trait.
pub trait Connection: Send + Sized + 'static {
    /// The error type returned by the `open` or `close` functions. This is an
    /// associated type for the trait meaning each specific implementation of
    /// the `Connection` trait may choose the appropriate concrete error type
    /// to return. The only constraint applied is that the selected error type
    /// must implement the
    /// [Error](https://doc.rust-lang.org/std/error/trait.Error.html) trait
    /// from the standard library. This allows for the error to be relevant to
    /// the context of the `Connection` implementation while avoiding
    /// unnecessary type parameters or having to coerce data between
    /// incompatible error types.
    type Error: error::Error;
    /// Establish the connection to the backend, or re-establish it if the
    /// transport was closed while the connection sat idle. The creation
    /// function handed to `ConnectionPool::new` produces connections in the
    /// unopened state and the pool invokes `open` lazily when a connection
    /// that does not report itself open is claimed.
    fn open(&mut self) -> Result<(), Self::Error>;
    /// Close the connection to the backend. The pool treats closing as best
    /// effort: a failure here is logged and never propagated to callers.
    fn close(&mut self) -> Result<(), Self::Error>;
    /// Report whether the connection to the backend is currently established.
    fn is_open(&self) -> bool;
    /// Report whether the total age of the connection exceeds
    /// `max_life_time`. Overdue connections are retired by the pool rather
    /// than handed out again.
    fn is_overdue(&self, max_life_time: Duration) -> bool;
}
