// Copyright 2020 Joyent, Inc.

//! A single-backend bounded connection pool
//!
//! Sidepocket is a library for keeping a rack of ready connections to a
//! single backend service. Opening a connection to a database or an RPC
//! endpoint is expensive, so the pool holds a bounded set of them, hands
//! them out one caller at a time, and quietly maintains the idle set in the
//! background. The library is built around one primary trait, the
//! [`Connection`](connection/trait.Connection.html) trait, and a
//! caller-supplied creation function.
//!
//! ## Connections
//!
//! In sidepocket, a *connection* is not necessarily just a TCP socket. It can
//! be anything that provides some kind of logical connection to a service, as
//! long as it obeys a similar interface to a socket.
//!
//! This is intended to allow users of the API to represent a "connection" as
//! an application or session layer concept. For example, it could be useful
//! to construct a pool of connections to an LDAP server that perform a bind
//! operation (authenticate) before they are considered *open*.
//!
//! Connections enter the pool unopened. The pool establishes the underlying
//! transport lazily: when a connection is claimed and does not report itself
//! open, the pool calls [`open`](connection/trait.Connection.html#tymethod.open)
//! before handing it to the caller.
//!
//! ## The creation function
//!
//! In addition to a [`Connection`](connection/trait.Connection.html)
//! implementation, sidepocket users provide the connection pool with a
//! function that produces new *connections* for the pool to manage. The trait
//! bounds established by the connection pool for this function are as
//! follows:
//! ```rust,ignore
//! FnMut(&PoolConfig) -> Result<C, C::Error> + Send + 'static
//! where C: Connection
//! ```
//! The requirement is a function that takes a reference to the
//! [`PoolConfig`](connection_pool/types/struct.PoolConfig.html) the pool was
//! built with and returns a new instance of a
//! [`Connection`](connection/trait.Connection.html). The configuration
//! carries the backend address and credentials, so the function is the place
//! to capture any application level information required to construct a
//! *connection* to a service. *e.g.* A database connection might require a
//! database name or user name. The function is called synchronously while
//! the pool warms up and from the balancer thread afterwards, and it must
//! not itself open the transport; the pool does that on first claim.
//!
//! ## Watermarks and the balancer
//!
//! The pool maintains its idle queue between two configured watermarks. A
//! background balancer thread wakes on a fixed interval, or early when a
//! starved claim nudges it, and compares the idle count against the
//! watermarks:
//!
//! * below `min_idle_size`, and with room under `max_open_size`, it creates
//!   one new connection;
//! * above `max_idle_size` it closes one idle connection;
//! * between the watermarks it does nothing.
//!
//! Adjusting by exactly one connection per wake is deliberate. It bounds the
//! rate of creation-function calls under a sudden burst of demand, and the
//! untouched band between the watermarks keeps the pool from oscillating
//! around a single threshold.
//!
//! Idle connections also age. An entry that has sat idle longer than
//! `max_idle_time`, or whose total age exceeds `max_life_time`, is closed
//! and discarded at claim time rather than handed out. The balancer then
//! replaces it on a following wake.
//!
//! ## Claims and ownership
//!
//! A connection is owned by exactly one party at a time: the pool while it
//! is idle, or a single caller while it is checked out. Callers either
//! manage the checkout explicitly with
//! [`get`](connection_pool/struct.ConnectionPool.html#method.get) and
//! [`put`](connection_pool/struct.ConnectionPool.html#method.put), or use
//! [`claim`](connection_pool/struct.ConnectionPool.html#method.claim) to
//! receive a guard that returns the connection automatically when it falls
//! out of scope. Returning a connection never blocks: if the idle queue is
//! full the returned connection is closed instead of queued. A returned
//! connection that no longer reports itself open is retired the same way
//! and the balancer replaces it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use std::thread;
//! use std::time::Duration;
//!
//! use slog::{o, Drain, Logger};
//!
//! use sidepocket::connection_pool::types::PoolConfig;
//! use sidepocket::connection_pool::ConnectionPool;
//!
//! let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
//! let log = Logger::root(
//!     Mutex::new(
//!         slog_term::FullFormat::new(plain).build()
//!     ).fuse(),
//!     o!("build-id" => "0.1.0")
//! );
//!
//! let config = PoolConfig {
//!     address: String::from("127.0.0.1:55555"),
//!     min_idle_size: 2,
//!     max_idle_size: 5,
//!     max_open_size: 10,
//!     log: Some(log.clone()),
//!     ..Default::default()
//! };
//!
//! let pool = Arc::new(ConnectionPool::new(config, MyConnection::new)?);
//!
//! for _ in 0..10 {
//!     let pool = Arc::clone(&pool);
//!     thread::spawn(move || {
//!         let conn = pool.claim(Some(Duration::from_secs(1)))?;
//!         // Do stuff here
//!         // The connection is returned to the pool when it falls out of
//!         // scope.
//!     });
//! }
//! ```
//!
//! There is an implementation of the
//! [`Connection`](connection/trait.Connection.html) trait that may be useful
//! to anyone looking to get started with `sidepocket`:
//!
//! * [`sidepocket-tcp-stream-connection`](https://github.com/joyent/rust-sidepocket)

#![allow(missing_docs)]

pub mod connection;
pub mod connection_pool;
pub mod error;
