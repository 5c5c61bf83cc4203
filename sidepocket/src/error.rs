// Copyright 2019 Joyent, Inc.

use std::error::Error as StdError;
use std::fmt;

/// The error type returned by the connection pool. The type is generic over
/// the pooled connection because the `Open` variant may carry the claimed
/// connection back to the caller.
pub enum Error<C> {
    /// The pool has been closed and no longer services requests.
    PoolClosed,
    /// No idle connection became available within the caller's deadline.
    ClaimTimeout,
    /// The connection creation function failed while the pool was warming up.
    Factory(String),
    /// A claimed connection could not be opened. When returned by `get` the
    /// connection is still checked out to the caller, who must hand it back
    /// with `put`; `claim` returns the connection on the caller's behalf and
    /// the payload is `None`.
    Open {
        err: String,
        connection: Option<C>,
    },
}

impl<C> fmt::Display for Error<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::PoolClosed => "the connection pool is closed".fmt(fmt),
            Error::ClaimTimeout => {
                "timed out waiting for a pool connection".fmt(fmt)
            }
            Error::Factory(err) => {
                write!(fmt, "failed to create connection: {}", err)
            }
            Error::Open { err, .. } => {
                write!(fmt, "failed to open claimed connection: {}", err)
            }
        }
    }
}

// The connection payload of the `Open` variant is elided from the output so
// that the impl does not require `C: Debug`.
impl<C> fmt::Debug for Error<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::PoolClosed => fmt.write_str("PoolClosed"),
            Error::ClaimTimeout => fmt.write_str("ClaimTimeout"),
            Error::Factory(err) => {
                fmt.debug_tuple("Factory").field(err).finish()
            }
            Error::Open { err, connection } => fmt
                .debug_struct("Open")
                .field("err", err)
                .field("connection", &connection.as_ref().map(|_| ".."))
                .finish(),
        }
    }
}

impl<C> StdError for Error<C> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        None
    }
}
