// Copyright 2019 Joyent, Inc.

use std::io::{Error as IOError, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use sidepocket::connection::Connection;
use sidepocket::connection_pool::types::PoolConfig;

#[derive(Debug)]
pub struct TcpStreamWrapper {
    pub stream: Option<TcpStream>,
    addr: SocketAddr,
    created_at: Instant,
}

impl TcpStreamWrapper {
    pub fn new(addr: SocketAddr) -> Self {
        TcpStreamWrapper {
            stream: None,
            addr,
            created_at: Instant::now(),
        }
    }
}

impl Connection for TcpStreamWrapper {
    type Error = IOError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let stream = TcpStream::connect(&self.addr)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.stream = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn is_overdue(&self, max_life_time: Duration) -> bool {
        self.created_at.elapsed() > max_life_time
    }
}

impl Deref for TcpStreamWrapper {
    type Target = TcpStream;

    fn deref(&self) -> &TcpStream {
        &self.stream.as_ref().unwrap()
    }
}

impl DerefMut for TcpStreamWrapper {
    fn deref_mut(&mut self) -> &mut TcpStream {
        self.stream.as_mut().unwrap()
    }
}

/// Creates an unopened wrapper for the first usable socket address named
/// by the pool configuration. Pass this function to the pool as its
/// creation function.
pub fn connection_creator(
    config: &PoolConfig,
) -> Result<TcpStreamWrapper, IOError> {
    let addr = config.address.to_socket_addrs()?.next().ok_or_else(|| {
        IOError::new(
            ErrorKind::AddrNotAvailable,
            format!("no usable address for {}", config.address),
        )
    })?;
    Ok(TcpStreamWrapper::new(addr))
}
