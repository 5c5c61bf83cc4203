// Copyright 2020 Joyent, Inc.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use sidepocket::connection::Connection;
use sidepocket::connection_pool::types::PoolConfig;
use sidepocket::connection_pool::ConnectionPool;
use sidepocket_tcp_stream_connection::connection_creator;

// Binds an echo server on an ephemeral loopback port and returns its
// address.
fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let address =
        listener.local_addr().expect("no local address").to_string();
    thread::spawn(move || {
        for stream in listener.incoming() {
            if let Ok(mut stream) = stream {
                thread::spawn(move || {
                    let reader_stream = stream
                        .try_clone()
                        .expect("failed to clone stream");
                    let mut reader = BufReader::new(reader_stream);
                    let mut line = String::new();
                    while reader.read_line(&mut line).unwrap_or(0) > 0 {
                        if stream.write_all(line.as_bytes()).is_err() {
                            break;
                        }
                        line.clear();
                    }
                });
            }
        }
    });
    address
}

#[test]
fn open_close_lifecycle() {
    let config = PoolConfig {
        address: echo_server(),
        ..Default::default()
    };

    let mut conn =
        connection_creator(&config).expect("failed to create connection");
    assert!(!conn.is_open());

    conn.open().expect("failed to open connection");
    assert!(conn.is_open());

    conn.write_all(b"ping\n").expect("write failed");
    let mut reader = BufReader::new(
        conn.stream
            .as_ref()
            .unwrap()
            .try_clone()
            .expect("failed to clone stream"),
    );
    let mut line = String::new();
    reader.read_line(&mut line).expect("read failed");
    assert_eq!(line, "ping\n");

    conn.close().expect("failed to close connection");
    assert!(!conn.is_open());
}

#[test]
fn unparseable_address_is_an_error() {
    let config = PoolConfig {
        address: String::from("not an address"),
        ..Default::default()
    };

    assert!(connection_creator(&config).is_err());
}

#[test]
fn open_fails_when_backend_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let address =
        listener.local_addr().expect("no local address").to_string();
    drop(listener);

    let config = PoolConfig {
        address,
        ..Default::default()
    };

    let mut conn =
        connection_creator(&config).expect("failed to create connection");
    assert!(conn.open().is_err());
    assert!(!conn.is_open());
}

#[test]
fn wrapper_reports_overdue_after_lifetime() {
    let config = PoolConfig {
        address: String::from("127.0.0.1:55555"),
        ..Default::default()
    };

    let conn =
        connection_creator(&config).expect("failed to create connection");
    assert!(!conn.is_overdue(Duration::from_secs(60)));
    thread::sleep(Duration::from_millis(20));
    assert!(conn.is_overdue(Duration::from_millis(5)));
}

#[test]
fn pooled_tcp_connections_echo() {
    let config = PoolConfig {
        address: echo_server(),
        min_idle_size: 2,
        max_idle_size: 2,
        max_open_size: 4,
        ..Default::default()
    };

    let pool = ConnectionPool::new(config, connection_creator)
        .expect("failed to create pool");

    let mut conn = pool
        .claim(Some(Duration::from_secs(1)))
        .expect("failed to claim connection");
    conn.write_all(b"ping\n").expect("write failed");
    let mut reader = BufReader::new(
        conn.stream
            .as_ref()
            .unwrap()
            .try_clone()
            .expect("failed to clone stream"),
    );
    let mut line = String::new();
    reader.read_line(&mut line).expect("read failed");
    assert_eq!(line, "ping\n");
    drop(conn);

    pool.close();
}
