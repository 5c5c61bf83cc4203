// Copyright 2020 Joyent, Inc.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use slog::{info, o, Drain, Logger};

use sidepocket::connection_pool::types::PoolConfig;
use sidepocket::connection_pool::ConnectionPool;
use sidepocket_tcp_stream_connection::connection_creator;

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    // An echo server on an ephemeral port stands in for the backend
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

    let config = PoolConfig {
        address,
        min_idle_size: 2,
        max_idle_size: 4,
        max_open_size: 8,
        log: Some(log.clone()),
        ..Default::default()
    };

    let pool = ConnectionPool::new(config, connection_creator)
        .expect("failed to create pool");

    let mut conn = pool
        .claim(Some(Duration::from_secs(1)))
        .expect("failed to claim connection");

    conn.write_all(b"hello backend\n").expect("write failed");
    let mut reader = BufReader::new(
        conn.stream
            .as_ref()
            .unwrap()
            .try_clone()
            .expect("failed to clone stream"),
    );
    let mut line = String::new();
    reader.read_line(&mut line).expect("read failed");
    info!(log, "backend echoed: {}", line.trim_end());

    drop(conn);
    pool.close();
}
