// Copyright 2020 Joyent, Inc.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use slog::{info, o, Drain, Logger};

use sidepocket::connection::Connection;
use sidepocket::connection_pool::types::PoolConfig;
use sidepocket::connection_pool::ConnectionPool;

const CLAIM_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct DummyConnection {
    addr: String,
    connected: bool,
    created_at: Instant,
}

impl DummyConnection {
    fn new(config: &PoolConfig) -> Self {
        DummyConnection {
            addr: config.address.clone(),
            connected: false,
            created_at: Instant::now(),
        }
    }
}

impl Connection for DummyConnection {
    type Error = std::io::Error;

    fn open(&mut self) -> Result<(), Self::Error> {
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected
    }

    fn is_overdue(&self, max_life_time: Duration) -> bool {
        self.created_at.elapsed() > max_life_time
    }
}

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    info!(log, "running basic sidepocket example");

    let config = PoolConfig {
        address: String::from("127.0.0.1:55555"),
        min_idle_size: 3,
        max_idle_size: 3,
        max_open_size: 3,
        log: Some(log.clone()),
        ..Default::default()
    };

    let pool = Arc::new(
        ConnectionPool::new(config, |config: &PoolConfig| {
            Ok(DummyConnection::new(config))
        })
        .expect("failed to create pool"),
    );

    // Check out every connection in the pool and hold them all at once
    let hold = Arc::new(Barrier::new(4));
    let release = Arc::new(Barrier::new(4));
    let mut workers = vec![];
    for id in 0..3 {
        let pool = Arc::clone(&pool);
        let hold = Arc::clone(&hold);
        let release = Arc::clone(&release);
        let log = log.clone();
        workers.push(thread::spawn(move || {
            let conn = pool
                .claim(Some(CLAIM_WAIT))
                .expect("failed to claim connection");
            info!(
                log,
                "worker {} claimed a connection to {}", id, conn.addr
            );
            hold.wait();
            release.wait();
            // The connection goes back to the pool when the claim guard
            // falls out of scope here
        }));
    }

    hold.wait();

    // Every connection is checked out, so nothing is immediately available
    assert!(pool.try_get().is_none());

    // and a waiting claim gives up once its deadline passes
    let start = Instant::now();
    assert!(pool.get(Some(CLAIM_WAIT)).is_err());
    info!(log, "starved claim timed out after {:?}", start.elapsed());

    if let Some(stats) = pool.stats() {
        info!(log, "pool stats";
            "idle" => %stats.idle_connections,
            "in_use" => %stats.in_use_connections);
    }

    release.wait();
    for worker in workers {
        let _ = worker.join();
    }

    let conn = pool.try_get().expect("no idle connection after release");
    info!(log, "claimed a connection to {}", conn.addr);
    pool.put(conn).expect("failed to return connection");

    pool.close();
    info!(log, "pool closed"; "state" => %pool.state());
}
