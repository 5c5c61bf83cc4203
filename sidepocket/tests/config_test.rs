// Copyright 2020 Joyent, Inc.

use std::time::Duration;

use sidepocket::connection_pool::types::PoolConfig;

#[test]
fn defaults_fill_in_unset_sizes() {
    let config = PoolConfig::default().normalize();

    assert_eq!(config.max_open_size, 50);
    assert_eq!(config.min_idle_size, 5);
    assert_eq!(config.max_idle_size, 5);
    assert_eq!(config.max_idle_time, Some(Duration::from_secs(600)));
    assert_eq!(config.max_life_time, None);
    assert_eq!(config.balance_interval, None);
}

#[test]
fn min_idle_clamped_to_capacity() {
    let config = PoolConfig {
        min_idle_size: 20,
        max_idle_size: 30,
        max_open_size: 8,
        ..Default::default()
    }
    .normalize();

    assert_eq!(config.min_idle_size, 8);
    assert_eq!(config.max_open_size, 8);
}

#[test]
fn watermark_band_is_well_formed() {
    // A high watermark below the low one would make the balancer trim
    // what it just topped up
    let config = PoolConfig {
        min_idle_size: 6,
        max_idle_size: 2,
        max_open_size: 10,
        ..Default::default()
    }
    .normalize();

    assert_eq!(config.min_idle_size, 6);
    assert_eq!(config.max_idle_size, 6);
}

#[test]
fn zero_durations_mean_unset() {
    let config = PoolConfig {
        max_idle_time: Some(Duration::from_secs(0)),
        max_life_time: Some(Duration::from_secs(0)),
        balance_interval: Some(Duration::from_secs(0)),
        ..Default::default()
    }
    .normalize();

    assert_eq!(config.max_idle_time, None);
    assert_eq!(config.max_life_time, None);
    assert_eq!(config.balance_interval, None);
}

#[test]
fn explicit_sizes_survive_normalization() {
    let config = PoolConfig {
        min_idle_size: 3,
        max_idle_size: 7,
        max_open_size: 12,
        ..Default::default()
    }
    .normalize();

    assert_eq!(config.min_idle_size, 3);
    assert_eq!(config.max_idle_size, 7);
    assert_eq!(config.max_open_size, 12);
}
