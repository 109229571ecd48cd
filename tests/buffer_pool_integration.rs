//! Integration tests for the buffer pool across threads

mod common;

use common::builders::{pool, SHAPE};
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};
use vischain_rs::ImageData;

#[test]
fn test_exhausted_pool_does_not_block_with_zero_timeout() {
    let pool = pool(2);

    let first = pool.acquire(None);
    let second = pool.acquire(None);
    assert!(first.is_some());
    assert!(second.is_some());
    assert!(pool.acquire(Some(Duration::ZERO)).is_none());

    assert!(pool.release(first.unwrap()).is_ok());
    assert!(pool.acquire(Some(Duration::ZERO)).is_some());
    assert_eq!(pool.stats().misses, 0);
}

#[test]
#[serial]
fn test_release_from_another_thread_wakes_waiter() {
    let pool = pool(1);
    let held = pool.acquire(None).unwrap();

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        held.recycle();
    });

    let started = Instant::now();
    let buffer = pool.acquire(Some(common::test_timeout()));
    assert!(buffer.is_some());
    assert!(started.elapsed() >= Duration::from_millis(20));
    releaser.join().unwrap();
}

#[test]
fn test_dropped_images_return_to_pool() {
    let pool = pool(2);
    {
        let _a = ImageData::from_pool(&pool, None);
        let _b = ImageData::from_pool(&pool, None);
        assert_eq!(pool.in_use_count(), 2);
    }

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, 2);
    assert_eq!(stats.implicit_returns, 2);
}

#[test]
fn test_duplicate_of_unpooled_image_stays_unpooled() {
    let pool = pool(1);
    let image = ImageData::filled(SHAPE, 9);
    let copy = image.duplicate();

    assert!(!copy.is_pooled());
    assert_eq!(copy, image);
    assert_eq!(pool.in_use_count(), 0);
}
