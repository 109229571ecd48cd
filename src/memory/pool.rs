//! Fixed-shape buffer pool
//!
//! All pool state sits behind one `parking_lot::Mutex`; `acquire` and the
//! return path are the only operations that mutate it. Waiters for a free
//! buffer park on a condvar that the return path signals.
//!
//! Buffers carry the pool generation they were allocated in. `resize` bumps
//! the generation, so buffers of the old shape that come back afterwards are
//! retired instead of re-pooled.

use crate::config::PoolConfig;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dimensions of an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl BufferShape {
    pub const fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of bytes in one buffer of this shape (8 bits per channel)
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl fmt::Display for BufferShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
    /// Buffers allocated for the free list over the pool's lifetime
    pub pooled_allocations: u64,
    /// Buffers handed out from outside the pool (shape mismatch or exhaustion)
    pub misses: u64,
    /// Pooled handles that came back by being dropped rather than released
    pub implicit_returns: u64,
    /// Returned buffers discarded instead of re-pooled
    pub retired: u64,
}

struct PoolState {
    shape: BufferShape,
    generation: u64,
    free: Vec<Vec<u8>>,
    in_use: usize,
    pooled_allocations: u64,
    misses: u64,
    implicit_returns: u64,
    retired: u64,
}

struct PoolShared {
    capacity: usize,
    zero_on_release: bool,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl PoolShared {
    fn give_back(&self, mut data: Vec<u8>, generation: u64, implicit: bool) {
        if self.zero_on_release {
            data.fill(0);
        }

        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);
        if implicit {
            state.implicit_returns += 1;
        }

        let stale = generation != state.generation || data.len() != state.shape.byte_len();
        if stale || state.free.len() >= self.capacity {
            state.retired += 1;
            return;
        }

        state.free.push(data);
        drop(state);
        self.returned.notify_one();
    }
}

/// Where a pooled buffer goes back to
struct Home {
    pool: Arc<PoolShared>,
    generation: u64,
}

/// Exclusive handle to an image buffer
///
/// Not `Clone`: copying pixels is an explicit [`PooledBuffer::duplicate`].
/// Dropping a pooled handle still returns its memory, but the pool counts it
/// as an implicit return.
#[must_use = "dropping a pooled buffer returns it implicitly; prefer BufferPool::release"]
pub struct PooledBuffer {
    data: Vec<u8>,
    shape: BufferShape,
    home: Option<Home>,
}

impl PooledBuffer {
    /// Allocate a zeroed buffer that belongs to no pool
    pub fn unpooled(shape: BufferShape) -> Self {
        Self {
            data: vec![0; shape.byte_len()],
            shape,
            home: None,
        }
    }

    /// Wrap existing pixel bytes; `None` if the length does not match the shape
    pub fn from_vec(shape: BufferShape, data: Vec<u8>) -> Option<Self> {
        (data.len() == shape.byte_len()).then_some(Self {
            data,
            shape,
            home: None,
        })
    }

    pub fn shape(&self) -> BufferShape {
        self.shape
    }

    /// Whether this buffer goes back to a pool when released
    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }

    /// Deep copy of the pixels
    ///
    /// Uses a free buffer from the same pool when one is immediately
    /// available, otherwise allocates directly.
    pub fn duplicate(&self) -> PooledBuffer {
        let pooled = self.home.as_ref().and_then(|home| {
            BufferPool {
                shared: Arc::clone(&home.pool),
            }
            .try_acquire_matching(self.shape)
        });

        let mut copy = pooled.unwrap_or_else(|| PooledBuffer::unpooled(self.shape));
        copy.data.copy_from_slice(&self.data);
        copy
    }

    /// Explicitly return the buffer to the pool it came from
    ///
    /// Unpooled buffers are simply freed.
    pub fn recycle(mut self) {
        if let Some(home) = self.home.take() {
            let data = std::mem::take(&mut self.data);
            home.pool.give_back(data, home.generation, false);
        }
    }

    fn belongs_to(&self, pool: &Arc<PoolShared>) -> bool {
        self.home
            .as_ref()
            .is_some_and(|home| Arc::ptr_eq(&home.pool, pool))
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("shape", &self.shape)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            tracing::debug!("Pooled {} buffer dropped without release", self.shape);
            let data = std::mem::take(&mut self.data);
            home.pool.give_back(data, home.generation, true);
        }
    }
}

/// Fixed-capacity, fixed-shape buffer allocator
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool and pre-allocate `capacity` buffers of `shape`
    pub fn new(capacity: usize, shape: BufferShape) -> Self {
        Self::with_zeroing(capacity, shape, true)
    }

    /// Like [`BufferPool::new`], choosing whether released buffers are zeroed
    pub fn with_zeroing(capacity: usize, shape: BufferShape, zero_on_release: bool) -> Self {
        let free: Vec<Vec<u8>> = (0..capacity).map(|_| vec![0; shape.byte_len()]).collect();

        tracing::debug!("Buffer pool created: {} x {}", capacity, shape);

        Self {
            shared: Arc::new(PoolShared {
                capacity,
                zero_on_release,
                state: Mutex::new(PoolState {
                    shape,
                    generation: 0,
                    free,
                    in_use: 0,
                    pooled_allocations: capacity as u64,
                    misses: 0,
                    implicit_returns: 0,
                    retired: 0,
                }),
                returned: Condvar::new(),
            }),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::with_zeroing(config.capacity, config.shape(), config.zero_on_release)
    }

    /// Take a buffer from the free list
    ///
    /// `Some(Duration::ZERO)` never blocks, `None` waits indefinitely.
    /// Returns `None` if no buffer became free before the timeout.
    pub fn acquire(&self, timeout: Option<Duration>) -> Option<PooledBuffer> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.shared.state.lock();

        loop {
            if let Some(data) = state.free.pop() {
                state.in_use += 1;
                return Some(PooledBuffer {
                    data,
                    shape: state.shape,
                    home: Some(Home {
                        pool: Arc::clone(&self.shared),
                        generation: state.generation,
                    }),
                });
            }

            match deadline {
                None => self.shared.returned.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    self.shared.returned.wait_until(&mut state, deadline);
                }
            }
        }
    }

    /// Acquire a buffer of an explicit shape
    ///
    /// A shape other than the configured one is a pool miss: the caller gets
    /// a directly allocated buffer and a warning is logged.
    pub fn acquire_shaped(
        &self,
        shape: BufferShape,
        timeout: Option<Duration>,
    ) -> Option<PooledBuffer> {
        let configured = self.shape();
        if shape != configured {
            tracing::warn!(
                "Pool miss: requested {} but pool holds {}; allocating directly",
                shape,
                configured
            );
            self.shared.state.lock().misses += 1;
            return Some(PooledBuffer::unpooled(shape));
        }
        self.acquire(timeout)
    }

    /// Acquire, falling back to a direct allocation when the pool stays empty
    pub fn acquire_or_allocate(&self, timeout: Option<Duration>) -> PooledBuffer {
        if let Some(buffer) = self.acquire(timeout) {
            return buffer;
        }

        let shape = {
            let mut state = self.shared.state.lock();
            state.misses += 1;
            state.shape
        };
        tracing::warn!(
            "Buffer pool exhausted ({} in use); allocating {} directly",
            self.in_use_count(),
            shape
        );
        PooledBuffer::unpooled(shape)
    }

    fn try_acquire_matching(&self, shape: BufferShape) -> Option<PooledBuffer> {
        if self.shape() != shape {
            return None;
        }
        self.acquire(Some(Duration::ZERO))
    }

    /// Return a buffer to the free list
    ///
    /// A buffer that did not come from this pool is left untouched and handed
    /// back in `Err`.
    pub fn release(&self, mut buffer: PooledBuffer) -> Result<(), PooledBuffer> {
        if !buffer.belongs_to(&self.shared) {
            tracing::debug!("Ignoring release of a {} buffer not owned by this pool", buffer.shape);
            return Err(buffer);
        }

        if let Some(home) = buffer.home.take() {
            let data = std::mem::take(&mut buffer.data);
            self.shared.give_back(data, home.generation, false);
        }
        Ok(())
    }

    /// Drain the free list and reallocate it for a new shape
    ///
    /// Outstanding buffers of the previous shape stay valid for their holders
    /// and are retired when they come back.
    pub fn resize(&self, shape: BufferShape) {
        let capacity = self.shared.capacity;
        let fresh: Vec<Vec<u8>> = (0..capacity).map(|_| vec![0; shape.byte_len()]).collect();

        let mut state = self.shared.state.lock();
        let previous = state.shape;
        state.shape = shape;
        state.generation += 1;
        state.free = fresh;
        state.pooled_allocations += capacity as u64;
        drop(state);

        tracing::info!("Buffer pool resized from {} to {}", previous, shape);
        self.shared.returned.notify_all();
    }

    pub fn available_count(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.shared.state.lock().in_use
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn shape(&self) -> BufferShape {
        self.shared.state.lock().shape
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            capacity: self.shared.capacity,
            available: state.free.len(),
            in_use: state.in_use,
            pooled_allocations: state.pooled_allocations,
            misses: state.misses,
            implicit_returns: state.implicit_returns,
            retired: state.retired,
        }
    }

    /// Whether two handles refer to the same pool
    pub fn same_pool(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("BufferPool")
            .field("shape", &self.shape())
            .field("capacity", &stats.capacity)
            .field("available", &stats.available)
            .field("in_use", &stats.in_use)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    const SMALL: BufferShape = BufferShape::new(4, 4, 1);

    #[test]
    fn test_capacity_two_third_acquire_fails() {
        let pool = BufferPool::new(2, SMALL);

        let a = pool.acquire(Some(Duration::ZERO));
        let b = pool.acquire(Some(Duration::ZERO));
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(pool.acquire(Some(Duration::ZERO)).is_none());

        assert_eq!(pool.available_count(), 0);
        assert_eq!(pool.in_use_count(), 2);

        pool.release(a.unwrap()).unwrap();
        pool.release(b.unwrap()).unwrap();
        assert_eq!(pool.available_count(), 2);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_release_zeroes_buffer() {
        let pool = BufferPool::new(1, SMALL);
        let mut buffer = pool.acquire(Some(Duration::ZERO)).unwrap();
        buffer.fill(0xAB);
        pool.release(buffer).unwrap();

        let again = pool.acquire(Some(Duration::ZERO)).unwrap();
        assert!(again.iter().all(|&b| b == 0));
        pool.release(again).unwrap();
    }

    #[test]
    fn test_release_without_zeroing_keeps_bytes() {
        let pool = BufferPool::with_zeroing(1, SMALL, false);
        let mut buffer = pool.acquire(Some(Duration::ZERO)).unwrap();
        buffer[0] = 9;
        pool.release(buffer).unwrap();

        let again = pool.acquire(Some(Duration::ZERO)).unwrap();
        assert_eq!(again[0], 9);
        pool.release(again).unwrap();
    }

    #[test]
    fn test_foreign_release_is_noop() {
        let pool = BufferPool::new(1, SMALL);
        let other = BufferPool::new(1, SMALL);

        let foreign = other.acquire(Some(Duration::ZERO)).unwrap();
        let handed_back = pool.release(foreign).unwrap_err();
        assert_eq!(pool.available_count(), 1);
        assert_eq!(other.in_use_count(), 1);

        other.release(handed_back).unwrap();
        assert!(pool.release(PooledBuffer::unpooled(SMALL)).is_err());
    }

    #[test]
    fn test_drop_counts_implicit_return() {
        let pool = BufferPool::new(1, SMALL);
        {
            let _buffer = pool.acquire(Some(Duration::ZERO)).unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.implicit_returns, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn test_recycle_is_explicit_return() {
        let pool = BufferPool::new(1, SMALL);
        pool.acquire(Some(Duration::ZERO)).unwrap().recycle();
        let stats = pool.stats();
        assert_eq!(stats.implicit_returns, 0);
        assert_eq!(stats.available, 1);
    }

    #[test]
    fn test_shape_mismatch_is_pool_miss() {
        let pool = BufferPool::new(1, SMALL);
        let big = pool
            .acquire_shaped(BufferShape::new(8, 8, 3), Some(Duration::ZERO))
            .unwrap();
        assert!(!big.is_pooled());
        assert_eq!(big.len(), 192);
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_acquire_or_allocate_falls_back() {
        let pool = BufferPool::new(1, SMALL);
        let held = pool.acquire_or_allocate(Some(Duration::ZERO));
        let extra = pool.acquire_or_allocate(Some(Duration::ZERO));
        assert!(held.is_pooled());
        assert!(!extra.is_pooled());
        assert_eq!(pool.stats().misses, 1);
        pool.release(held).unwrap();
    }

    #[test]
    fn test_resize_retires_old_buffers() {
        let pool = BufferPool::new(2, SMALL);
        let old = pool.acquire(Some(Duration::ZERO)).unwrap();

        let bigger = BufferShape::new(8, 8, 1);
        pool.resize(bigger);
        assert_eq!(pool.available_count(), 2);
        assert_eq!(pool.shape(), bigger);

        // Holder keeps a usable old-shape buffer
        assert_eq!(old.len(), 16);
        pool.release(old).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.in_use, 0);

        let fresh = pool.acquire(Some(Duration::ZERO)).unwrap();
        assert_eq!(fresh.shape(), bigger);
        assert_eq!(fresh.len(), 64);
        pool.release(fresh).unwrap();
    }

    #[test]
    fn test_blocking_acquire_wakes_on_release() {
        let pool = BufferPool::new(1, SMALL);
        let held = pool.acquire(Some(Duration::ZERO)).unwrap();

        let releaser = {
            let pool = pool.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pool.release(held).unwrap();
            })
        };

        let got = pool.acquire(Some(Duration::from_secs(5)));
        assert!(got.is_some());
        releaser.join().unwrap();
        pool.release(got.unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_timeout_elapses() {
        let pool = BufferPool::new(1, SMALL);
        let _held = pool.acquire(Some(Duration::ZERO)).unwrap();

        let start = Instant::now();
        assert!(pool.acquire(Some(Duration::from_millis(30))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_duplicate_uses_pool_when_free() {
        let pool = BufferPool::new(2, SMALL);
        let mut original = pool.acquire(Some(Duration::ZERO)).unwrap();
        original[3] = 42;

        let copy = original.duplicate();
        assert!(copy.is_pooled());
        assert_eq!(copy[3], 42);
        assert_eq!(pool.in_use_count(), 2);

        // Pool is now empty, so a further copy is allocated directly
        let overflow = copy.duplicate();
        assert!(!overflow.is_pooled());
        assert_eq!(overflow[3], 42);

        pool.release(original).unwrap();
        pool.release(copy).unwrap();
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(PooledBuffer::from_vec(SMALL, vec![0; 16]).is_some());
        assert!(PooledBuffer::from_vec(SMALL, vec![0; 15]).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Sequences that never hold more than `capacity` buffers are always
        /// served from the pre-allocated set.
        #[test]
        fn prop_never_allocates_beyond_capacity(
            capacity in 1usize..6,
            ops in prop::collection::vec(any::<bool>(), 0..64),
        ) {
            let pool = BufferPool::new(capacity, SMALL);
            let mut held = Vec::new();

            for acquire in ops {
                if acquire && held.len() < capacity {
                    let buffer = pool.acquire(Some(Duration::ZERO));
                    prop_assert!(buffer.is_some());
                    held.push(buffer.unwrap());
                } else if let Some(buffer) = held.pop() {
                    prop_assert!(pool.release(buffer).is_ok());
                }
                prop_assert_eq!(pool.in_use_count(), held.len());
                prop_assert_eq!(pool.available_count(), capacity - held.len());
            }

            let stats = pool.stats();
            prop_assert_eq!(stats.pooled_allocations, capacity as u64);
            prop_assert_eq!(stats.misses, 0);
            for buffer in held {
                pool.release(buffer).unwrap();
            }
        }
    }
}
