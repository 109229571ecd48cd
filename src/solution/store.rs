//! Completed-result store.
//!
//! Keeps the most recent bundles keyed by frame id. A bundle can be taken
//! exactly once; the oldest one is evicted when the store is full.

use crate::data::FrameId;
use crate::pipeline::ResultBundle;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StoreState {
    /// Ascending by frame id
    bundles: VecDeque<(FrameId, ResultBundle)>,
    latest: Option<FrameId>,
    collected: u64,
    evicted: u64,
}

#[derive(Debug)]
pub struct ResultStore {
    capacity: usize,
    state: Mutex<StoreState>,
    arrived: Condvar,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(StoreState::default()),
            arrived: Condvar::new(),
        }
    }

    pub fn insert(&self, frame_id: FrameId, bundle: ResultBundle) {
        let evicted = {
            let mut state = self.state.lock();
            state.bundles.push_back((frame_id, bundle));
            state.latest = Some(frame_id);
            state.collected += 1;

            let mut evicted = Vec::new();
            while state.bundles.len() > self.capacity {
                if let Some(old) = state.bundles.pop_front() {
                    state.evicted += 1;
                    evicted.push(old);
                }
            }
            evicted
        };
        self.arrived.notify_all();

        for (id, mut bundle) in evicted {
            tracing::debug!("Result store full; evicted frame {}", id);
            bundle.recycle_images();
        }
    }

    /// Hand out the bundle for `frame_id`, once.
    pub fn take(&self, frame_id: FrameId) -> Option<ResultBundle> {
        let mut state = self.state.lock();
        let pos = state.bundles.iter().position(|(id, _)| *id == frame_id)?;
        state.bundles.remove(pos).map(|(_, bundle)| bundle)
    }

    /// Hand out the newest stored bundle.
    pub fn take_latest(&self) -> Option<ResultBundle> {
        self.state.lock().bundles.pop_back().map(|(_, bundle)| bundle)
    }

    /// Id of the most recently collected frame, taken or not
    pub fn latest_frame_id(&self) -> Option<FrameId> {
        self.state.lock().latest
    }

    /// Block until `frame_id` arrives or `timeout` passes.
    ///
    /// Returns `None` early if a later frame arrived and `frame_id` is not
    /// stored, since it can no longer come.
    pub fn wait_for(&self, frame_id: FrameId, timeout: Duration) -> Option<ResultBundle> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if let Some(pos) = state.bundles.iter().position(|(id, _)| *id == frame_id) {
                return state.bundles.remove(pos).map(|(_, bundle)| bundle);
            }
            if state.latest.is_some_and(|latest| latest >= frame_id) {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    self.arrived.wait_until(&mut state, deadline);
                }
                None => self.arrived.wait(&mut state),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bundles ever inserted
    pub fn collected(&self) -> u64 {
        self.state.lock().collected
    }

    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
