//! Solution events.
//!
//! Subscribers get a bounded channel each. A subscriber that stops reading
//! misses events instead of stalling the engine; a dropped receiver is
//! forgotten on the next emit.

use crate::data::FrameId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;

/// Channel capacity per subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SolutionEvent {
    RunStarted,
    RunCompleted { elapsed_us: u64, failures: usize },
    PipelineStarted { stages: usize },
    PipelineStopped { discarded: usize },
    FrameCompleted { frame_id: FrameId, success: bool },
    PipelineFailed { message: String },
    ContinuousStarted { interval_ms: u64 },
    ContinuousStopped { runs: u64 },
    /// A tool panicked inside the run loop; the loop has exited
    ContinuousFailed { message: String },
}

#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<SolutionEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SolutionEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: SolutionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!("Subscriber lagging; dropped {:?}", event);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_live_subscribers() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);

        hub.emit(SolutionEvent::RunStarted);
        assert_eq!(rx.try_recv(), Ok(SolutionEvent::RunStarted));
        assert_eq!(hub.subscriber_count(), 1);
    }
}
