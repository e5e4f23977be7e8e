//! Capture event fanout.
//!
//! Listeners subscribe for a channel receiver instead of registering
//! callbacks, so emitters never hold references into consumer threads and
//! teardown cannot race a notification in flight. Per-listener emission
//! order follows emission order; a listener that falls behind only delays
//! itself.

use crate::recognition::RecognitionResult;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Events emitted by the capture pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    SessionStarted,
    SessionStopped { error: Option<String> },
    /// Rate-limited live volume, always within [0, 1].
    VolumeChanged { level: f32 },
    RecognitionFinished { result: RecognitionResult },
    RecognitionFailed { message: String },
}

/// One listener's handle: drop it (or call `EventHub::unsubscribe`) to stop
/// receiving events.
pub struct EventSubscription {
    pub id: u64,
    pub receiver: Receiver<CaptureEvent>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    senders: Vec<(u64, Sender<CaptureEvent>)>,
}

/// Shared event dispatcher. Cloning shares the subscriber list; emit never
/// blocks the producer.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.senders.push((id, sender));
        EventSubscription { id, receiver }
    }

    /// Returns false when the id was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.senders.len();
        inner.senders.retain(|(sub_id, _)| *sub_id != id);
        inner.senders.len() != before
    }

    pub fn emit(&self, event: CaptureEvent) {
        let mut inner = self.lock();
        inner
            .senders
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
