//! Background speech recognition dispatch.
//!
//! Recognition runs on its own worker thread so the capture pipeline and
//! any UI loop stay responsive. The dispatcher validates its inputs before
//! spawning: a missing recognizer or an empty capture fails immediately
//! without starting a thread.

use crate::audio::CapturedAudio;
use crate::events::{CaptureEvent, EventHub};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one recognition pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Lower-confidence candidates, best first. Often empty.
    pub alternatives: Vec<String>,
}

/// A speech recognition backend. Implementations must tolerate being called
/// from a worker thread.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, audio: &CapturedAudio) -> anyhow::Result<RecognitionResult>;

    fn name(&self) -> &str {
        "recognizer"
    }
}

/// Terminal message of a recognition job. Exactly one is sent per dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionMessage {
    Finished(RecognitionResult),
    Failed(String),
}

/// Handle to an in-flight (or already-failed) recognition pass.
pub struct RecognitionJob {
    pub receiver: Receiver<RecognitionMessage>,
    pub handle: Option<JoinHandle<()>>,
}

impl RecognitionJob {
    /// Block until the job's terminal message arrives and the worker (if
    /// any) has exited.
    pub fn wait(mut self) -> RecognitionMessage {
        let message = self
            .receiver
            .recv()
            .unwrap_or_else(|_| RecognitionMessage::Failed("recognition worker vanished".to_string()));
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return RecognitionMessage::Failed("recognition worker panicked".to_string());
            }
        }
        message
    }
}

/// Hands captures to a recognizer off-thread and mirrors the outcome onto
/// the event hub.
#[derive(Clone, Default)]
pub struct RecognitionDispatcher {
    events: EventHub,
}

impl RecognitionDispatcher {
    pub fn new(events: EventHub) -> Self {
        Self { events }
    }

    /// Start a recognition pass. Validation failures produce a job whose
    /// message is already waiting and whose `handle` is `None`.
    pub fn dispatch(
        &self,
        audio: CapturedAudio,
        recognizer: Option<Arc<dyn Recognizer>>,
    ) -> RecognitionJob {
        let (sender, receiver) = sync_channel(1);

        let Some(recognizer) = recognizer else {
            return self.fail_now(receiver, sender, "no recognizer configured");
        };
        if audio.is_empty() {
            return self.fail_now(receiver, sender, "no audio captured");
        }

        let events = self.events.clone();
        let handle = std::thread::Builder::new()
            .name("recognition".to_string())
            .spawn(move || {
                debug!(
                    recognizer = recognizer.name(),
                    bytes = audio.bytes.len(),
                    duration_seconds = audio.duration_seconds,
                    "recognition started"
                );
                match recognizer.recognize(&audio) {
                    Ok(result) => {
                        events.emit(CaptureEvent::RecognitionFinished {
                            result: result.clone(),
                        });
                        let _ = sender.send(RecognitionMessage::Finished(result));
                    }
                    Err(err) => {
                        let message = format!("recognition failed: {err:#}");
                        warn!(%message, "recognition error");
                        events.emit(CaptureEvent::RecognitionFailed {
                            message: message.clone(),
                        });
                        let _ = sender.send(RecognitionMessage::Failed(message));
                    }
                }
            });

        match handle {
            Ok(handle) => RecognitionJob {
                receiver,
                handle: Some(handle),
            },
            Err(err) => {
                let (sender, receiver) = sync_channel(1);
                self.fail_now(
                    receiver,
                    sender,
                    &format!("failed to spawn recognition worker: {err}"),
                )
            }
        }
    }

    fn fail_now(
        &self,
        receiver: Receiver<RecognitionMessage>,
        sender: std::sync::mpsc::SyncSender<RecognitionMessage>,
        message: &str,
    ) -> RecognitionJob {
        warn!(message, "recognition rejected");
        self.events.emit(CaptureEvent::RecognitionFailed {
            message: message.to_string(),
        });
        let _ = sender.send(RecognitionMessage::Failed(message.to_string()));
        RecognitionJob {
            receiver,
            handle: None,
        }
    }
}
