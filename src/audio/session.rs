//! Capture session: one native input stream bridged to the circular buffer
//! behind a small state machine.
//!
//! The driver callback never touches the buffer. It checks an atomic active
//! flag and pushes blocks into a bounded channel; the session's worker
//! thread is the sole buffer mutator. That removes the classic teardown
//! hazard where a callback still in flight dereferences listener state that
//! `stop()` already invalidated; there is nothing shared to invalidate.
//!
//! Teardown order, driven by the worker after `stop()` flips the active
//! flag: stop the native stream (the driver guarantees no further callbacks
//! once `stop` returns), drain blocks already queued, close the stream,
//! publish the terminal state, then acknowledge to the `stop()` caller. The
//! caller's wait is bounded; on timeout the worker is detached and resources
//! are released by drop rather than deadlocking.

use super::buffer::CircularAudioBuffer;
use super::driver::{CallbackFlow, DriverCallback, DriverEvent, InputDriver};
use super::format::{AudioFormat, CapturedAudio};
use super::meter::{block_level, LiveLevel};
use crate::config::CaptureConfig;
use crate::events::{CaptureEvent, EventHub};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the worker re-checks the active flag when no audio arrives.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Capture session lifecycle.
///
/// ```text
/// Idle → Starting → Running → Stopping → Stopped
///           ↓          ↓
///         Failed     Failed
/// ```
///
/// Stopped and Failed are terminal; the only path out of Running is through
/// Stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl CaptureSessionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// State shared between the session handle and its worker thread.
///
/// `state` and the `active` flag flip under the same lock so two threads can
/// never conclude different lifecycle states concurrently; the buffer has
/// its own short-critical-section lock because snapshots may be taken from
/// other threads while the worker appends.
struct SessionShared {
    state: Mutex<CaptureSessionState>,
    active: AtomicBool,
    buffer: Mutex<CircularAudioBuffer>,
    level: LiveLevel,
    error: Mutex<Option<String>>,
    dropped_blocks: AtomicUsize,
}

impl SessionShared {
    fn lock_state(&self) -> MutexGuard<'_, CaptureSessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_buffer(&self) -> MutexGuard<'_, CircularAudioBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_error(&self, message: String) {
        let mut slot = self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.get_or_insert(message);
    }
}

/// One recording. Created Idle, started once, destroyed after `stop()`
/// completes: the controller extracts the audio and drops the session so
/// no state can leak into the next recording.
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    driver: Arc<dyn InputDriver>,
    device_index: Option<usize>,
    config: CaptureConfig,
    events: EventHub,
    worker: Option<JoinHandle<()>>,
    ack_rx: Option<Receiver<()>>,
    started_at: Option<Instant>,
}

impl CaptureSession {
    pub fn new(
        driver: Arc<dyn InputDriver>,
        device_index: Option<usize>,
        config: CaptureConfig,
        events: EventHub,
    ) -> Self {
        let buffer = CircularAudioBuffer::new(config.max_buffer_seconds, config.format);
        Self {
            shared: Arc::new(SessionShared {
                state: Mutex::new(CaptureSessionState::Idle),
                active: AtomicBool::new(false),
                buffer: Mutex::new(buffer),
                level: LiveLevel::new(),
                error: Mutex::new(None),
                dropped_blocks: AtomicUsize::new(0),
            }),
            driver,
            device_index,
            config,
            events,
            worker: None,
            ack_rx: None,
            started_at: None,
        }
    }

    /// Begin capturing. No-op returning false outside Idle.
    pub fn start(&mut self) -> bool {
        {
            let mut state = self.shared.lock_state();
            if *state != CaptureSessionState::Idle {
                return false;
            }
            *state = CaptureSessionState::Starting;
            self.shared.active.store(true, Ordering::Release);
        }

        let (ack_tx, ack_rx) = bounded::<()>(1);
        let shared = self.shared.clone();
        let driver = self.driver.clone();
        let device_index = self.device_index;
        let config = self.config.clone();
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("capture-session".to_string())
            .spawn(move || run_capture(shared, driver, device_index, config, events, ack_tx));
        match handle {
            Ok(handle) => {
                self.worker = Some(handle);
                self.ack_rx = Some(ack_rx);
                self.started_at = Some(Instant::now());
                true
            }
            Err(err) => {
                let message = format!("failed to spawn capture worker: {err}");
                self.shared.record_error(message.clone());
                *self.shared.lock_state() = CaptureSessionState::Failed;
                self.shared.active.store(false, Ordering::Release);
                self.events.emit(CaptureEvent::SessionStopped {
                    error: Some(message),
                });
                false
            }
        }
    }

    /// Request a cooperative stop and wait, bounded by the configured
    /// timeout, for the worker to finish teardown. No-op returning false
    /// outside Starting/Running.
    pub fn stop(&mut self) -> bool {
        {
            let mut state = self.shared.lock_state();
            match *state {
                CaptureSessionState::Starting | CaptureSessionState::Running => {
                    *state = CaptureSessionState::Stopping;
                    self.shared.active.store(false, Ordering::Release);
                }
                _ => return false,
            }
        }

        let timeout = self.config.stop_timeout();
        let acknowledged = match self.ack_rx.as_ref() {
            Some(ack_rx) => ack_rx.recv_timeout(timeout).is_ok(),
            None => false,
        };
        if acknowledged {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        } else {
            // Force-release: detach the worker instead of deadlocking. Its
            // resources go away when the thread eventually exits.
            warn!(
                timeout_ms = self.config.stop_timeout_ms,
                "driver did not confirm stream stop in time; releasing capture resources"
            );
            self.worker.take();
            let mut state = self.shared.lock_state();
            if !state.is_terminal() {
                *state = CaptureSessionState::Stopped;
            }
        }
        true
    }

    pub fn state(&self) -> CaptureSessionState {
        *self.shared.lock_state()
    }

    pub fn error(&self) -> Option<String> {
        self.shared
            .error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current volume level in [0, 1].
    pub fn level(&self) -> f32 {
        self.shared.level.get()
    }

    /// Wall-clock seconds since the session started, 0 when not active.
    pub fn live_duration(&self) -> f64 {
        if !self.state().is_active() {
            return 0.0;
        }
        self.started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Point-in-time extraction of everything recorded so far. After the
    /// session stops this is the finalized capture; on a Failed session it
    /// holds every block up to the last successful append.
    pub fn captured_audio(&self) -> CapturedAudio {
        let bytes = self.shared.lock_buffer().snapshot();
        CapturedAudio::from_bytes(bytes, self.config.format)
    }

    /// Time-bounded suffix of the buffered audio.
    pub fn last_seconds(&self, seconds: f64) -> Vec<u8> {
        self.shared.lock_buffer().last_seconds(seconds)
    }

    /// Blocks the driver delivered that the bounded channel had no room for.
    pub fn dropped_blocks(&self) -> usize {
        self.shared.dropped_blocks.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> AudioFormat {
        self.config.format
    }
}

/// Worker body: open the stream, pump blocks from the bounded channel into
/// the buffer, then run the ordered teardown.
fn run_capture(
    shared: Arc<SessionShared>,
    driver: Arc<dyn InputDriver>,
    device_index: Option<usize>,
    config: CaptureConfig,
    events: EventHub,
    ack_tx: crossbeam_channel::Sender<()>,
) {
    let format = config.format;
    let (block_tx, block_rx) = bounded::<DriverEvent>(config.channel_capacity);

    let callback: DriverCallback = {
        let shared = shared.clone();
        Box::new(move |event| {
            // Cheap atomic check first: once stop is requested the callback
            // does no further work and tells the driver to wind down.
            if !shared.active.load(Ordering::Acquire) {
                return CallbackFlow::Complete;
            }
            match event {
                DriverEvent::Block(block) => match block_tx.try_send(DriverEvent::Block(block)) {
                    Ok(()) => CallbackFlow::Continue,
                    Err(TrySendError::Full(_)) => {
                        shared.dropped_blocks.fetch_add(1, Ordering::Relaxed);
                        CallbackFlow::Continue
                    }
                    Err(TrySendError::Disconnected(_)) => CallbackFlow::Complete,
                },
                error @ DriverEvent::Error(_) => {
                    let _ = block_tx.try_send(error);
                    CallbackFlow::Complete
                }
            }
        })
    };

    let mut stream = match driver.open_input(device_index, &format, config.chunk_frames, callback) {
        Ok(stream) => stream,
        Err(err) => {
            fail(&shared, &events, format!("{err}"), &ack_tx);
            return;
        }
    };
    if let Err(err) = stream.start() {
        fail(&shared, &events, format!("{err}"), &ack_tx);
        return;
    }

    // stop() may already have been requested while we were opening; only
    // then skip straight to teardown instead of entering Running.
    let entered_running = {
        let mut state = shared.lock_state();
        if *state == CaptureSessionState::Starting && shared.active.load(Ordering::Acquire) {
            *state = CaptureSessionState::Running;
            true
        } else {
            false
        }
    };
    if entered_running {
        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "capture session running"
        );
        events.emit(CaptureEvent::SessionStarted);
    }

    let volume_interval = config.volume_interval();
    let mut last_volume_emit: Option<Instant> = None;
    let mut failure: Option<String> = None;

    while shared.active.load(Ordering::Acquire) {
        match block_rx.recv_timeout(IDLE_POLL) {
            Ok(DriverEvent::Block(block)) => {
                let level = block_level(&block, &format);
                shared.lock_buffer().append(block);
                shared.level.set(level);
                let due = last_volume_emit
                    .map(|at| at.elapsed() >= volume_interval)
                    .unwrap_or(true);
                if due {
                    last_volume_emit = Some(Instant::now());
                    events.emit(CaptureEvent::VolumeChanged { level });
                }
            }
            Ok(DriverEvent::Error(message)) => {
                failure = Some(message);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Teardown. Flag first so the callback goes quiet, then wait for the
    // driver to confirm via stop(), then drain what already arrived so a
    // mid-stream failure still preserves every appended block.
    shared.active.store(false, Ordering::Release);
    if let Err(err) = stream.stop() {
        warn!(%err, "error while stopping input stream");
        failure.get_or_insert_with(|| err.to_string());
    }
    drop(stream);
    while let Ok(event) = block_rx.try_recv() {
        if let DriverEvent::Block(block) = event {
            shared.lock_buffer().append(block);
        }
    }
    shared.level.set(0.0);

    let captured_bytes = shared.lock_buffer().len_bytes();
    let dropped = shared.dropped_blocks.load(Ordering::Relaxed);
    debug!(
        captured_bytes,
        dropped, "capture session finished"
    );

    if let Some(message) = &failure {
        shared.record_error(message.clone());
    }
    {
        let mut state = shared.lock_state();
        *state = if failure.is_some() {
            CaptureSessionState::Failed
        } else {
            CaptureSessionState::Stopped
        };
    }
    events.emit(CaptureEvent::SessionStopped { error: failure });
    let _ = ack_tx.try_send(());
}

/// Open/start failure path: Failed state, descriptive error, no retry.
fn fail(
    shared: &Arc<SessionShared>,
    events: &EventHub,
    message: String,
    ack_tx: &crossbeam_channel::Sender<()>,
) {
    warn!(%message, "capture session failed");
    shared.record_error(message.clone());
    shared.active.store(false, Ordering::Release);
    *shared.lock_state() = CaptureSessionState::Failed;
    shared.level.set(0.0);
    events.emit(CaptureEvent::SessionStopped {
        error: Some(message),
    });
    let _ = ack_tx.try_send(());
}
