//! Session and controller tests against a scripted fake driver.

use super::buffer::CircularAudioBuffer;
use super::driver::{CallbackFlow, DeviceInfo, DriverCallback, DriverEvent, InputDriver, InputStream};
use super::format::AudioFormat;
use super::session::{CaptureSession, CaptureSessionState};
use crate::config::CaptureConfig;
use crate::controller::CaptureController;
use crate::events::{CaptureEvent, EventHub};
use crate::error::{CaptureError, Result};
use crate::recognition::RecognitionMessage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Driver that replays scripted blocks on a feeder thread.
#[derive(Default)]
struct FakeDriver {
    devices: Vec<DeviceInfo>,
    blocks: Vec<Vec<u8>>,
    block_interval: Duration,
    /// Blocks delivered back-to-back inside `InputStream::start`, before the
    /// session worker gets a chance to drain its channel.
    burst_in_start: Vec<Vec<u8>>,
    fail_open: bool,
    /// Deliver a stream error after this many blocks.
    error_after: Option<usize>,
    /// Delay inside `InputStream::stop`, to exercise the stop timeout.
    stop_delay: Duration,
    opened: AtomicUsize,
}

impl FakeDriver {
    fn with_blocks(blocks: Vec<Vec<u8>>) -> Self {
        Self {
            devices: vec![fake_device(0)],
            blocks,
            block_interval: Duration::from_millis(2),
            ..Self::default()
        }
    }
}

fn fake_device(index: usize) -> DeviceInfo {
    DeviceInfo {
        index,
        name: format!("fake input {index}"),
        max_input_channels: 1,
        default_sample_rate: 16_000,
    }
}

impl InputDriver for FakeDriver {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open_input(
        &self,
        _device_index: Option<usize>,
        _format: &AudioFormat,
        _chunk_frames: usize,
        callback: DriverCallback,
    ) -> Result<Box<dyn InputStream>> {
        if self.fail_open {
            return Err(CaptureError::DeviceUnavailable {
                message: "fake device refused to open".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FakeStream {
            callback: Some(callback),
            blocks: self.blocks.clone(),
            burst_in_start: self.burst_in_start.clone(),
            block_interval: self.block_interval,
            error_after: self.error_after,
            stop_delay: self.stop_delay,
            running: Arc::new(AtomicBool::new(false)),
            feeder: None,
            live_callback: None,
        }))
    }
}

struct FakeStream {
    callback: Option<DriverCallback>,
    blocks: Vec<Vec<u8>>,
    burst_in_start: Vec<Vec<u8>>,
    block_interval: Duration,
    error_after: Option<usize>,
    stop_delay: Duration,
    running: Arc<AtomicBool>,
    feeder: Option<thread::JoinHandle<()>>,
    /// Keeps the session callback alive until the stream is dropped, like
    /// the cpal driver where the stream owns the callback. Dropping it when
    /// the feeder's script runs out would disconnect the session's channel
    /// and end the session without a stop.
    live_callback: Option<Arc<Mutex<DriverCallback>>>,
}

impl InputStream for FakeStream {
    fn start(&mut self) -> Result<()> {
        let Some(callback) = self.callback.take() else {
            return Err(CaptureError::StreamInterrupted {
                message: "fake stream started twice".to_string(),
            });
        };
        let callback = Arc::new(Mutex::new(callback));
        self.live_callback = Some(callback.clone());
        for block in self.burst_in_start.drain(..) {
            let _ = (callback.lock().unwrap())(DriverEvent::Block(block));
        }
        let blocks = self.blocks.clone();
        let interval = self.block_interval;
        let error_after = self.error_after;
        let running = self.running.clone();
        running.store(true, Ordering::Release);
        self.feeder = Some(thread::spawn(move || {
            for (delivered, block) in blocks.into_iter().enumerate() {
                if !running.load(Ordering::Acquire) {
                    return;
                }
                if error_after == Some(delivered) {
                    let _ =
                        (callback.lock().unwrap())(DriverEvent::Error("fake stream error".to_string()));
                    return;
                }
                thread::sleep(interval);
                if (callback.lock().unwrap())(DriverEvent::Block(block)) == CallbackFlow::Complete {
                    return;
                }
            }
            if error_after.is_some() {
                let _ =
                    (callback.lock().unwrap())(DriverEvent::Error("fake stream error".to_string()));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.stop_delay.is_zero() {
            thread::sleep(self.stop_delay);
        }
        self.running.store(false, Ordering::Release);
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        Ok(())
    }
}

fn test_config() -> CaptureConfig {
    CaptureConfig {
        volume_interval_ms: 1,
        ..CaptureConfig::default()
    }
}

fn scripted_blocks(count: usize, block_bytes: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let sample = (i as i16 + 1) * 100;
            sample
                .to_le_bytes()
                .iter()
                .copied()
                .cycle()
                .take(block_bytes)
                .collect()
        })
        .collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn scripted_blocks_arrive_in_order() {
    let blocks = scripted_blocks(5, 32);
    let expected: Vec<u8> = blocks.iter().flatten().copied().collect();
    let driver = Arc::new(FakeDriver::with_blocks(blocks));
    let events = EventHub::new();
    let sub = events.subscribe();
    let mut session = CaptureSession::new(driver, Some(0), test_config(), events);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || {
        session.captured_audio().bytes.len() >= expected.len()
    }));
    assert!(session.stop());

    assert_eq!(session.state(), CaptureSessionState::Stopped);
    assert_eq!(session.captured_audio().bytes, expected);
    assert_eq!(session.dropped_blocks(), 0);

    let received: Vec<CaptureEvent> = sub.receiver.try_iter().collect();
    assert_eq!(received.first(), Some(&CaptureEvent::SessionStarted));
    assert_eq!(
        received.last(),
        Some(&CaptureEvent::SessionStopped { error: None })
    );
}

#[test]
fn start_is_single_shot_and_stop_needs_a_running_session() {
    let driver = Arc::new(FakeDriver::with_blocks(scripted_blocks(2, 32)));
    let mut session = CaptureSession::new(driver, Some(0), test_config(), EventHub::new());

    assert!(!session.stop(), "stop before start must be a no-op");
    assert!(session.start());
    assert!(!session.start(), "second start must be refused");
    assert!(session.stop());
    assert!(!session.stop(), "stop after stop must be a no-op");
    assert!(!session.start(), "a stopped session cannot restart");
}

#[test]
fn open_failure_lands_in_failed_with_empty_capture() {
    let driver = Arc::new(FakeDriver {
        devices: vec![fake_device(0)],
        fail_open: true,
        ..FakeDriver::default()
    });
    let events = EventHub::new();
    let sub = events.subscribe();
    let mut session = CaptureSession::new(driver, Some(0), test_config(), events);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || session
        .state()
        .is_terminal()));
    assert_eq!(session.state(), CaptureSessionState::Failed);
    assert!(session.captured_audio().is_empty());
    let error = session.error().expect("failure message");
    assert!(error.contains("refused to open"), "got {error}");
    match sub.receiver.recv_timeout(Duration::from_secs(1)).unwrap() {
        CaptureEvent::SessionStopped { error: Some(_) } => {}
        other => panic!("expected failed stop event, got {other:?}"),
    }
}

#[test]
fn mid_stream_error_preserves_audio_already_buffered() {
    let blocks = scripted_blocks(5, 32);
    let expected: Vec<u8> = blocks[..3].iter().flatten().copied().collect();
    let driver = Arc::new(FakeDriver {
        error_after: Some(3),
        ..FakeDriver::with_blocks(blocks)
    });
    let mut session = CaptureSession::new(driver, Some(0), test_config(), EventHub::new());

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || session
        .state()
        .is_terminal()));
    assert_eq!(session.state(), CaptureSessionState::Failed);
    assert_eq!(session.captured_audio().bytes, expected);
    assert!(session.error().expect("error").contains("fake stream error"));
}

#[test]
fn overflowing_the_block_channel_counts_drops_and_keeps_alignment() {
    // The worker cannot drain while it is still inside stream start, so a
    // burst delivered there against a capacity-1 channel accepts exactly one
    // block and drops the rest.
    let burst = scripted_blocks(8, 32);
    let first = burst[0].clone();
    let driver = Arc::new(FakeDriver {
        devices: vec![fake_device(0)],
        burst_in_start: burst,
        ..FakeDriver::default()
    });
    let config = CaptureConfig {
        channel_capacity: 1,
        ..test_config()
    };
    let mut session = CaptureSession::new(driver, Some(0), config, EventHub::new());

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || {
        !session.captured_audio().is_empty()
    }));
    assert!(session.stop());

    assert_eq!(session.dropped_blocks(), 7);
    let captured = session.captured_audio();
    assert_eq!(captured.bytes.len() % 32, 0, "capture split a block");
    assert_eq!(captured.bytes, first);
}

#[test]
fn stop_without_audio_yields_an_empty_capture() {
    let driver = Arc::new(FakeDriver {
        devices: vec![fake_device(0)],
        ..FakeDriver::default()
    });
    let events = EventHub::new();
    let sub = events.subscribe();
    let mut session = CaptureSession::new(driver, Some(0), test_config(), events);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || {
        session.state() == CaptureSessionState::Running
    }));
    assert!(session.stop());

    assert_eq!(session.state(), CaptureSessionState::Stopped);
    let captured = session.captured_audio();
    assert!(captured.is_empty());
    assert_eq!(captured.duration_seconds, 0.0);
    assert!(session.error().is_none());

    let received: Vec<CaptureEvent> = sub.receiver.try_iter().collect();
    assert_eq!(received.first(), Some(&CaptureEvent::SessionStarted));
    assert_eq!(
        received.last(),
        Some(&CaptureEvent::SessionStopped { error: None })
    );
}

#[test]
fn level_returns_to_zero_after_stop_and_stays_in_unit_range() {
    let loud = vec![vec![0xFF, 0x7F].repeat(512); 8];
    let driver = Arc::new(FakeDriver::with_blocks(loud));
    let events = EventHub::new();
    let sub = events.subscribe();
    let mut session = CaptureSession::new(driver, Some(0), test_config(), events);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || {
        !session.captured_audio().is_empty()
    }));
    assert!(session.stop());

    assert_eq!(session.level(), 0.0);
    for event in sub.receiver.try_iter() {
        if let CaptureEvent::VolumeChanged { level } = event {
            assert!((0.0..=1.0).contains(&level), "level {level} out of range");
        }
    }
}

#[test]
fn stop_timeout_detaches_a_stuck_driver() {
    let driver = Arc::new(FakeDriver {
        stop_delay: Duration::from_millis(400),
        ..FakeDriver::with_blocks(scripted_blocks(200, 32))
    });
    let config = CaptureConfig {
        stop_timeout_ms: 50,
        ..test_config()
    };
    let mut session = CaptureSession::new(driver, Some(0), config, EventHub::new());

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(2), || {
        session.state() == CaptureSessionState::Running
    }));
    let begun = Instant::now();
    assert!(session.stop());
    assert!(
        begun.elapsed() < Duration::from_millis(300),
        "stop must not wait for the stuck driver"
    );
    assert_eq!(session.state(), CaptureSessionState::Stopped);
}

#[test]
fn snapshot_during_capture_sees_whole_blocks() {
    let format = AudioFormat::default();
    let buffer = Arc::new(Mutex::new(CircularAudioBuffer::new(60.0, format)));
    let writer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for i in 0..1_000u32 {
                let value = (i % 251) as u8;
                buffer.lock().unwrap().append(vec![value; 32]);
            }
        })
    };
    for _ in 0..50 {
        let snapshot = buffer.lock().unwrap().snapshot();
        assert_eq!(snapshot.len() % 32, 0, "snapshot split a block");
        for chunk in snapshot.chunks_exact(32) {
            assert!(chunk.iter().all(|&byte| byte == chunk[0]));
        }
    }
    writer.join().unwrap();
    assert_eq!(buffer.lock().unwrap().snapshot().len(), 32 * 1_000);
}

#[test]
fn controller_refuses_start_without_devices() {
    let driver = Arc::new(FakeDriver::default());
    let mut controller = CaptureController::new(driver, test_config()).unwrap();
    assert!(controller.list_devices().is_empty());
    assert!(!controller.start());
    assert!(!controller.is_recording());
}

#[test]
fn controller_auto_selects_first_device_and_rejects_unknown_indices() {
    let driver = Arc::new(FakeDriver {
        devices: vec![fake_device(0), fake_device(1)],
        ..FakeDriver::default()
    });
    let mut controller = CaptureController::new(driver, test_config()).unwrap();
    assert_eq!(controller.selected_device(), Some(0));
    assert!(!controller.select_device(7));
    assert_eq!(controller.selected_device(), Some(0));
    assert!(controller.select_device(1));
    assert_eq!(controller.selected_device(), Some(1));
}

#[test]
fn controller_caches_capture_after_stop() {
    let blocks = scripted_blocks(4, 64);
    let expected: Vec<u8> = blocks.iter().flatten().copied().collect();
    let driver = Arc::new(FakeDriver::with_blocks(blocks));
    let mut controller = CaptureController::new(driver, test_config()).unwrap();

    assert_eq!(controller.live_duration(), 0.0);
    assert!(controller.start());
    assert!(controller.is_recording());
    assert!(wait_until(Duration::from_secs(2), || {
        controller.captured_audio().bytes.len() >= expected.len()
    }));
    assert!(controller.live_duration() > 0.0);
    assert!(controller.stop());

    assert!(!controller.is_recording());
    assert_eq!(controller.live_duration(), 0.0);
    assert_eq!(controller.captured_audio().bytes, expected);
    // The cache survives repeated reads.
    assert_eq!(controller.captured_audio().bytes, expected);
}

#[test]
fn controller_save_wav_round_trips_the_capture() {
    let driver = Arc::new(FakeDriver::with_blocks(scripted_blocks(4, 64)));
    let mut controller = CaptureController::new(driver, test_config()).unwrap();
    assert!(controller.start());
    assert!(wait_until(Duration::from_secs(2), || {
        !controller.captured_audio().is_empty()
    }));
    assert!(controller.stop());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    controller.save_wav(&path).unwrap();
    let back = super::wav::read_wav(&path).unwrap();
    assert_eq!(back.bytes, controller.captured_audio().bytes);
}

#[test]
fn controller_recognize_without_recognizer_fails_fast() {
    let driver = Arc::new(FakeDriver::with_blocks(scripted_blocks(2, 32)));
    let controller = CaptureController::new(driver, test_config()).unwrap();
    let job = controller.recognize(None);
    assert!(job.handle.is_none());
    assert_eq!(
        job.wait(),
        RecognitionMessage::Failed("no recognizer configured".to_string())
    );
}
