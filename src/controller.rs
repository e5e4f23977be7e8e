//! High-level capture facade.
//!
//! `CaptureController` owns device selection, the current session, the last
//! completed capture, and the recognition dispatcher, so callers deal with
//! one object instead of wiring the pipeline themselves. All dependencies
//! arrive through the constructor; nothing here touches global state.

use crate::audio::{CapturedAudio, CaptureSession, DeviceInfo, InputDriver};
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::events::{EventHub, EventSubscription};
use crate::recognition::{RecognitionDispatcher, RecognitionJob, Recognizer};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CaptureController {
    driver: Arc<dyn InputDriver>,
    config: CaptureConfig,
    events: EventHub,
    devices: Vec<DeviceInfo>,
    selected: Option<usize>,
    session: Option<CaptureSession>,
    captured: Option<CapturedAudio>,
    dispatcher: RecognitionDispatcher,
}

impl CaptureController {
    /// Build a controller over `driver`. Enumeration failure is tolerated
    /// (the device list stays empty until `list_devices` retries); an
    /// invalid config is not.
    pub fn new(driver: Arc<dyn InputDriver>, config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        let events = EventHub::new();
        let devices = match driver.devices() {
            Ok(devices) => devices,
            Err(err) => {
                warn!(%err, "device enumeration failed, starting with no devices");
                Vec::new()
            }
        };
        let selected = devices.first().map(|device| device.index);
        if let Some(index) = selected {
            debug!(index, "auto-selected first input device");
        }
        Ok(Self {
            driver,
            config,
            dispatcher: RecognitionDispatcher::new(events.clone()),
            events,
            devices,
            selected,
            session: None,
            captured: None,
        })
    }

    /// Known input devices, re-enumerating when the cached list is empty.
    pub fn list_devices(&mut self) -> &[DeviceInfo] {
        if self.devices.is_empty() {
            match self.driver.devices() {
                Ok(devices) => {
                    self.devices = devices;
                    if self.selected.is_none() {
                        self.selected = self.devices.first().map(|device| device.index);
                    }
                }
                Err(err) => warn!(%err, "device enumeration failed"),
            }
        }
        &self.devices
    }

    /// Switch input devices. Returns false for an unknown index. A session
    /// already recording is restarted on the new device.
    pub fn select_device(&mut self, index: usize) -> bool {
        if !self.devices.iter().any(|device| device.index == index) {
            warn!(index, "ignoring unknown device index");
            return false;
        }
        if self.selected == Some(index) {
            return true;
        }
        let was_recording = self.is_recording();
        if was_recording {
            self.stop();
        }
        self.selected = Some(index);
        info!(index, "input device selected");
        if was_recording {
            return self.start();
        }
        true
    }

    /// Begin capturing. Returns false when already recording or when no
    /// device is selected.
    pub fn start(&mut self) -> bool {
        if self.is_recording() {
            warn!("start ignored, capture already in progress");
            return false;
        }
        if self.selected.is_none() && self.devices.is_empty() {
            warn!("start ignored, no input device available");
            return false;
        }
        // A finished session may still hold the previous take; keep it
        // reachable until the new session produces audio.
        if let Some(old) = self.session.take() {
            let audio = old.captured_audio();
            if !audio.is_empty() {
                self.captured = Some(audio);
            }
        }
        let mut session = CaptureSession::new(
            self.driver.clone(),
            self.selected,
            self.config.clone(),
            self.events.clone(),
        );
        let started = session.start();
        if started {
            self.session = Some(session);
        }
        started
    }

    /// Stop the active session and cache its audio. Returns false when
    /// nothing was recording.
    pub fn stop(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        let stopped = session.stop();
        let audio = session.captured_audio();
        if let Some(error) = session.error() {
            warn!(%error, "session ended with error");
        }
        debug!(
            bytes = audio.bytes.len(),
            duration_seconds = audio.duration_seconds,
            dropped_blocks = session.dropped_blocks(),
            "capture stopped"
        );
        self.captured = Some(audio);
        stopped
    }

    /// The most recent audio: the live session's buffer while recording,
    /// otherwise the last completed capture.
    pub fn captured_audio(&self) -> CapturedAudio {
        if let Some(session) = &self.session {
            return session.captured_audio();
        }
        self.captured
            .clone()
            .unwrap_or_else(|| CapturedAudio::empty(self.config.format))
    }

    /// Wall-clock seconds of the active recording, 0 when idle.
    pub fn live_duration(&self) -> f64 {
        self.session
            .as_ref()
            .map(|session| session.live_duration())
            .unwrap_or(0.0)
    }

    /// Live volume level in [0, 1]; 0 when idle.
    pub fn level(&self) -> f32 {
        self.session
            .as_ref()
            .map(|session| session.level())
            .unwrap_or(0.0)
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.state().is_active())
            .unwrap_or(false)
    }

    pub fn selected_device(&self) -> Option<usize> {
        self.selected
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.events.unsubscribe(id)
    }

    /// Write the most recent capture to `path` as WAV.
    pub fn save_wav(&self, path: &Path) -> Result<()> {
        let audio = self.captured_audio();
        crate::audio::write_wav(path, &audio)?;
        info!(path = %path.display(), bytes = audio.bytes.len(), "capture saved");
        Ok(())
    }

    /// Hand the most recent capture to `recognizer` on a worker thread.
    pub fn recognize(&self, recognizer: Option<Arc<dyn Recognizer>>) -> RecognitionJob {
        self.dispatcher.dispatch(self.captured_audio(), recognizer)
    }
}
