//! Capture pipeline configuration and validation.

use crate::audio::AudioFormat;
use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frames per driver callback block.
pub const DEFAULT_CHUNK_FRAMES: usize = 1024;
/// Seconds of audio the circular buffer retains.
pub const DEFAULT_MAX_BUFFER_SECONDS: f64 = 60.0;
/// How long `stop()` waits for the driver to confirm the stream stopped.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;
/// Minimum spacing between volume notifications.
pub const DEFAULT_VOLUME_INTERVAL_MS: u64 = 100;
/// Block channel capacity between the driver callback and the capture worker.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tunable parameters for one capture session.
///
/// The defaults mirror what speech recognition backends expect: 16 kHz mono
/// 16-bit PCM in 1024-frame chunks, with up to a minute of audio buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub format: AudioFormat,
    pub chunk_frames: usize,
    pub max_buffer_seconds: f64,
    pub stop_timeout_ms: u64,
    pub volume_interval_ms: u64,
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            max_buffer_seconds: DEFAULT_MAX_BUFFER_SECONDS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            volume_interval_ms: DEFAULT_VOLUME_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;
        if self.chunk_frames == 0 {
            return Err(CaptureError::InvalidConfig {
                message: "chunk_frames must be positive".to_string(),
            });
        }
        if !self.max_buffer_seconds.is_finite() || self.max_buffer_seconds <= 0.0 {
            return Err(CaptureError::InvalidConfig {
                message: format!(
                    "max_buffer_seconds must be positive, got {}",
                    self.max_buffer_seconds
                ),
            });
        }
        if self.stop_timeout_ms == 0 {
            return Err(CaptureError::InvalidConfig {
                message: "stop_timeout_ms must be positive".to_string(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(CaptureError::InvalidConfig {
                message: "channel_capacity must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn volume_interval(&self) -> Duration {
        Duration::from_millis(self.volume_interval_ms)
    }
}
