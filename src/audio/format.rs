//! PCM format description and finalized captures.

use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};

/// Interleaved integer PCM, little-endian. The default matches what speech
/// recognition backends expect: 16 kHz mono 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_width_bytes: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            sample_width_bytes: 2,
        }
    }
}

impl AudioFormat {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(CaptureError::InvalidConfig {
                message: "sample_rate must be positive".to_string(),
            });
        }
        if !(1..=2).contains(&self.channels) {
            return Err(CaptureError::InvalidConfig {
                message: format!("channels must be 1 (mono) or 2 (stereo), got {}", self.channels),
            });
        }
        if !(1..=4).contains(&self.sample_width_bytes) {
            return Err(CaptureError::InvalidConfig {
                message: format!(
                    "sample_width_bytes must be 1..=4, got {}",
                    self.sample_width_bytes
                ),
            });
        }
        Ok(())
    }

    /// Bytes per second of audio in this format.
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * self.sample_width_bytes as usize
    }

    /// Seconds represented by `len_bytes` of PCM in this format.
    pub fn duration_of(&self, len_bytes: usize) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        len_bytes as f64 / rate as f64
    }
}

/// A finalized capture: contiguous PCM plus the format that describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub duration_seconds: f64,
}

impl CapturedAudio {
    pub fn from_bytes(bytes: Vec<u8>, format: AudioFormat) -> Self {
        let duration_seconds = format.duration_of(bytes.len());
        Self {
            bytes,
            format,
            duration_seconds,
        }
    }

    pub fn empty(format: AudioFormat) -> Self {
        Self::from_bytes(Vec::new(), format)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
