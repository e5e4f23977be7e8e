//! RMS-based volume estimation for live level display.

use super::format::AudioFormat;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Lock-free shared volume level in [0, 1], safe to read from any thread.
#[derive(Clone, Debug)]
pub struct LiveLevel {
    level_bits: Arc<AtomicU32>,
}

impl LiveLevel {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
        }
    }

    pub fn set(&self, level: f32) {
        self.level_bits
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Default for LiveLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Volume estimate for one PCM block, logarithmically scaled and clamped
/// to [0, 1]. Uses `log10(rms * 9 + 1)` so a full-scale signal maps to 1.0
/// and quiet signals keep useful resolution for display.
pub fn block_level(bytes: &[u8], format: &AudioFormat) -> f32 {
    let width = format.sample_width_bytes as usize;
    if width == 0 || bytes.len() < width {
        return 0.0;
    }
    let mut energy = 0.0f64;
    let mut count = 0usize;
    for chunk in bytes.chunks_exact(width) {
        let sample = normalized_sample(chunk);
        energy += f64::from(sample * sample);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let rms = (energy / count as f64).sqrt() as f32;
    if rms <= 0.0 {
        return 0.0;
    }
    (rms * 9.0 + 1.0).log10().clamp(0.0, 1.0)
}

/// Decode one little-endian PCM sample to [-1, 1]. Width 1 is unsigned
/// offset binary per the WAV convention; wider samples are signed.
fn normalized_sample(chunk: &[u8]) -> f32 {
    match chunk.len() {
        1 => (chunk[0] as f32 - 128.0) / 128.0,
        2 => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32_768.0,
        3 => {
            let raw = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
            raw as f32 / 8_388_608.0
        }
        4 => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}
