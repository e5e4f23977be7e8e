//! Circular PCM buffer, bounded in seconds.
//!
//! Storage is a deque of whole callback blocks rather than a flat ring so
//! eviction never splits a block: readers always see block-aligned audio.
//! Not internally synchronized; the session wraps it in a mutex and its
//! worker thread is the only writer.

use super::format::AudioFormat;
use std::collections::VecDeque;
use tracing::debug;

/// Log a buffer summary every this many appends.
const APPEND_LOG_EVERY: usize = 50;

pub struct CircularAudioBuffer {
    format: AudioFormat,
    capacity_bytes: usize,
    blocks: VecDeque<Vec<u8>>,
    total_bytes: usize,
    appends: usize,
}

impl CircularAudioBuffer {
    /// Buffer retaining up to `max_seconds` of audio in `format`.
    pub fn new(max_seconds: f64, format: AudioFormat) -> Self {
        let capacity_bytes = ((max_seconds * format.byte_rate() as f64) as usize).max(1);
        Self {
            format,
            capacity_bytes,
            blocks: VecDeque::new(),
            total_bytes: 0,
            appends: 0,
        }
    }

    /// Append one callback block, evicting oldest-first once over capacity.
    /// Empty blocks are ignored. A single block larger than the whole buffer
    /// is kept intact rather than truncated.
    pub fn append(&mut self, block: Vec<u8>) {
        if block.is_empty() {
            return;
        }
        self.total_bytes += block.len();
        self.blocks.push_back(block);
        while self.total_bytes > self.capacity_bytes && self.blocks.len() > 1 {
            if let Some(evicted) = self.blocks.pop_front() {
                self.total_bytes -= evicted.len();
            }
        }
        self.appends += 1;
        if self.appends % APPEND_LOG_EVERY == 0 {
            debug!(
                blocks = self.blocks.len(),
                total_bytes = self.total_bytes,
                capacity_bytes = self.capacity_bytes,
                "buffer append"
            );
        }
    }

    /// Copy of everything buffered, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes);
        for block in &self.blocks {
            out.extend_from_slice(block);
        }
        out
    }

    /// The most recent `seconds` of audio, block-aligned from the tail. The
    /// oldest included block is trimmed at its front so the result never
    /// exceeds the requested span.
    pub fn last_seconds(&self, seconds: f64) -> Vec<u8> {
        if seconds <= 0.0 {
            return Vec::new();
        }
        let want = (seconds * self.format.byte_rate() as f64) as usize;
        if want == 0 {
            return Vec::new();
        }
        if want >= self.total_bytes {
            return self.snapshot();
        }
        let mut taken = 0;
        let mut parts: Vec<&[u8]> = Vec::new();
        for block in self.blocks.iter().rev() {
            if taken >= want {
                break;
            }
            let need = want - taken;
            if block.len() <= need {
                parts.push(block);
                taken += block.len();
            } else {
                parts.push(&block[block.len() - need..]);
                taken += need;
            }
        }
        let mut out = Vec::with_capacity(taken);
        for part in parts.iter().rev() {
            out.extend_from_slice(part);
        }
        out
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.total_bytes = 0;
    }

    pub fn len_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Seconds of audio currently buffered.
    pub fn duration_seconds(&self) -> f64 {
        self.format.duration_of(self.total_bytes)
    }
}
