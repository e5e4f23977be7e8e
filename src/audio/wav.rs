//! WAV (RIFF/WAVE) export and import of captured audio.
//!
//! Header fields come verbatim from the capture's `AudioFormat`; the PCM
//! payload is written unmodified.

use super::format::{AudioFormat, CapturedAudio};
use crate::error::{CaptureError, Result};
use std::path::Path;

/// Write a capture as integer PCM WAV.
pub fn write_wav(path: &Path, audio: &CapturedAudio) -> Result<()> {
    let format = &audio.format;
    format.validate()?;
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width_bytes * 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let bytes = &audio.bytes;
    match format.sample_width_bytes {
        1 => {
            for &byte in bytes {
                writer.write_sample((byte as i16 - 128) as i8)?;
            }
        }
        2 => {
            for chunk in bytes.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
            }
        }
        3 => {
            for chunk in bytes.chunks_exact(3) {
                let sample = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                writer.write_sample(sample)?;
            }
        }
        4 => {
            for chunk in bytes.chunks_exact(4) {
                writer.write_sample(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))?;
            }
        }
        other => {
            return Err(CaptureError::UnsupportedFormat {
                message: format!("cannot write {other}-byte samples to WAV"),
            })
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Read integer PCM WAV back into a capture.
pub fn read_wav(path: &Path) -> Result<CapturedAudio> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        return Err(CaptureError::UnsupportedFormat {
            message: "float WAV payloads are not supported".to_string(),
        });
    }
    if spec.bits_per_sample % 8 != 0 {
        return Err(CaptureError::UnsupportedFormat {
            message: format!("{}-bit WAV samples are not byte aligned", spec.bits_per_sample),
        });
    }
    let format = AudioFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        sample_width_bytes: spec.bits_per_sample / 8,
    };
    format.validate()?;

    let mut bytes = Vec::new();
    match format.sample_width_bytes {
        1 => {
            for sample in reader.samples::<i8>() {
                bytes.push((sample? as i16 + 128) as u8);
            }
        }
        2 => {
            for sample in reader.samples::<i16>() {
                bytes.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        3 => {
            for sample in reader.samples::<i32>() {
                bytes.extend_from_slice(&sample?.to_le_bytes()[..3]);
            }
        }
        4 => {
            for sample in reader.samples::<i32>() {
                bytes.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        _ => unreachable!("validated width"),
    }
    Ok(CapturedAudio::from_bytes(bytes, format))
}
