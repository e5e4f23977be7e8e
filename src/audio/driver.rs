//! Native audio driver abstraction.
//!
//! The capture session talks to a small trait pair instead of cpal directly
//! so tests can script a fake driver and the session logic stays free of
//! platform details. `CpalDriver` is the production implementation.

use super::format::AudioFormat;
use crate::error::{CaptureError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One enumerated input device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// What the driver delivers to the session callback.
#[derive(Debug)]
pub enum DriverEvent {
    /// One block of PCM bytes in the session's format, arrival ordered.
    Block(Vec<u8>),
    /// A stream error after open; the session treats this as fatal.
    Error(String),
}

/// Returned by the callback to tell the driver whether to keep invoking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    Complete,
}

/// Invoked on the driver's own thread at audio-I/O cadence. Must never
/// block: the session implementation only checks an atomic flag and pushes
/// into a bounded channel.
pub type DriverCallback = Box<dyn FnMut(DriverEvent) -> CallbackFlow + Send>;

/// An open input stream. Created stopped; dropped to close and release.
/// Streams are not required to be `Send` (cpal's are not on every
/// platform), so they live entirely on the session worker thread.
pub trait InputStream {
    fn start(&mut self) -> Result<()>;
    /// Blocks until the driver guarantees no further callback invocations.
    fn stop(&mut self) -> Result<()>;
}

/// Device enumeration plus stream opening.
pub trait InputDriver: Send + Sync {
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open an input stream on the device at `device_index` (enumeration
    /// order), or the default input when `None`.
    fn open_input(
        &self,
        device_index: Option<usize>,
        format: &AudioFormat,
        chunk_frames: usize,
        callback: DriverCallback,
    ) -> Result<Box<dyn InputStream>>;
}

/// cpal-backed driver. Delivers 16-bit little-endian PCM regardless of the
/// device's native sample type.
#[derive(Debug, Default)]
pub struct CpalDriver;

impl CpalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl InputDriver for CpalDriver {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| CaptureError::DeviceUnavailable {
                message: format!("failed to enumerate input devices: {err}"),
            })?;
        let mut found = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("input device {index}"));
            match device.default_input_config() {
                Ok(config) => found.push(DeviceInfo {
                    index,
                    name,
                    max_input_channels: config.channels(),
                    default_sample_rate: config.sample_rate().0,
                }),
                Err(err) => {
                    // Devices without an input config are output-only; skip.
                    debug!(index, %name, %err, "skipping device without input config");
                }
            }
        }
        Ok(found)
    }

    fn open_input(
        &self,
        device_index: Option<usize>,
        format: &AudioFormat,
        chunk_frames: usize,
        callback: DriverCallback,
    ) -> Result<Box<dyn InputStream>> {
        if format.sample_width_bytes != 2 {
            return Err(CaptureError::UnsupportedFormat {
                message: format!(
                    "cpal driver produces 16-bit PCM only, requested width {}",
                    format.sample_width_bytes
                ),
            });
        }

        let host = cpal::default_host();
        let device = match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|err| CaptureError::DeviceUnavailable {
                    message: format!("failed to enumerate input devices: {err}"),
                })?
                .nth(index)
                .ok_or_else(|| CaptureError::DeviceUnavailable {
                    message: format!("input device index {index} not found"),
                })?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable {
                    message: "no default input device available".to_string(),
                })?,
        };

        let supported =
            device
                .default_input_config()
                .map_err(|err| CaptureError::DeviceUnavailable {
                    message: format!("failed to query input config: {err}"),
                })?;
        let stream_config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Fixed(chunk_frames as u32),
        };
        debug!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = format.sample_rate,
            channels = format.channels,
            chunk_frames,
            native_format = ?supported.sample_format(),
            "opening input stream"
        );

        // The data and error callbacks both feed the one session callback,
        // so it sits behind a mutex. The data path uses try_lock and drops
        // the block on contention rather than stalling the audio thread.
        let shared = Arc::new(Mutex::new(callback));
        let err_cb = {
            let shared = shared.clone();
            move |err: cpal::StreamError| {
                warn!(%err, "audio stream error");
                if let Ok(mut cb) = shared.lock() {
                    let _ = cb(DriverEvent::Error(err.to_string()));
                }
            }
        };

        let build_result = match supported.sample_format() {
            SampleFormat::I16 => {
                let shared = shared.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        forward_block(&shared, data, |sample| sample);
                    },
                    err_cb,
                    None,
                )
            }
            SampleFormat::U16 => {
                let shared = shared.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        forward_block(&shared, data, |sample| (sample as i32 - 32_768) as i16);
                    },
                    err_cb,
                    None,
                )
            }
            SampleFormat::F32 => {
                let shared = shared.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        forward_block(&shared, data, |sample| {
                            (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
                        });
                    },
                    err_cb,
                    None,
                )
            }
            other => {
                return Err(CaptureError::UnsupportedFormat {
                    message: format!("device sample format {other:?}"),
                })
            }
        };

        let stream = build_result.map_err(|err| CaptureError::DeviceUnavailable {
            message: format!("failed to open input stream: {err}"),
        })?;
        Ok(Box::new(CpalInputStream { stream }))
    }
}

/// Convert one device callback's samples to LE bytes and hand them to the
/// session callback. Skips the block when the callback is mid-swap rather
/// than blocking the driver thread.
fn forward_block<T: Copy>(
    shared: &Arc<Mutex<DriverCallback>>,
    data: &[T],
    convert: impl Fn(T) -> i16,
) {
    let Ok(mut cb) = shared.try_lock() else {
        return;
    };
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for &sample in data {
        bytes.extend_from_slice(&convert(sample).to_le_bytes());
    }
    let _ = cb(DriverEvent::Block(bytes));
}

struct CpalInputStream {
    stream: cpal::Stream,
}

impl InputStream for CpalInputStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|err| CaptureError::DeviceUnavailable {
                message: format!("failed to start input stream: {err}"),
            })
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|err| CaptureError::StreamInterrupted {
                message: format!("failed to stop input stream: {err}"),
            })
    }
}
