//! Audio capture pipeline.
//!
//! PCM blocks arrive from the native driver callback, cross a bounded
//! channel to the session worker, and land in a circular buffer sized in
//! seconds. The worker is the buffer's only writer; readers take snapshots.

mod buffer;
mod driver;
mod format;
mod meter;
mod session;
#[cfg(test)]
mod tests;
mod wav;

pub use buffer::CircularAudioBuffer;
pub use driver::{
    CallbackFlow, CpalDriver, DeviceInfo, DriverCallback, DriverEvent, InputDriver, InputStream,
};
pub use format::{AudioFormat, CapturedAudio};
pub use meter::{block_level, LiveLevel};
pub use session::{CaptureSession, CaptureSessionState};
pub use wav::{read_wav, write_wav};
