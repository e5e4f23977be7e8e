pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod recognition;
pub mod telemetry;

pub use audio::{AudioFormat, CapturedAudio, CaptureSessionState, CpalDriver, DeviceInfo};
pub use config::CaptureConfig;
pub use controller::CaptureController;
pub use error::{CaptureError, Result};
pub use events::{CaptureEvent, EventHub, EventSubscription};
pub use recognition::{
    RecognitionDispatcher, RecognitionJob, RecognitionMessage, RecognitionResult, Recognizer,
};
