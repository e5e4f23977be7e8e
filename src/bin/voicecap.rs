//! Command-line recorder built on the capture pipeline: list devices, record
//! for a fixed duration with live volume feedback, save WAV, optionally run
//! a recognizer.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voicecap::{
    telemetry, CaptureConfig, CaptureController, CaptureEvent, CpalDriver,
};

/// Microphone capture CLI.
#[derive(Debug, Parser)]
#[command(name = "voicecap", about = "voicecap audio capture", version)]
struct Cli {
    /// Print detected audio input devices and exit
    #[arg(long = "list-devices", default_value_t = false)]
    list_devices: bool,

    /// Emit machine-readable JSON where applicable
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Input device index (enumeration order); defaults to the first device
    #[arg(long)]
    device: Option<usize>,

    /// Recording length in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Write the capture to this WAV file
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Enable logging to stderr
    #[arg(long, env = "VOICECAP_LOG", default_value_t = false)]
    logs: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.logs);

    let driver = Arc::new(CpalDriver::new());
    let mut controller = CaptureController::new(driver, CaptureConfig::default())
        .context("invalid capture configuration")?;

    if cli.list_devices {
        let devices = controller.list_devices();
        if cli.json {
            println!("{}", serde_json::to_string_pretty(devices)?);
        } else if devices.is_empty() {
            println!("No audio input devices detected.");
        } else {
            println!("Detected audio input devices:");
            for device in devices {
                println!(
                    "  [{}] {} ({} ch, {} Hz)",
                    device.index, device.name, device.max_input_channels, device.default_sample_rate
                );
            }
        }
        return Ok(());
    }

    if let Some(index) = cli.device {
        controller.list_devices();
        if !controller.select_device(index) {
            anyhow::bail!("unknown input device index {index}");
        }
    }

    let subscription = controller.subscribe();
    if !controller.start() {
        anyhow::bail!("failed to start capture; is an input device available?");
    }
    eprintln!("Recording for {} seconds...", cli.seconds);

    let deadline = std::time::Instant::now() + Duration::from_secs(cli.seconds);
    while std::time::Instant::now() < deadline {
        match subscription.receiver.recv_timeout(Duration::from_millis(200)) {
            Ok(CaptureEvent::VolumeChanged { level }) => {
                let bars = (level * 30.0) as usize;
                eprint!("\rlevel [{:<30}]", "#".repeat(bars));
            }
            Ok(CaptureEvent::SessionStopped { error: Some(error) }) => {
                eprintln!();
                anyhow::bail!("capture failed: {error}");
            }
            Ok(_) | Err(_) => {}
        }
    }
    eprintln!();
    controller.stop();

    let audio = controller.captured_audio();
    println!(
        "Captured {:.2} seconds ({} bytes)",
        audio.duration_seconds,
        audio.bytes.len()
    );

    if let Some(path) = &cli.output {
        controller
            .save_wav(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}
