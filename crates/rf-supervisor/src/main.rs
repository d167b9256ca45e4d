//! Supervisor entry point (§4.O): loads configuration, opens the
//! output device, spawns the aux capture and engine threads, and
//! restarts the engine on fatal output-device loss while preserving
//! the in-flight snapshot.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rf_audio::{AuxRing, CaptureConfig, OutputSink, spawn_capture_thread};
use rf_core::SampleRate;
use rf_engine::{Engine, EngineCommand, EngineConfig, EngineNotification};
use rf_engine::Snapshot;

#[derive(Parser, Debug)]
#[command(name = "rf-supervisor", about = "Vibroacoustic transducer array engine")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Substring match against the enumerated output device list.
    #[arg(long)]
    output_device: Option<String>,

    /// Engine block size in frames.
    #[arg(long)]
    block_size: Option<usize>,
}

fn sample_rate_from_u32(value: u32) -> SampleRate {
    match value {
        44_100 => SampleRate::Hz44100,
        88_200 => SampleRate::Hz88200,
        96_000 => SampleRate::Hz96000,
        176_400 => SampleRate::Hz176400,
        192_000 => SampleRate::Hz192000,
        352_800 => SampleRate::Hz352800,
        384_000 => SampleRate::Hz384000,
        _ => SampleRate::Hz48000,
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = EngineConfig::load(&cli.config).unwrap_or_else(|e| {
        log::error!("config parse failure, falling back to defaults: {e}");
        EngineConfig::default()
    });
    if let Some(substring) = cli.output_device {
        config.output_device_substring = substring;
    }
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }

    let sample_rate = sample_rate_from_u32(config.sample_rate);
    let running = Arc::new(AtomicBool::new(true));

    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::Release)) {
            log::warn!("failed to install signal handler: {e}");
        }
    }

    let aux_ring = Arc::new(AuxRing::new(config.block_size * 8));

    // The Bluetooth capture handle is an external collaborator
    // (out of scope); the factory below always reports unavailable,
    // which keeps the aux path silent until a real transport supplies
    // a `CaptureSource` implementation.
    let capture_running = Arc::clone(&running);
    let capture_ring = Arc::clone(&aux_ring);
    let _capture_thread = spawn_capture_thread(
        capture_ring,
        || None,
        CaptureConfig::default(),
        capture_running,
    );

    // The control-plane transport (WebSocket) is out of scope; these
    // channels are the boundary a future transport posts/drains
    // through. `_command_tx` is kept alive so the receiver doesn't
    // observe a permanently-disconnected channel.
    let (_command_tx, command_rx) = crossbeam_channel::bounded::<EngineCommand>(256);
    let (notification_tx, notification_rx) = crossbeam_channel::bounded::<EngineNotification>(256);
    std::thread::spawn(move || {
        while let Ok(notification) = notification_rx.recv() {
            log::debug!("notification: {notification:?}");
        }
    });

    let mut pending_resume: Option<Snapshot> = None;

    let exit_code = loop {
        let device = match rf_audio::get_output_device_by_name(&config.output_device_substring) {
            Ok(device) => device,
            Err(e) => {
                log::error!("output device not found: {e}");
                break 1;
            }
        };

        let sink = match OutputSink::open(&device, config.sample_rate, config.block_size) {
            Ok(sink) => sink,
            Err(e) => {
                log::error!("failed to open output device: {e}");
                break 1;
            }
        };

        log::info!(
            "output device opened: block_size={} sample_rate={}",
            config.block_size,
            config.sample_rate
        );

        let mut engine = Engine::new(
            sample_rate,
            config.block_size,
            Arc::clone(&aux_ring),
            sink,
            config.persisted_mix_path.clone(),
            config.persisted_mono_path.clone(),
            config.routing_table_override.clone(),
        );
        if let Some(snapshot) = pending_resume.take() {
            log::info!("resuming row in flight after sink reopen");
            engine.resume_from_snapshot(snapshot);
        }

        let engine_running = Arc::clone(&running);
        let snapshot = engine.run(command_rx.clone(), notification_tx.clone(), engine_running);

        if !running.load(Ordering::Acquire) {
            break 0;
        }

        // The engine loop only returns early on a fatal output-device
        // error, handing back the row-in-flight snapshot; carry it into
        // the next iteration's freshly reopened engine.
        pending_resume = snapshot;
        log::warn!("engine loop exited unexpectedly, retrying after backoff");
        std::thread::sleep(Duration::from_secs(1));
    };

    std::process::exit(exit_code);
}
