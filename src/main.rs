mod backend;
mod config;
mod dsp;
mod ring;
mod source;
mod synth;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait};

use backend::create_backend;
use config::Config;
use source::{MidiSource, NoteEvent};
use synth::Synth;

/// Turn live note events into layered synthesized audio
#[derive(Parser, Debug)]
#[command(name = "minstrel")]
#[command(about = "Real-time note-event synthesizer", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config", required_unless_present = "list_devices")]
    config: Option<std::path::PathBuf>,

    /// List available devices and exit
    #[arg(short = 'l', long = "list")]
    list_devices: bool,
}

/// List available audio output devices
fn list_audio_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let mut devices: Vec<String> = host
        .output_devices()?
        .filter_map(|device| {
            device
                .description()
                .ok()
                .map(|desc| desc.name().to_string())
        })
        .collect();

    if let Some(default_device) = host.default_output_device() {
        if let Ok(default_desc) = default_device.description() {
            let default_name = default_desc.name().to_string();
            if !devices.contains(&default_name) {
                devices.push(default_name);
            }
        }
    }

    Ok(devices)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        println!("Available MIDI input ports:");
        for (i, port) in MidiSource::list_ports()?.iter().enumerate() {
            println!("  {}: {}", i, port);
        }
        println!("\nAvailable audio output devices:");
        for (i, device) in list_audio_devices()?.iter().enumerate() {
            println!("  {}: {}", i, device);
        }
        return Ok(());
    }

    let config_path = args.config.context("--config is required")?;
    let config = Config::load(&config_path)?;
    run(config)
}

fn run(config: Config) -> Result<()> {
    let (synth, handle) = Synth::new(config.splits);

    let mut backend = create_backend(config.backend, Box::new(synth));
    backend
        .init(config.sample_rate as f32, config.channels)
        .context("audio negotiation failed")?;
    println!(
        "Negotiated {} Hz, {} channel(s), {:?} backend",
        backend.sample_rate(),
        backend.num_channels(),
        config.backend,
    );

    // All note sources feed this channel; the main thread is the single
    // producer into the synth's event queue.
    let (tx, rx) = crossbeam_channel::unbounded::<NoteEvent>();
    let _midi = if let Some(port) = config.devices.listen {
        source::spawn_udp_source(port, tx)?;
        None
    } else {
        let spec = config
            .devices
            .midiin
            .as_deref()
            .ok_or_else(|| anyhow!("no note source configured"))?;
        Some(MidiSource::connect(spec, tx)?)
    };

    backend
        .start()
        .map_err(|err| anyhow!("failed to start audio backend: {err}"))?;

    // Every note drives all splits; split patches decide pitch and timbre.
    for event in rx.iter() {
        for split in 0..config.splits {
            if event.pressed {
                handle.post_note_on(split, event.note);
            } else {
                handle.post_note_off(split, event.note);
            }
        }
    }

    backend
        .stop()
        .map_err(|err| anyhow!("failed to stop audio backend: {err}"))?;
    Ok(())
}
