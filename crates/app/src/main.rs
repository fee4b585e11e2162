mod host;

use std::{path::PathBuf, thread, time::Duration};

use beatsnap_core::{
    capacity_for, AppConfig, BeatConsumer, BeatError, BeatProcessor, BeatSnapshot, DispatchStats,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::host::SimulatedHost;

fn main() -> beatsnap_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Simulate(args) => run_simulation(config, &args),
        Commands::Capacity { bpm, sample_rate } => {
            let sample_rate = sample_rate.unwrap_or(config.audio.sample_rate);
            let capacity = capacity_for(bpm, f64::from(sample_rate))
                .ok_or(BeatError::InvalidConfig("bpm and sample rate must be positive"))?;
            println!("{capacity}");
            Ok(())
        }
        Commands::Config => {
            let text = serde_json::to_string_pretty(&config).map_err(BeatError::Config)?;
            println!("{text}");
            Ok(())
        }
    }
}

fn run_simulation(mut config: AppConfig, args: &SimulateArgs) -> beatsnap_core::Result<()> {
    if let Some(sample_rate) = args.sample_rate {
        config.audio.sample_rate = sample_rate;
    }
    if let Some(block_size) = args.block_size {
        config.audio.block_size = block_size;
    }
    config.validate()?;
    if !(args.bpm.is_finite() && args.bpm > 0.0) {
        return Err(BeatError::InvalidConfig("bpm must be positive"));
    }

    let sample_rate = f64::from(config.audio.sample_rate);
    let block_size = config.audio.block_size;
    let mut processor = BeatProcessor::from_config(&config)?;
    let mut port = processor.consumer_port();
    let mut host = SimulatedHost::new(sample_rate, args.bpm, args.loop_beats);

    tracing::info!(
        bpm = args.bpm,
        sample_rate,
        block_size,
        beats = args.beats,
        loop_beats = args.loop_beats,
        "starting simulation"
    );

    let total_blocks = (f64::from(args.beats) * 60.0 / args.bpm * sample_rate / block_size as f64)
        .ceil() as usize;
    let tempo_change_block = args.tempo_change.map(|_| total_blocks / 2);
    let pace = (!args.fast).then(|| Duration::from_secs_f64(block_size as f64 / sample_rate));
    let channels = config.audio.input_channels.max(config.audio.output_channels);
    let input_channels = config.audio.input_channels;
    let tempo_change = args.tempo_change;

    let audio = thread::Builder::new()
        .name("audio".into())
        .spawn(move || {
            let mut storage = vec![vec![0.0f32; block_size]; channels];
            let mut block: Vec<&mut [f32]> =
                storage.iter_mut().map(|channel| &mut channel[..]).collect();
            for index in 0..total_blocks {
                if Some(index) == tempo_change_block {
                    if let Some(bpm) = tempo_change {
                        tracing::info!(from = host.bpm(), to = bpm, "host tempo change");
                        host.set_bpm(bpm);
                    }
                }
                let transport = host.next_block(&mut block[..input_channels]);
                processor.process_block(&mut block, input_channels, &transport);
                if let Some(pace) = pace {
                    thread::sleep(pace);
                }
            }
            processor
        })?;

    let mut receiver = port.attach()?;
    tracing::info!("attached click locator");
    let mut locator = ClickLocator::default();
    let refresh = Duration::from_millis(args.refresh_ms);
    while !audio.is_finished() {
        receiver.deliver_to(&mut locator);
        thread::sleep(refresh);
    }
    receiver.deliver_to(&mut locator);

    let processor = audio
        .join()
        .map_err(|_| BeatError::msg("audio thread panicked"))?;
    report(&processor.dispatch_stats(), processor.beats_detected(), &locator);
    Ok(())
}

fn report(stats: &DispatchStats, beats: u64, locator: &ClickLocator) {
    tracing::info!(
        beats,
        delivered = stats.delivered,
        superseded = stats.superseded,
        dropped = stats.dropped,
        received = locator.received,
        "simulation finished"
    );
}

/// Consumer that reports where the loudest sample of each snapshot sits
/// relative to the beat boundary. With a click on every beat this should be
/// at or very near phase zero.
#[derive(Debug, Default)]
struct ClickLocator {
    received: u64,
    beat: Vec<f32>,
}

impl BeatConsumer for ClickLocator {
    fn push_buffer(&mut self, snapshot: &BeatSnapshot, start_index: usize) {
        self.received += 1;
        self.beat.resize(snapshot.frames(), 0.0);
        let copied = snapshot.copy_aligned(0, &mut self.beat);
        let peak = self.beat[..copied]
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0f32), |best, (index, sample)| {
                if sample.abs() > best.1 {
                    (index, sample.abs())
                } else {
                    best
                }
            });
        let stamp = snapshot.stamp();
        tracing::info!(
            sequence = stamp.sequence,
            kind = ?snapshot.kind(),
            bpm = stamp.bpm,
            frames = snapshot.frames(),
            start_index,
            peak_phase = peak.0,
            peak_level = peak.1,
            "beat snapshot"
        );
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-aligned audio snapshots for visualisers", long_about = None)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the engine from a simulated host and log every snapshot.
    Simulate(SimulateArgs),
    /// Print the number of samples in one beat.
    Capacity {
        #[arg(long)]
        bpm: f64,
        #[arg(long)]
        sample_rate: Option<u32>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Host tempo.
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    /// Number of beats to play.
    #[arg(long, default_value_t = 8)]
    beats: u32,
    /// Loop back to the start after this many beats.
    #[arg(long)]
    loop_beats: Option<f64>,
    /// Switch to this tempo halfway through.
    #[arg(long)]
    tempo_change: Option<f64>,
    /// Overrides the configured sample rate.
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Overrides the configured block size.
    #[arg(long)]
    block_size: Option<usize>,
    /// Consumer poll interval.
    #[arg(long, default_value_t = 16)]
    refresh_ms: u64,
    /// Run the audio thread as fast as possible instead of in real time.
    #[arg(long)]
    fast: bool,
}
