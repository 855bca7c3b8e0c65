use std::error::Error;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use deckmix::{
    AnalysisConfig, AudioEngine, Deck, LoaderEvent, SampleBank, StripState, analyze,
    decode_audio_file, setup_logger,
};

#[derive(Parser, Debug)]
#[command(name = "deckmix", about = "Two-deck DJ mixing engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a track and print tempo, key, energy and waveform as JSON
    Analyze {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Transform window in samples (power of two)
        #[arg(long, default_value_t = 2048)]
        window_size: usize,

        /// Number of waveform points
        #[arg(long, default_value_t = 800)]
        width: usize,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Play one or two tracks through the default output device
    Play {
        /// Track for the left deck
        left: PathBuf,

        /// Track for the right deck
        right: Option<PathBuf>,

        /// Crossfader position (0 = left, 100 = right)
        #[arg(long, default_value_t = 50.0)]
        crossfader: f32,

        /// Effect preset for both decks (CLEAN, ECHO, SPACE, DUBSTEP)
        #[arg(long)]
        preset: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Load a sample bank from a directory and play its pads in order
    Pads {
        /// Directory holding kick.wav, snare.wav, hihat.wav and clap.wav
        dir: PathBuf,

        /// Sample bank (DRUMS, FX)
        #[arg(long, default_value = "DRUMS")]
        bank: String,

        /// Pads to play, by name; defaults to every pad of the bank
        pads: Vec<String>,

        /// Pause between pads in milliseconds
        #[arg(long, default_value_t = 400)]
        interval_ms: u64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_logger();
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            window_size,
            width,
            pretty,
        } => {
            let config = AnalysisConfig {
                window_size,
                waveform_width: width,
                ..AnalysisConfig::default()
            };
            run_analyze(&input, &config, pretty)
        }
        Command::Play {
            left,
            right,
            crossfader,
            preset,
            seconds,
        } => run_play(left, right, crossfader, preset.as_deref(), seconds),
        Command::Pads {
            dir,
            bank,
            pads,
            interval_ms,
        } => run_pads(&dir, &bank, &pads, Duration::from_millis(interval_ms)),
    }
}

fn run_analyze(input: &Path, config: &AnalysisConfig, pretty: bool) -> Result<(), Box<dyn Error>> {
    let buffer = decode_audio_file(input, 2, None)?;
    log::info!(
        "Decoded {} ({:.1}s @ {} Hz)",
        input.display(),
        buffer.duration_secs(),
        buffer.sample_rate()
    );

    let analysis = analyze(&buffer, config)?;
    let json = if pretty {
        serde_json::to_string_pretty(&analysis)?
    } else {
        serde_json::to_string(&analysis)?
    };
    println!("{json}");
    Ok(())
}

fn run_play(
    left: PathBuf,
    right: Option<PathBuf>,
    crossfader: f32,
    preset: Option<&str>,
    seconds: Option<f64>,
) -> Result<(), Box<dyn Error>> {
    let mut engine = AudioEngine::new();
    engine.set_crossfader(crossfader)?;
    if let Some(id) = preset {
        for deck in Deck::ALL {
            engine.apply_preset(deck, id)?;
        }
    }
    engine.run()?;

    let mut pending = vec![Deck::Left];
    engine.load_file_async(Deck::Left, &left)?;
    if let Some(right) = &right {
        pending.push(Deck::Right);
        engine.load_file_async(Deck::Right, right)?;
    }

    while !pending.is_empty() {
        match engine.poll_loader_event() {
            Some(LoaderEvent::Progress {
                deck,
                percent,
                stage,
            }) => log::debug!("{deck}: {stage} {:.0}%", percent * 100.0),
            Some(LoaderEvent::Success { deck, .. }) => {
                if let Some(analysis) = engine.analysis(deck) {
                    let key = analysis
                        .key
                        .map_or_else(|| "-".to_string(), |key| key.name());
                    log::info!("{deck}: {:.1} bpm, key {key}", analysis.tempo.bpm);
                }
                engine.play(deck)?;
                pending.retain(|&d| d != deck);
            }
            Some(LoaderEvent::Error { deck, error, .. }) => {
                log::error!("{deck}: {error}");
                pending.retain(|&d| d != deck);
            }
            Some(LoaderEvent::Started { .. }) => {}
            None => thread::sleep(Duration::from_millis(10)),
        }
    }

    let started = Instant::now();
    loop {
        let playing = Deck::ALL
            .into_iter()
            .any(|deck| engine.deck_state(deck) == StripState::Playing);
        let timed_out = seconds.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit);
        if !playing || timed_out {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    log::info!("Played {:.1}s", engine.current_time());
    engine.stop_all()?;
    engine.shut_down();
    Ok(())
}

fn run_pads(dir: &Path, bank: &str, pads: &[String], interval: Duration) -> Result<(), Box<dyn Error>> {
    let bank = SampleBank::parse(bank).ok_or_else(|| format!("unknown sample bank: {bank}"))?;
    let names: Vec<&str> = if pads.is_empty() {
        bank.pad_names().to_vec()
    } else {
        pads.iter().map(String::as_str).collect()
    };

    let mut engine = AudioEngine::new();
    engine.run()?;
    engine.set_sample_bank(bank);
    engine.load_sample_bank(dir)?;

    for name in names {
        let pad = bank
            .pad_index(name)
            .ok_or_else(|| format!("{bank} bank has no pad named {name}"))?;
        if !engine.trigger_pad(pad)? {
            log::warn!("{bank} {name}: no sample loaded");
        }
        thread::sleep(interval);
    }

    engine.shut_down();
    Ok(())
}
