use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::time::sleep;
use tracing::{info, warn};

use tapscribe::audio::{CaptureSource, NullSource, WavReplaySource};
use tapscribe::engine::{AudioEngine, EngineConfig, EngineEvent, EngineSources};
use tapscribe::stt::RecognitionResults;
use tapscribe::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tapscribe",
    version,
    about = "Realtime transcription for microphone and system audio"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay WAV files through the transcription engine
    Stream(StreamArgs),
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// WAV file replayed as the microphone source
    #[arg(long)]
    file: PathBuf,

    /// WAV file replayed as the system audio source
    #[arg(long)]
    system_file: Option<PathBuf>,

    /// Replay without realtime pacing
    #[arg(long)]
    unpaced: bool,

    /// Override the recognition model
    #[arg(long)]
    model: Option<String>,

    /// Override the transcription language
    #[arg(long)]
    language: Option<String>,

    /// Override the upload sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Override the service endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Request interim (provisional) results (the default)
    #[arg(long, overrides_with = "no_interim")]
    interim: bool,

    /// Only deliver finalized results
    #[arg(long)]
    no_interim: bool,

    /// Request punctuation
    #[arg(long)]
    punctuate: bool,

    /// Request smart formatting of numbers and dates
    #[arg(long)]
    smart_format: bool,

    /// Request speaker diarization
    #[arg(long)]
    diarize: bool,

    /// Endpointing window in milliseconds
    #[arg(long)]
    endpointing_ms: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    match cli.command {
        Command::Stream(args) => run_stream(args).await,
    }
}

async fn run_stream(args: StreamArgs) -> anyhow::Result<()> {
    let mut app = AppConfig::from_env()?;
    if let Some(model) = args.model {
        app.model = model;
    }
    if let Some(language) = args.language {
        app.language = language;
    }
    if let Some(sample_rate) = args.sample_rate {
        app.sample_rate = sample_rate;
    }
    if let Some(base_url) = args.base_url {
        app.base_url = base_url;
    }

    let mut stream = app.stream_config();
    stream.interim_results = args.interim || !args.no_interim;
    stream.punctuate = args.punctuate;
    stream.smart_format = args.smart_format;
    stream.diarize = args.diarize;
    if let Some(endpointing_ms) = args.endpointing_ms {
        stream.endpointing_ms = endpointing_ms;
    }

    let replay = |path: &PathBuf| {
        if args.unpaced {
            WavReplaySource::unpaced(path)
        } else {
            WavReplaySource::new(path)
        }
    };

    let microphone = replay(&args.file);
    let mut replay_flags = vec![microphone.capturing_flag()];
    let system_audio: Box<dyn CaptureSource> = match &args.system_file {
        Some(path) => {
            let source = replay(path);
            replay_flags.push(source.capturing_flag());
            Box::new(source)
        }
        None => Box::new(NullSource::new()),
    };

    // Replay has no real output device, so the change feed stays silent. The
    // sender must outlive the engine or the monitor sees a closed channel.
    let (_device_tx, device_events) = tokio::sync::mpsc::channel(16);

    let sources = EngineSources {
        microphone: Box::new(microphone),
        system_audio,
        device_events,
    };
    let (mut engine, mut events) = AudioEngine::new(EngineConfig::new(stream), sources);

    engine.start().await?;
    info!(file = %args.file.display(), "transcribing, press Ctrl+C to stop");

    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(event);
            }
            _ = signal::ctrl_c() => {
                info!("shutting down");
                engine.stop().await;
                return Ok(());
            }
            _ = poll.tick() => {
                if replay_finished(&replay_flags) {
                    info!("replay finished, waiting for trailing results");
                    break;
                }
            }
        }
    }

    // Give the service a moment to flush final transcripts.
    let deadline = sleep(Duration::from_secs(2));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(event);
            }
        }
    }

    engine.stop().await;
    Ok(())
}

fn replay_finished(flags: &[Arc<AtomicBool>]) -> bool {
    flags.iter().all(|flag| !flag.load(Ordering::Acquire))
}

fn print_event(event: EngineEvent) {
    match event {
        EngineEvent::Connected { source } => info!(%source, "session connected"),
        EngineEvent::Disconnected { source } => info!(%source, "session disconnected"),
        EngineEvent::Error { source, message } => warn!(%source, "{message}"),
        EngineEvent::Results { source, data } | EngineEvent::Finalized { source, data } => {
            let Some(results) = RecognitionResults::from_value(&data) else {
                return;
            };
            if let Some(transcript) = results.transcript() {
                if results.is_final {
                    println!("[{source}] {transcript}");
                } else {
                    println!("[{source}] ... {transcript}");
                }
            }
        }
        EngineEvent::Metadata { source, data } => {
            let request_id = data
                .get("request_id")
                .and_then(|id| id.as_str())
                .unwrap_or("unknown");
            info!(%source, request_id, "session metadata");
        }
    }
}
