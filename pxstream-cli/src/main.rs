use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Select;
use pxstream_client::{
    MediaSink, MediaTrack, SessionEvent, SessionHandle, SessionListener, SessionOrchestrator,
};
use pxstream_core::StreamConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pxstream")]
#[command(about = "Headless client for a pixel streaming session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a signalling server and print session events
    Connect {
        /// Signalling server, e.g. ws://127.0.0.1:80
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long)]
        streamer: Option<String>,

        /// JSON file with a stream configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        codec: Option<String>,

        /// Only use TURN relay candidates
        #[arg(long)]
        relay: bool,

        /// Send the offer instead of waiting for the streamer's
        #[arg(long)]
        offer: bool,

        /// Subscribe to the first streamer instead of asking
        #[arg(long)]
        non_interactive: bool,
    },
}

/// Prints events and asks the user to pick a streamer when the server
/// lists several.
struct ConsoleListener {
    interactive: bool,
    done: mpsc::UnboundedSender<String>,
}

impl ConsoleListener {
    fn choose_streamer(&self, handle: &SessionHandle, ids: &[String]) {
        if !self.interactive {
            if let Some(first) = ids.first() {
                println!("   {} {}", "↳ subscribing to".cyan(), first.bold());
                let _ = handle.subscribe(first.clone());
            }
            return;
        }

        let handle = handle.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let picked = Select::new()
                .with_prompt("Select a streamer")
                .items(&ids)
                .default(0)
                .interact();
            match picked {
                Ok(index) => {
                    if let Some(id) = ids.get(index) {
                        let _ = handle.subscribe(id.clone());
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", "Selection aborted:".red(), e);
                    let _ = handle.request_disconnect("no streamer selected");
                }
            }
        });
    }
}

#[async_trait]
impl SessionListener for ConsoleListener {
    async fn on_event(&self, handle: &SessionHandle, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { from, to } => {
                println!("{} {} -> {}", "⟳".blue(), from, to.to_string().bold());
            }
            SessionEvent::StreamerListReceived { ids, auto_selected } => {
                println!("{} {}", "📡 Streamers:".cyan(), ids.join(", "));
                if auto_selected.is_none() && !ids.is_empty() {
                    self.choose_streamer(handle, ids);
                }
            }
            SessionEvent::PlayerCount { count } => {
                println!("{} {}", "👥 Players:".cyan(), count);
            }
            SessionEvent::Message(message) => {
                println!("{} {:?}", "←".green(), message);
            }
            SessionEvent::OwnershipChanged(change) => {
                println!(
                    "{} {} control {:?} -> {:?}",
                    "🔑".yellow(),
                    change.capability,
                    change.from,
                    change.to
                );
            }
            SessionEvent::TransferComplete(done) => {
                println!(
                    "{} {} ({} bytes{})",
                    "📦 Transfer complete:".green(),
                    done.kind,
                    done.data.len(),
                    done.extension
                        .as_deref()
                        .map(|ext| format!(", .{ext}"))
                        .unwrap_or_default()
                );
            }
            SessionEvent::FreezeFrameCleared => println!("{}", "❄ Freeze frame cleared".cyan()),
            SessionEvent::LatencyProbe(result) => {
                println!("{} {:?}", "⏱ Round trip:".cyan(), result.round_trip);
            }
            SessionEvent::IdleCountdown { grace } => {
                println!("{} {:?}", "💤 Idle, disconnecting in".yellow(), grace);
            }
            SessionEvent::IdleResumed => println!("{}", "Activity resumed".green()),
            SessionEvent::IdleTimeout => println!("{}", "💤 Idle timeout".yellow()),
            SessionEvent::Stats(stats) => {
                let rate = stats
                    .bitrate_kbps
                    .map(|kbps| format!("{kbps:.0} kbps"))
                    .unwrap_or_else(|| "-".to_string());
                let fps = stats
                    .frames_per_second
                    .map(|fps| format!("{fps:.1} fps"))
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {} bytes, {}, {}", "📊 Stats:".dimmed(), stats.bytes_received, rate, fps);
            }
            SessionEvent::Error(e) => println!("{} {}", "✖".red().bold(), e),
            SessionEvent::Disconnected { reason } => {
                println!("{} {}", "Disconnected:".red().bold(), reason);
                let _ = self.done.send(reason.clone());
            }
        }
    }
}

struct ConsoleMedia;

#[async_trait]
impl MediaSink for ConsoleMedia {
    async fn on_channel_ready(&self, relay: bool) {
        let mode = if relay { "relay" } else { "direct" };
        println!("{} ({})", "✨ Data channel ready".green().bold(), mode);
    }

    async fn on_track(&self, track: MediaTrack) {
        println!("{} {:?} {} [{}]", "🎞 Track:".cyan(), track.kind, track.id, track.codec);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<StreamConfig> {
    let Some(path) = path else {
        return Ok(StreamConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    StreamConfig::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Commands::Connect {
        url,
        streamer,
        config,
        codec,
        relay,
        offer,
        non_interactive,
    } = Cli::parse().command;

    let mut config = load_config(config.as_ref())?;
    if let Some(url) = url {
        config.signalling_url = url;
    }
    config.streamer_id = streamer.or(config.streamer_id);
    config.preferred_codec = codec.or(config.preferred_codec);
    config.force_relay |= relay;
    config.originate_offer |= offer;

    println!(
        "{} {}",
        "🚀 Connecting to".green().bold(),
        config.signalling_url.bold()
    );

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let (mut session, handle) = SessionOrchestrator::with_defaults(config);
    session.add_listener(Arc::new(ConsoleListener {
        interactive: !non_interactive,
        done: done_tx,
    }));
    session.set_media_sink(Arc::new(ConsoleMedia));
    let task = tokio::spawn(session.run());

    handle.connect().await.context("Session loop stopped")?;

    let reason = tokio::select! {
        reason = done_rx.recv() => reason.unwrap_or_else(|| "session ended".to_string()),
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            println!("{}", "Interrupted, disconnecting...".yellow());
            handle.disconnect("interrupted").await.context("Session loop stopped")?;
            "interrupted".to_string()
        }
    };

    handle.shutdown().context("Session loop stopped")?;
    task.await.context("Session task panicked")?;
    println!("{} {}", "Session finished:".bold(), reason);
    Ok(())
}
