//! Parla Tutor
//!
//! A terminal client holding one live session: lines typed on stdin become
//! user turns, the tutor's replies are printed as they stream in, and its
//! audio goes to the speaker (with the `device` feature) and optionally to a
//! WAV file.

mod cli;
mod console;
#[cfg(feature = "device")]
mod device;
mod recorder;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use console::Console;
use gemini_realtime::{LiveSession, SessionEvent};
use parla_audio::AudioSink;
use recorder::Recorder;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_ID: &str = "terminal";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?;
    let config = args.live_config(api_key)?;
    let session = LiveSession::new(SESSION_ID, config, output_sink(&args)?);

    let events = session.subscribe();
    let printer = spawn_printer(events, args.record.is_some());
    session
        .connect()
        .await
        .context("Failed to connect to the live service")?;
    info!(model = %args.model, "Connected. Type a message, or /quit to leave.");

    #[cfg(feature = "device")]
    let _microphone = if args.mic {
        let microphone = device::Microphone::open_default(session.config().input_format)?;
        Some(session.forward_audio(microphone)?)
    } else {
        None
    };

    let closed = wait_closed(session.subscribe());
    tokio::pin!(closed);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = session.send(line) {
                    warn!(error = %e, "Message not sent");
                    if !session.is_connected() {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut closed => break,
        }
    }

    session.disconnect().await;
    let recorder = finish_printer(printer).await;
    if let (Some(path), Some(recorder)) = (&args.record, recorder) {
        recorder.save(path)?;
    }
    Ok(())
}

#[cfg(feature = "device")]
fn output_sink(args: &Args) -> Result<Box<dyn AudioSink>> {
    if args.text_only {
        return Ok(Box::new(parla_audio::NullSink));
    }
    Ok(Box::new(device::CpalSink::open_default()?))
}

#[cfg(not(feature = "device"))]
fn output_sink(_args: &Args) -> Result<Box<dyn AudioSink>> {
    Ok(Box::new(parla_audio::NullSink))
}

/// Resolves once the session's connection has ended.
async fn wait_closed(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Closed { .. }) | Err(broadcast::error::RecvError::Closed) => return,
            _ => {}
        }
    }
}

fn spawn_printer(
    mut events: broadcast::Receiver<SessionEvent>,
    record: bool,
) -> JoinHandle<Recorder> {
    tokio::spawn(async move {
        let mut console = Console::new();
        let mut recorder = Recorder::new();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Terminal fell behind the session");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if let (true, SessionEvent::Audio(fragment)) = (record, &event) {
                recorder.record(fragment);
            }
            if let Some(text) = console.render(&event) {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            if matches!(event, SessionEvent::Closed { .. }) {
                break;
            }
        }
        recorder
    })
}

async fn finish_printer(mut printer: JoinHandle<Recorder>) -> Option<Recorder> {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut printer).await {
        Ok(Ok(recorder)) => Some(recorder),
        Ok(Err(e)) => {
            warn!(error = %e, "Printer task failed");
            None
        }
        Err(_) => {
            printer.abort();
            None
        }
    }
}
