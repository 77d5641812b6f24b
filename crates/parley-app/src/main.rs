//! Parley application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Build the search and generation clients and the retrieval pipeline
//! 3. Build the voice arbiter when the recorder and synthesizer are installed
//! 4. Answer a one-shot query, or run the interactive terminal loop

mod cli;
mod repl;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use parley_agent::{AgentError, AgentEvent, AgentOrchestrator, ListenOutcome, TurnOutcome};
use parley_core::ParleyConfig;
use parley_rag::{OpenAiCompletionClient, PipelineSettings, RagPipeline, TavilySearchClient};
use parley_voice::{
    program_available, CommandRecorder, CommandSynthesizer, VoiceArbiter, WhisperHttpRecognizer,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use cli::CliArgs;
use repl::{format_history, Command, EventPrinter, HELP};

fn init_tracing(level: &str) {
    // Logs go to stderr so the transcript on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_pipeline(config: &ParleyConfig) -> Result<Arc<RagPipeline>, Box<dyn std::error::Error>> {
    if config.search.api_key.is_empty() {
        tracing::warn!("No search API key configured, answers will have no web context");
    }
    if config.generation.api_key.is_empty() {
        tracing::warn!("No generation API key configured, every query will fail");
    }

    let search = TavilySearchClient::new(&config.search)?;
    let completion = OpenAiCompletionClient::new(&config.generation)?;
    Ok(Arc::new(RagPipeline::new(
        Arc::new(search),
        Arc::new(completion),
        PipelineSettings::from_config(config),
    )))
}

/// The voice arbiter, or `None` when the audio programs are missing.
fn build_voice(config: &ParleyConfig) -> Option<Arc<VoiceArbiter>> {
    let voice = &config.voice;
    let recorder_found = program_available(&voice.recorder_program);
    let synthesizer_found = program_available(&voice.synthesizer_program);
    if !recorder_found || !synthesizer_found {
        tracing::warn!(
            recorder = %voice.recorder_program,
            recorder_found,
            synthesizer = %voice.synthesizer_program,
            synthesizer_found,
            "Audio programs not found, voice disabled"
        );
        return None;
    }

    let recognizer = match WhisperHttpRecognizer::from_config(config) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Speech recognizer unavailable, voice disabled");
            return None;
        }
    };

    tracing::info!(
        recorder = %voice.recorder_program,
        synthesizer = %voice.synthesizer_program,
        "Voice ready"
    );
    Some(Arc::new(VoiceArbiter::from_config(
        Arc::new(CommandRecorder::from_config(voice)),
        Arc::new(recognizer),
        Arc::new(CommandSynthesizer::from_config(voice)),
        voice,
    )))
}

/// Write agent events to stdout until the channel closes.
async fn print_events(mut events: broadcast::Receiver<AgentEvent>) {
    let mut printer = EventPrinter::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = printer.render(&event) {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Rejections the orchestrator does not already announce as a notice.
fn report_rejection(err: &AgentError) {
    match err {
        AgentError::Busy | AgentError::Voice(_) => {}
        other => println!("! {other}"),
    }
}

async fn run_interactive(orchestrator: Arc<AgentOrchestrator>) -> std::io::Result<()> {
    let printer = tokio::spawn(print_events(orchestrator.subscribe_events()));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Query(text) => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.submit_query(&text).await {
                        report_rejection(&e);
                    }
                });
            }
            Command::Listen => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    match orchestrator.start_listening().await {
                        Ok(ListenOutcome::Turn { transcript, .. }) => {
                            tracing::debug!(transcript_len = transcript.len(), "Voice turn finished");
                        }
                        Ok(ListenOutcome::Cancelled) => println!("  (nothing heard)"),
                        Err(e) => report_rejection(&e),
                    }
                });
            }
            Command::Stop => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    let transcript = orchestrator.stop_listening().await;
                    if !transcript.is_empty() {
                        println!("  (heard: {transcript})");
                    }
                });
            }
            Command::Quiet => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move { orchestrator.stop_speaking().await });
            }
            Command::Voice(enabled) => {
                orchestrator.set_voice_enabled(enabled);
                if enabled && !orchestrator.voice_enabled() {
                    println!("! voice is not available on this machine");
                } else {
                    println!("  voice {}", if enabled { "on" } else { "off" });
                }
            }
            Command::Voices => {
                let voices = orchestrator.available_voices().await;
                if voices.is_empty() {
                    println!("  (no voices reported)");
                } else {
                    println!("  {}", voices.join(", "));
                }
            }
            Command::History => print!("{}", format_history(&orchestrator.messages())),
            Command::Help => println!("{HELP}"),
            Command::Unknown(input) => println!("! unknown command: {input} (try /help)"),
        }
    }

    orchestrator.shutdown().await;
    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing so its log level can seed the filter.
    let config_file = args.resolve_config_path();
    let loaded = ParleyConfig::load(&config_file);
    let file_level = loaded
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_default();
    init_tracing(&args.resolve_log_level(&file_level));

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults");
            ParleyConfig::default()
        }
    };
    config.apply_env_overrides();
    if args.no_voice {
        config.voice.enabled = false;
    }
    if args.stream {
        config.generation.stream = true;
    }

    let pipeline = build_pipeline(&config)?;
    let voice = build_voice(&config);
    let orchestrator = Arc::new(AgentOrchestrator::from_config(pipeline, voice, &config));
    tracing::info!(
        voice = orchestrator.voice_enabled(),
        stream = config.generation.stream,
        "Agent ready"
    );

    let Some(query) = args.query else {
        run_interactive(orchestrator).await?;
        return Ok(());
    };

    // One-shot mode.
    let outcome = orchestrator.submit_query(&query).await;
    orchestrator.shutdown().await;
    match outcome? {
        TurnOutcome::Answered { text, .. } => {
            println!("{text}");
            Ok(())
        }
        TurnOutcome::Failed { reason } => {
            println!("{}", config.agent.apology_text);
            Err(reason.into())
        }
    }
}
