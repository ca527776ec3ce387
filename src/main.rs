//! session-capture - capture pipeline and receiving backend
//!
//! Subcommands:
//! - `session-capture serve` - HTTP API plus the NATS ingest loop
//! - `session-capture capture` - Record from the synthetic device through the full pipeline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session_capture::{
    create_router, AppState, CaptureController, ChannelTransport, Config, HttpSpeechToText,
    HttpToneAnalyzer, IngestError, IngestOutcome, IngestService, MediaAcquisition,
    MediaConstraints, NatsTransport, SessionAssembler, SessionIdentity, SessionTransport,
    SpeechToText, SyntheticConfig, SyntheticDevices, Toggle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-capture")]
#[command(about = "Webcam/microphone capture pipeline and analysis backend")]
#[command(version)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/session-capture")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and ingest pipeline messages from NATS
    Serve,

    /// Record one session from the synthetic device
    Capture {
        /// User stamped onto every message
        #[arg(short, long, default_value = "demo")]
        user: String,

        /// Recording length in seconds
        #[arg(short, long, default_value = "9")]
        seconds: u64,

        /// Deliver to an in-process assembler instead of NATS
        #[arg(long)]
        dry_run: bool,

        /// Simulate the user denying device access
        #[arg(long)]
        deny: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Commands::Serve => serve(cfg).await,
        Commands::Capture {
            user,
            seconds,
            dry_run,
            deny,
        } => capture(cfg, user, seconds, dry_run, deny).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let analyzer = HttpToneAnalyzer::new(
        &cfg.analysis.endpoint,
        &cfg.analysis.username,
        &cfg.analysis.password,
        &cfg.analysis.version,
        Duration::from_millis(cfg.analysis.timeout_ms),
    )
    .context("Failed to create tone analyzer client")?;

    let state = AppState::new(Arc::new(analyzer));

    let mut service = IngestService::new(Arc::clone(&state.assembler))
        .save_recordings_to(cfg.ingest.recordings_path.clone());

    if cfg.speech.enabled {
        let speech: Arc<dyn SpeechToText> = Arc::new(
            HttpSpeechToText::new(
                &cfg.speech.endpoint,
                &cfg.speech.username,
                &cfg.speech.password,
                &cfg.speech.model,
                Duration::from_millis(cfg.speech.timeout_ms),
            )
            .context("Failed to create speech-to-text client")?,
        );
        info!("Transcribing completed recordings with {}", cfg.speech.model);
        service = service.with_transcription(
            speech,
            Arc::clone(&state.analyzer),
            state.analyses.clone(),
        );
    }

    match NatsTransport::connect(&cfg.transport.nats_url, &cfg.transport.subject_prefix).await {
        Ok(transport) => {
            let mut messages = transport.subscribe_pipeline().await?;

            tokio::spawn(async move {
                while let Some(message) = messages.recv().await {
                    report(service.handle(message).await);
                }
                warn!("Pipeline subscription ended");
            });
        }
        Err(e) => warn!("NATS unavailable, ingest disabled: {:#}", e),
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn capture(
    cfg: Config,
    user: String,
    seconds: u64,
    dry_run: bool,
    deny: bool,
) -> Result<()> {
    let devices = SyntheticDevices::new(SyntheticConfig {
        deny: deny.then(|| "Permission denied by user".to_string()),
        ..SyntheticConfig::default()
    });

    let acquisition = MediaAcquisition::new(
        Arc::new(devices),
        MediaConstraints::default(),
        cfg.capture.acquire_timeout(),
    );

    let assembler = Arc::new(RwLock::new(SessionAssembler::new()));

    let (transport, ingest_task): (Arc<dyn SessionTransport>, _) = if dry_run {
        let (transport, mut messages) = ChannelTransport::new();
        let service = IngestService::new(Arc::clone(&assembler))
            .save_recordings_to(cfg.ingest.recordings_path.clone());

        let task = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                report(service.handle(message).await);
            }
        });
        let transport: Arc<dyn SessionTransport> = Arc::new(transport);
        (transport, Some(task))
    } else {
        let transport: Arc<dyn SessionTransport> = Arc::new(
            NatsTransport::connect(&cfg.transport.nats_url, &cfg.transport.subject_prefix).await?,
        );
        (transport, None)
    };

    let identity = SessionIdentity::starting_now(user);
    let session_timestamp = identity.session_timestamp;

    let controller = CaptureController::attach(
        &acquisition,
        transport,
        identity,
        cfg.capture.session_config(),
    );

    if let Err(e) = controller.ready().await {
        warn!("Device unavailable: {}", e);
        info!("Widget: {:?}", controller.render());
        return Ok(());
    }

    info!("Widget: {:?}", controller.render());

    if let Toggle::Started(id) = controller.toggle_recording().await? {
        info!("Recording session {} for {} seconds", id, seconds);
    }

    tokio::time::sleep(Duration::from_secs(seconds)).await;

    if let Toggle::Stopped(stopped) = controller.toggle_recording().await? {
        let stats = stopped.drained().await;
        info!("Session stats: {}", serde_json::to_string(&stats)?);
    }

    controller.shutdown().await;
    drop(controller);

    if let Some(task) = ingest_task {
        task.await.context("Ingest task failed")?;

        if let Some(timeline) = assembler.read().await.timeline(session_timestamp) {
            info!("Timeline: {}", serde_json::to_string(&timeline)?);
        }
    }

    Ok(())
}

fn report(result: Result<Option<IngestOutcome>, IngestError>) {
    match result {
        Ok(Some(outcome)) => {
            info!(
                "Recording {} of session {} complete ({} ms)",
                outcome.recording.id,
                outcome.recording.session_timestamp,
                outcome.recording.duration_ms()
            );
            if let Some(transcript) = &outcome.transcript {
                info!("Transcript: {:?}", transcript.text);
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Rejected pipeline message: {}", e),
    }
}
