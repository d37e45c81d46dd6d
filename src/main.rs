use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use exhibit_voice::audio::{FileCapture, PlaybackSink, WavSink};
use exhibit_voice::credentials::{
    CredentialProvider, ElevenLabsCredentialProvider, HttpCredentialProvider,
};
use exhibit_voice::session::{AgentProfile, ConnectionState, SessionEvent, VoiceSession};
use exhibit_voice::{AppState, Config, EventPublisher, WsConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exhibit-voice")]
#[command(about = "Real-time voice conversations with AI exhibit agents")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/exhibit-voice")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the credential broker
    Serve {
        /// Override service.http.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Hold one conversation, using a WAV file as the microphone
    Talk {
        /// Agent to talk to
        #[arg(short, long)]
        agent_id: String,

        /// WAV file streamed in real time as microphone input
        #[arg(short, long)]
        input: PathBuf,

        /// Where the agent's speech is recorded
        #[arg(short, long, default_value = "agent-reply.wav")]
        output: PathBuf,

        /// Label for the agent's transcript lines
        #[arg(long, default_value = "Agent")]
        agent_name: String,

        /// Ask ElevenLabs directly with the broker API key instead of the broker
        #[arg(long)]
        direct: bool,

        /// Start with the microphone muted
        #[arg(long)]
        muted: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("exhibit_voice=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Exhibit Voice v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(cfg.service.http.port);
            if cfg.broker.api_key.is_none() {
                warn!("No ElevenLabs API key configured; signed URL requests will fail");
            }
            let state = AppState::with_upstream(
                cfg.broker.upstream_base_url.clone(),
                cfg.broker.api_key.clone(),
            );
            exhibit_voice::http::serve(&cfg.service.http.bind, port, state).await
        }
        Command::Talk { agent_id, input, output, agent_name, direct, muted } => {
            talk(&cfg, agent_id, input, output, agent_name, direct, muted).await
        }
    }
}

async fn talk(
    cfg: &Config,
    agent_id: String,
    input: PathBuf,
    output: PathBuf,
    agent_name: String,
    direct: bool,
    muted: bool,
) -> Result<()> {
    let credentials: Arc<dyn CredentialProvider> = if direct {
        let Some(api_key) = cfg.broker.api_key.clone() else {
            bail!("--direct needs broker.api_key or ELEVENLABS_API_KEY");
        };
        Arc::new(ElevenLabsCredentialProvider::with_base_url(
            reqwest::Client::new(),
            cfg.broker.upstream_base_url.clone(),
            api_key,
        ))
    } else {
        Arc::new(HttpCredentialProvider::new(
            cfg.credentials.endpoint.clone(),
            cfg.credentials.wire_style,
        ))
    };

    let mut session_config = cfg.session_config(agent_id, AgentProfile::named(agent_name));
    session_config.start_muted |= muted;

    let sample_rate = cfg.audio.sample_rate;
    let sink_factory = Box::new(move || -> Result<Box<dyn PlaybackSink>> {
        Ok(Box::new(WavSink::create(&output, sample_rate)?))
    });

    let mut session = VoiceSession::new(
        session_config,
        credentials,
        Arc::new(WsConnector::new()),
        Box::new(FileCapture::new(input, cfg.capture_config())),
        sink_factory,
    );

    let mut events = session.subscribe();

    let forwarder = match &cfg.events.nats_url {
        Some(url) => {
            let publisher = EventPublisher::connect(url, cfg.events.subject_prefix.clone())
                .await
                .context("Failed to start event publication")?;
            let publisher = Arc::new(publisher);
            let task = Arc::clone(&publisher)
                .spawn_forwarder(session.session_id().to_string(), session.subscribe());
            Some((publisher, task))
        }
        None => None,
    };

    session.start().await?;
    info!("Conversation started! Press Ctrl+C to hang up");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Hanging up...");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Transcript(line)) => println!("{}: {}", line.label, line.text),
                Ok(SessionEvent::Error { message }) => error!("{}", message),
                Ok(SessionEvent::Status { state: ConnectionState::Disconnected }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} session events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let report = session.end().await?;
    if !report.errors.is_empty() {
        warn!("Teardown finished with errors: {:?}", report.errors);
    }

    let stats = session.stats().await;
    info!("Conversation complete!");
    info!("Duration: {:.1}s", stats.duration_secs);
    info!(
        "Audio blocks: {} sent, {} dropped ({} muted, {} backpressure)",
        stats.frames_sent,
        stats.frames_dropped(),
        stats.frames_muted,
        stats.frames_backpressure
    );
    info!(
        "Agent audio: {} chunks played, {} undecodable",
        stats.chunks_scheduled, stats.decode_failures
    );
    info!("Transcript lines: {}", stats.transcript_lines);

    drop(session);
    if let Some((publisher, task)) = forwarder {
        if let Err(e) = task.await {
            warn!("Event forwarder failed: {}", e);
        }
        publisher.flush().await?;
    }

    Ok(())
}
