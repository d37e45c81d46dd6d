use super::config::SessionConfig;
use super::events::{EventBus, SessionEvent};
use super::state::{ConnectionState, SessionSnapshot, SharedState};
use super::stats::{SessionCounters, SessionStats, TranscriptLine};
use crate::audio::{AudioFrame, CaptureBackend, InboundPlayer, OutboundPump, PlaybackSink};
use crate::credentials::CredentialProvider;
use crate::error::{DecodeError, Result, SessionError};
use crate::protocol::close::NORMAL_CLOSURE;
use crate::protocol::{CloseCategory, CloseInfo, Directive, Interpreter};
use crate::transport::{Connector, OutboundMessage, Transport, TransportEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Creates the audio output for one attempt
pub type SinkFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn PlaybackSink>> + Send + Sync>;

/// What teardown did, step by step
///
/// Every step runs even when an earlier one failed; failures are collected
/// in `errors`.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// How the transport ended (local close or remote closure)
    pub close: Option<CloseInfo>,
    /// Category of an abnormal remote closure
    pub category: Option<CloseCategory>,
    pub transport_closed: bool,
    pub capture_stopped: bool,
    pub output_released: bool,
    pub clock_reset: bool,
    pub errors: Vec<String>,
}

struct ReactorHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<ReactorExit>,
}

struct ReactorExit {
    report: TeardownReport,
    capture: Box<dyn CaptureBackend>,
}

/// A streaming voice conversation with one agent
///
/// Owns the capture backend across attempts. Each `start` fetches a fresh
/// credential, acquires capture and output, opens the transport and hands
/// everything to a reactor task until the transport closes or `end` is
/// called.
pub struct VoiceSession {
    /// Session configuration
    config: SessionConfig,

    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    sink_factory: SinkFactory,

    /// Capture backend; `None` while a reactor holds it
    capture: Option<Box<dyn CaptureBackend>>,

    /// Connection state and mute flag
    shared: Arc<SharedState>,

    events: EventBus,

    /// Counters of the current attempt
    counters: Arc<SessionCounters>,

    /// Transcript of the current attempt
    transcript: Arc<Mutex<Vec<TranscriptLine>>>,

    conversation_id: Arc<Mutex<Option<String>>>,

    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,

    reactor: Option<ReactorHandle>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureBackend>,
        sink_factory: SinkFactory,
    ) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let initial = SessionSnapshot { muted: config.start_muted, ..Default::default() };

        Self {
            config,
            credentials,
            connector,
            sink_factory,
            capture: Some(capture),
            shared: Arc::new(SharedState::new(initial)),
            events: EventBus::new(),
            counters: Arc::new(SessionCounters::default()),
            transcript: Arc::new(Mutex::new(Vec::new())),
            conversation_id: Arc::new(Mutex::new(None)),
            created_at: Utc::now(),
            connected_at: None,
            reactor: None,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a new attempt: `Idle/Disconnected → Connecting → Connected`.
    ///
    /// Any failure surfaces on the error channel, returns the session to
    /// `Idle` and releases whatever was already acquired.
    pub async fn start(&mut self) -> Result<()> {
        let current = self.shared.snapshot().state;
        if !current.can_start() {
            return Err(SessionError::InvalidState(format!("cannot start while {}", current)));
        }

        let agent_id = self.config.agent_id.trim().to_string();
        if agent_id.is_empty() {
            return Err(self.fail(SessionError::configuration("No agent ID configured")));
        }

        // Collect the previous attempt, if its transport closed on its own
        self.reap().await;

        info!("Starting voice session {} for agent {}", self.config.session_id, agent_id);
        self.set_state(ConnectionState::Connecting);

        self.counters = Arc::new(SessionCounters::default());
        self.transcript.lock().await.clear();
        *self.conversation_id.lock().await = None;

        let credential = match self.credentials.fetch(&agent_id).await {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(e)),
        };
        let style = credential.wire_style();
        debug!(provider = self.credentials.name(), %style, "Credential issued");

        let mut sink = match (self.sink_factory)() {
            Ok(sink) => sink,
            Err(e) => {
                return Err(self.fail(SessionError::configuration(format!(
                    "Audio output unavailable: {:#}",
                    e
                ))))
            }
        };

        let Some(mut capture) = self.capture.take() else {
            release_sink(sink.as_mut());
            return Err(self.fail(SessionError::InvalidState("capture backend lost".to_string())));
        };

        let frames = match capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                self.capture = Some(capture);
                release_sink(sink.as_mut());
                return Err(self.fail(e.into()));
            }
        };
        info!("Microphone acquired via {} backend", capture.name());

        let connection = match self.connector.connect(&credential.into_url()).await {
            Ok(connection) => connection,
            Err(e) => {
                if let Err(stop_err) = capture.stop().await {
                    warn!("Failed to stop capture after connect failure: {}", stop_err);
                }
                drop(frames);
                self.capture = Some(capture);
                release_sink(sink.as_mut());
                return Err(self.fail(e.into()));
            }
        };

        self.connected_at = Some(Utc::now());
        let start_muted = self.config.start_muted;
        self.shared.update(|s| {
            s.ready = false;
            s.muted = start_muted;
        });
        self.set_state(ConnectionState::Connected);
        info!(
            "Connected via {} ({} wire style)",
            self.connector.name(),
            style
        );

        let reactor = Reactor {
            session_id: self.config.session_id.clone(),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            counters: Arc::clone(&self.counters),
            transcript: Arc::clone(&self.transcript),
            conversation_id: Arc::clone(&self.conversation_id),
            interpreter: Interpreter::new(self.config.profile.display_name.clone()),
            pump: OutboundPump::new(
                style,
                self.config.max_buffered_bytes,
                self.config.silence_gate(),
                Arc::clone(&self.counters),
            ),
            player: InboundPlayer::new(sink, self.config.sample_rate),
            transport: connection.transport,
            ping_interval: self.config.ping_interval,
            level_interval: self.config.level_interval,
            assume_ready_on_open: self.config.assume_ready_on_open,
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(reactor.run(capture, frames, connection.events, shutdown_rx));
        self.reactor = Some(ReactorHandle { shutdown: shutdown_tx, task });

        Ok(())
    }

    /// End the call and wait for teardown.
    ///
    /// Also collects an attempt whose transport already closed.
    pub async fn end(&mut self) -> Result<TeardownReport> {
        let Some(handle) = self.reactor.take() else {
            return Err(SessionError::InvalidState("no session to end".to_string()));
        };

        info!("Ending voice session: {}", self.config.session_id);
        // Already gone if the transport closed first
        let _ = handle.shutdown.send(());

        self.join(handle.task).await
    }

    /// Tear down any previous attempt and start again with a fresh
    /// credential.
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.reactor.is_some() {
            let report = self.end().await?;
            debug!(?report, "Previous attempt torn down for reconnect");
        }
        self.start().await
    }

    async fn reap(&mut self) {
        if let Some(handle) = self.reactor.take() {
            let _ = handle.shutdown.send(());
            if let Err(e) = self.join(handle.task).await {
                error!("Previous attempt did not shut down cleanly: {}", e);
            }
        }
    }

    async fn join(&mut self, task: JoinHandle<ReactorExit>) -> Result<TeardownReport> {
        match task.await {
            Ok(exit) => {
                self.capture = Some(exit.capture);
                Ok(exit.report)
            }
            Err(e) => {
                error!("Session reactor failed: {}", e);
                self.set_state(ConnectionState::Disconnected);
                Err(SessionError::InvalidState(format!("session reactor failed: {}", e)))
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        set_state(&self.shared, &self.events, state);
    }

    /// Surface an attempt-fatal error and fall back to `Idle`.
    fn fail(&self, err: SessionError) -> SessionError {
        error!("Voice session {} failed: {}", self.config.session_id, err);
        self.events.emit(SessionEvent::Error { message: err.user_message() });
        self.set_state(ConnectionState::Idle);
        err
    }

    // ========================================================================
    // Controls
    // ========================================================================

    pub fn set_muted(&self, muted: bool) {
        let (before, after) = self.shared.update(|s| s.muted = muted);
        if before.muted != after.muted {
            info!("Microphone {}", if muted { "muted" } else { "unmuted" });
            self.events.emit(SessionEvent::MuteChanged { muted });
        }
    }

    /// Flip mute; returns the new value.
    pub fn toggle_mute(&self) -> bool {
        let (_, after) = self.shared.update(|s| s.muted = !s.muted);
        info!("Microphone {}", if after.muted { "muted" } else { "unmuted" });
        self.events.emit(SessionEvent::MuteChanged { muted: after.muted });
        after.muted
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.snapshot().state
    }

    pub fn is_muted(&self) -> bool {
        self.shared.snapshot().muted
    }

    /// Status, error, transcript and level events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot changes
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.subscribe()
    }

    /// Endpoint-issued conversation id, once ready
    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation_id.lock().await.clone()
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let lines = self.transcript.lock().await.len();
        SessionStats::from_counters(&self.counters, self.connected_at, lines)
    }

    /// Get accumulated transcript
    pub async fn transcript(&self) -> Vec<TranscriptLine> {
        self.transcript.lock().await.clone()
    }
}

fn set_state(shared: &SharedState, events: &EventBus, state: ConnectionState) {
    let (before, _) = shared.update(|s| s.state = state);
    if before.state != state {
        info!("Session state: {} -> {}", before.state, state);
    }
    events.emit(SessionEvent::Status { state });
}

fn release_sink(sink: &mut dyn PlaybackSink) {
    if let Err(e) = sink.release() {
        warn!("Failed to release audio output {}: {:#}", sink.name(), e);
    }
}

// ============================================================================
// Reactor
// ============================================================================

enum Exit {
    /// `end`, or the session handle was dropped
    Local,
    Remote(CloseInfo),
}

/// Event loop of one connected attempt
///
/// Sole owner of the interpreter, pump, player and transport handle; the
/// only state it shares is the snapshot, counters and transcript.
struct Reactor {
    session_id: String,
    shared: Arc<SharedState>,
    events: EventBus,
    counters: Arc<SessionCounters>,
    transcript: Arc<Mutex<Vec<TranscriptLine>>>,
    conversation_id: Arc<Mutex<Option<String>>>,
    interpreter: Interpreter,
    pump: OutboundPump,
    player: InboundPlayer,
    transport: Arc<dyn Transport>,
    ping_interval: Duration,
    level_interval: Duration,
    assume_ready_on_open: bool,
}

impl Reactor {
    async fn run(
        mut self,
        capture: Box<dyn CaptureBackend>,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> ReactorExit {
        info!("Session reactor started: {}", self.session_id);

        if self.assume_ready_on_open && self.interpreter.assume_ready() {
            self.mark_ready(None, None).await;
        }

        let pings_enabled = !self.ping_interval.is_zero();
        let ping_period = self.ping_interval.max(Duration::from_millis(1));
        let mut ping = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let levels_enabled = !self.level_interval.is_zero();
        let mut level = tokio::time::interval(self.level_interval.max(Duration::from_millis(1)));
        level.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut capture_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break Exit::Local,

                event = transport_events.recv() => match event {
                    Some(TransportEvent::Text(text)) => self.on_text(&text).await,
                    Some(TransportEvent::Binary(bytes)) => self.on_binary(&bytes),
                    Some(TransportEvent::Error(e)) => {
                        // The close event that follows decides what the user sees
                        warn!("Transport error: {}", e);
                    }
                    Some(TransportEvent::Closed(info)) => break Exit::Remote(info),
                    None => break Exit::Remote(CloseInfo::abnormal()),
                },

                frame = frames.recv(), if capture_open => match frame {
                    Some(frame) => {
                        let snapshot = self.shared.snapshot();
                        self.pump.process(&frame, &snapshot, self.transport.as_ref());
                    }
                    None => {
                        info!("Capture stream ended");
                        capture_open = false;
                    }
                },

                _ = ping.tick(), if pings_enabled => self.send_ping(),

                _ = level.tick(), if levels_enabled => {
                    let level = self.player.level();
                    self.events.emit(SessionEvent::AudioLevel { level });
                }
            }
        };

        // Liveness timer stops first
        drop(ping);
        drop(level);

        self.teardown(exit, capture, frames).await
    }

    async fn on_text(&mut self, text: &str) {
        match self.interpreter.interpret_text(text) {
            Directive::Reply(message) => match message.to_json() {
                Ok(json) => {
                    if self.send_control(OutboundMessage::Text(json)) {
                        SessionCounters::bump(&self.counters.pongs_sent);
                    }
                }
                Err(e) => warn!("Failed to encode reply: {}", e),
            },
            Directive::MarkReady { conversation_id, output_pcm_rate } => {
                self.mark_ready(conversation_id, output_pcm_rate).await;
            }
            Directive::ApplyMetadata { conversation_id, output_pcm_rate } => {
                self.apply_metadata(conversation_id, output_pcm_rate).await;
            }
            Directive::Transcript(line) => {
                info!("{}: {}", line.label, line.text);
                self.transcript.lock().await.push(line.clone());
                self.events.emit(SessionEvent::Transcript(line));
            }
            Directive::PlayPcm(payload) => {
                let result = self.player.play_pcm_base64(&payload);
                self.count_playback(result);
            }
            Directive::Ignore => {}
        }
    }

    fn on_binary(&mut self, bytes: &[u8]) {
        let result = self.player.play_clip(bytes);
        self.count_playback(result);
    }

    fn count_playback<T>(&self, result: std::result::Result<T, DecodeError>) {
        match result {
            Ok(_) => SessionCounters::bump(&self.counters.chunks_scheduled),
            Err(e) => {
                SessionCounters::bump(&self.counters.decode_failures);
                warn!("Dropping undecodable audio chunk: {}", e);
            }
        }
    }

    async fn mark_ready(&mut self, conversation_id: Option<String>, output_pcm_rate: Option<u32>) {
        self.apply_metadata(conversation_id.clone(), output_pcm_rate).await;
        self.shared.update(|s| s.ready = true);
        info!("Session ready; outbound audio enabled");
        self.events.emit(SessionEvent::Ready { conversation_id });
    }

    async fn apply_metadata(&mut self, conversation_id: Option<String>, output_pcm_rate: Option<u32>) {
        if let Some(rate) = output_pcm_rate {
            self.player.set_pcm_rate(rate);
        }
        if conversation_id.is_some() {
            *self.conversation_id.lock().await = conversation_id;
        }
    }

    fn send_ping(&mut self) {
        if !self.transport.is_open() {
            return;
        }
        match self.interpreter.next_ping().to_json() {
            Ok(json) => {
                if self.send_control(OutboundMessage::Text(json)) {
                    SessionCounters::bump(&self.counters.pings_sent);
                    debug!("Sent keepalive ping");
                }
            }
            Err(e) => warn!("Failed to encode keepalive ping: {}", e),
        }
    }

    fn send_control(&self, message: OutboundMessage) -> bool {
        match self.transport.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send control message: {}", e);
                false
            }
        }
    }

    /// Release everything this attempt holds, in order, without stopping
    /// at the first failure.
    async fn teardown(
        mut self,
        exit: Exit,
        mut capture: Box<dyn CaptureBackend>,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> ReactorExit {
        let mut report = TeardownReport::default();

        match &exit {
            Exit::Local => {
                report.close = Some(CloseInfo::normal());
            }
            Exit::Remote(info) => {
                info!(
                    code = info.code,
                    reason = %info.reason,
                    clean = info.clean,
                    "Transport closed by remote"
                );
                report.close = Some(info.clone());
                report.category = info.category();
            }
        }

        // Transport
        if let Err(e) = self.transport.close(NORMAL_CLOSURE, "Session ended") {
            warn!("Transport close failed: {}", e);
            report.errors.push(format!("transport: {}", e));
        }
        report.transport_closed = !self.transport.is_open();

        // Microphone
        drop(frames);
        if let Err(e) = capture.stop().await {
            warn!("Failed to stop capture: {}", e);
            report.errors.push(format!("capture: {}", e));
        }
        report.capture_stopped = !capture.is_capturing();

        // Audio output
        match self.player.release() {
            Ok(()) => report.output_released = true,
            Err(e) => {
                warn!("Failed to release audio output: {:#}", e);
                report.errors.push(format!("output: {:#}", e));
            }
        }

        // Playback clock
        self.player.reset_clock();
        report.clock_reset = true;
        self.events.emit(SessionEvent::AudioLevel { level: 0.0 });

        if let Some(category) = report.category {
            let err = SessionError::Closed(category);
            error!("Voice session {} closed abnormally: {}", self.session_id, err);
            self.events.emit(SessionEvent::Error { message: err.user_message() });
        }

        self.shared.update(|s| s.ready = false);
        set_state(&self.shared, &self.events, ConnectionState::Disconnected);

        info!("Session reactor stopped: {}", self.session_id);

        ReactorExit { report, capture }
    }
}
