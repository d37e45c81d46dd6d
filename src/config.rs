use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::credentials::ELEVENLABS_BASE_URL;
use crate::protocol::WireStyle;
use crate::session::{AgentProfile, SessionConfig};

/// Environment variable prefix (`EXHIBIT_SESSION__PING_INTERVAL_SECS=20`)
const ENV_PREFIX: &str = "EXHIBIT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub broker: BrokerConfig,
    pub credentials: CredentialsConfig,
    pub session: SessionSettings,
    pub audio: AudioConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { name: "exhibit-voice".to_string(), http: HttpConfig::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1".to_string(), port: 3000 }
    }
}

/// Upstream used by the credential broker
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub upstream_base_url: String,
    /// Falls back to `ELEVENLABS_API_KEY`
    pub api_key: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { upstream_base_url: ELEVENLABS_BASE_URL.to_string(), api_key: None }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("upstream_base_url", &self.upstream_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Where the voice client gets signed URLs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub endpoint: String,
    pub wire_style: WireStyle,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/elevenlabs/signed-url".to_string(),
            wire_style: WireStyle::Json,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ping_interval_secs: u64,
    pub max_buffered_bytes: usize,
    pub skip_silence: bool,
    pub silence_threshold: f32,
    pub start_muted: bool,
    pub level_interval_ms: u64,
    pub assume_ready_on_open: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 15,
            max_buffered_bytes: 1024 * 1024,
            skip_silence: false,
            silence_threshold: 0.01,
            start_muted: false,
            level_interval_ms: 100,
            assume_ready_on_open: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per captured block
    pub frame_samples: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { sample_rate: 16000, frame_samples: 2048 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Publishing is off unless set
    pub nats_url: Option<String>,
    pub subject_prefix: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { nats_url: None, subject_prefix: "exhibit.session".to_string() }
    }
}

impl Config {
    /// Load from `path` (any extension the `config` crate knows; optional)
    /// overlaid with `EXHIBIT_*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if cfg.broker.api_key.as_deref().map_or(true, str::is_empty) {
            cfg.broker.api_key = std::env::var("ELEVENLABS_API_KEY").ok().filter(|k| !k.is_empty());
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.http.port == 0 {
            bail!("service.http.port must be non-zero");
        }
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be non-zero");
        }
        if self.audio.frame_samples == 0 {
            bail!("audio.frame_samples must be non-zero");
        }
        if self.session.ping_interval_secs == 0 {
            bail!("session.ping_interval_secs must be non-zero");
        }
        if self.session.max_buffered_bytes == 0 {
            bail!("session.max_buffered_bytes must be non-zero");
        }
        if !(0.0..=1.0).contains(&self.session.silence_threshold) {
            bail!("session.silence_threshold must be within [0, 1]");
        }
        Ok(())
    }

    /// Session settings for one agent
    pub fn session_config(&self, agent_id: impl Into<String>, profile: AgentProfile) -> SessionConfig {
        SessionConfig {
            agent_id: agent_id.into(),
            profile,
            ping_interval: Duration::from_secs(self.session.ping_interval_secs),
            max_buffered_bytes: self.session.max_buffered_bytes,
            skip_silence: self.session.skip_silence,
            silence_threshold: self.session.silence_threshold,
            start_muted: self.session.start_muted,
            level_interval: Duration::from_millis(self.session.level_interval_ms),
            assume_ready_on_open: self.session.assume_ready_on_open,
            sample_rate: self.audio.sample_rate,
            ..SessionConfig::default()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.sample_rate,
            frame_samples: self.audio.frame_samples,
            ..CaptureConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.session.ping_interval_secs, 15);
        assert_eq!(cfg.session.max_buffered_bytes, 1_048_576);
        assert_eq!(cfg.audio.frame_samples, 2048);
        assert_eq!(cfg.credentials.wire_style, WireStyle::Json);
    }

    #[test]
    fn test_load_file_overrides() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[service.http]
port = 8088

[credentials]
wire_style = "raw_binary"

[session]
skip_silence = true
start_muted = true
"#
        )?;

        let cfg = Config::load(file.path().to_str().context("path")?)?;
        assert_eq!(cfg.service.http.port, 8088);
        assert_eq!(cfg.credentials.wire_style, WireStyle::RawBinary);
        assert!(cfg.session.skip_silence);
        // Untouched keys keep their defaults
        assert_eq!(cfg.session.ping_interval_secs, 15);

        let session = cfg.session_config("agent_1", AgentProfile::named("Curator"));
        assert!(session.start_muted);
        assert_eq!(session.silence_gate(), Some(0.01));
        Ok(())
    }

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("absent");
        let cfg = Config::load(path.to_str().context("path")?)?;
        assert_eq!(cfg.service.http.port, 3000);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut cfg = Config::default();
        cfg.session.ping_interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.audio.frame_samples = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.session.max_buffered_bytes = 0;
        assert!(cfg.validate().is_err());
    }
}
