//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use switchboard_conference::{TwilioConfig, DEFAULT_AGENT_LABEL, DEFAULT_AUTO_HANGUP};
use switchboard_intents::{CompletionConfig, Region};
use switchboard_voice::TranscriptionConfig;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telephony account used for outbound legs and conference control.
    #[serde(default)]
    pub twilio: TwilioConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Fallback intent classifier. Disabled when endpoint or key is empty.
    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub conference: ConferenceConfig,

    #[serde(default)]
    pub contacts: ContactsConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used to build callback URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "switchboard_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceConfig {
    /// WebSocket URL the telephony backend streams call audio to. Derived
    /// from `server.public_url` when empty.
    #[serde(default)]
    pub media_stream_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConferenceConfig {
    /// Hard cap on a conference's lifetime.
    #[serde(default = "default_auto_hangup_secs")]
    pub auto_hangup_secs: u64,

    /// Participant label identifying the agent's own call leg.
    #[serde(default = "default_agent_label")]
    pub agent_label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactsConfig {
    #[serde(default = "default_contacts_path")]
    pub path: String,

    /// Region assumed for numbers spoken or stored without a country code.
    #[serde(default)]
    pub default_region: Region,
}

#[derive(Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Bearer token for the `/api` control surface. Empty rejects every
    /// protected request.
    #[serde(default)]
    pub api_bearer_token: String,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("api_bearer_token", &"[REDACTED]")
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auto_hangup_secs() -> u64 {
    DEFAULT_AUTO_HANGUP.as_secs()
}

fn default_agent_label() -> String {
    DEFAULT_AGENT_LABEL.to_string()
}

fn default_contacts_path() -> String {
    "contacts.json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            auto_hangup_secs: default_auto_hangup_secs(),
            agent_label: default_agent_label(),
        }
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            path: default_contacts_path(),
            default_region: Region::default(),
        }
    }
}

impl ConferenceConfig {
    pub fn auto_hangup(&self) -> Duration {
        Duration::from_secs(self.auto_hangup_secs)
    }
}

impl Config {
    fn public_base(&self) -> &str {
        self.server.public_url.trim_end_matches('/')
    }

    /// Where the telephony backend posts conference lifecycle events.
    pub fn status_callback_url(&self) -> String {
        format!("{}/conference/events", self.public_base())
    }

    /// The configured media stream URL, or `ws(s)://<public host>/media-stream`.
    pub fn media_stream_url(&self) -> String {
        if !self.voice.media_stream_url.trim().is_empty() {
            return self.voice.media_stream_url.trim().to_string();
        }
        let base = self.public_base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/media-stream", ws_base)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SWITCHBOARD_HOST`, `SWITCHBOARD_PORT`, `SWITCHBOARD_PUBLIC_URL` override `server.*`
/// - `SWITCHBOARD_LOG_LEVEL`, `SWITCHBOARD_LOG_JSON` override `logging.*`
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_NUMBER` override `twilio.*`
/// - `STT_API_KEY` overrides `transcription.api_key`
/// - `COMPLETION_API_KEY`, `COMPLETION_ENDPOINT` override `completion.*`
/// - `VOICE_AGENT_WS_URL` overrides `voice.media_stream_url`
/// - `INTERNAL_API_BEARER` overrides `security.api_bearer_token`
/// - `SWITCHBOARD_CONTACTS_PATH` overrides `contacts.path`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("SWITCHBOARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("SWITCHBOARD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = var("SWITCHBOARD_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(level) = var("SWITCHBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("SWITCHBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(sid) = var("TWILIO_ACCOUNT_SID") {
        config.twilio.account_sid = sid;
    }
    if let Some(token) = var("TWILIO_AUTH_TOKEN") {
        config.twilio.auth_token = token;
    }
    if let Some(number) = var("TWILIO_NUMBER") {
        config.twilio.phone_number = number;
    }
    if let Some(key) = var("STT_API_KEY") {
        config.transcription.api_key = key;
    }
    if let Some(key) = var("COMPLETION_API_KEY") {
        config.completion.api_key = key;
    }
    if let Some(endpoint) = var("COMPLETION_ENDPOINT") {
        config.completion.endpoint = endpoint;
    }
    if let Some(url) = var("VOICE_AGENT_WS_URL") {
        config.voice.media_stream_url = url;
    }
    if let Some(token) = var("INTERNAL_API_BEARER") {
        config.security.api_bearer_token = token;
    }
    if let Some(path) = var("SWITCHBOARD_CONTACTS_PATH") {
        config.contacts.path = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file() {
        let config = load_config(Some("/nonexistent/switchboard.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.conference.auto_hangup(), Duration::from_secs(1200));
        assert_eq!(config.conference.agent_label, "agent");
        assert_eq!(config.contacts.path, "contacts.json");
        assert_eq!(config.contacts.default_region, Region::US);
        assert!(!config.completion.is_enabled());
    }

    #[test]
    fn parses_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080
            public_url = "https://switchboard.example.com/"

            [completion]
            model = "gpt-4o-mini"

            [conference]
            auto_hangup_secs = 60

            [contacts]
            default_region = "GB"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.completion.timeout_secs, CompletionConfig::default().timeout_secs);
        assert_eq!(config.conference.auto_hangup_secs, 60);
        assert_eq!(config.conference.agent_label, "agent");
        assert_eq!(config.contacts.default_region, Region::GB);
        assert_eq!(
            config.status_callback_url(),
            "https://switchboard.example.com/conference/events"
        );
        assert_eq!(
            config.media_stream_url(),
            "wss://switchboard.example.com/media-stream"
        );
    }

    #[test]
    fn region_in_file_accepts_lowercase_and_uk() {
        for (raw, expected) in [("uk", Region::GB), ("gb", Region::GB), ("au", Region::AU)] {
            let config: Config =
                toml::from_str(&format!("[contacts]\ndefault_region = \"{raw}\"\n")).unwrap();
            assert_eq!(config.contacts.default_region, expected, "input: {raw}");
        }

        let err = toml::from_str::<Config>("[contacts]\ndefault_region = \"xy\"\n").unwrap_err();
        assert!(err.to_string().contains("unsupported default region"));
    }

    #[test]
    fn explicit_media_stream_url_wins() {
        let mut config = Config::default();
        assert_eq!(config.media_stream_url(), "ws://localhost:3000/media-stream");
        config.voice.media_stream_url = "wss://media.example.com/stream".to_string();
        assert_eq!(config.media_stream_url(), "wss://media.example.com/stream");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SWITCHBOARD_PORT", "4000"),
            ("SWITCHBOARD_HOST", "not-an-ip"),
            ("SWITCHBOARD_LOG_JSON", "1"),
            ("TWILIO_AUTH_TOKEN", "tw-secret"),
            ("TWILIO_NUMBER", "+15550001111"),
            ("COMPLETION_ENDPOINT", "https://llm.example.com/v1/chat/completions"),
            ("COMPLETION_API_KEY", "sk-test"),
            ("INTERNAL_API_BEARER", "bearer-1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, default_host());
        assert!(config.logging.json);
        assert_eq!(config.twilio.auth_token, "tw-secret");
        assert_eq!(config.twilio.phone_number, "+15550001111");
        assert!(config.completion.is_enabled());
        assert_eq!(config.security.api_bearer_token, "bearer-1");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = Config::default();
        config.security.api_bearer_token = "bearer-secret".to_string();
        config.twilio.auth_token = "twilio-secret".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("bearer-secret"));
        assert!(!rendered.contains("twilio-secret"));
    }
}
