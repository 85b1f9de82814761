use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use stepclock_audio::{DispatchConfig, DispatchMode, LoopQuantize};
use stepclock_types::{SessionConfig, SessionError};
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid session settings: {0}")]
    Session(#[from] SessionError),
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    dispatch: DispatchSection,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    midi: MidiSection,
}

#[derive(Deserialize, Default)]
struct SessionSection {
    bpm: Option<f32>,
    ppq: Option<u32>,
    beats_per_bar: Option<u32>,
}

#[derive(Deserialize, Default)]
struct DispatchSection {
    mode: Option<String>,
    lookahead_ms: Option<u64>,
    latency_compensation_ms: Option<u64>,
    channel: Option<u8>,
    queue_capacity: Option<usize>,
    max_pending: Option<usize>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    loop_quantize: Option<String>,
    random_seed: Option<u64>,
}

#[derive(Deserialize, Default)]
struct MidiSection {
    port: Option<String>,
}

pub struct Config {
    session: SessionSection,
    dispatch: DispatchSection,
    engine: EngineSection,
    midi: MidiSection,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/stepclock/config.toml` when present.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::embedded(),
        }
    }

    /// Embedded defaults overlaid with `path`. A missing file is silently
    /// skipped; an unreadable or malformed one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.merge(user),
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    /// Strict variant of `load_from` for callers that want to report errors.
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Embedded defaults overlaid with `overrides`.
    pub fn from_toml_str(overrides: &str) -> Result<Self, ConfigError> {
        let user: ConfigFile = toml::from_str(overrides)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn embedded() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        Self {
            session: base.session,
            dispatch: base.dispatch,
            engine: base.engine,
            midi: base.midi,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_session(&mut self.session, user.session);
        merge_dispatch(&mut self.dispatch, user.dispatch);
        merge_engine(&mut self.engine, user.engine);
        if user.midi.port.is_some() {
            self.midi.port = user.midi.port;
        }
    }

    /// Validated tempo and resolution. Zero ppq or a non-positive tempo is an error,
    /// never silently replaced.
    pub fn session(&self) -> Result<SessionConfig, ConfigError> {
        let fallback = SessionConfig::default();
        Ok(SessionConfig::new(
            self.session.bpm.unwrap_or(fallback.bpm),
            self.session.ppq.unwrap_or(fallback.ppq),
            self.session.beats_per_bar.unwrap_or(fallback.beats_per_bar),
        )?)
    }

    pub fn dispatch(&self) -> DispatchConfig {
        let fallback = DispatchConfig::default();
        let lookahead = self
            .dispatch
            .lookahead_ms
            .map(|ms| Duration::from_millis(ms.min(1_000)))
            .unwrap_or(fallback.lookahead);
        let latency_compensation = self
            .dispatch
            .latency_compensation_ms
            .map(|ms| Duration::from_millis(ms).min(lookahead))
            .unwrap_or(fallback.latency_compensation);
        DispatchConfig {
            mode: self
                .dispatch
                .mode
                .as_deref()
                .and_then(parse_dispatch_mode)
                .unwrap_or(fallback.mode),
            lookahead,
            latency_compensation,
            channel: self
                .dispatch
                .channel
                .map(|ch| ch.clamp(1, 16) - 1)
                .unwrap_or(fallback.channel),
            queue_capacity: self
                .dispatch
                .queue_capacity
                .unwrap_or(fallback.queue_capacity)
                .clamp(1, 65_536),
            max_pending: self
                .dispatch
                .max_pending
                .unwrap_or(fallback.max_pending)
                .clamp(2, 1 << 20),
        }
    }

    pub fn loop_quantize(&self) -> LoopQuantize {
        self.engine
            .loop_quantize
            .as_deref()
            .and_then(LoopQuantize::parse)
            .unwrap_or_default()
    }

    pub fn random_seed(&self) -> u64 {
        self.engine
            .random_seed
            .unwrap_or(stepclock_audio::engine::DEFAULT_RANDOM_SEED)
    }

    /// Substring of the MIDI output port to connect to.
    pub fn midi_port(&self) -> Option<&str> {
        self.midi.port.as_deref()
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepclock").join("config.toml"))
}

fn merge_session(base: &mut SessionSection, user: SessionSection) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.ppq.is_some() {
        base.ppq = user.ppq;
    }
    if user.beats_per_bar.is_some() {
        base.beats_per_bar = user.beats_per_bar;
    }
}

fn merge_dispatch(base: &mut DispatchSection, user: DispatchSection) {
    if user.mode.is_some() {
        base.mode = user.mode;
    }
    if user.lookahead_ms.is_some() {
        base.lookahead_ms = user.lookahead_ms;
    }
    if user.latency_compensation_ms.is_some() {
        base.latency_compensation_ms = user.latency_compensation_ms;
    }
    if user.channel.is_some() {
        base.channel = user.channel;
    }
    if user.queue_capacity.is_some() {
        base.queue_capacity = user.queue_capacity;
    }
    if user.max_pending.is_some() {
        base.max_pending = user.max_pending;
    }
}

fn merge_engine(base: &mut EngineSection, user: EngineSection) {
    if user.loop_quantize.is_some() {
        base.loop_quantize = user.loop_quantize;
    }
    if user.random_seed.is_some() {
        base.random_seed = user.random_seed;
    }
}

fn parse_dispatch_mode(s: &str) -> Option<DispatchMode> {
    match s.to_lowercase().as_str() {
        "lookahead" | "look-ahead" => Some(DispatchMode::LookAhead),
        "immediate" => Some(DispatchMode::Immediate),
        _ => {
            log::warn!(target: "config", "unknown dispatch mode {:?}", s);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults() {
        let config = Config::embedded();
        let session = config.session().unwrap();
        assert_eq!(session.bpm, 120.0);
        assert_eq!(session.ppq, 24);
        assert_eq!(session.beats_per_bar, 4);

        let dispatch = config.dispatch();
        assert_eq!(dispatch.mode, DispatchMode::LookAhead);
        assert_eq!(dispatch.lookahead, Duration::from_millis(20));
        assert_eq!(dispatch.latency_compensation, Duration::from_millis(5));
        assert_eq!(dispatch.channel, 0);
        assert_eq!(dispatch.queue_capacity, 512);
        assert_eq!(dispatch.max_pending, 4096);

        assert_eq!(config.loop_quantize(), LoopQuantize::Beat);
        assert_eq!(config.random_seed(), 12345);
        assert_eq!(config.midi_port(), None);
    }

    #[test]
    fn overrides_merge_field_by_field() {
        let config = Config::from_toml_str(
            r#"
            [session]
            bpm = 96.5

            [dispatch]
            mode = "immediate"
            channel = 10

            [engine]
            loop_quantize = "bar"

            [midi]
            port = "IAC"
            "#,
        )
        .unwrap();
        let session = config.session().unwrap();
        assert_eq!(session.bpm, 96.5);
        assert_eq!(session.ppq, 24);
        let dispatch = config.dispatch();
        assert_eq!(dispatch.mode, DispatchMode::Immediate);
        assert_eq!(dispatch.channel, 9);
        assert_eq!(dispatch.lookahead, Duration::from_millis(20));
        assert_eq!(config.loop_quantize(), LoopQuantize::Bar);
        assert_eq!(config.midi_port(), Some("IAC"));
    }

    #[test]
    fn out_of_range_values_clamped() {
        let config = Config::from_toml_str(
            r#"
            [dispatch]
            channel = 0
            lookahead_ms = 10
            latency_compensation_ms = 50
            queue_capacity = 0
            "#,
        )
        .unwrap();
        let dispatch = config.dispatch();
        assert_eq!(dispatch.channel, 0);
        assert_eq!(dispatch.latency_compensation, Duration::from_millis(10));
        assert_eq!(dispatch.queue_capacity, 1);

        let config = Config::from_toml_str("[dispatch]\nchannel = 99").unwrap();
        assert_eq!(config.dispatch().channel, 15);
    }

    #[test]
    fn structural_session_errors_reported() {
        let config = Config::from_toml_str("[session]\nppq = 0").unwrap();
        assert!(matches!(
            config.session(),
            Err(ConfigError::Session(SessionError::ZeroPpq))
        ));
    }

    #[test]
    fn unknown_names_fall_back() {
        let config = Config::from_toml_str(
            "[dispatch]\nmode = \"warp\"\n[engine]\nloop_quantize = \"phrase\"",
        )
        .unwrap();
        assert_eq!(config.dispatch().mode, DispatchMode::LookAhead);
        assert_eq!(config.loop_quantize(), LoopQuantize::Beat);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("[session\nbpm = "),
            Err(ConfigError::Parse(_))
        ));
    }
}
