//! Settle configuration system
//!
//! This crate provides centralized configuration for the animation settle
//! coordinator, loading settings from `settle.toml` with environment variable
//! overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "settle.toml";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`SettleConfig`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SettleConfig {
    /// Element markers recognized by the scanner and registry
    pub markers: MarkerConfig,
    /// Fallback timer settings
    pub timing: TimingConfig,
    /// Page lifecycle integration
    pub lifecycle: LifecycleConfig,
    /// Headless animation playback settings
    pub playback: PlaybackConfig,
}

/// A boolean marker carried by an element: either a class or an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Present when the element's class list contains the name.
    Class(String),
    /// Present when the element carries the attribute, whatever its value.
    Attribute(String),
}

impl Marker {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    /// Parse the selector-like form used in environment variables:
    /// `.name` for a class, `[name]` for an attribute. A bare name is a class.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let inner = inner.trim();
            return (!inner.is_empty()).then(|| Self::attribute(inner));
        }
        let name = text.strip_prefix('.').unwrap_or(text);
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::class(name))
    }

    /// Class or attribute name.
    pub fn name(&self) -> &str {
        match self {
            Self::Class(name) | Self::Attribute(name) => name,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(name) => write!(f, ".{name}"),
            Self::Attribute(name) => write!(f, "[{name}]"),
        }
    }
}

/// Marker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Flags a root whose entrance animations are being coordinated
    pub animating: Marker,
    /// Flags a descendant whose own animations must also finish
    pub nested: Marker,
    /// Written on a root once it is bound, cleared again on finalization
    pub bound: Marker,
}

/// Fallback timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Slack added on top of the longest `duration + delay` before the
    /// fallback timer marks a participant done
    pub safety_margin_ms: u64,
    /// Maximum number of tasks the headless runtime runs in one drain
    pub step_limit: usize,
}

/// Lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Name of the custom event fired on each view transition
    pub event: String,
}

/// Headless playback configuration, used to reproduce lost or duplicated
/// finished-signals
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Animation names whose finished-signal is never delivered
    pub drop_animations: Vec<String>,
    /// Deliver every finished-signal twice
    pub duplicate_events: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            animating: Marker::class("is-animating"),
            nested: Marker::class("animate-nested"),
            bound: Marker::attribute("data-settle-bound"),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 50,
            step_limit: 10_000,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            event: "astro:page-load".to_string(),
        }
    }
}

impl SettleConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from `settle.toml` in the current directory, or
    /// return the default configuration if it is missing or invalid
    pub fn load_or_default() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_FILE).unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        // Markers
        if let Some(marker) = env_marker("SETTLE_ANIMATING_MARKER") {
            self.markers.animating = marker;
        }
        if let Some(marker) = env_marker("SETTLE_NESTED_MARKER") {
            self.markers.nested = marker;
        }
        if let Some(marker) = env_marker("SETTLE_BOUND_MARKER") {
            self.markers.bound = marker;
        }

        // Timing
        if let Ok(val) = std::env::var("SETTLE_SAFETY_MARGIN_MS") {
            if let Ok(margin) = val.trim().parse::<u64>() {
                self.timing.safety_margin_ms = margin;
            }
        }
        if let Ok(val) = std::env::var("SETTLE_STEP_LIMIT") {
            if let Ok(limit) = val.trim().parse::<usize>() {
                self.timing.step_limit = limit.max(1);
            }
        }

        // Lifecycle
        if let Ok(event) = std::env::var("SETTLE_LIFECYCLE_EVENT") {
            if !event.trim().is_empty() {
                self.lifecycle.event = event.trim().to_string();
            }
        }

        // Playback
        if let Ok(val) = std::env::var("SETTLE_DROP_ANIMATIONS") {
            self.playback.drop_animations = val
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(val) = std::env::var("SETTLE_DUPLICATE_EVENTS") {
            self.playback.duplicate_events = val == "1" || val.eq_ignore_ascii_case("true");
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from settle.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

fn env_marker(key: &str) -> Option<Marker> {
    std::env::var(key).ok().and_then(|val| Marker::parse(&val))
}
