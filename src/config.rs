//! Configuration types.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::controller::DEFAULT_HISTORY_LIMIT;
use crate::datatypes::{DataTypeProperties, DataTypeRegistry};
use crate::error::ConfigError;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default worker limit for channels that do not set their own.
    pub max_workers: usize,
    /// How long a stop or pause waits for in-flight messages.
    pub drain_timeout: Duration,
    /// Optional TOML file with channel definitions.
    pub channels_file: Option<PathBuf>,
    /// Transitions kept per channel.
    pub transition_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            drain_timeout: Duration::from_secs(30),
            channels_file: None,
            transition_history: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Read settings from `CONDUIT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_workers: usize = std::env::var("CONDUIT_MAX_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_workers);

        let drain_timeout_secs: u64 = std::env::var("CONDUIT_DRAIN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.drain_timeout.as_secs());

        let channels_file = std::env::var("CONDUIT_CHANNELS_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let transition_history: usize = std::env::var("CONDUIT_TRANSITION_HISTORY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.transition_history);

        Self {
            max_workers,
            drain_timeout: Duration::from_secs(drain_timeout_secs),
            channels_file,
            transition_history,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_source_name() -> String {
    "Source".to_string()
}

/// Source connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    pub inbound_data_type: String,
    pub outbound_data_type: String,
    #[serde(default)]
    pub data_type_properties: DataTypeProperties,
}

/// Destination connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub inbound_data_type: String,
    pub outbound_data_type: String,
    /// Format of the response the destination returns. Defaults to the outbound format.
    #[serde(default)]
    pub response_data_type: Option<String>,
    #[serde(default)]
    pub data_type_properties: DataTypeProperties,
    /// Connector properties, snapshotted as SENT content before dispatch.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl DestinationConfig {
    pub fn response_data_type(&self) -> &str {
        self.response_data_type
            .as_deref()
            .unwrap_or(&self.outbound_data_type)
    }
}

/// One channel definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Concurrent messages for this channel; engine default when absent.
    #[serde(default)]
    pub max_workers: Option<usize>,
    pub source: SourceConfig,
    pub destinations: Vec<DestinationConfig>,
}

impl ChannelConfig {
    /// Check the definition against the registered data types.
    pub fn validate(&self, registry: &DataTypeRegistry) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Validation {
            channel: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("channel id is empty".to_string()));
        }
        if self.max_workers == Some(0) {
            return Err(invalid("max_workers must be at least 1".to_string()));
        }
        if self.destinations.is_empty() {
            return Err(invalid("at least one destination is required".to_string()));
        }

        let mut names = HashSet::new();
        for destination in &self.destinations {
            if destination.name.trim().is_empty() {
                return Err(invalid("destination name is empty".to_string()));
            }
            if destination.name == self.source.name {
                return Err(invalid(format!(
                    "destination '{}' shadows the source connector name",
                    destination.name
                )));
            }
            if !names.insert(destination.name.as_str()) {
                return Err(invalid(format!(
                    "duplicate destination name '{}'",
                    destination.name
                )));
            }
        }

        let data_types = [
            &self.source.inbound_data_type,
            &self.source.outbound_data_type,
        ]
        .into_iter()
        .chain(self.destinations.iter().flat_map(|d| {
            [&d.inbound_data_type, &d.outbound_data_type]
                .into_iter()
                .chain(d.response_data_type.as_ref())
        }));
        for data_type in data_types {
            if !registry.contains(data_type) {
                return Err(invalid(format!("unknown data type '{}'", data_type)));
            }
        }

        Ok(())
    }

    /// Enabled destinations in declaration order, paired with their meta data ids.
    ///
    /// Ids are assigned by position (1-based) so disabling a destination
    /// never renumbers its siblings.
    pub fn enabled_destinations(&self) -> impl Iterator<Item = (u32, &DestinationConfig)> {
        self.destinations
            .iter()
            .zip(1u32..)
            .filter(|(d, _)| d.enabled)
            .map(|(d, id)| (id, d))
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// A file of channel definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsFile {
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
}

impl ChannelsFile {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Validate every channel and reject duplicate ids.
    pub fn validate(&self, registry: &DataTypeRegistry) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for channel in &self.channels {
            channel.validate(registry)?;
            if !ids.insert(channel.id.as_str()) {
                return Err(ConfigError::Validation {
                    channel: channel.id.clone(),
                    reason: "duplicate channel id".to_string(),
                });
            }
        }
        Ok(())
    }
}
