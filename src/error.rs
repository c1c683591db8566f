//! Error types for the conduit engine core.

use std::time::Duration;

use uuid::Uuid;

use crate::channel::state::DeployedState;
use crate::message::content::ContentType;
use crate::message::status::Status;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data type error: {0}")]
    DataType(#[from] DataTypeError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Channel {channel} failed validation: {reason}")]
    Validation { channel: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by data type readers, writers and the registry.
#[derive(Debug, thiserror::Error)]
pub enum DataTypeError {
    #[error("Unknown data type format: {0}")]
    UnknownFormat(String),

    #[error("Feature not recognized: {0}")]
    FeatureNotRecognized(String),

    #[error("Feature {name} cannot be set to {value} for this reader")]
    FeatureNotSupported { name: String, value: bool },

    #[error("Property not recognized: {0}")]
    PropertyNotRecognized(String),

    #[error("ContentHandler not set")]
    HandlerNotConfigured,

    #[error("Failed to parse {format} input: {reason}")]
    Parse { format: String, reason: String },

    #[error("Failed to encode {format} output: {reason}")]
    Encode { format: String, reason: String },

    #[error("Cannot resolve input source {0}")]
    UnresolvedSource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataTypeError {
    /// True for the feature/property negotiation failures.
    pub fn is_unsupported_feature(&self) -> bool {
        matches!(
            self,
            Self::FeatureNotRecognized(_)
                | Self::FeatureNotSupported { .. }
                | Self::PropertyNotRecognized(_)
        )
    }

    pub(crate) fn parse(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encode {
            format: format.into(),
            reason: reason.into(),
        }
    }
}

/// Violations of the per-connector content stage invariants.
///
/// These indicate a wiring bug in the caller and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Content {content_type} already stored for message {message_id} connector {meta_data_id}")]
    DuplicateStage {
        message_id: Uuid,
        meta_data_id: u32,
        content_type: ContentType,
    },

    #[error("Cannot store {content_type} before {requires}")]
    StageOrdering {
        content_type: ContentType,
        requires: &'static str,
    },

    #[error("Content type {0} does not hold a map")]
    NotAMap(ContentType),

    #[error("Content type {0} holds a map and must be merged")]
    ExpectedMap(ContentType),

    #[error("Connector message {meta_data_id} cannot move from {from} to {to}")]
    IllegalStatusTransition {
        meta_data_id: u32,
        from: Status,
        to: Status,
    },
}

/// Channel lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {channel_id} cannot transition from {from} to {to}")]
    IllegalStateTransition {
        channel_id: String,
        from: DeployedState,
        to: DeployedState,
    },

    #[error("Channel {channel_id} is not running (state {state})")]
    ChannelNotRunning {
        channel_id: String,
        state: DeployedState,
    },

    #[error("Channel {0} not found")]
    NotFound(String),

    #[error("Channel {0} is already deployed")]
    AlreadyDeployed(String),

    #[error("Channel {channel_id} cannot enter {to} with {in_flight} message(s) in flight")]
    WorkInFlight {
        channel_id: String,
        to: DeployedState,
        in_flight: usize,
    },

    #[error("Channel {channel_id} did not drain within {timeout:?} ({in_flight} in flight)")]
    DrainTimeout {
        channel_id: String,
        timeout: Duration,
        in_flight: usize,
    },
}

/// Destination dispatch failures. Carried as data, never propagated out of the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Destination {destination} failed: {reason}")]
    Failed { destination: String, reason: String },

    #[error("Destination {destination} timed out after {timeout:?}")]
    Timeout {
        destination: String,
        timeout: Duration,
    },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Data type error: {0}")]
    DataType(#[from] DataTypeError),

    #[error("Preprocessor failed: {0}")]
    Preprocess(String),

    #[error("Transformer {step} failed: {reason}")]
    Transform { step: String, reason: String },

    #[error("Postprocessor failed: {0}")]
    Postprocess(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
