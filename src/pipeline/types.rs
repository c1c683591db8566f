//! Shared types for the connector message pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::datatypes::Element;
use crate::error::{DispatchError, PipelineError};
use crate::message::{ContentMap, Message};

// ── User steps ──────────────────────────────────────────────────────

/// Variable scopes visible to steps while one message is processed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageMaps {
    /// Read-mostly values supplied with the inbound message.
    pub source: ContentMap,
    /// Shared by every connector of the message.
    pub channel: ContentMap,
    /// Local to the connector currently running.
    pub connector: ContentMap,
    /// Response values keyed by destination.
    pub response: ContentMap,
}

impl MessageMaps {
    pub fn with_source(source: ContentMap) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    /// Scopes for a destination: source and channel carried over, the rest fresh.
    pub(crate) fn for_destination(&self) -> Self {
        Self {
            source: self.source.clone(),
            channel: self.channel.clone(),
            ..Self::default()
        }
    }
}

/// What a filter/transformer step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep processing.
    Accept,
    /// Stop here; the connector message is marked FILTERED.
    Filter { reason: String },
}

/// Rewrites raw inbound text before it is decoded.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, raw: &str, maps: &mut MessageMaps) -> Result<String, PipelineError>;
}

/// A filter or transformer step over the canonical tree.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, message: &mut Element, maps: &mut MessageMaps) -> Result<StepOutcome, PipelineError>;
}

/// Runs once every destination of a message has finished.
pub trait Postprocessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, message: &Message) -> Result<(), PipelineError>;
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Everything a destination needs to deliver one encoded message.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub channel_id: String,
    pub message_id: Uuid,
    pub meta_data_id: u32,
    pub destination: String,
    /// Payload in the destination's outbound data type.
    pub encoded: String,
    pub data_type: String,
    /// Connector properties as configured.
    pub properties: serde_json::Value,
    /// 1 for the first delivery attempt.
    pub attempt: u32,
}

/// Result of handing a message to a destination.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Delivered. The response, if any, is decoded with the response data type.
    Sent { response: Option<String> },
    /// Delivery failed or timed out.
    Failed(DispatchError),
    /// The destination accepted the message for later delivery.
    Queued { reason: String },
}

impl DispatchOutcome {
    pub fn sent(response: impl Into<String>) -> Self {
        Self::Sent {
            response: Some(response.into()),
        }
    }

    pub fn failed(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed(DispatchError::Failed {
            destination: destination.into(),
            reason: reason.into(),
        })
    }

    pub fn timeout(destination: impl Into<String>, timeout: Duration) -> Self {
        Self::Failed(DispatchError::Timeout {
            destination: destination.into(),
            timeout,
        })
    }
}

/// Delivery backend of one destination connector.
///
/// Timeouts belong here: an implementation reports them as
/// [`DispatchOutcome::timeout`] rather than hanging the pipeline.
#[async_trait]
pub trait DestinationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome;
}

// ── Wiring ──────────────────────────────────────────────────────────

/// Steps attached to the source connector.
#[derive(Clone, Default)]
pub struct SourceComponents {
    pub preprocessor: Option<Arc<dyn Preprocessor>>,
    pub transformers: Vec<Arc<dyn Transformer>>,
}

/// Steps and delivery backend of one destination connector.
#[derive(Clone)]
pub struct DestinationComponents {
    pub transformers: Vec<Arc<dyn Transformer>>,
    pub response_transformers: Vec<Arc<dyn Transformer>>,
    pub dispatcher: Arc<dyn DestinationDispatcher>,
}

impl DestinationComponents {
    pub fn new(dispatcher: Arc<dyn DestinationDispatcher>) -> Self {
        Self {
            transformers: Vec::new(),
            response_transformers: Vec::new(),
            dispatcher,
        }
    }

    pub fn with_transformer(mut self, step: Arc<dyn Transformer>) -> Self {
        self.transformers.push(step);
        self
    }

    pub fn with_response_transformer(mut self, step: Arc<dyn Transformer>) -> Self {
        self.response_transformers.push(step);
        self
    }
}

/// Code attached to a channel, keyed by destination name.
#[derive(Clone, Default)]
pub struct ChannelComponents {
    pub source: SourceComponents,
    pub destinations: HashMap<String, DestinationComponents>,
    pub postprocessor: Option<Arc<dyn Postprocessor>>,
}

impl ChannelComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preprocessor(mut self, step: Arc<dyn Preprocessor>) -> Self {
        self.source.preprocessor = Some(step);
        self
    }

    pub fn with_source_transformer(mut self, step: Arc<dyn Transformer>) -> Self {
        self.source.transformers.push(step);
        self
    }

    pub fn with_destination(mut self, name: impl Into<String>, components: DestinationComponents) -> Self {
        self.destinations.insert(name.into(), components);
        self
    }

    pub fn with_postprocessor(mut self, step: Arc<dyn Postprocessor>) -> Self {
        self.postprocessor = Some(step);
        self
    }
}

/// Run steps in order until one filters or fails.
pub(crate) fn run_steps(
    steps: &[Arc<dyn Transformer>],
    message: &mut Element,
    maps: &mut MessageMaps,
) -> Result<StepOutcome, PipelineError> {
    for step in steps {
        if let StepOutcome::Filter { reason } = step.apply(message, maps)? {
            return Ok(StepOutcome::Filter {
                reason: format!("{}: {}", step.name(), reason),
            });
        }
    }
    Ok(StepOutcome::Accept)
}
