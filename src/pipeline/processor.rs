//! Connector message pipeline.
//!
//! Flow for one inbound message:
//! 1. Source: RAW → preprocessor → decode (PROCESSED_RAW) → filter/transform
//!    (TRANSFORMED) → encode (ENCODED)
//! 2. Destinations, concurrently: RAW (the source tree in the destination's
//!    inbound data type) → decode → filter/transform → encode → dispatch →
//!    RESPONSE → response transform
//! 3. Postprocessor
//!
//! Failures at a stage are recorded on the connector message as error
//! content plus ERROR status; they never abort sibling destinations.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::controller::ChannelStateMachine;
use crate::config::{ChannelConfig, DestinationConfig};
use crate::datatypes::{DataTypeRegistry, Element};
use crate::error::{ConfigError, PipelineError};
use crate::message::{
    Content, ContentMap, ContentType, ConnectorMessage, Message, SOURCE_META_DATA_ID, Status,
};
use crate::pipeline::types::{
    ChannelComponents, DestinationComponents, DispatchOutcome, DispatchRequest, MessageMaps,
    StepOutcome, run_steps,
};

/// Data type tag for canonical XML content.
pub const CANONICAL_DATA_TYPE: &str = "XML";

/// Processes messages for one channel.
pub struct ChannelPipeline {
    config: Arc<ChannelConfig>,
    registry: Arc<DataTypeRegistry>,
    components: ChannelComponents,
    state: Arc<ChannelStateMachine>,
}

impl ChannelPipeline {
    /// Wire a channel. Every enabled destination needs components.
    pub fn new(
        config: Arc<ChannelConfig>,
        registry: Arc<DataTypeRegistry>,
        components: ChannelComponents,
        state: Arc<ChannelStateMachine>,
    ) -> Result<Self, ConfigError> {
        config.validate(&registry)?;
        for (_, destination) in config.enabled_destinations() {
            if !components.destinations.contains_key(&destination.name) {
                return Err(ConfigError::Validation {
                    channel: config.id.clone(),
                    reason: format!("no dispatcher for destination '{}'", destination.name),
                });
            }
        }
        Ok(Self {
            config,
            registry,
            components,
            state,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ChannelStateMachine> {
        &self.state
    }

    /// Process one inbound message to completion.
    ///
    /// Fails fast with `ChannelNotRunning` unless the channel is STARTED.
    /// Message-level failures are returned as data inside the [`Message`];
    /// an `Err` means a wiring bug (content ordering or status misuse).
    pub async fn process(&self, raw: &str, source_map: ContentMap) -> Result<Message, PipelineError> {
        let _work = self.state.admit()?;

        let message_id = Uuid::new_v4();
        let channel_id = self.config.id.as_str();
        info!(channel_id, message_id = %message_id, "Message admitted");

        let source = Arc::new(ConnectorMessage::new(
            message_id,
            channel_id,
            SOURCE_META_DATA_ID,
            self.config.source.name.as_str(),
        ));
        let mut message = Message::new(message_id, channel_id, Arc::clone(&source));

        let mut maps = MessageMaps::with_source(source_map);
        let Some(transformed) = self.process_source(&source, raw, &mut maps)? else {
            info!(
                channel_id,
                message_id = %message_id,
                status = %source.status(),
                "Message finished at source"
            );
            return Ok(message);
        };

        let destinations: Vec<_> = self
            .config
            .enabled_destinations()
            .filter_map(|(meta_data_id, config)| {
                let components = self.components.destinations.get(&config.name)?;
                let connector = Arc::new(ConnectorMessage::new(
                    message_id,
                    channel_id,
                    meta_data_id,
                    config.name.as_str(),
                ));
                message.add_destination(Arc::clone(&connector));
                Some((config, components, connector))
            })
            .collect();

        let results = join_all(destinations.iter().map(|(config, components, connector)| {
            self.process_destination(config, components, connector, &transformed, &maps)
        }))
        .await;

        source.set_status(Status::Sent)?;

        let mut response_map = ContentMap::new();
        for destination in message.destinations() {
            let detail = destination
                .error()
                .map(|e| e.content.render())
                .or_else(|| destination.text(ContentType::Response));
            response_map.insert(
                destination.connector_name().to_string(),
                json!({ "status": destination.status(), "message": detail }),
            );
        }
        source.merge_map(ContentType::ResponseMap, response_map)?;

        let mut first_bug = None;
        for (result, (config, _, connector)) in results.into_iter().zip(&destinations) {
            if let Err(e) = result {
                error!(
                    channel_id,
                    message_id = %message_id,
                    connector = %config.name,
                    error = %e,
                    "Destination pipeline wiring error"
                );
                if connector.status() != Status::Error {
                    connector.set_status(Status::Error).ok();
                }
                first_bug.get_or_insert(e);
            }
        }

        self.postprocess(&message);

        if let Some(e) = first_bug {
            return Err(e);
        }
        info!(
            channel_id,
            message_id = %message_id,
            destinations = destinations.len(),
            "Message processed"
        );
        Ok(message)
    }

    /// Process several messages independently.
    ///
    /// Failures on individual messages are logged but don't fail the batch.
    pub async fn process_batch(&self, raws: Vec<String>) -> Vec<Message> {
        let count = raws.len();
        info!(channel_id = %self.config.id, count, "Processing message batch");

        let results = join_all(raws.iter().map(|raw| self.process(raw, ContentMap::new()))).await;
        let mut messages = Vec::with_capacity(count);
        for result in results {
            match result {
                Ok(message) => messages.push(message),
                Err(e) => error!(channel_id = %self.config.id, error = %e, "Failed to process message in batch"),
            }
        }

        info!(
            channel_id = %self.config.id,
            processed = messages.len(),
            total = count,
            "Batch processing complete"
        );
        messages
    }

    /// Run the source stages. `None` means the message stopped at the source.
    fn process_source(
        &self,
        source: &ConnectorMessage,
        raw: &str,
        maps: &mut MessageMaps,
    ) -> Result<Option<Element>, PipelineError> {
        let config = &self.config.source;
        source.set_status(Status::Received)?;
        source.put_with_data_type(ContentType::Raw, Content::text(raw), config.inbound_data_type.as_str())?;
        if !maps.source.is_empty() {
            source.merge_map(ContentType::SourceMap, maps.source.clone())?;
        }

        let preprocessed = match &self.components.source.preprocessor {
            Some(step) => match step.process(raw, maps) {
                Ok(text) => text,
                Err(e) => return fail(source, ContentType::ProcessingError, step.name(), &e).map(|_| None),
            },
            None => raw.to_string(),
        };

        let mut tree = match self.registry.decode(
            &config.inbound_data_type,
            &config.data_type_properties,
            &preprocessed,
        ) {
            Ok(tree) => tree,
            Err(e) => return fail(source, ContentType::ProcessingError, "decode", &e).map(|_| None),
        };
        source.put_with_data_type(ContentType::ProcessedRaw, Content::text(tree.to_xml()), CANONICAL_DATA_TYPE)?;

        match run_steps(&self.components.source.transformers, &mut tree, maps) {
            Ok(StepOutcome::Accept) => {}
            Ok(StepOutcome::Filter { reason }) => {
                debug!(message_id = %source.message_id(), reason = %reason, "Source filter rejected message");
                source.set_status(Status::Filtered)?;
                persist_maps(source, maps)?;
                return Ok(None);
            }
            Err(e) => return fail(source, ContentType::ProcessingError, "transformer", &e).map(|_| None),
        }
        source.put_with_data_type(ContentType::Transformed, Content::text(tree.to_xml()), CANONICAL_DATA_TYPE)?;

        match self.registry.encode(&config.outbound_data_type, &config.data_type_properties, &tree) {
            Ok(encoded) => {
                source.put_with_data_type(ContentType::Encoded, Content::text(encoded), config.outbound_data_type.as_str())?;
            }
            Err(e) => return fail(source, ContentType::ProcessingError, "encode", &e).map(|_| None),
        }
        persist_maps(source, maps)?;
        source.set_status(Status::Transformed)?;
        Ok(Some(tree))
    }

    async fn process_destination(
        &self,
        config: &DestinationConfig,
        components: &DestinationComponents,
        connector: &ConnectorMessage,
        source_tree: &Element,
        source_maps: &MessageMaps,
    ) -> Result<(), PipelineError> {
        let mut maps = source_maps.for_destination();
        let inbound = config.inbound_data_type.as_str();
        let properties = &config.data_type_properties;
        connector.set_status(Status::Received)?;

        let raw = match self.registry.encode(inbound, properties, source_tree) {
            Ok(raw) => raw,
            Err(e) => {
                connector.put_with_data_type(ContentType::Raw, Content::text(source_tree.to_xml()), CANONICAL_DATA_TYPE)?;
                return fail(connector, ContentType::ProcessingError, "inbound encode", &e);
            }
        };
        connector.put_with_data_type(ContentType::Raw, Content::text(raw.as_str()), inbound)?;
        if !maps.source.is_empty() {
            connector.merge_map(ContentType::SourceMap, maps.source.clone())?;
        }

        let mut tree = match self.registry.decode(inbound, properties, &raw) {
            Ok(tree) => tree,
            Err(e) => return fail(connector, ContentType::ProcessingError, "inbound decode", &e),
        };
        if self.queue_if_draining(config, connector, "transformer")? {
            return Ok(());
        }
        match run_steps(&components.transformers, &mut tree, &mut maps) {
            Ok(StepOutcome::Accept) => {}
            Ok(StepOutcome::Filter { reason }) => {
                debug!(connector = %config.name, reason = %reason, "Destination filter rejected message");
                connector.set_status(Status::Filtered)?;
                return persist_maps(connector, &maps);
            }
            Err(e) => {
                persist_maps(connector, &maps)?;
                return fail(connector, ContentType::ProcessingError, "transformer", &e);
            }
        }
        connector.put_with_data_type(ContentType::Transformed, Content::text(tree.to_xml()), CANONICAL_DATA_TYPE)?;
        if self.queue_if_draining(config, connector, "encode")? {
            return persist_maps(connector, &maps);
        }

        let encoded = match self.registry.encode(&config.outbound_data_type, properties, &tree) {
            Ok(encoded) => encoded,
            Err(e) => {
                persist_maps(connector, &maps)?;
                return fail(connector, ContentType::ProcessingError, "encode", &e);
            }
        };
        connector.put_with_data_type(ContentType::Encoded, Content::text(encoded.clone()), config.outbound_data_type.as_str())?;
        connector.set_status(Status::Transformed)?;
        persist_maps(connector, &maps)?;

        if self.queue_if_draining(config, connector, "dispatch")? {
            return Ok(());
        }

        connector.put_with_data_type(ContentType::Sent, Content::text(config.properties.to_string()), "JSON")?;
        let request = DispatchRequest {
            channel_id: self.config.id.clone(),
            message_id: connector.message_id(),
            meta_data_id: connector.meta_data_id(),
            destination: config.name.clone(),
            encoded,
            data_type: config.outbound_data_type.clone(),
            properties: config.properties.clone(),
            attempt: connector.record_send_attempt(),
        };

        match components.dispatcher.dispatch(&request).await {
            DispatchOutcome::Sent { response } => {
                if let Some(response) = response {
                    connector.put_with_data_type(ContentType::Response, Content::text(response.as_str()), config.response_data_type())?;
                    if !self.process_response(config, components, connector, &response, &mut maps)? {
                        return Ok(());
                    }
                }
                connector.set_status(Status::Sent)?;
                debug!(connector = %config.name, "Destination sent");
                Ok(())
            }
            DispatchOutcome::Failed(e) => fail(connector, ContentType::ProcessingError, "dispatch", &e),
            DispatchOutcome::Queued { reason } => {
                info!(connector = %config.name, reason = %reason, "Destination queued message");
                connector.set_status(Status::Queued)?;
                Ok(())
            }
        }
    }

    /// Park a destination as QUEUED once the channel is draining.
    ///
    /// Checked before each destination stage; returns true if the connector was queued.
    fn queue_if_draining(
        &self,
        config: &DestinationConfig,
        connector: &ConnectorMessage,
        stage: &str,
    ) -> Result<bool, PipelineError> {
        if !self.state.is_draining() {
            return Ok(false);
        }
        info!(
            channel_id = %self.config.id,
            connector = %config.name,
            stage,
            "Channel draining, destination queued instead of sent"
        );
        connector.set_status(Status::Queued)?;
        Ok(true)
    }

    /// Decode and transform a response. Returns false if the connector was failed.
    ///
    /// A response transformer that filters ends response processing: the
    /// connector stays SENT and only the untransformed RESPONSE is kept.
    fn process_response(
        &self,
        config: &DestinationConfig,
        components: &DestinationComponents,
        connector: &ConnectorMessage,
        response: &str,
        maps: &mut MessageMaps,
    ) -> Result<bool, PipelineError> {
        let data_type = config.response_data_type();
        let properties = &config.data_type_properties;

        let mut tree = match self.registry.decode(data_type, properties, response) {
            Ok(tree) => tree,
            Err(e) => return fail(connector, ContentType::ResponseError, "response decode", &e).map(|_| false),
        };
        match run_steps(&components.response_transformers, &mut tree, maps) {
            Ok(StepOutcome::Accept) => {}
            Ok(StepOutcome::Filter { reason }) => {
                debug!(connector = %config.name, reason = %reason, "Response filter skipped response transform");
                return Ok(true);
            }
            Err(e) => return fail(connector, ContentType::ResponseError, "response transformer", &e).map(|_| false),
        }
        connector.put_with_data_type(ContentType::ResponseTransformed, Content::text(tree.to_xml()), CANONICAL_DATA_TYPE)?;

        match self.registry.encode(data_type, properties, &tree) {
            Ok(processed) => {
                connector.put_with_data_type(ContentType::ProcessedResponse, Content::text(processed), data_type)?;
                if !maps.response.is_empty() {
                    connector.merge_map(ContentType::ResponseMap, std::mem::take(&mut maps.response))?;
                }
                Ok(true)
            }
            Err(e) => fail(connector, ContentType::ResponseError, "response encode", &e).map(|_| false),
        }
    }

    fn postprocess(&self, message: &Message) {
        let Some(step) = &self.components.postprocessor else {
            return;
        };
        if let Err(e) = step.process(message) {
            warn!(
                channel_id = %self.config.id,
                message_id = %message.message_id,
                error = %e,
                "Postprocessor failed"
            );
            if let Err(e) = message.source().put(
                ContentType::PostprocessorError,
                Content::error(step.name(), e.to_string()),
            ) {
                error!(message_id = %message.message_id, error = %e, "Could not record postprocessor error");
            }
        }
    }
}

/// Record a message-level failure: error content, then ERROR status.
fn fail(
    connector: &ConnectorMessage,
    content_type: ContentType,
    stage: &str,
    error: &dyn std::fmt::Display,
) -> Result<(), PipelineError> {
    warn!(
        channel_id = %connector.channel_id(),
        message_id = %connector.message_id(),
        connector = %connector.connector_name(),
        stage,
        error = %error,
        "Connector message failed"
    );
    connector.put(content_type, Content::error(stage, error.to_string()))?;
    connector.set_status(Status::Error)?;
    Ok(())
}

fn persist_maps(connector: &ConnectorMessage, maps: &MessageMaps) -> Result<(), PipelineError> {
    if !maps.channel.is_empty() {
        connector.merge_map(ContentType::ChannelMap, maps.channel.clone())?;
    }
    if !maps.connector.is_empty() {
        connector.merge_map(ContentType::ConnectorMap, maps.connector.clone())?;
    }
    Ok(())
}
