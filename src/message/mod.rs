//! Message model: content stages, per-connector status and the message itself.

pub mod connector_message;
pub mod content;
pub mod status;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use connector_message::{ConnectorMessage, ContentStore};
pub use content::{Content, ContentMap, ContentType, ErrorContent, MessageContent};
pub use status::Status;

/// Meta data id of the source connector.
pub const SOURCE_META_DATA_ID: u32 = 0;

/// One inbound message and every connector message it produced.
#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: Uuid,
    pub channel_id: String,
    pub received_at: DateTime<Utc>,
    connector_messages: BTreeMap<u32, Arc<ConnectorMessage>>,
}

impl Message {
    pub fn new(message_id: Uuid, channel_id: impl Into<String>, source: Arc<ConnectorMessage>) -> Self {
        let mut connector_messages = BTreeMap::new();
        connector_messages.insert(SOURCE_META_DATA_ID, source);
        Self {
            message_id,
            channel_id: channel_id.into(),
            received_at: Utc::now(),
            connector_messages,
        }
    }

    pub(crate) fn add_destination(&mut self, destination: Arc<ConnectorMessage>) {
        self.connector_messages
            .insert(destination.meta_data_id(), destination);
    }

    pub fn source(&self) -> &Arc<ConnectorMessage> {
        &self.connector_messages[&SOURCE_META_DATA_ID]
    }

    /// Destination connector messages in meta data id order.
    pub fn destinations(&self) -> impl Iterator<Item = &Arc<ConnectorMessage>> {
        self.connector_messages
            .values()
            .filter(|cm| !cm.is_source())
    }

    pub fn destination(&self, name: &str) -> Option<&Arc<ConnectorMessage>> {
        self.destinations().find(|cm| cm.connector_name() == name)
    }

    pub fn connector_message(&self, meta_data_id: u32) -> Option<&Arc<ConnectorMessage>> {
        self.connector_messages.get(&meta_data_id)
    }

    pub fn connector_messages(&self) -> impl Iterator<Item = &Arc<ConnectorMessage>> {
        self.connector_messages.values()
    }

    /// Every connector message has reached a resting status.
    pub fn is_processed(&self) -> bool {
        self.connector_messages
            .values()
            .all(|cm| cm.status().is_terminal())
    }
}
