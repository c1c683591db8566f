//! Serializable snapshots for reporting, in the external vocabulary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::channel::manager::ChannelSummary;
use crate::external::status::{ExternalContentType, ExternalDeployedState, ExternalStatus};
use crate::message::{ConnectorMessage, Message};

#[derive(Debug, Clone, Serialize)]
pub struct ContentReport {
    pub content_type: ExternalContentType,
    pub data_type: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorReport {
    pub meta_data_id: u32,
    pub connector_name: String,
    pub status: ExternalStatus,
    pub send_attempts: u32,
    pub error: Option<String>,
    pub contents: Vec<ContentReport>,
}

impl ConnectorReport {
    pub fn from_connector_message(connector: &ConnectorMessage) -> Self {
        Self {
            meta_data_id: connector.meta_data_id(),
            connector_name: connector.connector_name().to_string(),
            status: connector.status().into(),
            send_attempts: connector.send_attempts(),
            error: connector.error().map(|e| e.content.render()),
            contents: connector
                .contents()
                .snapshot()
                .iter()
                .map(|c| ContentReport {
                    content_type: c.content_type.into(),
                    data_type: c.data_type.clone(),
                    content: c.content.render(),
                })
                .collect(),
        }
    }
}

/// A message and all of its connector messages.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub message_id: Uuid,
    pub channel_id: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub connectors: Vec<ConnectorReport>,
}

impl MessageReport {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.message_id,
            channel_id: message.channel_id.clone(),
            received_at: message.received_at,
            processed: message.is_processed(),
            connectors: message
                .connector_messages()
                .map(|cm| ConnectorReport::from_connector_message(cm))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub id: String,
    pub name: String,
    pub state: ExternalDeployedState,
    /// Display label, e.g. `Started`.
    pub state_label: String,
    pub in_flight: usize,
}

impl From<&ChannelSummary> for ChannelReport {
    fn from(summary: &ChannelSummary) -> Self {
        let state = ExternalDeployedState::from(summary.state);
        Self {
            id: summary.id.clone(),
            name: summary.name.clone(),
            state,
            state_label: state.label(),
            in_flight: summary.in_flight,
        }
    }
}
