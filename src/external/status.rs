//! Externally reported vocabularies for status, content type and channel state.
//!
//! These are separate closed sets from the engine's own enums so the two can
//! evolve independently. Engine → external is total; external → engine yields
//! `None` for values the engine has no counterpart for. Names that are not
//! recognized at all parse as `Unknown` instead of failing.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::state::DeployedState;
use crate::message::content::ContentType;
use crate::message::status::Status;

/// Title-case an underscore-separated wire name: `PROCESSED_RAW` → `Processed Raw`.
fn title_case(wire_name: &str) -> String {
    wire_name
        .split('_')
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Status ──────────────────────────────────────────────────────────

/// Message status as reported outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalStatus {
    Received,
    Filtered,
    Transformed,
    Sent,
    Queued,
    Error,
    Pending,
    /// Any name this vocabulary does not know.
    #[serde(other)]
    Unknown,
}

impl ExternalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Filtered => "FILTERED",
            Self::Transformed => "TRANSFORMED",
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The engine status, or `None` for `Unknown`.
    pub fn to_internal(self) -> Option<Status> {
        Some(match self {
            Self::Received => Status::Received,
            Self::Filtered => Status::Filtered,
            Self::Transformed => Status::Transformed,
            Self::Sent => Status::Sent,
            Self::Queued => Status::Queued,
            Self::Error => Status::Error,
            Self::Pending => Status::Pending,
            Self::Unknown => return None,
        })
    }
}

impl From<Status> for ExternalStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Received => Self::Received,
            Status::Filtered => Self::Filtered,
            Status::Transformed => Self::Transformed,
            Status::Sent => Self::Sent,
            Status::Queued => Self::Queued,
            Status::Error => Self::Error,
            Status::Pending => Self::Pending,
        }
    }
}

impl FromStr for ExternalStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Status::ALL
            .into_iter()
            .map(Self::from)
            .find(|e| e.as_str() == s)
            .unwrap_or(Self::Unknown))
    }
}

impl std::fmt::Display for ExternalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Content type ────────────────────────────────────────────────────

/// Content stage tag as reported outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalContentType {
    Raw,
    ProcessedRaw,
    Transformed,
    Encoded,
    Sent,
    Response,
    ResponseTransformed,
    ProcessedResponse,
    ConnectorMap,
    ChannelMap,
    ResponseMap,
    ProcessingError,
    PostprocessorError,
    ResponseError,
    SourceMap,
    #[serde(other)]
    Unknown,
}

impl ExternalContentType {
    pub fn as_str(&self) -> &'static str {
        match self.to_internal() {
            Some(internal) => internal.as_str(),
            None => "UNKNOWN",
        }
    }

    /// Human-readable label, e.g. `Processed Raw`.
    pub fn label(&self) -> String {
        title_case(self.as_str())
    }

    pub fn to_internal(self) -> Option<ContentType> {
        Some(match self {
            Self::Raw => ContentType::Raw,
            Self::ProcessedRaw => ContentType::ProcessedRaw,
            Self::Transformed => ContentType::Transformed,
            Self::Encoded => ContentType::Encoded,
            Self::Sent => ContentType::Sent,
            Self::Response => ContentType::Response,
            Self::ResponseTransformed => ContentType::ResponseTransformed,
            Self::ProcessedResponse => ContentType::ProcessedResponse,
            Self::ConnectorMap => ContentType::ConnectorMap,
            Self::ChannelMap => ContentType::ChannelMap,
            Self::ResponseMap => ContentType::ResponseMap,
            Self::ProcessingError => ContentType::ProcessingError,
            Self::PostprocessorError => ContentType::PostprocessorError,
            Self::ResponseError => ContentType::ResponseError,
            Self::SourceMap => ContentType::SourceMap,
            Self::Unknown => return None,
        })
    }
}

impl From<ContentType> for ExternalContentType {
    fn from(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Raw => Self::Raw,
            ContentType::ProcessedRaw => Self::ProcessedRaw,
            ContentType::Transformed => Self::Transformed,
            ContentType::Encoded => Self::Encoded,
            ContentType::Sent => Self::Sent,
            ContentType::Response => Self::Response,
            ContentType::ResponseTransformed => Self::ResponseTransformed,
            ContentType::ProcessedResponse => Self::ProcessedResponse,
            ContentType::ConnectorMap => Self::ConnectorMap,
            ContentType::ChannelMap => Self::ChannelMap,
            ContentType::ResponseMap => Self::ResponseMap,
            ContentType::ProcessingError => Self::ProcessingError,
            ContentType::PostprocessorError => Self::PostprocessorError,
            ContentType::ResponseError => Self::ResponseError,
            ContentType::SourceMap => Self::SourceMap,
        }
    }
}

impl FromStr for ExternalContentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .map_or(Self::Unknown, Self::from))
    }
}

impl std::fmt::Display for ExternalContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

// ── Deployed state ──────────────────────────────────────────────────

/// Channel state as reported outside the engine.
///
/// `Unknown` doubles as the sentinel for unrecognized names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalDeployedState {
    Undeployed,
    Deploying,
    Undeploying,
    Starting,
    Started,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Syncing,
    #[serde(other)]
    Unknown,
}

impl ExternalDeployedState {
    pub fn to_internal(self) -> DeployedState {
        match self {
            Self::Undeployed => DeployedState::Undeployed,
            Self::Deploying => DeployedState::Deploying,
            Self::Undeploying => DeployedState::Undeploying,
            Self::Starting => DeployedState::Starting,
            Self::Started => DeployedState::Started,
            Self::Pausing => DeployedState::Pausing,
            Self::Paused => DeployedState::Paused,
            Self::Stopping => DeployedState::Stopping,
            Self::Stopped => DeployedState::Stopped,
            Self::Syncing => DeployedState::Syncing,
            Self::Unknown => DeployedState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.to_internal().as_str()
    }

    /// Human-readable label, e.g. `Started`.
    pub fn label(&self) -> String {
        title_case(self.as_str())
    }
}

impl From<DeployedState> for ExternalDeployedState {
    fn from(state: DeployedState) -> Self {
        match state {
            DeployedState::Undeployed => Self::Undeployed,
            DeployedState::Deploying => Self::Deploying,
            DeployedState::Undeploying => Self::Undeploying,
            DeployedState::Starting => Self::Starting,
            DeployedState::Started => Self::Started,
            DeployedState::Pausing => Self::Pausing,
            DeployedState::Paused => Self::Paused,
            DeployedState::Stopping => Self::Stopping,
            DeployedState::Stopped => Self::Stopped,
            DeployedState::Syncing => Self::Syncing,
            DeployedState::Unknown => Self::Unknown,
        }
    }
}

impl FromStr for ExternalDeployedState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeployedState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .map_or(Self::Unknown, Self::from))
    }
}

impl std::fmt::Display for ExternalDeployedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in Status::ALL {
            let external = ExternalStatus::from(status);
            assert_eq!(external.to_internal(), Some(status));
            assert_eq!(external.as_str(), status.as_str());
        }
        assert_eq!(ExternalStatus::Unknown.to_internal(), None);
    }

    #[test]
    fn content_type_round_trip() {
        for content_type in ContentType::ALL {
            let external = ExternalContentType::from(content_type);
            assert_eq!(external.to_internal(), Some(content_type));
            assert_eq!(external.as_str().parse::<ExternalContentType>().unwrap(), external);
        }
    }

    #[test]
    fn deployed_state_round_trip() {
        for state in DeployedState::ALL {
            let external = ExternalDeployedState::from(state);
            assert_eq!(external.to_internal(), state);
            assert_eq!(state.as_str().parse::<ExternalDeployedState>().unwrap(), external);
        }
    }

    #[test]
    fn unrecognized_names_become_unknown() {
        assert_eq!("ARCHIVED".parse::<ExternalStatus>().unwrap(), ExternalStatus::Unknown);
        assert_eq!("received".parse::<ExternalStatus>().unwrap(), ExternalStatus::Unknown);
        assert_eq!(
            "ATTACHMENT".parse::<ExternalContentType>().unwrap(),
            ExternalContentType::Unknown
        );
        assert_eq!(
            "HALTED".parse::<ExternalDeployedState>().unwrap(),
            ExternalDeployedState::Unknown
        );

        let parsed: ExternalStatus = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(parsed, ExternalStatus::Unknown);
        let parsed: ExternalContentType = serde_json::from_str("\"PROCESSED_RAW\"").unwrap();
        assert_eq!(parsed, ExternalContentType::ProcessedRaw);
    }

    #[test]
    fn wire_names_are_serde_names() {
        for status in Status::ALL {
            let external = ExternalStatus::from(status);
            assert_eq!(
                serde_json::to_string(&external).unwrap(),
                format!("\"{}\"", external.as_str())
            );
        }
        for content_type in ContentType::ALL {
            let external = ExternalContentType::from(content_type);
            assert_eq!(
                serde_json::to_string(&external).unwrap(),
                format!("\"{}\"", content_type.as_str())
            );
        }
    }

    #[test]
    fn display_labels() {
        assert_eq!(ExternalDeployedState::Started.to_string(), "Started");
        assert_eq!(ExternalDeployedState::Undeployed.to_string(), "Undeployed");
        assert_eq!(ExternalContentType::ProcessedRaw.to_string(), "Processed Raw");
        assert_eq!(
            ExternalContentType::ResponseTransformed.to_string(),
            "Response Transformed"
        );
        assert_eq!(ExternalContentType::Raw.to_string(), "Raw");
        assert_eq!(ExternalStatus::Queued.to_string(), "QUEUED");
    }
}
