//! Content stage tags and payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a stored payload represents at a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    /// Inbound message as received, before preprocessing.
    Raw,
    /// Inbound message normalized by the source data type.
    ProcessedRaw,
    /// Canonical representation after transformer execution.
    Transformed,
    /// Transformed data serialized into the outbound data type.
    Encoded,
    /// Snapshot of destination connector properties before dispatch.
    Sent,
    /// Raw response returned by the destination.
    Response,
    /// Canonical representation of the response.
    ResponseTransformed,
    /// Response serialized into the response outbound data type.
    ProcessedResponse,
    ConnectorMap,
    ChannelMap,
    ResponseMap,
    SourceMap,
    ProcessingError,
    PostprocessorError,
    ResponseError,
}

impl ContentType {
    pub const ALL: [ContentType; 15] = [
        Self::Raw,
        Self::ProcessedRaw,
        Self::Transformed,
        Self::Encoded,
        Self::Sent,
        Self::Response,
        Self::ResponseTransformed,
        Self::ProcessedResponse,
        Self::ConnectorMap,
        Self::ChannelMap,
        Self::ResponseMap,
        Self::SourceMap,
        Self::ProcessingError,
        Self::PostprocessorError,
        Self::ResponseError,
    ];

    /// Map stages hold key/value scopes and accept incremental merges.
    pub fn is_map(&self) -> bool {
        matches!(
            self,
            Self::ConnectorMap | Self::ChannelMap | Self::ResponseMap | Self::SourceMap
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ProcessingError | Self::PostprocessorError | Self::ResponseError
        )
    }

    /// Wire name, e.g. `PROCESSED_RAW`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::ProcessedRaw => "PROCESSED_RAW",
            Self::Transformed => "TRANSFORMED",
            Self::Encoded => "ENCODED",
            Self::Sent => "SENT",
            Self::Response => "RESPONSE",
            Self::ResponseTransformed => "RESPONSE_TRANSFORMED",
            Self::ProcessedResponse => "PROCESSED_RESPONSE",
            Self::ConnectorMap => "CONNECTOR_MAP",
            Self::ChannelMap => "CHANNEL_MAP",
            Self::ResponseMap => "RESPONSE_MAP",
            Self::SourceMap => "SOURCE_MAP",
            Self::ProcessingError => "PROCESSING_ERROR",
            Self::PostprocessorError => "POSTPROCESSOR_ERROR",
            Self::ResponseError => "RESPONSE_ERROR",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value scope visible to user steps.
pub type ContentMap = BTreeMap<String, serde_json::Value>;

/// Error detail stored under one of the `*_ERROR` content types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContent {
    /// Stage that failed, e.g. "decode" or "dispatch".
    pub stage: String,
    pub message: String,
}

impl ErrorContent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// A stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Map(ContentMap),
    Error(ErrorContent),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn error(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorContent::new(stage, message))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ContentMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Human-readable rendering for reports.
    pub fn render(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Map(m) => serde_json::to_string(m).unwrap_or_default(),
            Self::Error(e) => e.to_string(),
        }
    }
}

/// One published content stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageContent {
    pub content_type: ContentType,
    pub content: Content,
    /// Data type the payload is expressed in, if any.
    pub data_type: Option<String>,
    pub stored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_types() {
        let maps: Vec<_> = ContentType::ALL.iter().filter(|c| c.is_map()).collect();
        assert_eq!(
            maps,
            vec![
                &ContentType::ConnectorMap,
                &ContentType::ChannelMap,
                &ContentType::ResponseMap,
                &ContentType::SourceMap
            ]
        );
    }

    #[test]
    fn wire_names_match_serde() {
        for ct in ContentType::ALL {
            let json = serde_json::to_string(&ct).unwrap();
            assert_eq!(json, format!("\"{}\"", ct.as_str()));
        }
    }

    #[test]
    fn content_render() {
        assert_eq!(Content::text("A|B").render(), "A|B");
        assert_eq!(Content::error("decode", "bad input").render(), "decode: bad input");
        let mut map = ContentMap::new();
        map.insert("k".into(), serde_json::json!(1));
        assert_eq!(Content::Map(map).render(), r#"{"k":1}"#);
    }
}
