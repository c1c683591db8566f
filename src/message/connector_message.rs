//! Per-connector message record and its content stage store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ContentError;
use crate::message::content::{Content, ContentMap, ContentType, MessageContent};
use crate::message::status::Status;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Write-once content stages for one connector message.
///
/// Each stage is published as a single `Arc` swap under the write lock, so
/// concurrent readers see either nothing or the complete payload.
#[derive(Debug, Default)]
pub struct ContentStore {
    stages: RwLock<HashMap<ContentType, Arc<MessageContent>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stage.
    ///
    /// Non-map stages are write-once. Map stages merge the given keys into
    /// whatever is already stored.
    pub(crate) fn put(
        &self,
        owner: (Uuid, u32),
        content_type: ContentType,
        content: Content,
        data_type: Option<String>,
    ) -> Result<Arc<MessageContent>, ContentError> {
        let mut stages = write(&self.stages);

        if content_type.is_map() {
            let Content::Map(additions) = content else {
                return Err(ContentError::ExpectedMap(content_type));
            };
            let mut merged = stages
                .get(&content_type)
                .and_then(|existing| existing.content.as_map().cloned())
                .unwrap_or_default();
            merged.extend(additions);
            let published = Arc::new(MessageContent {
                content_type,
                content: Content::Map(merged),
                data_type,
                stored_at: Utc::now(),
            });
            stages.insert(content_type, Arc::clone(&published));
            return Ok(published);
        }

        if matches!(content, Content::Map(_)) {
            return Err(ContentError::NotAMap(content_type));
        }
        if stages.contains_key(&content_type) {
            return Err(ContentError::DuplicateStage {
                message_id: owner.0,
                meta_data_id: owner.1,
                content_type,
            });
        }
        match content_type {
            ContentType::Encoded
                if !stages.contains_key(&ContentType::Raw)
                    && !stages.contains_key(&ContentType::ProcessedRaw) =>
            {
                return Err(ContentError::StageOrdering {
                    content_type,
                    requires: "RAW or PROCESSED_RAW",
                });
            }
            ContentType::ResponseTransformed if !stages.contains_key(&ContentType::Response) => {
                return Err(ContentError::StageOrdering {
                    content_type,
                    requires: "RESPONSE",
                });
            }
            _ => {}
        }

        let published = Arc::new(MessageContent {
            content_type,
            content,
            data_type,
            stored_at: Utc::now(),
        });
        stages.insert(content_type, Arc::clone(&published));
        Ok(published)
    }

    pub fn get(&self, content_type: ContentType) -> Option<Arc<MessageContent>> {
        read(&self.stages).get(&content_type).cloned()
    }

    pub fn contains(&self, content_type: ContentType) -> bool {
        read(&self.stages).contains_key(&content_type)
    }

    /// All stored stages in pipeline order.
    pub fn snapshot(&self) -> Vec<Arc<MessageContent>> {
        let mut all: Vec<_> = read(&self.stages).values().cloned().collect();
        all.sort_by_key(|c| c.content_type);
        all
    }
}

#[derive(Debug, Clone, Copy)]
struct StatusRecord {
    status: Status,
    updated_at: DateTime<Utc>,
    send_attempts: u32,
}

/// The record of one message at one connector.
///
/// Meta data id 0 is the source connector; destinations are numbered from 1.
#[derive(Debug)]
pub struct ConnectorMessage {
    message_id: Uuid,
    channel_id: String,
    meta_data_id: u32,
    connector_name: String,
    received_at: DateTime<Utc>,
    status: RwLock<StatusRecord>,
    contents: ContentStore,
}

impl ConnectorMessage {
    /// Create a connector message in `PENDING`.
    pub fn new(
        message_id: Uuid,
        channel_id: impl Into<String>,
        meta_data_id: u32,
        connector_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            channel_id: channel_id.into(),
            meta_data_id,
            connector_name: connector_name.into(),
            received_at: now,
            status: RwLock::new(StatusRecord {
                status: Status::Pending,
                updated_at: now,
                send_attempts: 0,
            }),
            contents: ContentStore::new(),
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn meta_data_id(&self) -> u32 {
        self.meta_data_id
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    pub fn is_source(&self) -> bool {
        self.meta_data_id == 0
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn status(&self) -> Status {
        read(&self.status).status
    }

    pub fn status_updated_at(&self) -> DateTime<Utc> {
        read(&self.status).updated_at
    }

    pub fn send_attempts(&self) -> u32 {
        read(&self.status).send_attempts
    }

    /// Move to `target`, returning the previous status.
    pub fn set_status(&self, target: Status) -> Result<Status, ContentError> {
        let mut record = write(&self.status);
        let from = record.status;
        if !from.can_transition_to(target) {
            return Err(ContentError::IllegalStatusTransition {
                meta_data_id: self.meta_data_id,
                from,
                to: target,
            });
        }
        record.status = target;
        record.updated_at = Utc::now();
        Ok(from)
    }

    pub(crate) fn record_send_attempt(&self) -> u32 {
        let mut record = write(&self.status);
        record.send_attempts += 1;
        record.send_attempts
    }

    pub fn contents(&self) -> &ContentStore {
        &self.contents
    }

    /// Store a payload for `content_type`.
    pub fn put(
        &self,
        content_type: ContentType,
        content: Content,
    ) -> Result<Arc<MessageContent>, ContentError> {
        self.contents
            .put((self.message_id, self.meta_data_id), content_type, content, None)
    }

    /// Store a payload tagged with the data type it is expressed in.
    pub fn put_with_data_type(
        &self,
        content_type: ContentType,
        content: Content,
        data_type: impl Into<String>,
    ) -> Result<Arc<MessageContent>, ContentError> {
        self.contents.put(
            (self.message_id, self.meta_data_id),
            content_type,
            content,
            Some(data_type.into()),
        )
    }

    /// Merge keys into a map stage.
    pub fn merge_map(
        &self,
        content_type: ContentType,
        entries: ContentMap,
    ) -> Result<Arc<MessageContent>, ContentError> {
        if !content_type.is_map() {
            return Err(ContentError::NotAMap(content_type));
        }
        self.put(content_type, Content::Map(entries))
    }

    pub fn get(&self, content_type: ContentType) -> Option<Arc<MessageContent>> {
        self.contents.get(content_type)
    }

    /// Text payload of a stage, if present and textual.
    pub fn text(&self, content_type: ContentType) -> Option<String> {
        self.get(content_type)
            .and_then(|c| c.content.as_text().map(str::to_string))
    }

    /// Map stage contents; empty if the stage was never written.
    pub fn map(&self, content_type: ContentType) -> ContentMap {
        self.get(content_type)
            .and_then(|c| c.content.as_map().cloned())
            .unwrap_or_default()
    }

    /// The stored error content, whichever error stage holds it.
    pub fn error(&self) -> Option<Arc<MessageContent>> {
        [
            ContentType::ProcessingError,
            ContentType::ResponseError,
            ContentType::PostprocessorError,
        ]
        .into_iter()
        .find_map(|ct| self.get(ct))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cm() -> ConnectorMessage {
        ConnectorMessage::new(Uuid::new_v4(), "adt-in", 1, "Destination 1")
    }

    #[test]
    fn starts_pending_and_empty() {
        let msg = cm();
        assert_eq!(msg.status(), Status::Pending);
        assert!(msg.contents().snapshot().is_empty());
        assert!(msg.get(ContentType::Raw).is_none());
        assert!(!msg.is_source());
    }

    #[test]
    fn second_put_is_duplicate_and_first_value_kept() {
        let msg = cm();
        msg.put(ContentType::Raw, Content::text("first")).unwrap();
        let err = msg.put(ContentType::Raw, Content::text("second")).unwrap_err();
        assert!(matches!(
            err,
            ContentError::DuplicateStage {
                content_type: ContentType::Raw,
                meta_data_id: 1,
                ..
            }
        ));
        assert_eq!(msg.text(ContentType::Raw).unwrap(), "first");
    }

    #[test]
    fn write_once_holds_for_every_non_map_type() {
        for ct in ContentType::ALL.into_iter().filter(|c| !c.is_map()) {
            let msg = cm();
            msg.put(ContentType::Raw, Content::text("raw")).ok();
            msg.put(ContentType::Response, Content::text("resp")).ok();
            if !msg.contents().contains(ct) {
                msg.put(ct, Content::text("v1")).unwrap();
            }
            let before = msg.get(ct).unwrap();
            assert!(matches!(
                msg.put(ct, Content::text("v2")),
                Err(ContentError::DuplicateStage { .. })
            ));
            assert_eq!(msg.get(ct).unwrap(), before);
        }
    }

    #[test]
    fn encoded_requires_raw_or_processed_raw() {
        let msg = cm();
        let err = msg.put(ContentType::Encoded, Content::text("x")).unwrap_err();
        assert!(matches!(err, ContentError::StageOrdering { .. }));
        assert!(msg.get(ContentType::Encoded).is_none());

        msg.put(ContentType::ProcessedRaw, Content::text("<a/>")).unwrap();
        msg.put(ContentType::Encoded, Content::text("x")).unwrap();

        let other = cm();
        other.put(ContentType::Raw, Content::text("A")).unwrap();
        other.put(ContentType::Encoded, Content::text("x")).unwrap();
    }

    #[test]
    fn response_transformed_requires_response() {
        let msg = cm();
        let err = msg
            .put(ContentType::ResponseTransformed, Content::text("<r/>"))
            .unwrap_err();
        assert!(matches!(err, ContentError::StageOrdering { requires: "RESPONSE", .. }));
        msg.put(ContentType::Response, Content::text("ACK")).unwrap();
        msg.put(ContentType::ResponseTransformed, Content::text("<r/>"))
            .unwrap();
    }

    #[test]
    fn map_stages_merge() {
        let msg = cm();
        let mut first = ContentMap::new();
        first.insert("a".into(), json!(1));
        first.insert("b".into(), json!(2));
        msg.merge_map(ContentType::ChannelMap, first).unwrap();

        let mut second = ContentMap::new();
        second.insert("b".into(), json!(20));
        second.insert("c".into(), json!(3));
        msg.merge_map(ContentType::ChannelMap, second).unwrap();

        let map = msg.map(ContentType::ChannelMap);
        assert_eq!(map.get("a"), Some(&json!(1)));
        assert_eq!(map.get("b"), Some(&json!(20)));
        assert_eq!(map.get("c"), Some(&json!(3)));
    }

    #[test]
    fn map_and_non_map_payloads_are_not_interchangeable() {
        let msg = cm();
        assert!(matches!(
            msg.put(ContentType::SourceMap, Content::text("x")),
            Err(ContentError::ExpectedMap(ContentType::SourceMap))
        ));
        assert!(matches!(
            msg.merge_map(ContentType::Raw, ContentMap::new()),
            Err(ContentError::NotAMap(ContentType::Raw))
        ));
    }

    #[test]
    fn status_follows_transition_table() {
        let msg = cm();
        assert_eq!(msg.set_status(Status::Received).unwrap(), Status::Pending);
        msg.set_status(Status::Transformed).unwrap();
        msg.set_status(Status::Error).unwrap();
        let err = msg.set_status(Status::Sent).unwrap_err();
        assert!(matches!(
            err,
            ContentError::IllegalStatusTransition {
                from: Status::Error,
                to: Status::Sent,
                ..
            }
        ));
        assert_eq!(msg.status(), Status::Error);
    }

    #[test]
    fn concurrent_readers_see_whole_stage() {
        let msg = Arc::new(cm());
        let payload = "x".repeat(64 * 1024);
        let reader = {
            let msg = Arc::clone(&msg);
            std::thread::spawn(move || {
                loop {
                    if let Some(c) = msg.get(ContentType::Response) {
                        return c.content.as_text().map(str::len);
                    }
                    std::thread::yield_now();
                }
            })
        };
        msg.put(ContentType::Response, Content::text(payload.clone()))
            .unwrap();
        assert_eq!(reader.join().unwrap(), Some(payload.len()));
    }

    #[test]
    fn error_lookup_finds_any_error_stage() {
        let msg = cm();
        assert!(msg.error().is_none());
        msg.put(ContentType::ResponseError, Content::error("response", "bad ack"))
            .unwrap();
        assert_eq!(
            msg.error().unwrap().content_type,
            ContentType::ResponseError
        );
    }
}
