//! Per-connector delivery status.

use serde::{Deserialize, Serialize};

/// Delivery status of one connector message.
///
/// A projection of where processing is, not a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Received by the connector.
    Received,
    /// Rejected by the connector's filter.
    Filtered,
    /// Transformed by the connector.
    Transformed,
    /// Sent and a successful response received.
    Sent,
    /// Suspended; waiting in a queue for delivery.
    Queued,
    /// Processing failed.
    Error,
    /// Created, not yet received.
    Pending,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Self::Received,
        Self::Filtered,
        Self::Transformed,
        Self::Sent,
        Self::Queued,
        Self::Error,
        Self::Pending,
    ];

    /// Check if this status allows moving to `target`.
    pub fn can_transition_to(&self, target: Status) -> bool {
        use Status::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Received) |
            // From Received
            (Received, Filtered) | (Received, Transformed) |
            (Received, Queued) | (Received, Error) |
            // From Filtered
            (Filtered, Queued) | (Filtered, Error) |
            // From Transformed
            (Transformed, Sent) | (Transformed, Queued) | (Transformed, Error) |
            // From Queued (delivery of a requeued message)
            (Queued, Sent) | (Queued, Error)
        )
    }

    /// Processing against this connector message has come to rest.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Queued | Self::Error | Self::Filtered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Filtered => "FILTERED",
            Self::Transformed => "TRANSFORMED",
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
