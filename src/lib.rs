//! Conduit: integration engine core.
//!
//! Channels receive messages through a source connector, convert them into a
//! canonical form through pluggable data types, and hand them to one or more
//! destination connectors, recording every stage of content per connector.

pub mod channel;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod external;
pub mod message;
pub mod pipeline;

pub use error::{Error, Result};
