//! Pluggable data type conversion.
//!
//! Every wire format is translated into one canonical structural event
//! stream, so generic consumers never need per-format knowledge:
//! - `event`: the event contract (`ContentHandler` and friends)
//! - `reader`: `DataTypeReader` plus the shared `ReaderCore`
//! - `canonical`: the canonical tree built from events
//! - `registry`: format id → reader/writer factory
//! - `delimited`, `json`, `raw`: built-in formats

pub mod canonical;
pub mod delimited;
pub mod event;
pub mod json;
pub mod properties;
pub mod raw;
pub mod reader;
pub mod registry;

pub use canonical::{Element, EventRecorder, Node, SaxEvent, TreeBuilder};
pub use event::{Attributes, ContentHandler, DtdHandler, EntityResolver, ErrorHandler, InputSource};
pub use properties::DataTypeProperties;
pub use reader::{DataTypeReader, FEATURE_NAMESPACE_PREFIXES, FEATURE_NAMESPACES, ReaderCore};
pub use registry::{DataTypeFactory, DataTypeRegistry, DataTypeRegistryBuilder, DataTypeWriter};
