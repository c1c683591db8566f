//! Connector message pipeline.
//!
//! Every inbound message flows through:
//! 1. the source connector: preprocess, decode, filter/transform, encode
//! 2. each enabled destination, concurrently: filter/transform, encode, dispatch
//! 3. the postprocessor
//!
//! Stage failures are recorded on the connector message, never thrown.

pub mod processor;
pub mod steps;
pub mod types;

pub use processor::{CANONICAL_DATA_TYPE, ChannelPipeline};
pub use types::{
    ChannelComponents, DestinationComponents, DestinationDispatcher, DispatchOutcome,
    DispatchRequest, MessageMaps, Postprocessor, Preprocessor, StepOutcome, Transformer,
};
