//! Pass-through data type: the whole payload is the text of one element.

use crate::datatypes::canonical::Element;
use crate::datatypes::event::{InputSource, emit_simple_element};
use crate::datatypes::properties::DataTypeProperties;
use crate::datatypes::reader::{DataTypeReader, ReaderCore};
use crate::datatypes::registry::{DataTypeFactory, DataTypeWriter};
use crate::error::DataTypeError;

pub const FORMAT_ID: &str = "RAW";

const DEFAULT_ROOT: &str = "raw";

pub struct RawReader {
    core: ReaderCore,
    root: String,
}

impl DataTypeReader for RawReader {
    fn format(&self) -> &str {
        FORMAT_ID
    }

    fn core(&self) -> &ReaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ReaderCore {
        &mut self.core
    }

    fn parse(&mut self, input: &InputSource) -> Result<(), DataTypeError> {
        let handler = self.core.ensure_handler_set()?;
        let text = self.core.read_input(input)?;
        handler.start_document()?;
        emit_simple_element(handler.as_ref(), &self.root, &text)?;
        handler.end_document()
    }
}

pub struct RawWriter;

impl DataTypeWriter for RawWriter {
    fn format(&self) -> &str {
        FORMAT_ID
    }

    fn write(&self, root: &Element) -> Result<String, DataTypeError> {
        Ok(root.text())
    }
}

#[derive(Debug, Default)]
pub struct RawDataType;

impl DataTypeFactory for RawDataType {
    fn id(&self) -> &str {
        FORMAT_ID
    }

    fn create_reader(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeReader> {
        Box::new(RawReader {
            core: ReaderCore::new(),
            root: properties.root_or(DEFAULT_ROOT).to_string(),
        })
    }

    fn create_writer(&self, _properties: &DataTypeProperties) -> Box<dyn DataTypeWriter> {
        Box::new(RawWriter)
    }
}
