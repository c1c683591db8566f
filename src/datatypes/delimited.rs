//! Delimited text (`A|B|C`) data type.
//!
//! `A|B|C` reads as
//! `<delimited><row><column1>A</column1><column2>B</column2><column3>C</column3></row></delimited>`.

use crate::datatypes::canonical::Element;
use crate::datatypes::event::{Attributes, InputSource, emit_simple_element};
use crate::datatypes::properties::DataTypeProperties;
use crate::datatypes::reader::{DataTypeReader, ReaderCore};
use crate::datatypes::registry::{DataTypeFactory, DataTypeWriter};
use crate::error::DataTypeError;

pub const FORMAT_ID: &str = "DELIMITED";

const DEFAULT_ROOT: &str = "delimited";
const ROW: &str = "row";
const COLUMN_PREFIX: &str = "column";

pub struct DelimitedReader {
    core: ReaderCore,
    properties: DataTypeProperties,
}

impl DelimitedReader {
    pub fn new(properties: DataTypeProperties) -> Self {
        Self {
            core: ReaderCore::new(),
            properties,
        }
    }

    fn records<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split(self.properties.record_delimiter.as_str())
            .map(|r| r.strip_suffix('\r').unwrap_or(r))
            .collect()
    }
}

impl DataTypeReader for DelimitedReader {
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
        if self.properties.field_delimiter.is_empty() || self.properties.record_delimiter.is_empty()
        {
            return Err(DataTypeError::parse(FORMAT_ID, "delimiters must not be empty"));
        }
        let text = self.core.read_input(input)?;
        let root = self.properties.root_or(DEFAULT_ROOT).to_string();

        handler.start_document()?;
        handler.start_element("", &root, &root, Attributes::empty())?;
        for (index, record) in self.records(&text).into_iter().enumerate() {
            if record.trim().is_empty() {
                self.core.warn(&format!("skipped blank record {}", index + 1));
                continue;
            }
            handler.start_element("", ROW, ROW, Attributes::empty())?;
            for (column, field) in record
                .split(self.properties.field_delimiter.as_str())
                .enumerate()
            {
                let name = format!("{COLUMN_PREFIX}{}", column + 1);
                let value = if self.properties.strip_whitespace {
                    field.trim()
                } else {
                    field
                };
                emit_simple_element(handler.as_ref(), &name, value)?;
            }
            handler.end_element("", ROW, ROW)?;
        }
        handler.end_element("", &root, &root)?;
        handler.end_document()
    }
}

pub struct DelimitedWriter {
    properties: DataTypeProperties,
}

impl DataTypeWriter for DelimitedWriter {
    fn format(&self) -> &str {
        FORMAT_ID
    }

    /// Each child of the root is a record; each record child is a field, in order.
    fn write(&self, root: &Element) -> Result<String, DataTypeError> {
        let mut records = Vec::new();
        for row in root.child_elements() {
            if row.is_leaf() {
                return Err(DataTypeError::encode(
                    FORMAT_ID,
                    format!("record element {} has no fields", row.local_name),
                ));
            }
            let fields: Vec<String> = row.child_elements().map(Element::text).collect();
            records.push(fields.join(&self.properties.field_delimiter));
        }
        Ok(records.join(&self.properties.record_delimiter))
    }
}

#[derive(Debug, Default)]
pub struct DelimitedDataType;

impl DataTypeFactory for DelimitedDataType {
    fn id(&self) -> &str {
        FORMAT_ID
    }

    fn create_reader(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeReader> {
        Box::new(DelimitedReader::new(properties.clone()))
    }

    fn create_writer(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeWriter> {
        Box::new(DelimitedWriter {
            properties: properties.clone(),
        })
    }
}
