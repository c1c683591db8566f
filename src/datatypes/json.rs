//! JSON data type.
//!
//! Objects become elements named after their keys, arrays become repeated
//! elements, scalars become text and `null` an empty element.

use serde_json::{Map, Value};

use crate::datatypes::canonical::Element;
use crate::datatypes::event::{Attributes, ContentHandler, InputSource, emit_text};
use crate::datatypes::properties::DataTypeProperties;
use crate::datatypes::reader::{DataTypeReader, ReaderCore};
use crate::datatypes::registry::{DataTypeFactory, DataTypeWriter};
use crate::error::DataTypeError;

pub const FORMAT_ID: &str = "JSON";

const DEFAULT_ROOT: &str = "json";
const ARRAY_ITEM: &str = "item";

/// Map an arbitrary JSON key onto a usable element name.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
    {
        name.insert(0, '_');
    }
    name
}

pub struct JsonReader {
    core: ReaderCore,
    properties: DataTypeProperties,
}

impl JsonReader {
    pub fn new(properties: DataTypeProperties) -> Self {
        Self {
            core: ReaderCore::new(),
            properties,
        }
    }
}

fn emit_value(handler: &dyn ContentHandler, name: &str, value: &Value) -> Result<(), DataTypeError> {
    match value {
        Value::Array(items) => {
            for item in items {
                emit_value(handler, name, item)?;
            }
            Ok(())
        }
        _ => {
            handler.start_element("", name, name, Attributes::empty())?;
            emit_content(handler, value)?;
            handler.end_element("", name, name)
        }
    }
}

fn emit_content(handler: &dyn ContentHandler, value: &Value) -> Result<(), DataTypeError> {
    match value {
        Value::Null => Ok(()),
        Value::Bool(b) => emit_text(handler, if *b { "true" } else { "false" }),
        Value::Number(n) => emit_text(handler, &n.to_string()),
        Value::String(s) => emit_text(handler, s),
        Value::Object(map) => {
            for (key, child) in map {
                emit_value(handler, &element_name(key), child)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                emit_value(handler, ARRAY_ITEM, item)?;
            }
            Ok(())
        }
    }
}

impl DataTypeReader for JsonReader {
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
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| DataTypeError::parse(FORMAT_ID, e.to_string()))?;
        let root = self.properties.root_or(DEFAULT_ROOT).to_string();

        handler.start_document()?;
        handler.start_element("", &root, &root, Attributes::empty())?;
        emit_content(handler.as_ref(), &value)?;
        handler.end_element("", &root, &root)?;
        handler.end_document()
    }
}

pub struct JsonWriter;

/// Best-effort scalar typing for leaf text.
fn scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = text.parse::<i64>() {
                Value::from(n)
            } else if let Some(n) = text
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(n)
            } else {
                Value::String(text.to_string())
            }
        }
    }
}

fn to_value(element: &Element) -> Value {
    if element.children.is_empty() {
        return Value::Null;
    }
    if element.is_leaf() {
        return scalar(&element.text());
    }
    let mut map = Map::new();
    for child in element.child_elements() {
        let value = to_value(child);
        match map.get_mut(&child.local_name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(child.local_name.clone(), value);
            }
        }
    }
    // Children named `item` directly under an element came from an array.
    if map.len() == 1
        && let Some(items) = map.get(ARRAY_ITEM)
    {
        return match items {
            Value::Array(_) => items.clone(),
            other => Value::Array(vec![other.clone()]),
        };
    }
    Value::Object(map)
}

impl DataTypeWriter for JsonWriter {
    fn format(&self) -> &str {
        FORMAT_ID
    }

    fn write(&self, root: &Element) -> Result<String, DataTypeError> {
        Ok(serde_json::to_string(&to_value(root))?)
    }
}

#[derive(Debug, Default)]
pub struct JsonDataType;

impl DataTypeFactory for JsonDataType {
    fn id(&self) -> &str {
        FORMAT_ID
    }

    fn create_reader(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeReader> {
        Box::new(JsonReader::new(properties.clone()))
    }

    fn create_writer(&self, _properties: &DataTypeProperties) -> Box<dyn DataTypeWriter> {
        Box::new(JsonWriter)
    }
}
