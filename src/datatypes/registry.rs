//! Data type registry: format identifier → reader/writer factory.
//!
//! The registry is assembled once at startup through [`DataTypeRegistryBuilder`]
//! and is immutable afterwards, so lookups take no lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datatypes::canonical::{Element, read_tree};
use crate::datatypes::delimited::DelimitedDataType;
use crate::datatypes::event::InputSource;
use crate::datatypes::json::JsonDataType;
use crate::datatypes::properties::DataTypeProperties;
use crate::datatypes::raw::RawDataType;
use crate::datatypes::reader::DataTypeReader;
use crate::error::DataTypeError;

/// Serializes a canonical tree back into a wire format.
pub trait DataTypeWriter: Send + Sync {
    fn format(&self) -> &str;

    fn write(&self, root: &Element) -> Result<String, DataTypeError>;
}

/// Produces readers and writers for one format.
pub trait DataTypeFactory: Send + Sync {
    /// Format identifier, matched case-insensitively.
    fn id(&self) -> &str;

    /// A fresh reader with no handlers attached.
    fn create_reader(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeReader>;

    fn create_writer(&self, properties: &DataTypeProperties) -> Box<dyn DataTypeWriter>;
}

fn normalize(format_id: &str) -> String {
    format_id.trim().to_ascii_uppercase()
}

/// Collects factories before the registry is frozen.
#[derive(Default)]
pub struct DataTypeRegistryBuilder {
    factories: HashMap<String, Arc<dyn DataTypeFactory>>,
}

impl DataTypeRegistryBuilder {
    /// Register a factory. The first registration of an identifier wins.
    pub fn register(mut self, factory: Arc<dyn DataTypeFactory>) -> Self {
        let id = normalize(factory.id());
        if self.factories.contains_key(&id) {
            tracing::warn!(
                format = %id,
                "Rejected data type registration: identifier already registered"
            );
            return self;
        }
        tracing::debug!("Registered data type: {}", id);
        self.factories.insert(id, factory);
        self
    }

    /// Register the built-in DELIMITED, JSON and RAW formats.
    pub fn with_builtins(self) -> Self {
        self.register(Arc::new(DelimitedDataType))
            .register(Arc::new(JsonDataType))
            .register(Arc::new(RawDataType))
    }

    pub fn build(self) -> DataTypeRegistry {
        DataTypeRegistry {
            factories: self.factories,
        }
    }
}

/// Read-only registry of data type factories.
pub struct DataTypeRegistry {
    factories: HashMap<String, Arc<dyn DataTypeFactory>>,
}

impl DataTypeRegistry {
    pub fn builder() -> DataTypeRegistryBuilder {
        DataTypeRegistryBuilder::default()
    }

    /// Registry holding only the built-in formats.
    pub fn with_builtins() -> Self {
        Self::builder().with_builtins().build()
    }

    fn factory(&self, format_id: &str) -> Result<&Arc<dyn DataTypeFactory>, DataTypeError> {
        self.factories
            .get(&normalize(format_id))
            .ok_or_else(|| DataTypeError::UnknownFormat(format_id.to_string()))
    }

    /// A new reader for `format_id`. The caller attaches a content handler.
    pub fn resolve(
        &self,
        format_id: &str,
        properties: &DataTypeProperties,
    ) -> Result<Box<dyn DataTypeReader>, DataTypeError> {
        Ok(self.factory(format_id)?.create_reader(properties))
    }

    pub fn resolve_writer(
        &self,
        format_id: &str,
        properties: &DataTypeProperties,
    ) -> Result<Box<dyn DataTypeWriter>, DataTypeError> {
        Ok(self.factory(format_id)?.create_writer(properties))
    }

    pub fn contains(&self, format_id: &str) -> bool {
        self.factories.contains_key(&normalize(format_id))
    }

    /// Registered identifiers, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Parse `text` in `format_id` into the canonical tree.
    pub fn decode(
        &self,
        format_id: &str,
        properties: &DataTypeProperties,
        text: &str,
    ) -> Result<Element, DataTypeError> {
        let mut reader = self.resolve(format_id, properties)?;
        read_tree(reader.as_mut(), &InputSource::from_text(text))
    }

    /// Serialize a canonical tree into `format_id`.
    pub fn encode(
        &self,
        format_id: &str,
        properties: &DataTypeProperties,
        root: &Element,
    ) -> Result<String, DataTypeError> {
        self.resolve_writer(format_id, properties)?.write(root)
    }
}

impl Default for DataTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::datatypes::canonical::EventRecorder;

    #[test]
    fn resolves_builtins_case_insensitively() {
        let registry = DataTypeRegistry::with_builtins();
        assert_eq!(registry.list(), vec!["DELIMITED", "JSON", "RAW"]);
        let reader = registry
            .resolve("delimited", &DataTypeProperties::default())
            .unwrap();
        assert_eq!(reader.format(), "DELIMITED");
        assert!(reader.content_handler().is_none());
    }

    #[test]
    fn unknown_format_fails() {
        let registry = DataTypeRegistry::with_builtins();
        let err = registry
            .resolve("HL7V2", &DataTypeProperties::default())
            .err()
            .unwrap();
        assert!(matches!(err, DataTypeError::UnknownFormat(ref f) if f == "HL7V2"));
        assert!(registry.encode("HL7V2", &DataTypeProperties::default(), &Element::new("x")).is_err());
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let registry = DataTypeRegistry::builder()
            .register(Arc::new(RawDataType))
            .register(Arc::new(RawDataType))
            .build();
        assert_eq!(registry.list(), vec!["RAW"]);
    }

    #[test]
    fn decode_then_encode_across_formats() {
        let registry = DataTypeRegistry::with_builtins();
        let props = DataTypeProperties::default();
        let tree = registry.decode("DELIMITED", &props, "A|B|C").unwrap();
        let json = registry.encode("JSON", &props, &tree).unwrap();
        assert_eq!(json, r#"{"row":{"column1":"A","column2":"B","column3":"C"}}"#);
    }

    #[test]
    fn each_resolve_returns_an_independent_reader() {
        let registry = DataTypeRegistry::with_builtins();
        let props = DataTypeProperties::default();
        let mut first = registry.resolve("RAW", &props).unwrap();
        let second = registry.resolve("RAW", &props).unwrap();
        first.set_content_handler(Some(Arc::new(EventRecorder::new())));
        assert!(first.content_handler().is_some());
        assert!(second.content_handler().is_none());
    }

    #[test]
    fn concurrent_parses_do_not_interleave() {
        let registry = Arc::new(DataTypeRegistry::with_builtins());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let text: String = (0..200)
                        .map(|r| format!("t{i}r{r}|x|y"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let recorder = Arc::new(EventRecorder::new());
                    let mut reader = registry
                        .resolve("DELIMITED", &DataTypeProperties::default())
                        .unwrap();
                    reader.set_content_handler(Some(recorder.clone()));
                    reader.parse(&InputSource::from_text(text)).unwrap();
                    (i, recorder.events())
                })
            })
            .collect();

        for handle in handles {
            let (i, events) = handle.join().unwrap();
            // document + root + 200 rows * (row + 3 columns * 3 events + row end)
            assert_eq!(events.len(), 2 + 2 + 200 * 11);
            let prefix = format!("t{i}r");
            let firsts: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    crate::datatypes::canonical::SaxEvent::Characters(t) if t.starts_with('t') => {
                        Some(t.clone())
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(firsts.len(), 200);
            assert!(firsts.iter().all(|t| t.starts_with(&prefix)));
        }
    }
}
