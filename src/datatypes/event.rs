//! Canonical structural event stream.
//!
//! Every data type reader emits the same ordered sequence of events,
//! `start_document → (start_element → characters* → end_element)* → end_document`,
//! so consumers (validators, transformers, serializers) never need to know
//! which wire format the message arrived in.
//!
//! Namespace URIs use the empty string for "no namespace", never `None`.

use std::path::Path;

use crate::error::DataTypeError;

/// Receives structural events from a data type reader.
///
/// Handlers are shared behind `Arc` while attached to a reader, so they take
/// `&self` and keep any accumulated state behind interior mutability.
pub trait ContentHandler: Send + Sync {
    fn start_document(&self) -> Result<(), DataTypeError>;

    fn start_element(
        &self,
        namespace_uri: &str,
        local_name: &str,
        qualified_name: &str,
        attributes: &Attributes,
    ) -> Result<(), DataTypeError>;

    /// Character data: `length` chars of `buffer` starting at `offset`.
    fn characters(&self, buffer: &[char], offset: usize, length: usize)
    -> Result<(), DataTypeError>;

    fn end_element(
        &self,
        namespace_uri: &str,
        local_name: &str,
        qualified_name: &str,
    ) -> Result<(), DataTypeError>;

    fn end_document(&self) -> Result<(), DataTypeError>;
}

/// Receives recoverable diagnostics raised while parsing.
pub trait ErrorHandler: Send + Sync {
    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    fn fatal_error(&self, message: &str);
}

/// Receives DTD declarations. Rarely relevant for non-XML data types.
pub trait DtdHandler: Send + Sync {
    fn notation_decl(&self, name: &str, public_id: Option<&str>, system_id: Option<&str>);

    fn unparsed_entity_decl(
        &self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    );
}

/// Resolves external identifiers into input sources.
pub trait EntityResolver: Send + Sync {
    /// Return `Ok(None)` to fall back to default resolution of `system_id`.
    fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, DataTypeError>;
}

/// A single element attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

/// Attribute list passed to `start_element`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<Attribute>,
}

static EMPTY_ATTRIBUTES: Attributes = Attributes::new();

impl Attributes {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Shared immutable empty attribute list. Needs no clearing between events.
    pub fn empty() -> &'static Attributes {
        &EMPTY_ATTRIBUTES
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.entries.push(attribute);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    /// Look up an attribute value by namespace and local name.
    pub fn value(&self, namespace_uri: &str, local_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|a| a.namespace_uri == namespace_uri && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }
}

/// Abstract input for a parse call: inline data, a system identifier, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSource {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl InputSource {
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        Self {
            system_id: Some(system_id.into()),
            ..Default::default()
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_bytes(text.into().into_bytes())
    }

    /// Read inline data, or a `file:` URI / plain path named by the system id.
    ///
    /// Resolution through an [`EntityResolver`] happens in the reader core
    /// before this is called.
    pub fn read_text(&self) -> Result<String, DataTypeError> {
        if let Some(data) = &self.data {
            return String::from_utf8(data.clone())
                .map_err(|e| DataTypeError::parse("input", format!("invalid UTF-8: {e}")));
        }
        let Some(system_id) = self.system_id.as_deref() else {
            return Err(DataTypeError::UnresolvedSource("<empty>".to_string()));
        };
        let path = system_id.strip_prefix("file://").unwrap_or(system_id);
        if system_id.contains("://") && !system_id.starts_with("file://") {
            return Err(DataTypeError::UnresolvedSource(system_id.to_string()));
        }
        Ok(std::fs::read_to_string(Path::new(path))?)
    }
}

/// Emit `text` as a single `characters` event. No event is emitted for empty text.
pub fn emit_text(handler: &dyn ContentHandler, text: &str) -> Result<(), DataTypeError> {
    if text.is_empty() {
        return Ok(());
    }
    let buffer: Vec<char> = text.chars().collect();
    handler.characters(&buffer, 0, buffer.len())
}

/// Emit `<name>text</name>` with no namespace and empty attributes.
pub fn emit_simple_element(
    handler: &dyn ContentHandler,
    name: &str,
    text: &str,
) -> Result<(), DataTypeError> {
    handler.start_element("", name, name, Attributes::empty())?;
    emit_text(handler, text)?;
    handler.end_element("", name, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_attributes_are_shared_and_empty() {
        let a = Attributes::empty();
        let b = Attributes::empty();
        assert!(std::ptr::eq(a, b));
        assert!(a.is_empty());
        assert_eq!(a.len(), 0);
    }

    #[test]
    fn attribute_lookup() {
        let mut attrs = Attributes::new();
        attrs.push(Attribute {
            namespace_uri: String::new(),
            local_name: "id".into(),
            qualified_name: "id".into(),
            value: "42".into(),
        });
        assert_eq!(attrs.value("", "id"), Some("42"));
        assert_eq!(attrs.value("urn:x", "id"), None);
    }

    #[test]
    fn input_source_inline_text() {
        let input = InputSource::from_text("A|B|C");
        assert_eq!(input.read_text().unwrap(), "A|B|C");
    }

    #[test]
    fn input_source_reads_file_uri() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"from disk").unwrap();
        let uri = format!("file://{}", file.path().display());
        let input = InputSource::from_system_id(uri);
        assert_eq!(input.read_text().unwrap(), "from disk");
    }

    #[test]
    fn input_source_rejects_remote_uri() {
        let input = InputSource::from_system_id("http://example.com/msg.hl7");
        assert!(matches!(
            input.read_text(),
            Err(DataTypeError::UnresolvedSource(_))
        ));
    }

    #[test]
    fn input_source_empty_is_unresolved() {
        assert!(InputSource::default().read_text().is_err());
    }
}
