//! Data type reader contract.
//!
//! [`ReaderCore`] holds the handler references and the fixed feature/property
//! negotiation shared by every reader. Concrete readers embed one by value and
//! only implement [`DataTypeReader::parse`].

use std::sync::Arc;

use crate::datatypes::event::{
    ContentHandler, DtdHandler, EntityResolver, ErrorHandler, InputSource,
};
use crate::error::DataTypeError;

/// Namespace reporting. Always on.
pub const FEATURE_NAMESPACES: &str = "http://xml.org/sax/features/namespaces";

/// Namespace-prefix reporting. Always off.
pub const FEATURE_NAMESPACE_PREFIXES: &str = "http://xml.org/sax/features/namespace-prefixes";

/// Handler storage and fixed capability negotiation for a reader.
#[derive(Clone, Default)]
pub struct ReaderCore {
    content_handler: Option<Arc<dyn ContentHandler>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    dtd_handler: Option<Arc<dyn DtdHandler>>,
    entity_resolver: Option<Arc<dyn EntityResolver>>,
}

impl std::fmt::Debug for ReaderCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderCore")
            .field("content_handler", &self.content_handler.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("dtd_handler", &self.dtd_handler.is_some())
            .field("entity_resolver", &self.entity_resolver.is_some())
            .finish()
    }
}

impl ReaderCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_handler(&self) -> Option<Arc<dyn ContentHandler>> {
        self.content_handler.clone()
    }

    /// Replace the content handler, returning the previous one.
    pub fn set_content_handler(
        &mut self,
        handler: Option<Arc<dyn ContentHandler>>,
    ) -> Option<Arc<dyn ContentHandler>> {
        std::mem::replace(&mut self.content_handler, handler)
    }

    pub fn error_handler(&self) -> Option<Arc<dyn ErrorHandler>> {
        self.error_handler.clone()
    }

    pub fn set_error_handler(
        &mut self,
        handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Option<Arc<dyn ErrorHandler>> {
        std::mem::replace(&mut self.error_handler, handler)
    }

    pub fn dtd_handler(&self) -> Option<Arc<dyn DtdHandler>> {
        self.dtd_handler.clone()
    }

    pub fn set_dtd_handler(
        &mut self,
        handler: Option<Arc<dyn DtdHandler>>,
    ) -> Option<Arc<dyn DtdHandler>> {
        std::mem::replace(&mut self.dtd_handler, handler)
    }

    pub fn entity_resolver(&self) -> Option<Arc<dyn EntityResolver>> {
        self.entity_resolver.clone()
    }

    pub fn set_entity_resolver(
        &mut self,
        resolver: Option<Arc<dyn EntityResolver>>,
    ) -> Option<Arc<dyn EntityResolver>> {
        std::mem::replace(&mut self.entity_resolver, resolver)
    }

    /// The registered content handler, or `HandlerNotConfigured`.
    ///
    /// Readers call this before emitting their first event.
    pub fn ensure_handler_set(&self) -> Result<Arc<dyn ContentHandler>, DataTypeError> {
        self.content_handler
            .clone()
            .ok_or(DataTypeError::HandlerNotConfigured)
    }

    pub fn get_feature(&self, name: &str) -> Result<bool, DataTypeError> {
        match name {
            FEATURE_NAMESPACES => Ok(true),
            FEATURE_NAMESPACE_PREFIXES => Ok(false),
            _ => Err(DataTypeError::FeatureNotRecognized(name.to_string())),
        }
    }

    /// Accepts only the fixed value of each recognized feature.
    pub fn set_feature(&self, name: &str, value: bool) -> Result<(), DataTypeError> {
        let fixed = self.get_feature(name)?;
        if value != fixed {
            return Err(DataTypeError::FeatureNotSupported {
                name: name.to_string(),
                value,
            });
        }
        Ok(())
    }

    pub fn get_property(&self, name: &str) -> Result<serde_json::Value, DataTypeError> {
        Err(DataTypeError::PropertyNotRecognized(name.to_string()))
    }

    pub fn set_property(&self, name: &str, _value: serde_json::Value) -> Result<(), DataTypeError> {
        Err(DataTypeError::PropertyNotRecognized(name.to_string()))
    }

    /// Load the text behind `input`, consulting the entity resolver for
    /// system identifiers without inline data.
    pub fn read_input(&self, input: &InputSource) -> Result<String, DataTypeError> {
        if input.data.is_none()
            && let (Some(resolver), Some(system_id)) =
                (self.entity_resolver.as_ref(), input.system_id.as_deref())
            && let Some(resolved) =
                resolver.resolve_entity(input.public_id.as_deref(), system_id)?
        {
            return resolved.read_text();
        }
        input.read_text()
    }

    pub(crate) fn warn(&self, message: &str) {
        tracing::debug!(message, "Reader warning");
        if let Some(handler) = &self.error_handler {
            handler.warning(message);
        }
    }
}

/// A format reader that translates its wire format into canonical events.
///
/// Instances are not shared between concurrent parses: `parse` takes
/// `&mut self`, and the registry hands out a fresh reader per resolve.
pub trait DataTypeReader: Send {
    /// Registry identifier of the format this reader parses.
    fn format(&self) -> &str;

    fn core(&self) -> &ReaderCore;

    fn core_mut(&mut self) -> &mut ReaderCore;

    /// Emit the structure of `input` to the registered content handler.
    fn parse(&mut self, input: &InputSource) -> Result<(), DataTypeError>;

    /// Convenience wrapper that parses the source named by `system_id`.
    fn parse_uri(&mut self, system_id: &str) -> Result<(), DataTypeError> {
        self.parse(&InputSource::from_system_id(system_id))
    }

    fn content_handler(&self) -> Option<Arc<dyn ContentHandler>> {
        self.core().content_handler()
    }

    fn set_content_handler(
        &mut self,
        handler: Option<Arc<dyn ContentHandler>>,
    ) -> Option<Arc<dyn ContentHandler>> {
        self.core_mut().set_content_handler(handler)
    }

    fn error_handler(&self) -> Option<Arc<dyn ErrorHandler>> {
        self.core().error_handler()
    }

    fn set_error_handler(
        &mut self,
        handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Option<Arc<dyn ErrorHandler>> {
        self.core_mut().set_error_handler(handler)
    }

    fn dtd_handler(&self) -> Option<Arc<dyn DtdHandler>> {
        self.core().dtd_handler()
    }

    fn set_dtd_handler(
        &mut self,
        handler: Option<Arc<dyn DtdHandler>>,
    ) -> Option<Arc<dyn DtdHandler>> {
        self.core_mut().set_dtd_handler(handler)
    }

    fn entity_resolver(&self) -> Option<Arc<dyn EntityResolver>> {
        self.core().entity_resolver()
    }

    fn set_entity_resolver(
        &mut self,
        resolver: Option<Arc<dyn EntityResolver>>,
    ) -> Option<Arc<dyn EntityResolver>> {
        self.core_mut().set_entity_resolver(resolver)
    }

    fn get_feature(&self, name: &str) -> Result<bool, DataTypeError> {
        self.core().get_feature(name)
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<(), DataTypeError> {
        self.core().set_feature(name, value)
    }

    fn get_property(&self, name: &str) -> Result<serde_json::Value, DataTypeError> {
        self.core().get_property(name)
    }

    fn set_property(&mut self, name: &str, value: serde_json::Value) -> Result<(), DataTypeError> {
        self.core().set_property(name, value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::datatypes::canonical::{EventRecorder, SaxEvent};
    use crate::datatypes::event::{Attributes, emit_text};

    /// Emits `<test>value</test>` for any input.
    #[derive(Default)]
    struct FixedReader {
        core: ReaderCore,
    }

    impl DataTypeReader for FixedReader {
        fn format(&self) -> &str {
            "TEST"
        }
        fn core(&self) -> &ReaderCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut ReaderCore {
            &mut self.core
        }
        fn parse(&mut self, _input: &InputSource) -> Result<(), DataTypeError> {
            let handler = self.core.ensure_handler_set()?;
            handler.start_document()?;
            handler.start_element("", "test", "", Attributes::empty())?;
            emit_text(handler.as_ref(), "value")?;
            handler.end_element("", "test", "")?;
            handler.end_document()
        }
    }

    /// Records the system ids it is asked to parse.
    #[derive(Default)]
    struct SpyReader {
        core: ReaderCore,
        seen: Vec<Option<String>>,
    }

    impl DataTypeReader for SpyReader {
        fn format(&self) -> &str {
            "SPY"
        }
        fn core(&self) -> &ReaderCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut ReaderCore {
            &mut self.core
        }
        fn parse(&mut self, input: &InputSource) -> Result<(), DataTypeError> {
            self.core.ensure_handler_set()?;
            self.seen.push(input.system_id.clone());
            Ok(())
        }
    }

    struct CountingErrors(Mutex<Vec<String>>);

    impl ErrorHandler for CountingErrors {
        fn warning(&self, message: &str) {
            self.0.lock().unwrap().push(format!("warning: {message}"));
        }
        fn error(&self, message: &str) {
            self.0.lock().unwrap().push(format!("error: {message}"));
        }
        fn fatal_error(&self, message: &str) {
            self.0.lock().unwrap().push(format!("fatal: {message}"));
        }
    }

    struct NoDtd;

    impl DtdHandler for NoDtd {
        fn notation_decl(&self, _: &str, _: Option<&str>, _: Option<&str>) {}
        fn unparsed_entity_decl(&self, _: &str, _: Option<&str>, _: &str, _: &str) {}
    }

    struct InlineResolver;

    impl EntityResolver for InlineResolver {
        fn resolve_entity(
            &self,
            _public_id: Option<&str>,
            system_id: &str,
        ) -> Result<Option<InputSource>, DataTypeError> {
            if system_id == "mem://greeting" {
                Ok(Some(InputSource::from_text("hello")))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn parse_emits_events_in_order() {
        let recorder = Arc::new(EventRecorder::new());
        let mut reader = FixedReader::default();
        reader.set_content_handler(Some(recorder.clone()));

        reader.parse(&InputSource::default()).unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                SaxEvent::StartDocument,
                SaxEvent::StartElement {
                    namespace_uri: String::new(),
                    local_name: "test".into(),
                    qualified_name: String::new(),
                },
                SaxEvent::Characters("value".into()),
                SaxEvent::EndElement {
                    namespace_uri: String::new(),
                    local_name: "test".into(),
                    qualified_name: String::new(),
                },
                SaxEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn parse_without_handler_fails() {
        let mut reader = FixedReader::default();
        let err = reader.parse(&InputSource::default()).unwrap_err();
        assert!(matches!(err, DataTypeError::HandlerNotConfigured));
    }

    #[test]
    fn parse_uri_delegates_to_parse() {
        let mut reader = SpyReader::default();
        reader.set_content_handler(Some(Arc::new(EventRecorder::new())));
        reader.parse_uri("file:///test.xml").unwrap();
        assert_eq!(reader.seen, vec![Some("file:///test.xml".to_string())]);
    }

    #[test]
    fn content_handler_accessors() {
        let mut reader = FixedReader::default();
        assert!(reader.content_handler().is_none());

        let first: Arc<dyn ContentHandler> = Arc::new(EventRecorder::new());
        let second: Arc<dyn ContentHandler> = Arc::new(EventRecorder::new());
        assert!(reader.set_content_handler(Some(first.clone())).is_none());
        assert!(Arc::ptr_eq(&reader.content_handler().unwrap(), &first));

        let previous = reader.set_content_handler(Some(second.clone())).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(Arc::ptr_eq(&reader.content_handler().unwrap(), &second));
    }

    #[test]
    fn error_dtd_and_resolver_accessors() {
        let mut reader = FixedReader::default();
        assert!(reader.error_handler().is_none());
        assert!(reader.dtd_handler().is_none());
        assert!(reader.entity_resolver().is_none());

        let errors: Arc<dyn ErrorHandler> = Arc::new(CountingErrors(Mutex::new(Vec::new())));
        let dtd: Arc<dyn DtdHandler> = Arc::new(NoDtd);
        let resolver: Arc<dyn EntityResolver> = Arc::new(InlineResolver);
        reader.set_error_handler(Some(errors.clone()));
        reader.set_dtd_handler(Some(dtd.clone()));
        reader.set_entity_resolver(Some(resolver.clone()));

        assert!(Arc::ptr_eq(&reader.error_handler().unwrap(), &errors));
        assert!(Arc::ptr_eq(&reader.dtd_handler().unwrap(), &dtd));
        assert!(Arc::ptr_eq(&reader.entity_resolver().unwrap(), &resolver));
    }

    #[test]
    fn warnings_reach_error_handler() {
        let errors = Arc::new(CountingErrors(Mutex::new(Vec::new())));
        let mut core = ReaderCore::new();
        core.set_error_handler(Some(errors.clone()));
        core.warn("blank line skipped");
        assert_eq!(
            errors.0.lock().unwrap().as_slice(),
            ["warning: blank line skipped"]
        );
    }

    #[test]
    fn feature_namespaces_fixed_true() {
        let mut reader = FixedReader::default();
        assert!(reader.get_feature(FEATURE_NAMESPACES).unwrap());
        reader.set_feature(FEATURE_NAMESPACES, true).unwrap();
        let err = reader.set_feature(FEATURE_NAMESPACES, false).unwrap_err();
        assert!(matches!(err, DataTypeError::FeatureNotSupported { .. }));
        assert!(reader.get_feature(FEATURE_NAMESPACES).unwrap());
    }

    #[test]
    fn feature_namespace_prefixes_fixed_false() {
        let mut reader = FixedReader::default();
        assert!(!reader.get_feature(FEATURE_NAMESPACE_PREFIXES).unwrap());
        reader.set_feature(FEATURE_NAMESPACE_PREFIXES, false).unwrap();
        let err = reader
            .set_feature(FEATURE_NAMESPACE_PREFIXES, true)
            .unwrap_err();
        assert!(matches!(err, DataTypeError::FeatureNotSupported { .. }));
        assert!(!reader.get_feature(FEATURE_NAMESPACE_PREFIXES).unwrap());
    }

    #[test]
    fn feature_names_are_case_sensitive() {
        let reader = FixedReader::default();
        let err = reader
            .get_feature("HTTP://XML.ORG/SAX/FEATURES/NAMESPACES")
            .unwrap_err();
        assert!(matches!(err, DataTypeError::FeatureNotRecognized(_)));
    }

    #[test]
    fn unknown_feature_rejected_on_get_and_set() {
        let mut reader = FixedReader::default();
        let name = "http://xml.org/sax/features/unknown-feature";
        assert!(reader.get_feature(name).unwrap_err().is_unsupported_feature());
        assert!(
            reader
                .set_feature(name, true)
                .unwrap_err()
                .is_unsupported_feature()
        );
    }

    #[test]
    fn properties_never_recognized() {
        let mut reader = FixedReader::default();
        let name = "http://xml.org/sax/properties/lexical-handler";
        assert!(matches!(
            reader.get_property(name),
            Err(DataTypeError::PropertyNotRecognized(_))
        ));
        assert!(matches!(
            reader.set_property(name, serde_json::json!({})),
            Err(DataTypeError::PropertyNotRecognized(_))
        ));
    }

    #[test]
    fn read_input_prefers_entity_resolver() {
        let mut core = ReaderCore::new();
        core.set_entity_resolver(Some(Arc::new(InlineResolver)));
        let text = core
            .read_input(&InputSource::from_system_id("mem://greeting"))
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn read_input_uses_inline_data_first() {
        let mut core = ReaderCore::new();
        core.set_entity_resolver(Some(Arc::new(InlineResolver)));
        let mut input = InputSource::from_text("inline");
        input.system_id = Some("mem://greeting".into());
        assert_eq!(core.read_input(&input).unwrap(), "inline");
    }
}
