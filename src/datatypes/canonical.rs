//! Canonical in-memory form of a message.
//!
//! The event stream is rebuilt into an [`Element`] tree by [`TreeBuilder`] so
//! transformers can work on structure, and rendered as canonical XML text when
//! stored as content.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::datatypes::event::{Attributes, ContentHandler, InputSource, emit_text};
use crate::datatypes::reader::DataTypeReader;
use crate::error::DataTypeError;

/// A node in the canonical tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A namespace-qualified element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub namespace_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(local_name: impl Into<String>) -> Self {
        let local_name = local_name.into();
        Self {
            namespace_uri: String::new(),
            qualified_name: local_name.clone(),
            local_name,
            children: Vec::new(),
        }
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Name used when rendering: the qualified name if the reader supplied one.
    pub fn name(&self) -> &str {
        if self.qualified_name.is_empty() {
            &self.local_name
        } else {
            &self.qualified_name
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name == local_name)
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// True if the element holds only text (no child elements).
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|n| matches!(n, Node::Text(_)))
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Resolve a `/`-separated path of local names below this element.
    pub fn path(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |el, segment| el.child(segment))
    }

    /// Mutable variant of [`Element::path`].
    pub fn path_mut(&mut self, path: &str) -> Option<&mut Element> {
        let mut current = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .child_elements_mut()
                .find(|e| e.local_name == segment)?;
        }
        Some(current)
    }

    /// Replay this tree as a complete event document.
    pub fn emit_document(&self, handler: &dyn ContentHandler) -> Result<(), DataTypeError> {
        handler.start_document()?;
        self.emit(handler)?;
        handler.end_document()
    }

    fn emit(&self, handler: &dyn ContentHandler) -> Result<(), DataTypeError> {
        handler.start_element(
            &self.namespace_uri,
            &self.local_name,
            &self.qualified_name,
            Attributes::empty(),
        )?;
        for node in &self.children {
            match node {
                Node::Element(e) => e.emit(handler)?,
                Node::Text(t) => emit_text(handler, t)?,
            }
        }
        handler.end_element(&self.namespace_uri, &self.local_name, &self.qualified_name)
    }

    /// Render as canonical XML. A namespace is declared only where it changes.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, "");
        out
    }

    fn write_xml(&self, out: &mut String, parent_ns: &str) {
        let name = self.name();
        out.push('<');
        out.push_str(name);
        if self.namespace_uri != parent_ns {
            out.push_str(" xmlns=\"");
            escape_into(out, &self.namespace_uri, true);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(e) => e.write_xml(out, &self.namespace_uri),
                Node::Text(t) => escape_into(out, t, false),
            }
        }
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// `buffer[offset..offset + length]`, or `None` if the range overflows or runs past the end.
fn char_range(buffer: &[char], offset: usize, length: usize) -> Option<&[char]> {
    let end = offset.checked_add(length)?;
    buffer.get(offset..end)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned builder only ever holds partially built events; keep going.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct BuildState {
    stack: Vec<Element>,
    root: Option<Element>,
    started: bool,
    finished: bool,
}

/// Content handler that rebuilds the canonical tree from events.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    state: Mutex<BuildState>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the finished document root.
    pub fn take_root(&self) -> Result<Element, DataTypeError> {
        let mut state = lock(&self.state);
        if !state.finished {
            return Err(DataTypeError::parse("canonical", "document was not completed"));
        }
        state
            .root
            .take()
            .ok_or_else(|| DataTypeError::parse("canonical", "document has no root element"))
    }
}

impl ContentHandler for TreeBuilder {
    fn start_document(&self) -> Result<(), DataTypeError> {
        let mut state = lock(&self.state);
        *state = BuildState {
            started: true,
            ..Default::default()
        };
        Ok(())
    }

    fn start_element(
        &self,
        namespace_uri: &str,
        local_name: &str,
        qualified_name: &str,
        _attributes: &Attributes,
    ) -> Result<(), DataTypeError> {
        let mut state = lock(&self.state);
        if !state.started || (state.stack.is_empty() && state.root.is_some()) {
            return Err(DataTypeError::parse(
                "canonical",
                format!("unexpected element {local_name}"),
            ));
        }
        state.stack.push(Element {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qualified_name: qualified_name.to_string(),
            children: Vec::new(),
        });
        Ok(())
    }

    fn characters(
        &self,
        buffer: &[char],
        offset: usize,
        length: usize,
    ) -> Result<(), DataTypeError> {
        let slice = char_range(buffer, offset, length)
            .ok_or_else(|| DataTypeError::parse("canonical", "character range out of bounds"))?;
        let mut state = lock(&self.state);
        let Some(current) = state.stack.last_mut() else {
            return Err(DataTypeError::parse("canonical", "text outside of root element"));
        };
        let text: String = slice.iter().collect();
        // Adjacent character events belong to one text node.
        if let Some(Node::Text(existing)) = current.children.last_mut() {
            existing.push_str(&text);
        } else {
            current.children.push(Node::Text(text));
        }
        Ok(())
    }

    fn end_element(
        &self,
        _namespace_uri: &str,
        local_name: &str,
        _qualified_name: &str,
    ) -> Result<(), DataTypeError> {
        let mut state = lock(&self.state);
        let element = state.stack.pop().ok_or_else(|| {
            DataTypeError::parse("canonical", format!("unbalanced end of {local_name}"))
        })?;
        if element.local_name != local_name {
            return Err(DataTypeError::parse(
                "canonical",
                format!("expected end of {}, got {local_name}", element.local_name),
            ));
        }
        match state.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => state.root = Some(element),
        }
        Ok(())
    }

    fn end_document(&self) -> Result<(), DataTypeError> {
        let mut state = lock(&self.state);
        if !state.stack.is_empty() {
            return Err(DataTypeError::parse("canonical", "document ended inside an element"));
        }
        state.finished = true;
        Ok(())
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
    StartDocument,
    StartElement {
        namespace_uri: String,
        local_name: String,
        qualified_name: String,
    },
    Characters(String),
    EndElement {
        namespace_uri: String,
        local_name: String,
        qualified_name: String,
    },
    EndDocument,
}

/// Content handler that records every event verbatim.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<SaxEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SaxEvent> {
        lock(&self.events).clone()
    }
}

impl ContentHandler for EventRecorder {
    fn start_document(&self) -> Result<(), DataTypeError> {
        lock(&self.events).push(SaxEvent::StartDocument);
        Ok(())
    }

    fn start_element(
        &self,
        namespace_uri: &str,
        local_name: &str,
        qualified_name: &str,
        _attributes: &Attributes,
    ) -> Result<(), DataTypeError> {
        lock(&self.events).push(SaxEvent::StartElement {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qualified_name: qualified_name.to_string(),
        });
        Ok(())
    }

    fn characters(
        &self,
        buffer: &[char],
        offset: usize,
        length: usize,
    ) -> Result<(), DataTypeError> {
        let text: String = char_range(buffer, offset, length)
            .ok_or_else(|| DataTypeError::parse("recorder", "character range out of bounds"))?
            .iter()
            .collect();
        lock(&self.events).push(SaxEvent::Characters(text));
        Ok(())
    }

    fn end_element(
        &self,
        namespace_uri: &str,
        local_name: &str,
        qualified_name: &str,
    ) -> Result<(), DataTypeError> {
        lock(&self.events).push(SaxEvent::EndElement {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qualified_name: qualified_name.to_string(),
        });
        Ok(())
    }

    fn end_document(&self) -> Result<(), DataTypeError> {
        lock(&self.events).push(SaxEvent::EndDocument);
        Ok(())
    }
}

/// Run `reader` over `input` and return the canonical tree it describes.
///
/// The reader is left with no content handler attached.
pub fn read_tree(
    reader: &mut dyn DataTypeReader,
    input: &InputSource,
) -> Result<Element, DataTypeError> {
    let builder = Arc::new(TreeBuilder::new());
    let previous = reader.set_content_handler(Some(builder.clone()));
    let parsed = reader.parse(input);
    reader.set_content_handler(previous);
    parsed?;
    builder.take_root()
}
