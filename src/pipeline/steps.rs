//! Built-in pipeline steps.
//!
//! - [`RegexReplace`]: preprocessor rewriting raw text
//! - [`ElementFilter`]: drops messages missing an element or value
//! - [`FieldMapper`]: copies, renames and sets fields of the canonical tree

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::datatypes::Element;
use crate::error::PipelineError;
use crate::pipeline::types::{MessageMaps, Preprocessor, StepOutcome, Transformer};

/// Replace every match of a pattern in the raw inbound text.
#[derive(Debug, Clone)]
pub struct RegexReplace {
    name: String,
    regex: Regex,
    replacement: String,
}

impl RegexReplace {
    pub fn new(name: impl Into<String>, pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }
}

impl Preprocessor for RegexReplace {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, raw: &str, _maps: &mut MessageMaps) -> Result<String, PipelineError> {
        Ok(self
            .regex
            .replace_all(raw, self.replacement.as_str())
            .into_owned())
    }
}

/// Passes every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Transformer for AcceptAll {
    fn name(&self) -> &str {
        "accept-all"
    }

    fn apply(&self, _: &mut Element, _: &mut MessageMaps) -> Result<StepOutcome, PipelineError> {
        Ok(StepOutcome::Accept)
    }
}

/// Accepts a message only if an element exists at `path`, optionally with matching text.
#[derive(Debug, Clone)]
pub struct ElementFilter {
    path: String,
    pattern: Option<Regex>,
}

impl ElementFilter {
    pub fn exists(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pattern: None,
        }
    }

    pub fn matching(path: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            path: path.into(),
            pattern: Some(Regex::new(pattern)?),
        })
    }
}

impl Transformer for ElementFilter {
    fn name(&self) -> &str {
        "element-filter"
    }

    fn apply(&self, message: &mut Element, _maps: &mut MessageMaps) -> Result<StepOutcome, PipelineError> {
        let Some(element) = message.path(&self.path) else {
            return Ok(StepOutcome::Filter {
                reason: format!("no element at {}", self.path),
            });
        };
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(&element.text())
        {
            return Ok(StepOutcome::Filter {
                reason: format!("{} does not match {}", self.path, pattern.as_str()),
            });
        }
        Ok(StepOutcome::Accept)
    }
}

/// One field operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapping {
    /// Copy the element text into the channel map.
    ToChannelMap { path: String, key: String },
    /// Copy the element text into the connector map.
    ToConnectorMap { path: String, key: String },
    /// Rename the element at `path`.
    Rename { path: String, to: String },
    /// Replace the element text.
    SetText { path: String, value: String },
    /// Replace the element text with a value from the source map.
    FromSourceMap { path: String, key: String },
}

impl Mapping {
    fn path(&self) -> &str {
        match self {
            Self::ToChannelMap { path, .. }
            | Self::ToConnectorMap { path, .. }
            | Self::Rename { path, .. }
            | Self::SetText { path, .. }
            | Self::FromSourceMap { path, .. } => path,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Applies a list of field mappings in order.
///
/// A missing path is skipped unless the mapper is strict.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    name: String,
    mappings: Vec<Mapping>,
    strict: bool,
}

impl FieldMapper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mappings: Vec::new(),
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn map(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    fn missing(&self, path: &str) -> Result<(), PipelineError> {
        if self.strict {
            return Err(PipelineError::Transform {
                step: self.name.clone(),
                reason: format!("no element at {}", path),
            });
        }
        debug!(step = %self.name, path, "Mapping skipped, element absent");
        Ok(())
    }
}

impl Transformer for FieldMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, message: &mut Element, maps: &mut MessageMaps) -> Result<StepOutcome, PipelineError> {
        for mapping in &self.mappings {
            let Some(element) = message.path_mut(mapping.path()) else {
                self.missing(mapping.path())?;
                continue;
            };
            match mapping {
                Mapping::ToChannelMap { key, .. } => {
                    maps.channel.insert(key.clone(), Value::String(element.text()));
                }
                Mapping::ToConnectorMap { key, .. } => {
                    maps.connector.insert(key.clone(), Value::String(element.text()));
                }
                Mapping::Rename { to, .. } => {
                    element.local_name = to.clone();
                    element.qualified_name = to.clone();
                }
                Mapping::SetText { value, .. } => element.set_text(value.clone()),
                Mapping::FromSourceMap { key, path } => match maps.source.get(key) {
                    Some(value) => element.set_text(value_text(value)),
                    None if self.strict => {
                        return Err(PipelineError::Transform {
                            step: self.name.clone(),
                            reason: format!("source map has no '{}' for {}", key, path),
                        });
                    }
                    None => {}
                },
            }
        }
        Ok(StepOutcome::Accept)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::datatypes::DataTypeRegistry;
    use crate::datatypes::DataTypeProperties;

    fn row(text: &str) -> Element {
        DataTypeRegistry::with_builtins()
            .decode("DELIMITED", &DataTypeProperties::default(), text)
            .unwrap()
    }

    #[test]
    fn regex_replace_rewrites_raw() {
        let step = RegexReplace::new("strip-cr", r"\r\n?", "\n").unwrap();
        let mut maps = MessageMaps::default();
        assert_eq!(step.process("A|B\r\nC|D\r", &mut maps).unwrap(), "A|B\nC|D\n");
    }

    #[test]
    fn invalid_pattern_rejected() {
        assert!(RegexReplace::new("bad", "(", "").is_err());
        assert!(ElementFilter::matching("row", "[").is_err());
    }

    #[test]
    fn element_filter() {
        let mut message = row("A|B|C");
        let mut maps = MessageMaps::default();

        assert_eq!(
            ElementFilter::exists("row/column2").apply(&mut message, &mut maps).unwrap(),
            StepOutcome::Accept
        );
        assert!(matches!(
            ElementFilter::exists("row/column9").apply(&mut message, &mut maps).unwrap(),
            StepOutcome::Filter { .. }
        ));
        let only_a = ElementFilter::matching("row/column1", "^A$").unwrap();
        assert_eq!(only_a.apply(&mut message, &mut maps).unwrap(), StepOutcome::Accept);
        let mut other = row("Z|B");
        assert!(matches!(
            only_a.apply(&mut other, &mut maps).unwrap(),
            StepOutcome::Filter { .. }
        ));
    }

    #[test]
    fn field_mapper_operations() {
        let mut message = row("A|B|C");
        let mut maps = MessageMaps::with_source([("facility".to_string(), json!("LAB"))].into());

        let mapper = FieldMapper::new("map")
            .map(Mapping::ToChannelMap {
                path: "row/column1".into(),
                key: "first".into(),
            })
            .map(Mapping::ToConnectorMap {
                path: "row/column3".into(),
                key: "last".into(),
            })
            .map(Mapping::SetText {
                path: "row/column2".into(),
                value: "b".into(),
            })
            .map(Mapping::FromSourceMap {
                path: "row/column3".into(),
                key: "facility".into(),
            })
            .map(Mapping::Rename {
                path: "row/column1".into(),
                to: "code".into(),
            })
            .map(Mapping::SetText {
                path: "row/column7".into(),
                value: "ignored".into(),
            });

        assert_eq!(mapper.apply(&mut message, &mut maps).unwrap(), StepOutcome::Accept);
        assert_eq!(maps.channel["first"], "A");
        assert_eq!(maps.connector["last"], "C");
        assert_eq!(message.path("row/code").unwrap().text(), "A");
        assert_eq!(message.path("row/column2").unwrap().text(), "b");
        assert_eq!(message.path("row/column3").unwrap().text(), "LAB");
    }

    #[test]
    fn strict_mapper_fails_on_missing_path() {
        let mut message = row("A");
        let mut maps = MessageMaps::default();
        let mapper = FieldMapper::new("strict")
            .strict()
            .map(Mapping::SetText {
                path: "row/column2".into(),
                value: "x".into(),
            });
        let err = mapper.apply(&mut message, &mut maps).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { ref step, .. } if step == "strict"));
    }
}
