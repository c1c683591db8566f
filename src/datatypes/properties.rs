//! Per-connector data type settings.

use serde::{Deserialize, Serialize};

/// Settings handed to a data type factory when a reader or writer is created.
///
/// Each format reads the fields it understands and ignores the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTypeProperties {
    /// Separator between fields of one record (delimited text).
    pub field_delimiter: String,
    /// Separator between records (delimited text).
    pub record_delimiter: String,
    /// Override for the canonical root element name.
    pub root_element: Option<String>,
    /// Trim surrounding whitespace from each field.
    pub strip_whitespace: bool,
}

impl Default for DataTypeProperties {
    fn default() -> Self {
        Self {
            field_delimiter: "|".to_string(),
            record_delimiter: "\n".to_string(),
            root_element: None,
            strip_whitespace: true,
        }
    }
}

impl DataTypeProperties {
    pub(crate) fn root_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.root_element.as_deref().unwrap_or(default)
    }
}
