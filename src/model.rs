use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the column that carries the backend's unique row id.
pub const ID_COLUMN: &str = "id";

/// A navigable link attached to a field (e.g. a trace or dashboard link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Link {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), href: None }
    }

    pub fn with_href(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self { title: title.into(), href: Some(href.into()) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub hidden: bool,
}

/// One column of a structured record set. `values[i]` belongs to row `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
    #[serde(default)]
    pub config: ColumnConfig,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self { name: name.into(), values, config: ColumnConfig::default() }
    }

    pub fn hidden(mut self) -> Self {
        self.config.hidden = true;
        self
    }

    /// Cell at `row_index`; `None` when out of range or JSON `null`.
    pub fn value_at(&self, row_index: usize) -> Option<&Value> {
        match self.values.get(row_index) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub columns: Vec<Column>,
}

impl DataFrame {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One log entry as produced upstream. Read-only for this crate.
#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    pub uid: String,
    pub raw: String,
    pub entry: String,
    pub timestamp_epoch_ms: i64,
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    pub data_frame: Arc<DataFrame>,
    pub row_index: usize,
    pub entry_field_index: usize,
}

impl LogRow {
    /// Raw cell of column `column_index` for this row.
    pub fn cell(&self, column_index: usize) -> Option<&Value> {
        self.data_frame.columns.get(column_index)?.value_at(self.row_index)
    }

    pub fn cell_by_name(&self, name: &str) -> Option<&Value> {
        self.data_frame.column(name)?.value_at(self.row_index)
    }

    /// Backend-provided unique id, if the frame carries an `id` column.
    pub fn id(&self) -> Option<String> {
        self.cell_by_name(ID_COLUMN).map(stringify_value)
    }
}

/// A key/value pair shown in the row details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column_index: Option<usize>,
}

impl Field {
    pub fn detected(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into(), links: Vec::new(), source_column_index: None }
    }

    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatItem {
    pub value: String,
    pub count: usize,
    pub proportion: f64,
}

/// Display string of a cell. Strings are used verbatim, everything else
/// is rendered as JSON.
pub fn stringify_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
