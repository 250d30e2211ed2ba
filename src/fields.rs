use crate::config::ExploreConfig;
use crate::format_cache::FormatCache;
use crate::model::{stringify_value, Column, Field, Link, LogRow, ID_COLUMN};
use std::collections::HashMap;
use tracing::debug;

/// Lines longer than this (in characters) are not parsed for fields.
pub const MAX_LINE_LENGTH: usize = 100_000;

/// Resolves data links for a derived field cell.
pub trait LinkResolver {
    fn resolve(&self, column: &Column, row_index: usize) -> Vec<Link>;
}

impl<F> LinkResolver for F
where
    F: Fn(&Column, usize) -> Vec<Link>,
{
    fn resolve(&self, column: &Column, row_index: usize) -> Vec<Link> {
        self(column, row_index)
    }
}

/// Builds the detail field list of a log row: fields parsed out of the
/// message merged with the row's structured columns.
pub struct FieldExtractor {
    formats: FormatCache,
    max_line_length: usize,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self { formats: FormatCache::default(), max_line_length: MAX_LINE_LENGTH }
    }
}

impl FieldExtractor {
    pub fn new(config: &ExploreConfig) -> Self {
        Self {
            formats: FormatCache::new(config.format_cache_capacity),
            max_line_length: config.max_line_length,
        }
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn formats(&self) -> &FormatCache {
        &self.formats
    }

    pub fn exceeds_max_length(&self, line: &str) -> bool {
        // byte length bounds char count from above
        line.len() > self.max_line_length && line.chars().count() > self.max_line_length
    }

    /// Merged, de-duplicated and display-sorted fields of `row`.
    pub fn extract_fields(&self, row: &LogRow, links: Option<&dyn LinkResolver>) -> Vec<Field> {
        let derived = derived_fields(row, links);
        let detected = self.detected_fields(row);
        let mut fields = merge_fields(derived, detected);
        sort_fields(&mut fields);
        fields
    }

    /// Fields parsed out of `row.entry`. Parse failures yield an empty list.
    pub fn detected_fields(&self, row: &LogRow) -> Vec<Field> {
        let line = row.entry.as_str();
        if self.exceeds_max_length(line) {
            debug!(uid = %row.uid, len = line.len(), "line too long, skipping field detection");
            return Vec::new();
        }
        let Some(parser) = self.formats.parser_for_line(line) else {
            return Vec::new();
        };
        match parser.get_fields(line) {
            Ok(tokens) => tokens
                .iter()
                .map(|t| Field::detected(parser.get_label_from_field(t), parser.get_value_from_field(t)))
                .collect(),
            Err(err) => {
                debug!(uid = %row.uid, format = ?parser.format(), error = %err, "field detection failed");
                Vec::new()
            }
        }
    }
}

/// Fields backed by the row's structured columns. The message column, the
/// `id` column, hidden columns and absent cells are skipped.
pub fn derived_fields(row: &LogRow, links: Option<&dyn LinkResolver>) -> Vec<Field> {
    let mut out = Vec::new();
    for (idx, column) in row.data_frame.columns.iter().enumerate() {
        if idx == row.entry_field_index || column.name == ID_COLUMN || column.config.hidden {
            continue;
        }
        let Some(value) = column.value_at(row.row_index) else {
            continue;
        };
        out.push(Field {
            key: column.name.clone(),
            value: stringify_value(value),
            links: links.map(|r| r.resolve(column, row.row_index)).unwrap_or_default(),
            source_column_index: Some(idx),
        });
    }
    out
}

/// Strips one leading and one trailing double quote, if present.
pub fn normalize_value(value: &str) -> &str {
    let v = value.strip_prefix('"').unwrap_or(value);
    v.strip_suffix('"').unwrap_or(v)
}

/// Merges derived then detected fields. Fields with the same key and
/// normalized value collapse into the first one seen; links are appended.
pub fn merge_fields(derived: Vec<Field>, detected: Vec<Field>) -> Vec<Field> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Field> = Vec::with_capacity(derived.len() + detected.len());
    for field in derived.into_iter().chain(detected) {
        let merge_key = format!("{}={}", field.key, normalize_value(&field.value));
        match index.get(&merge_key) {
            Some(&pos) => merged[pos].links.extend(field.links),
            None => {
                index.insert(merge_key, merged.len());
                merged.push(field);
            }
        }
    }
    merged
}

/// Linked fields first, then by key. Stable, so equal keys keep merge order.
pub fn sort_fields(fields: &mut [Field]) {
    fields.sort_by(|a, b| {
        b.has_links()
            .cmp(&a.has_links())
            .then_with(|| a.key.cmp(&b.key))
    });
}
