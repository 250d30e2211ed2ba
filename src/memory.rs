use crate::context::{Direction, FetchOptions, RawRow, RowSource, RowSourceError, LINE_COLUMN, TS_COLUMN};
use crate::model::{Column, DataFrame, LogRow, ID_COLUMN};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: usize,
    pub line: String,
    pub timestamp: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
}

impl Entry {
    fn ts_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn key(&self) -> (i64, usize) {
        (self.timestamp.timestamp_millis(), self.id)
    }

    fn to_raw_row(&self) -> RawRow {
        RawRow::new()
            .with(ID_COLUMN, self.id.to_string())
            .with(TS_COLUMN, self.ts_string())
            .with(LINE_COLUMN, self.line.clone())
    }
}

/// Log lines held in memory, served as a [`RowSource`]. Rows are ordered by
/// `(timestamp, id)`, so lines sharing a timestamp keep insertion order.
/// BEFORE returns rows strictly preceding the anchor, AFTER returns the
/// anchor and everything following it. Both are ordered nearest to the
/// anchor first. An anchor without a numeric id splits on timestamp alone.
#[derive(Default)]
pub struct MemoryRowSource {
    entries: Vec<Entry>,
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push_line(&mut self, line: &str, timestamp: DateTime<Utc>) -> usize {
        self.push_line_with_labels(line, timestamp, BTreeMap::new())
    }

    pub fn push_line_with_labels(
        &mut self,
        line: &str,
        timestamp: DateTime<Utc>,
        labels: BTreeMap<String, String>,
    ) -> usize {
        let id = self.entries.len();
        self.entries.push(Entry { id, line: line.to_string(), timestamp, labels });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries as log rows sharing one frame: `ts` (hidden), `line`,
    /// `id`, then one column per label key. Rows lacking a label get `null`.
    pub fn to_rows(&self) -> Vec<LogRow> {
        let label_keys: BTreeSet<&String> = self.entries.iter().flat_map(|e| e.labels.keys()).collect();
        let mut columns = vec![
            Column::new(TS_COLUMN, self.entries.iter().map(|e| Value::from(e.ts_string())).collect()).hidden(),
            Column::new(LINE_COLUMN, self.entries.iter().map(|e| Value::from(e.line.clone())).collect()),
            Column::new(ID_COLUMN, self.entries.iter().map(|e| Value::from(e.id.to_string())).collect()),
        ];
        for key in &label_keys {
            let values = self
                .entries
                .iter()
                .map(|e| e.labels.get(*key).map(|v| Value::from(v.clone())).unwrap_or(Value::Null))
                .collect();
            columns.push(Column::new(key.as_str(), values));
        }
        let frame = Arc::new(DataFrame::new(columns));
        self.entries
            .iter()
            .map(|e| LogRow {
                uid: e.id.to_string(),
                raw: e.line.clone(),
                entry: e.line.clone(),
                timestamp_epoch_ms: e.timestamp.timestamp_millis(),
                labels: e.labels.clone(),
                data_frame: Arc::clone(&frame),
                row_index: e.id,
                entry_field_index: 1,
            })
            .collect()
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn fetch(&self, anchor: &LogRow, options: FetchOptions) -> Result<Vec<RawRow>, RowSourceError> {
        let anchor_ms = anchor.timestamp_epoch_ms;
        let anchor_id = anchor.id().and_then(|id| id.parse::<usize>().ok());
        let precedes = |e: &Entry| match anchor_id {
            Some(id) => e.key() < (anchor_ms, id),
            None => e.timestamp.timestamp_millis() < anchor_ms,
        };
        let rows: Vec<RawRow> = match options.direction {
            Direction::Before => self
                .entries
                .iter()
                .filter(|e| precedes(*e))
                .sorted_by_key(|e| std::cmp::Reverse(e.key()))
                .take(options.limit)
                .map(Entry::to_raw_row)
                .collect(),
            Direction::After => self
                .entries
                .iter()
                .filter(|e| !precedes(*e))
                .sorted_by_key(|e| e.key())
                .take(options.limit)
                .map(Entry::to_raw_row)
                .collect(),
        };
        Ok(rows)
    }
}
