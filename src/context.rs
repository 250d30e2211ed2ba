use crate::config::ContextConfig;
use crate::model::{stringify_value, LogRow, ID_COLUMN};
use crate::parser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

pub const TS_COLUMN: &str = "ts";
pub const LINE_COLUMN: &str = "line";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Older than the anchor.
    Before,
    /// Newer than the anchor; the anchor's own timestamp is included.
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: usize,
    pub direction: Direction,
}

#[derive(Debug, Error)]
pub enum RowSourceError {
    #[error("{0}")]
    Backend(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// A row as returned by a [`RowSource`], addressable by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    fields: Map<String, Value>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.get(ID_COLUMN).map(stringify_value)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(TS_COLUMN).and_then(parser::parse_timestamp)
    }

    pub fn line(&self) -> Option<String> {
        self.get(LINE_COLUMN).map(stringify_value)
    }
}

/// Backend capability serving the rows around an anchor. Timeouts are the
/// implementation's business and surface as an error like any other.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, anchor: &LogRow, options: FetchOptions) -> Result<Vec<RawRow>, RowSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub has_more_before: bool,
    pub has_more_after: bool,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_after: Option<String>,
}

impl ContextWindow {
    pub fn empty(limit: usize) -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            has_more_before: true,
            has_more_after: true,
            limit,
            error_before: None,
            error_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Fetching,
    Ready,
    Closed,
}

/// True when `row` is the anchor itself. Rows are matched by id when both
/// carry one, otherwise by millisecond timestamp, which also drops other
/// rows sharing the anchor's timestamp.
pub fn is_anchor_row(anchor: &LogRow, row: &RawRow) -> bool {
    match (anchor.id(), row.id()) {
        (Some(a), Some(b)) => a == b,
        _ => row
            .timestamp()
            .is_some_and(|ts| ts.timestamp_millis() == anchor.timestamp_epoch_ms),
    }
}

/// Puts rows (as returned by the backend, nearest to the anchor first) into
/// display order.
pub fn normalize_direction_order<T>(mut rows: Vec<T>, direction: Direction, sort_order: SortOrder) -> Vec<T> {
    match (sort_order, direction) {
        (SortOrder::Ascending, Direction::Before | Direction::After) => rows.reverse(),
        (SortOrder::Descending, _) => {}
    }
    rows
}

type DirectionResult = Result<Vec<RawRow>, RowSourceError>;

/// Issues the BEFORE and AFTER requests concurrently and waits for both.
async fn fetch_both<S: RowSource + ?Sized>(
    source: &S,
    anchor: &LogRow,
    limit: usize,
) -> (DirectionResult, DirectionResult) {
    tokio::join!(
        source.fetch(anchor, FetchOptions { limit, direction: Direction::Before }),
        source.fetch(anchor, FetchOptions { limit: limit.saturating_add(1), direction: Direction::After }),
    )
}

/// What a settled direction contributes to the window.
struct DirectionOutcome {
    lines: Vec<String>,
    error: Option<String>,
    /// Rows returned before the anchor was filtered out.
    returned: Option<usize>,
}

fn settle(
    anchor: &LogRow,
    result: DirectionResult,
    direction: Direction,
    sort_order: SortOrder,
) -> DirectionOutcome {
    match result {
        Ok(rows) => {
            let returned = rows.len();
            let lines: Vec<String> = rows
                .iter()
                .filter(|r| !is_anchor_row(anchor, r))
                .filter_map(RawRow::line)
                .collect();
            DirectionOutcome {
                lines: normalize_direction_order(lines, direction, sort_order),
                error: None,
                returned: Some(returned),
            }
        }
        Err(err) => {
            debug!(uid = %anchor.uid, ?direction, error = %err, "context fetch failed");
            DirectionOutcome { lines: Vec::new(), error: Some(err.to_string()), returned: None }
        }
    }
}

/// Count seen at the last successful fetch of one direction.
#[derive(Debug, Clone, Copy)]
struct Seen {
    limit: usize,
    returned: usize,
}

/// A direction has more rows unless a larger limit returned no more rows
/// than last time.
fn has_more(previous: Option<Seen>, current: Seen, was: bool) -> bool {
    match previous {
        None => true,
        Some(prev) if current.limit > prev.limit => current.returned > prev.returned,
        Some(_) => was,
    }
}

struct SessionState {
    window: ContextWindow,
    status: SessionStatus,
    generation: u64,
    seen_before: Option<Seen>,
    seen_after: Option<Seen>,
}

impl SessionState {
    fn apply(&mut self, limit: usize, before: DirectionOutcome, after: DirectionOutcome) {
        let w = &mut self.window;
        if let Some(returned) = before.returned {
            let seen = Seen { limit, returned };
            w.has_more_before = has_more(self.seen_before, seen, w.has_more_before);
            self.seen_before = Some(seen);
        }
        if let Some(returned) = after.returned {
            let seen = Seen { limit, returned };
            w.has_more_after = has_more(self.seen_after, seen, w.has_more_after);
            self.seen_after = Some(seen);
        }
        w.before = before.lines;
        w.after = after.lines;
        w.error_before = before.error;
        w.error_after = after.error;
        w.limit = limit;
        self.status = SessionStatus::Ready;
    }
}

/// Entry point for context lookups against one row source.
pub struct ContextFetcher<S: ?Sized> {
    source: Arc<S>,
    config: ContextConfig,
}

impl<S: RowSource + ?Sized> ContextFetcher<S> {
    pub fn new(source: Arc<S>, config: ContextConfig) -> Self {
        Self { source, config }
    }

    /// One-shot fetch of `limit` rows each way around `anchor`.
    pub async fn fetch_context(&self, anchor: &LogRow, limit: usize) -> ContextWindow {
        let (before, after) = fetch_both(self.source.as_ref(), anchor, limit).await;
        let order = self.config.sort_order;
        let mut state = SessionState {
            window: ContextWindow::empty(limit),
            status: SessionStatus::Fetching,
            generation: 0,
            seen_before: None,
            seen_after: None,
        };
        state.apply(
            limit,
            settle(anchor, before, Direction::Before, order),
            settle(anchor, after, Direction::After, order),
        );
        state.window
    }

    /// Starts a context session around `anchor`. Nothing is fetched until
    /// [`ContextSession::fetch`] is awaited.
    pub fn open(&self, anchor: LogRow) -> ContextSession<S> {
        ContextSession {
            anchor,
            source: Arc::clone(&self.source),
            sort_order: self.config.sort_order,
            step: self.config.load_more_step,
            state: Mutex::new(SessionState {
                window: ContextWindow::empty(self.config.initial_limit),
                status: SessionStatus::Idle,
                generation: 0,
                seen_before: None,
                seen_after: None,
            }),
        }
    }
}

/// The context view of one anchor row. All window updates go through
/// [`ContextSession::fetch`]; results of superseded fetches are dropped.
pub struct ContextSession<S: ?Sized> {
    anchor: LogRow,
    source: Arc<S>,
    sort_order: SortOrder,
    step: usize,
    state: Mutex<SessionState>,
}

impl<S: RowSource + ?Sized> ContextSession<S> {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn window(&self) -> ContextWindow {
        self.state().window.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    pub fn limit(&self) -> usize {
        self.state().window.limit
    }

    /// Fetches both directions at the current limit. Returns the updated
    /// window, or `None` if a newer fetch was issued meanwhile or the
    /// session was closed.
    pub async fn fetch(&self) -> Option<ContextWindow> {
        let (generation, limit) = {
            let mut st = self.state();
            if st.status == SessionStatus::Closed {
                return None;
            }
            st.generation += 1;
            st.status = SessionStatus::Fetching;
            (st.generation, st.window.limit)
        };

        let (before, after) = fetch_both(self.source.as_ref(), &self.anchor, limit).await;

        let mut st = self.state();
        if st.status == SessionStatus::Closed || st.generation != generation {
            trace!(uid = %self.anchor.uid, generation, limit, "discarding stale context result");
            return None;
        }
        st.apply(
            limit,
            settle(&self.anchor, before, Direction::Before, self.sort_order),
            settle(&self.anchor, after, Direction::After, self.sort_order),
        );
        Some(st.window.clone())
    }

    /// Grows the limit by the configured step and refetches the whole window.
    pub async fn load_more(&self) -> Option<ContextWindow> {
        {
            let mut st = self.state();
            if st.status == SessionStatus::Closed {
                return None;
            }
            st.window.limit = st.window.limit.saturating_add(self.step);
        }
        self.fetch().await
    }

    /// Ends the session. In-flight fetches will not touch the window.
    pub fn close(&self) {
        let mut st = self.state();
        st.status = SessionStatus::Closed;
        st.generation += 1;
    }
}
