use chrono::{Duration, TimeZone, Utc};
use logexplore::config::ContextConfig;
use logexplore::context::{ContextFetcher, Direction, FetchOptions, RowSource, SortOrder};
use logexplore::fields::FieldExtractor;
use logexplore::memory::MemoryRowSource;
use logexplore::stats;
use std::collections::BTreeMap;
use std::sync::Arc;

fn labels(app: Option<&str>) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    if let Some(app) = app {
        m.insert("app".to_string(), app.to_string());
    }
    m
}

fn sample() -> MemoryRowSource {
    let t0 = Utc.with_ymd_and_hms(2024, 9, 5, 10, 0, 0).unwrap();
    let mut src = MemoryRowSource::new();
    src.push_line_with_labels("level=info msg=\"User 123 logged in\"", t0, labels(Some("auth")));
    src.push_line_with_labels("level=info msg=\"User 456 logged in\"", t0 + Duration::seconds(30), labels(Some("auth")));
    src.push_line_with_labels("level=warn msg=\"User 789 logged out\"", t0 + Duration::seconds(60), labels(None));
    src.push_line("level=error msg=\"db down\"", t0 + Duration::seconds(90));
    src
}

#[tokio::test]
async fn context_around_middle_line() {
    let src = sample();
    let rows = src.to_rows();
    let fetcher = ContextFetcher::new(
        Arc::new(src),
        ContextConfig { initial_limit: 1, load_more_step: 1, sort_order: SortOrder::Descending },
    );
    let session = fetcher.open(rows[1].clone());
    let w = session.fetch().await.unwrap();
    assert_eq!(w.before, vec![rows[0].entry.clone()]);
    assert_eq!(w.after, vec![rows[2].entry.clone()]);

    let w = session.load_more().await.unwrap();
    assert_eq!(w.limit, 2);
    assert_eq!(w.before, vec![rows[0].entry.clone()]);
    assert_eq!(w.after, vec![rows[2].entry.clone(), rows[3].entry.clone()]);
    assert!(!w.has_more_before);
    assert!(w.has_more_after);
}

#[tokio::test]
async fn after_range_includes_the_anchor() {
    let src = sample();
    let rows = src.to_rows();
    let got = src
        .fetch(&rows[1], FetchOptions { limit: 2, direction: Direction::After })
        .await
        .unwrap();
    let ids: Vec<String> = got.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    let got = src
        .fetch(&rows[3], FetchOptions { limit: 10, direction: Direction::Before })
        .await
        .unwrap();
    let ids: Vec<String> = got.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, vec!["2", "1", "0"]);
}

#[tokio::test]
async fn equal_timestamps_split_on_insertion_order() {
    let t0 = Utc.with_ymd_and_hms(2024, 9, 5, 10, 0, 0).unwrap();
    let mut src = MemoryRowSource::new();
    for i in 0..5 {
        src.push_line(&format!("line{i}"), t0);
    }
    let rows = src.to_rows();
    let fetcher = ContextFetcher::new(
        Arc::new(src),
        ContextConfig { initial_limit: 2, load_more_step: 2, sort_order: SortOrder::Descending },
    );
    let session = fetcher.open(rows[2].clone());
    let w = session.fetch().await.unwrap();
    assert_eq!(w.before, vec!["line1", "line0"]);
    assert_eq!(w.after, vec!["line3", "line4"]);
}

#[tokio::test]
async fn equal_timestamp_after_range_starts_at_the_anchor() {
    let t0 = Utc.with_ymd_and_hms(2024, 9, 5, 10, 0, 0).unwrap();
    let mut src = MemoryRowSource::new();
    for i in 0..4 {
        src.push_line(&format!("line{i}"), t0);
    }
    let rows = src.to_rows();
    let got = src
        .fetch(&rows[1], FetchOptions { limit: 10, direction: Direction::After })
        .await
        .unwrap();
    let ids: Vec<String> = got.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[test]
fn rows_share_one_frame_and_expose_labels_as_fields() {
    let src = sample();
    assert_eq!(src.len(), 4);
    let rows = src.to_rows();
    assert!(Arc::ptr_eq(&rows[0].data_frame, &rows[3].data_frame));
    assert_eq!(rows[2].id().as_deref(), Some("2"));

    let extractor = FieldExtractor::default();
    let fields = extractor.extract_fields(&rows[0], None);
    let kv: Vec<(&str, &str)> = fields.iter().map(|f| (f.key.as_str(), f.value.as_str())).collect();
    assert_eq!(kv, vec![("app", "auth"), ("level", "info"), ("msg", "\"User 123 logged in\"")]);

    // sparse label: no app field for row 2
    let fields = extractor.extract_fields(&rows[2], None);
    assert!(fields.iter().all(|f| f.key != "app"));
}

#[test]
fn label_and_field_stats_over_memory_rows() {
    let rows = sample().to_rows();
    let by_app = stats::label_stats(&rows, "app");
    assert_eq!(by_app.len(), 1);
    assert_eq!(by_app[0].count, 2);

    let extractor = FieldExtractor::default();
    let by_level = stats::field_stats(&extractor, &rows, "level");
    let got: Vec<(&str, usize)> = by_level.iter().map(|i| (i.value.as_str(), i.count)).collect();
    assert_eq!(got, vec![("info", 2), ("error", 1), ("warn", 1)]);
}
