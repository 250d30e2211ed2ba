use logexplore::fields::FieldExtractor;
use logexplore::model::{Column, DataFrame, Field, LogRow, StatItem};
use logexplore::stats::{self, OTHER_BUCKET};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn rows(entries: &[&str], level_label: &[Option<&str>]) -> Vec<LogRow> {
    let frame = Arc::new(DataFrame::new(vec![
        Column::new("line", entries.iter().map(|e| Value::from(*e)).collect()),
        Column::new(
            "level",
            level_label.iter().map(|l| l.map(Value::from).unwrap_or(Value::Null)).collect(),
        ),
    ]));
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut labels = BTreeMap::new();
            if let Some(Some(l)) = level_label.get(i) {
                labels.insert("level".to_string(), l.to_string());
            }
            LogRow {
                uid: i.to_string(),
                raw: e.to_string(),
                entry: e.to_string(),
                timestamp_epoch_ms: i as i64,
                labels,
                data_frame: Arc::clone(&frame),
                row_index: i,
                entry_field_index: 0,
            }
        })
        .collect()
}

fn counts(items: &[StatItem]) -> Vec<(&str, usize)> {
    items.iter().map(|i| (i.value.as_str(), i.count)).collect()
}

#[test]
fn counts_only_rows_with_a_value_and_proportions_sum_to_one() {
    let rs = rows(
        &["a", "b", "c", "d", "e"],
        &[Some("info"), Some("error"), None, Some("info"), Some("")],
    );
    let items = stats::label_stats(&rs, "level");
    assert_eq!(counts(&items), vec![("info", 2), ("", 1), ("error", 1)]);
    let total: usize = items.iter().map(|i| i.count).sum();
    assert_eq!(total, 4);
    let sum: f64 = items.iter().map(|i| i.proportion).sum();
    assert!((sum - 1.0).abs() < 1e-9);
    assert!((items[0].proportion - 0.5).abs() < 1e-9);
}

#[test]
fn empty_population_yields_empty_histogram() {
    assert!(stats::compute_stats(&[] as &[LogRow], |_| Some("x".to_string())).is_empty());
    let rs = rows(&["a", "b"], &[None, None]);
    assert!(stats::label_stats(&rs, "level").is_empty());
    assert!(stats::count_values(Vec::<String>::new()).is_empty());
}

#[test]
fn top_k_and_other_bucket_conserve_the_total() {
    let items = stats::count_values(
        ["a", "a", "a", "b", "b", "c", "d", "d", "d", "d", "e"].iter().map(|s| s.to_string()),
    );
    for k in 0..=6 {
        let (top, rest) = stats::top_k(&items, k);
        assert_eq!(top.len(), k.min(items.len()));
        let sum: usize = top.iter().chain(rest.iter()).map(|i| i.count).sum();
        assert_eq!(sum, 11);
        for t in &top {
            assert!(rest.iter().all(|r| r.value != t.value));
        }
    }

    let shown = stats::with_other_bucket(&items, 2);
    assert_eq!(counts(&shown), vec![("d", 4), ("a", 3), (OTHER_BUCKET, 4)]);
    let other = shown.last().unwrap();
    assert!((other.proportion - 4.0 / 11.0).abs() < 1e-9);

    let all = stats::with_other_bucket(&items, 10);
    assert!(all.iter().all(|i| i.value != OTHER_BUCKET));
}

#[test]
fn top_k_keeps_input_order_for_ties() {
    let items = vec![
        StatItem { value: "x".into(), count: 1, proportion: 0.25 },
        StatItem { value: "y".into(), count: 2, proportion: 0.5 },
        StatItem { value: "z".into(), count: 1, proportion: 0.25 },
    ];
    let (top, rest) = stats::top_k(&items, 2);
    assert_eq!(counts(&top), vec![("y", 2), ("x", 1)]);
    assert_eq!(counts(&rest), vec![("z", 1)]);
}

#[test]
fn field_stats_match_per_row_format() {
    let rs = rows(
        &[
            "status=200 path=/a",
            r#"{"status":200,"path":"/b"}"#,
            "status=500 path=/a",
            "no fields here",
            r#"{"path":"/c"}"#,
        ],
        &[None, None, None, None, None],
    );
    let extractor = FieldExtractor::default();
    let items = stats::field_stats(&extractor, &rs, "status");
    assert_eq!(counts(&items), vec![("200", 2), ("500", 1)]);

    let short = FieldExtractor::default().with_max_line_length(20);
    let items = stats::field_stats(&short, &rs, "status");
    assert_eq!(counts(&items), vec![("200", 1), ("500", 1)]);
}

#[test]
fn stats_for_field_uses_column_for_derived_fields() {
    let rs = rows(&["level=debug", "level=debug", "x"], &[Some("warn"), Some("warn"), Some("info")]);
    let extractor = FieldExtractor::default();

    let derived = Field { source_column_index: Some(1), ..Field::detected("level", "warn") };
    assert_eq!(counts(&stats::stats_for_field(&extractor, &rs, &derived)), vec![("warn", 2), ("info", 1)]);

    let detected = Field::detected("level", "debug");
    assert_eq!(counts(&stats::stats_for_field(&extractor, &rs, &detected)), vec![("debug", 2)]);

    assert_eq!(counts(&stats::column_stats(&rs, "level")), vec![("warn", 2), ("info", 1)]);
    assert!(stats::column_stats(&rs, "missing").is_empty());
}

#[test]
fn selector_can_read_raw_cells() {
    let rs = rows(&["a", "b"], &[Some("x"), None]);
    let items = stats::compute_stats(&rs, |r| r.cell_by_name("level").map(|v| v.to_string()));
    assert_eq!(items, vec![StatItem { value: json!("x").to_string(), count: 1, proportion: 1.0 }]);
}
