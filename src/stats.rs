use crate::fields::FieldExtractor;
use crate::model::{stringify_value, Field, LogRow, StatItem};
use crate::parser::{self, LogFormat, Matcher};
use ahash::AHashMap;
use itertools::Itertools;
use rayon::prelude::*;

/// Value of the aggregate bucket holding everything outside the top K.
pub const OTHER_BUCKET: &str = "Other";

/// Histogram of `selector` over `rows`. Rows for which the selector yields
/// nothing are left out of the population; an empty string is a value.
/// Sorted by count (desc), then value.
pub fn compute_stats<'a, I, F>(rows: I, mut selector: F) -> Vec<StatItem>
where
    I: IntoIterator<Item = &'a LogRow>,
    F: FnMut(&LogRow) -> Option<String>,
{
    count_values(rows.into_iter().filter_map(|row| selector(row)))
}

pub fn count_values<I>(values: I) -> Vec<StatItem>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: AHashMap<String, usize> = AHashMap::new();
    let mut total = 0usize;
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
        total += 1;
    }
    counts
        .into_iter()
        .map(|(value, count)| StatItem { value, count, proportion: ratio(count, total) })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)))
        .collect()
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Splits `items` into the `k` most frequent and the remainder. Equal counts
/// keep their input order.
pub fn top_k(items: &[StatItem], k: usize) -> (Vec<StatItem>, Vec<StatItem>) {
    let mut sorted: Vec<StatItem> = items
        .iter()
        .cloned()
        .sorted_by(|a, b| b.count.cmp(&a.count))
        .collect();
    let rest = sorted.split_off(k.min(sorted.len()));
    (sorted, rest)
}

/// Top `k` items plus one [`OTHER_BUCKET`] item summing the rest.
pub fn with_other_bucket(items: &[StatItem], k: usize) -> Vec<StatItem> {
    let total: usize = items.iter().map(|i| i.count).sum();
    let (mut top, rest) = top_k(items, k);
    if !rest.is_empty() {
        let count: usize = rest.iter().map(|i| i.count).sum();
        top.push(StatItem { value: OTHER_BUCKET.to_string(), count, proportion: ratio(count, total) });
    }
    top
}

pub fn label_stats(rows: &[LogRow], label: &str) -> Vec<StatItem> {
    compute_stats(rows, |row| row.labels.get(label).cloned())
}

pub fn column_stats(rows: &[LogRow], column: &str) -> Vec<StatItem> {
    compute_stats(rows, |row| row.cell_by_name(column).map(stringify_value))
}

/// Histogram of a detected field, matched per row with the parser of that
/// row's format.
pub fn field_stats(extractor: &FieldExtractor, rows: &[LogRow], key: &str) -> Vec<StatItem> {
    let matchers: Vec<(LogFormat, Matcher)> = [LogFormat::Json, LogFormat::Logfmt]
        .into_iter()
        .filter_map(|f| parser::parser_for(f).map(|p| (f, p.build_matcher(key))))
        .collect();
    let values: Vec<String> = rows
        .par_iter()
        .filter_map(|row| {
            let line = row.entry.as_str();
            if extractor.exceeds_max_length(line) {
                return None;
            }
            let format = extractor.formats().format_of(line);
            let (_, matcher) = matchers.iter().find(|(f, _)| *f == format)?;
            matcher(line)
        })
        .collect();
    count_values(values)
}

/// Stats for a field picked from the details view: structured fields come
/// from their column, detected ones from the message text.
pub fn stats_for_field(extractor: &FieldExtractor, rows: &[LogRow], field: &Field) -> Vec<StatItem> {
    match field.source_column_index {
        Some(_) => column_stats(rows, &field.key),
        None => field_stats(extractor, rows, &field.key),
    }
}
