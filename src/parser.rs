use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Logfmt,
    Plaintext,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a JSON object line")]
    NotJsonObject,
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extracts the value of one field from a line, if present.
pub type Matcher = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A candidate field found by a parser. Only the parser that produced it
/// knows how to read its label and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldToken {
    text: String,
    label_end: usize,
    value_start: usize,
}

impl FieldToken {
    fn new(label: &str, value: &str) -> Self {
        let text = format!("{label}={value}");
        Self { label_end: label.len(), value_start: label.len() + 1, text }
    }
}

pub trait LogsParser: Send + Sync {
    fn format(&self) -> LogFormat;
    /// Cheap sniff: does this line look like our format?
    fn test(&self, line: &str) -> bool;
    fn get_fields(&self, line: &str) -> Result<Vec<FieldToken>, ParseError>;
    fn get_label_from_field(&self, token: &FieldToken) -> String;
    fn get_value_from_field(&self, token: &FieldToken) -> String;
    fn build_matcher(&self, label: &str) -> Matcher;
}

pub struct JsonParser;

pub struct LogfmtParser;

static JSON_PARSER: JsonParser = JsonParser;
static LOGFMT_PARSER: LogfmtParser = LogfmtParser;

static RE_LOGFMT_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)([\w\(\)\[\]\{\}]+)=(""|(?:".*?[^\\]"|[^"\s]\S*))"#).unwrap()
});

impl LogsParser for JsonParser {
    fn format(&self) -> LogFormat {
        LogFormat::Json
    }

    fn test(&self, line: &str) -> bool {
        line.trim_start().starts_with('{')
            && serde_json::from_str::<Value>(line).is_ok_and(|v| v.is_object())
    }

    fn get_fields(&self, line: &str) -> Result<Vec<FieldToken>, ParseError> {
        let flat = flatten_line(line)?;
        Ok(flat.iter().map(|(k, v)| FieldToken::new(k, v)).collect())
    }

    fn get_label_from_field(&self, token: &FieldToken) -> String {
        token.text[..token.label_end].to_string()
    }

    fn get_value_from_field(&self, token: &FieldToken) -> String {
        token.text[token.value_start..].to_string()
    }

    fn build_matcher(&self, label: &str) -> Matcher {
        let label = label.to_string();
        Box::new(move |line: &str| flatten_line(line).ok()?.remove(&label))
    }
}

impl LogsParser for LogfmtParser {
    fn format(&self) -> LogFormat {
        LogFormat::Logfmt
    }

    fn test(&self, line: &str) -> bool {
        RE_LOGFMT_PAIR.is_match(line)
    }

    fn get_fields(&self, line: &str) -> Result<Vec<FieldToken>, ParseError> {
        Ok(RE_LOGFMT_PAIR
            .captures_iter(line)
            .map(|c| FieldToken::new(&c[1], &c[2]))
            .collect())
    }

    fn get_label_from_field(&self, token: &FieldToken) -> String {
        token.text[..token.label_end].to_string()
    }

    fn get_value_from_field(&self, token: &FieldToken) -> String {
        token.text[token.value_start..].to_string()
    }

    fn build_matcher(&self, label: &str) -> Matcher {
        let pattern = format!(r#"(?:^|\s){}=("[^"]*"|\S+)"#, regex::escape(label));
        let Ok(re) = Regex::new(&pattern) else {
            return Box::new(|_: &str| None);
        };
        Box::new(move |line: &str| re.captures(line).map(|c| c[1].to_string()))
    }
}

/// Sniffs the format of a line. JSON wins over logfmt, since a JSON object
/// with `"a=b"` inside a string would also look like logfmt. A line that
/// only starts like JSON falls through to the logfmt check.
pub fn detect_format(line: &str) -> LogFormat {
    if JSON_PARSER.test(line) {
        LogFormat::Json
    } else if LOGFMT_PARSER.test(line) {
        LogFormat::Logfmt
    } else {
        LogFormat::Plaintext
    }
}

pub fn parser_for(format: LogFormat) -> Option<&'static dyn LogsParser> {
    match format {
        LogFormat::Json => Some(&JSON_PARSER),
        LogFormat::Logfmt => Some(&LOGFMT_PARSER),
        LogFormat::Plaintext => None,
    }
}

pub fn detect(line: &str) -> Option<&'static dyn LogsParser> {
    parser_for(detect_format(line))
}

fn flatten_line(line: &str) -> Result<BTreeMap<String, String>, ParseError> {
    match serde_json::from_str::<Value>(line)? {
        v @ Value::Object(_) => {
            let mut flat = BTreeMap::new();
            flatten_json("", &v, &mut flat);
            Ok(flat)
        }
        _ => Err(ParseError::NotJsonObject),
    }
}

fn flatten_json(prefix: &str, v: &Value, out: &mut BTreeMap<String, String>) {
    match v {
        Value::Object(map) => {
            for (k, v) in map.iter() {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_json(&key, v, out);
            }
        }
        Value::Array(arr) => {
            for (idx, item) in arr.iter().enumerate() {
                let key = if prefix.is_empty() {
                    idx.to_string()
                } else {
                    format!("{prefix}.{idx}")
                };
                flatten_json(&key, item, out);
            }
        }
        Value::Null => {
            out.insert(prefix.to_string(), "null".to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
    }
}

/// Reads a backend timestamp cell. Integers are epoch milliseconds; digit
/// strings are sized by length (s / ms / µs / ns).
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::String(s) => parse_ts_string(s).or_else(|| parse_ts_number_string(s)),
        _ => None,
    }
}

fn parse_ts_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let fmts = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];
    for f in fmts.iter() {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

fn parse_ts_number_string(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n = s.parse::<i64>().ok()?;
    match s.len() {
        10 => DateTime::<Utc>::from_timestamp(n, 0),
        13 => DateTime::<Utc>::from_timestamp_millis(n),
        16 => DateTime::<Utc>::from_timestamp_micros(n),
        19 => Some(DateTime::<Utc>::from_timestamp_nanos(n)),
        _ => None,
    }
}
