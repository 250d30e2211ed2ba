use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use logexplore::config::ExploreConfig;
use logexplore::context::{ContextFetcher, SortOrder};
use logexplore::fields::{normalize_value, FieldExtractor};
use logexplore::memory::MemoryRowSource;
use logexplore::model::LogRow;
use logexplore::{parser, stats};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(name = "logexplore", version, about = "Log row details, value stats and context")]
struct Cli {
    /// Input files (`-` for stdin). May be repeated.
    #[arg(required = false)]
    input: Vec<String>,

    /// JSON config file
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Timestamp field hints (e.g., ts, time, timestamp)
    #[arg(long = "time-key")]
    time_key: Vec<String>,

    /// What to print: fields | stats | context
    #[arg(long = "only", default_value = "fields")]
    only: String,

    /// Row index for fields/context
    #[arg(long = "row", default_value_t = 0)]
    row: usize,

    /// Field (or column) to compute stats for
    #[arg(long = "field")]
    field: Option<String>,
    /// Label to compute stats for
    #[arg(long = "label")]
    label: Option<String>,
    #[arg(long = "top")]
    top: Option<usize>,

    /// Initial context limit per direction
    #[arg(long = "limit")]
    limit: Option<usize>,
    /// Number of "load more" rounds after the first context fetch
    #[arg(long = "more", default_value_t = 0)]
    more: usize,
    #[arg(long = "ascending", default_value_t = false)]
    ascending: bool,

    #[arg(long = "max-line-length")]
    max_line_length: Option<usize>,
}

fn read_all_lines(paths: &[String]) -> io::Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for p in paths {
        if p == "-" {
            for line in io::stdin().lock().lines() {
                out.push((p.clone(), line?));
            }
        } else {
            let r = BufReader::new(File::open(p)?);
            for line in r.lines() {
                out.push((p.clone(), line?));
            }
        }
    }
    Ok(out)
}

/// Timestamp of a line from the first matching hint key.
fn line_timestamp(line: &str, time_keys: &[String]) -> Option<DateTime<Utc>> {
    let p = parser::detect(line)?;
    time_keys.iter().find_map(|key| {
        let raw = p.build_matcher(key)(line)?;
        parser::parse_timestamp(&Value::String(normalize_value(&raw).to_string()))
    })
}

fn load_source(lines: &[(String, String)], time_keys: &[String]) -> MemoryRowSource {
    let mut source = MemoryRowSource::new();
    let mut last = DateTime::<Utc>::UNIX_EPOCH;
    for (path, line) in lines {
        let ts = line_timestamp(line, time_keys).unwrap_or(last);
        last = ts;
        let mut labels = BTreeMap::new();
        labels.insert("filename".to_string(), path.clone());
        source.push_line_with_labels(line, ts, labels);
    }
    source
}

fn load_config(cli: &Cli) -> anyhow::Result<ExploreConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ExploreConfig::load(path)?,
        None => ExploreConfig::default(),
    };
    if let Some(n) = cli.max_line_length {
        cfg.max_line_length = n;
    }
    if let Some(n) = cli.limit {
        cfg.context.initial_limit = n;
    }
    if let Some(n) = cli.top {
        cfg.stats.top_k = n;
    }
    if cli.ascending {
        cfg.context.sort_order = SortOrder::Ascending;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn pick_row(rows: &[LogRow], idx: usize) -> anyhow::Result<&LogRow> {
    match rows.get(idx) {
        Some(r) => Ok(r),
        None => bail!("row {idx} out of range ({} rows)", rows.len()),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    init_parallelism();
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let input_files = if cli.input.is_empty() { vec!["-".to_string()] } else { cli.input.clone() };
    let time_keys = if cli.time_key.is_empty() {
        vec!["ts".to_string(), "time".to_string(), "timestamp".to_string()]
    } else {
        cli.time_key.clone()
    };
    let lines = read_all_lines(&input_files).context("reading input")?;
    let source = load_source(&lines, &time_keys);
    let rows = source.to_rows();
    info!(rows = rows.len(), "loaded input");

    let extractor = FieldExtractor::new(&cfg);
    match cli.only.as_str() {
        "fields" => {
            let row = pick_row(&rows, cli.row)?;
            let fields = extractor.extract_fields(row, None);
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        "stats" => {
            let items = if let Some(label) = &cli.label {
                stats::label_stats(&rows, label)
            } else if let Some(key) = &cli.field {
                let is_column = rows.first().is_some_and(|r| r.data_frame.column(key).is_some());
                debug!(key = %key, is_column, "computing field stats");
                if is_column { stats::column_stats(&rows, key) } else { stats::field_stats(&extractor, &rows, key) }
            } else {
                bail!("--only stats needs --field or --label");
            };
            let shown = stats::with_other_bucket(&items, cfg.stats.top_k);
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        "context" => {
            let anchor = pick_row(&rows, cli.row)?.clone();
            let fetcher = ContextFetcher::new(Arc::new(source), cfg.context.clone());
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            let window = runtime.block_on(async {
                let session = fetcher.open(anchor);
                session.fetch().await;
                for _ in 0..cli.more {
                    session.load_more().await;
                }
                let window = session.window();
                session.close();
                window
            });
            println!("{}", serde_json::to_string_pretty(&window)?);
        }
        other => bail!("unknown --only value: {other}"),
    }
    Ok(())
}
