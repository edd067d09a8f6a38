//! Structured JSON-lines logging for the render supervisor.
//!
//! Every record is one JSON object on stdout. When `LOG_DIR` is set the same
//! records are appended to a per-run directory so a session can be replayed
//! and audited after the fact:
//!
//! ```text
//! <LOG_DIR>/<run_id>/manifest.json
//! <LOG_DIR>/<run_id>/events.jsonl   (info and above)
//! <LOG_DIR>/<run_id>/trace.jsonl    (trace, debug)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").as_deref().unwrap_or("info"))
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Registry,   // Widget records, timeouts
    Library,    // Charting library availability, polyfill
    DataPrep,   // Data collaborator round trips
    Fallback,   // Inert placeholder visuals
    Table,      // Data table visibility
    Watcher,    // Tree mutations, debounce
    Supervisor, // Passes, transitions
    System,     // Startup, shutdown
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Registry => "registry",
            Domain::Library => "library",
            Domain::DataPrep => "dataprep",
            Domain::Fallback => "fallback",
            Domain::Table => "table",
            Domain::Watcher => "watcher",
            Domain::Supervisor => "supervisor",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domain_listed(domains, self.as_str()),
        }
    }
}

fn domain_listed(list: &str, name: &str) -> bool {
    list.split(',').any(|d| d.trim() == name)
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct FileSink {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sink: Option<FileSink>,
}

impl RunContext {
    fn from_env() -> Self {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sink = match std::env::var("LOG_DIR") {
            Ok(base) => match FileSink::open(Path::new(&base), &run_id) {
                Ok(sink) => Some(sink),
                Err(err) => {
                    eprintln!("[log] file sink disabled: {}", err);
                    None
                }
            },
            Err(_) => None,
        };
        Self { run_id, sink }
    }
}

impl FileSink {
    fn open(base: &Path, run_id: &str) -> std::io::Result<Self> {
        let mut run_dir = PathBuf::from(base);
        run_dir.push(run_id);
        create_dir_all(&run_dir)?;

        std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        )?;

        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(run_dir.join(name))
                .map(|f| Mutex::new(BufWriter::new(f)))
        };
        Ok(Self {
            events: open("events.jsonl")?,
            trace: open("trace.jsonl")?,
        })
    }

    fn write(&self, level: Level, line: &str) {
        let writer = match level {
            Level::Trace | Level::Debug => &self.trace,
            _ => &self.events,
        };
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

fn run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(RunContext::from_env)
}

pub fn run_id() -> &'static str {
    &run_context().run_id
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let ctx = run_context();
    let line = render_record(&ctx.run_id, level, domain.as_str(), event, fields);
    if let Some(sink) = &ctx.sink {
        sink.write(level, &line);
    }
    println!("{}", line);
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["widget_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn render_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let (mut top, data) = split_fields(fields);
    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("ts_ms".to_string(), json!(ts_epoch_ms()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain helpers
// =============================================================================

fn transition_fields(widget_id: &str, from: &str, to: &str, event: &str) -> Map<String, Value> {
    obj(&[
        ("widget_id", v_str(widget_id)),
        ("from", v_str(from)),
        ("to", v_str(to)),
        ("event", v_str(event)),
    ])
}

/// Log a widget state transition
pub fn log_transition(widget_id: &str, from: &str, to: &str, event: &str) {
    log(
        Level::Debug,
        Domain::Supervisor,
        "transition",
        transition_fields(widget_id, from, to, event),
    );
}

/// Log a degraded outcome with its error kind
pub fn log_fallback(widget_id: &str, kind: &str, detail: &str) {
    log(
        Level::Warn,
        Domain::Fallback,
        "fallback",
        obj(&[
            ("widget_id", v_str(widget_id)),
            ("kind", v_str(kind)),
            ("msg", v_str(detail)),
        ]),
    );
}

/// Log the outcome of one supervisor pass
pub fn log_pass(reason: &str, known: usize, terminal: usize, state_hash: &str) {
    log(
        Level::Debug,
        Domain::Supervisor,
        "pass",
        obj(&[
            ("reason", v_str(reason)),
            ("known", json!(known)),
            ("terminal", json!(terminal)),
            ("state_hash", v_str(state_hash)),
        ]),
    );
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn test_level_parse_defaults_to_info() {
        assert_eq!(Level::parse("debug"), Level::Debug);
        assert_eq!(Level::parse(" warn "), Level::Warn);
        assert_eq!(Level::parse("verbose"), Level::Info);
    }

    #[test]
    fn test_domain_list_matching() {
        assert!(domain_listed("library, watcher", "watcher"));
        assert!(!domain_listed("library", "table"));
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_record_hoists_widget_id() {
        let line = render_record(
            "r-test",
            Level::Warn,
            "fallback",
            "fallback",
            obj(&[
                ("widget_id", v_str("beta")),
                ("msg", v_str("timed out")),
                ("kind", v_str("data_prep_timeout")),
            ]),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["widget_id"], "beta");
        assert_eq!(parsed["msg"], "timed out");
        assert_eq!(parsed["lvl"], "WARN");
        assert_eq!(parsed["data"]["kind"], "data_prep_timeout");
        assert!(parsed["data"].get("widget_id").is_none());
    }

    #[test]
    fn test_transition_record_fields() {
        let line = render_record(
            "r-test",
            Level::Debug,
            "supervisor",
            "transition",
            transition_fields("alpha", "awaiting_data", "rendered", "rendered"),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["widget_id"], "alpha");
        assert_eq!(parsed["data"]["from"], "awaiting_data");
        assert_eq!(parsed["data"]["to"], "rendered");
        assert_eq!(parsed["data"]["event"], "rendered");
        assert!(parsed["data"].get("trigger").is_none());
    }

    #[test]
    fn test_file_sink_splits_streams() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(dir.path(), "r-sink").unwrap();
        sink.write(Level::Info, "{\"event\":\"pass\"}");
        sink.write(Level::Debug, "{\"event\":\"transition\"}");

        let run_dir = dir.path().join("r-sink");
        let events = std::fs::read_to_string(run_dir.join("events.jsonl")).unwrap();
        let trace = std::fs::read_to_string(run_dir.join("trace.jsonl")).unwrap();
        assert!(events.contains("pass"));
        assert!(!events.contains("transition"));
        assert!(trace.contains("transition"));
        assert!(run_dir.join("manifest.json").exists());
    }
}
