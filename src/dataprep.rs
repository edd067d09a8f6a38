//! Data preparation round trips.
//!
//! Wire format with the collaborator:
//!
//! ```text
//! -> { "action": "prepareData", "widgetId": "alpha", ...seed }
//! <- { "action": "dataReady", "widgetId": "alpha", "chartData": { "series": [...], "categories": [...] } }
//! <- { "action": "error", "message": "..." }
//! ```
//!
//! The dispatcher never retries. A rejection and a missed deadline end the
//! same way, in the fallback path, and the deadline is owned by the supervisor.

use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::DataPrepError;
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub series: Vec<Series>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub chart_type: Option<String>,
}

impl ChartData {
    pub fn validate(&self) -> Result<(), DataPrepError> {
        if self.series.is_empty() {
            return Err(DataPrepError::Malformed("no series".to_string()));
        }
        if !self.categories.is_empty() {
            if let Some(bad) = self.series.iter().find(|s| s.data.len() != self.categories.len()) {
                return Err(DataPrepError::Malformed(format!(
                    "series '{}' has {} points for {} categories",
                    bad.name,
                    bad.data.len(),
                    self.categories.len()
                )));
            }
        }
        Ok(())
    }
}

/// Seed data forwarded verbatim alongside the widget id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareRequest {
    pub seed: Map<String, Value>,
}

impl PrepareRequest {
    pub fn new(seed: Map<String, Value>) -> Self {
        Self { seed }
    }

    /// Parse a `data-seed` attribute. Anything other than a JSON object is ignored.
    pub fn from_seed_attr(raw: Option<&str>) -> Self {
        let seed = raw
            .and_then(|r| serde_json::from_str::<Value>(r).ok())
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        Self { seed }
    }

    pub fn to_message(&self, widget_id: &str) -> Value {
        let mut message = self.seed.clone();
        message.insert("action".to_string(), json!("prepareData"));
        message.insert("widgetId".to_string(), json!(widget_id));
        Value::Object(message)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataReady {
    #[serde(default)]
    widget_id: Option<String>,
    chart_data: ChartData,
}

/// The worker-like collaborator. A rejection carries the worker's message.
#[async_trait(?Send)]
pub trait DataPrepWorker {
    async fn post(&self, message: Value) -> Result<Value, String>;
}

#[derive(Clone)]
pub struct DataPrepDispatcher {
    worker: Rc<dyn DataPrepWorker>,
}

impl std::fmt::Debug for DataPrepDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPrepDispatcher").finish_non_exhaustive()
    }
}

impl DataPrepDispatcher {
    pub fn new(worker: Rc<dyn DataPrepWorker>) -> Self {
        Self { worker }
    }

    pub async fn prepare(&self, widget_id: &str, request: PrepareRequest) -> Result<ChartData, DataPrepError> {
        log(
            Level::Debug,
            Domain::DataPrep,
            "prepare",
            obj(&[("widget_id", v_str(widget_id)), ("seed_keys", json!(request.seed.len()))]),
        );
        let reply = self
            .worker
            .post(request.to_message(widget_id))
            .await
            .map_err(DataPrepError::Collaborator);
        let result = reply.and_then(|r| parse_reply(widget_id, r));
        match &result {
            Ok(data) => log(
                Level::Debug,
                Domain::DataPrep,
                "data_ready",
                obj(&[("widget_id", v_str(widget_id)), ("series", json!(data.series.len()))]),
            ),
            Err(err) => log(
                Level::Warn,
                Domain::DataPrep,
                "rejected",
                obj(&[("widget_id", v_str(widget_id)), ("msg", v_str(&err.to_string()))]),
            ),
        }
        result
    }
}

fn parse_reply(widget_id: &str, reply: Value) -> Result<ChartData, DataPrepError> {
    let action = reply
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| DataPrepError::Malformed("missing action".to_string()))?;
    match action {
        "dataReady" => {
            let ready: DataReady =
                serde_json::from_value(reply).map_err(|e| DataPrepError::Malformed(e.to_string()))?;
            if let Some(got) = ready.widget_id {
                if got != widget_id {
                    return Err(DataPrepError::WidgetMismatch {
                        expected: widget_id.to_string(),
                        got,
                    });
                }
            }
            ready.chart_data.validate()?;
            Ok(ready.chart_data)
        }
        "error" => Err(DataPrepError::Collaborator(
            reply
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string(),
        )),
        other => Err(DataPrepError::UnexpectedAction(other.to_string())),
    }
}
