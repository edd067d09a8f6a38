//! In-memory collaborators: a library host with scripted availability, a
//! stand-in "real" chart library, and a data worker that answers per widget
//! on a schedule. Used by the demo binary and the tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::dataprep::{DataPrepWorker, Series};
use crate::error::{LoaderError, RenderError};
use crate::library::{ChartInstance, ChartLibrary, ChartOptions, HostElement, LibraryHost};
use crate::page::Fragment;

pub const REAL_CHART_CLASS: &str = "chart-canvas";

/// A chart library that draws a canvas fragment and can be told to fail.
#[derive(Debug, Default)]
pub struct SimulatedLibrary {
    fail_construct: Cell<bool>,
    fail_render: Cell<bool>,
    constructed: Cell<u32>,
}

impl SimulatedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_construct(&self, fail: bool) {
        self.fail_construct.set(fail);
    }

    pub fn fail_render(&self, fail: bool) {
        self.fail_render.set(fail);
    }

    pub fn constructed(&self) -> u32 {
        self.constructed.get()
    }
}

impl ChartLibrary for SimulatedLibrary {
    fn name(&self) -> &str {
        "simulated"
    }

    fn construct(&self, host: HostElement, options: ChartOptions) -> Result<Box<dyn ChartInstance>, RenderError> {
        if self.fail_construct.get() {
            return Err(RenderError::InvalidOptions(format!("unsupported type '{}'", options.chart_type)));
        }
        if !host.page.contains(&host.id) {
            return Err(RenderError::MissingHost(host.id));
        }
        self.constructed.set(self.constructed.get() + 1);
        Ok(Box::new(SimulatedChart {
            host,
            options,
            fail_render: self.fail_render.get(),
        }))
    }
}

#[derive(Debug)]
pub struct SimulatedChart {
    host: HostElement,
    options: ChartOptions,
    fail_render: bool,
}

impl SimulatedChart {
    fn draw(&self) {
        let text = format!("{} x{}", self.options.chart_type, self.options.series.len());
        self.host
            .page
            .replace_children(&self.host.id, vec![Fragment::new("canvas", REAL_CHART_CLASS, &text)]);
    }
}

#[async_trait(?Send)]
impl ChartInstance for SimulatedChart {
    async fn render(&mut self) -> Result<(), RenderError> {
        if self.fail_render {
            return Err(RenderError::Draw("canvas context lost".to_string()));
        }
        self.draw();
        Ok(())
    }

    fn update_options(&mut self, options: ChartOptions, redraw: bool, _animate: bool) {
        self.options = options;
        if redraw {
            self.draw();
        }
    }

    fn update_series(&mut self, series: Vec<Series>) {
        self.options.series = series;
        self.draw();
    }

    fn destroy(&mut self) {
        self.host.page.replace_children(&self.host.id, Vec::new());
    }
}

/// Library host whose global appears at a scripted moment (or never).
#[derive(Debug)]
pub struct SimulatedLibraryHost {
    library: Rc<SimulatedLibrary>,
    available_at: Cell<Option<Instant>>,
    loader_present: Cell<bool>,
    inject_fails: bool,
    inject_settles: bool,
    inject_latency: Duration,
    injections: Cell<u32>,
}

impl SimulatedLibraryHost {
    fn build(available_at: Option<Instant>, loader_present: bool, inject_fails: bool) -> Self {
        Self {
            library: Rc::new(SimulatedLibrary::new()),
            available_at: Cell::new(available_at),
            loader_present: Cell::new(loader_present),
            inject_fails,
            inject_settles: true,
            inject_latency: Duration::from_millis(50),
            injections: Cell::new(0),
        }
    }

    /// Library global already initialised.
    pub fn present() -> Self {
        Self::build(Some(Instant::now()), true, false)
    }

    /// Loader tag already on the page; global shows up after `delay`.
    pub fn arriving_after(delay: Duration) -> Self {
        Self::build(Some(Instant::now() + delay), true, false)
    }

    /// Loader tag on the page that never initialises.
    pub fn loader_hangs() -> Self {
        Self::build(None, true, false)
    }

    /// No loader; injecting one fails.
    pub fn absent() -> Self {
        Self::build(None, false, true)
    }

    /// No loader; injecting one succeeds and the global arrives `delay` after injection.
    pub fn injectable(delay: Duration) -> Self {
        let host = Self::build(None, false, false);
        host.available_at.set(Some(Instant::now() + host.inject_latency + delay));
        host
    }

    /// No loader; the injected tag fires neither its load nor its error callback.
    pub fn inject_never_settles() -> Self {
        Self {
            inject_settles: false,
            ..Self::build(None, false, false)
        }
    }

    pub fn make_available(&self) {
        self.available_at.set(Some(Instant::now()));
    }

    pub fn injections(&self) -> u32 {
        self.injections.get()
    }

    pub fn chart_library(&self) -> Rc<SimulatedLibrary> {
        self.library.clone()
    }
}

#[async_trait(?Send)]
impl LibraryHost for SimulatedLibraryHost {
    fn library(&self) -> Option<Rc<dyn ChartLibrary>> {
        match self.available_at.get() {
            Some(at) if Instant::now() >= at => Some(self.library.clone() as Rc<dyn ChartLibrary>),
            _ => None,
        }
    }

    fn loader_present(&self, _src: &str) -> bool {
        self.loader_present.get()
    }

    async fn inject_loader(&self, src: &str) -> Result<(), LoaderError> {
        self.injections.set(self.injections.get() + 1);
        self.loader_present.set(true);
        if !self.inject_settles {
            std::future::pending::<()>().await;
        }
        sleep(self.inject_latency).await;
        if self.inject_fails {
            Err(LoaderError {
                src: src.to_string(),
                reason: "network error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// How the worker answers for one widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    After(Duration),
    Never,
    Fail(String),
    Malformed,
}

impl Plan {
    /// `"1500"`, `"never"`, `"fail"`, `"malformed"`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "never" => Some(Plan::Never),
            "fail" => Some(Plan::Fail("worker rejected request".to_string())),
            "malformed" => Some(Plan::Malformed),
            ms => ms.parse().ok().map(|v| Plan::After(Duration::from_millis(v))),
        }
    }
}

/// Data worker answering each widget according to its [`Plan`].
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    plans: RefCell<HashMap<String, Plan>>,
    default_plan: Option<Plan>,
    posted: RefCell<Vec<Value>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(plan: Plan) -> Self {
        Self {
            default_plan: Some(plan),
            ..Default::default()
        }
    }

    pub fn plan(&self, widget_id: &str, plan: Plan) {
        self.plans.borrow_mut().insert(widget_id.to_string(), plan);
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.borrow().clone()
    }

    pub fn posted_for(&self, widget_id: &str) -> usize {
        self.posted
            .borrow()
            .iter()
            .filter(|m| m["widgetId"] == widget_id)
            .count()
    }

    pub fn sample_reply(widget_id: &str) -> Value {
        json!({
            "action": "dataReady",
            "widgetId": widget_id,
            "chartData": {
                "series": [
                    { "name": "revenue", "data": [1.2, 2.4, 4.1, 7.9] },
                    { "name": "costs", "data": [1.0, 1.6, 2.2, 3.0] }
                ],
                "categories": ["2023", "2024", "2025", "2026"],
                "chartType": "bar"
            }
        })
    }
}

#[async_trait(?Send)]
impl DataPrepWorker for ScriptedWorker {
    async fn post(&self, message: Value) -> Result<Value, String> {
        let widget_id = message["widgetId"].as_str().unwrap_or_default().to_string();
        self.posted.borrow_mut().push(message);
        let plan = self
            .plans
            .borrow()
            .get(&widget_id)
            .cloned()
            .or_else(|| self.default_plan.clone())
            .unwrap_or(Plan::After(Duration::ZERO));
        match plan {
            Plan::After(delay) => {
                sleep(delay).await;
                Ok(Self::sample_reply(&widget_id))
            }
            Plan::Never => std::future::pending::<Result<Value, String>>().await,
            Plan::Fail(reason) => Err(reason),
            Plan::Malformed => Ok(json!({ "action": "dataReady", "chartData": { "series": [] } })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parse() {
        assert_eq!(Plan::parse("2000"), Some(Plan::After(Duration::from_secs(2))));
        assert_eq!(Plan::parse("never"), Some(Plan::Never));
        assert!(matches!(Plan::parse("fail"), Some(Plan::Fail(_))));
        assert_eq!(Plan::parse("soon"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_follows_plan() {
        let worker = ScriptedWorker::new();
        worker.plan("alpha", Plan::After(Duration::from_millis(2000)));
        let start = Instant::now();
        let reply = worker.post(json!({ "action": "prepareData", "widgetId": "alpha" })).await.unwrap();
        assert_eq!(reply["action"], "dataReady");
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        assert_eq!(worker.posted_for("alpha"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_arrival_time() {
        let host = SimulatedLibraryHost::arriving_after(Duration::from_secs(1));
        assert!(host.library().is_none());
        sleep(Duration::from_secs(1)).await;
        assert!(host.library().is_some());
    }
}
