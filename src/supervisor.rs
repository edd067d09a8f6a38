//! Render supervisor: the per-widget state machine and its side effects.
//!
//! Everything here is synchronous. Each entry point checks the registry and
//! applies its transition in one block, with no await in between, and
//! returns the [`Job`]s that need async work. The [`crate::runtime`] module
//! runs those jobs and feeds their outcomes back in.
//!
//! ```text
//!            discover          library ready         data + render ok
//!   Idle ───────────► AwaitingLibrary ───────► AwaitingData ─────────► Rendered
//!                          │                        │
//!                          │ deadline               │ reject / throw / deadline
//!                          ▼                        ▼
//!                       TimedOut ──────┬────── Failed
//!                                      ▼
//!                              FallbackRendered
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::AbortHandle;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::config::SupervisorConfig;
use crate::dataprep::{ChartData, DataPrepDispatcher, DataPrepWorker, PrepareRequest, Series};
use crate::datatable::DataTableVisibilityController;
use crate::error::{DataPrepError, FailureKind, RenderError, SupervisorError};
use crate::fallback::FallbackChartFactory;
use crate::library::{ChartHandle, ChartInstance, ChartOptions, HostElement, LibraryAvailabilityMonitor, LibraryHost, LibraryStatus};
use crate::lifecycle::{WidgetEvent, WidgetState};
use crate::logging::{log, log_fallback, log_pass, obj, v_str, Domain, Level};
use crate::page::{chart_id, loading_id, table_id, PageHandle, LOADED_CLASS, PLACEHOLDER_CLASS};
use crate::registry::{LoadingRegistry, TimeoutHandle};
use crate::signals::{Signal, SignalBus};

pub const ERROR_BANNER_TEXT: &str = "This chart could not be loaded. Its data is available in the table.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Offset from page readiness.
    Scheduled(Duration),
    Mutation,
    Manual,
}

impl PassReason {
    fn label(&self) -> String {
        match self {
            PassReason::Scheduled(offset) => format!("scheduled+{}ms", offset.as_millis()),
            PassReason::Mutation => "mutation".to_string(),
            PassReason::Manual => "manual".to_string(),
        }
    }
}

/// Async work requested by the supervisor.
pub enum Job {
    EnsureLibrary,
    ArmTimeout { widget_id: String, deadline: Instant },
    Prepare { widget_id: String, request: PrepareRequest },
    Render { widget_id: String, chart: Box<dyn ChartInstance> },
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::EnsureLibrary => f.write_str("EnsureLibrary"),
            Job::ArmTimeout { widget_id, deadline } => f
                .debug_struct("ArmTimeout")
                .field("widget_id", widget_id)
                .field("deadline", deadline)
                .finish(),
            Job::Prepare { widget_id, request } => f
                .debug_struct("Prepare")
                .field("widget_id", widget_id)
                .field("request", request)
                .finish(),
            Job::Render { widget_id, .. } => f.debug_struct("Render").field("widget_id", widget_id).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSummary {
    pub widget_id: String,
    pub state: WidgetState,
    pub error: Option<FailureKind>,
    pub table_visible: bool,
    pub elapsed_ms: u64,
    pub history: Vec<WidgetState>,
}

pub struct RenderSupervisor {
    config: SupervisorConfig,
    page: PageHandle,
    registry: LoadingRegistry,
    library: Rc<LibraryAvailabilityMonitor>,
    dispatcher: DataPrepDispatcher,
    fallback: FallbackChartFactory,
    tables: DataTableVisibilityController,
    signals: SignalBus,
    library_requested: bool,
    /// Abort handles for in-flight prepare/render work, by widget.
    work: HashMap<String, AbortHandle>,
}

impl std::fmt::Debug for RenderSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSupervisor")
            .field("registry", &self.registry)
            .field("library", &self.library)
            .field("library_requested", &self.library_requested)
            .finish()
    }
}

impl RenderSupervisor {
    pub fn new(
        config: SupervisorConfig,
        page: PageHandle,
        host: Rc<dyn LibraryHost>,
        worker: Rc<dyn DataPrepWorker>,
    ) -> Self {
        let library = Rc::new(LibraryAvailabilityMonitor::new(
            host,
            &config.loader_src,
            config.library_poll_policy(),
        ));
        Self {
            registry: LoadingRegistry::new(config.data_wait_policy().deadline()),
            library,
            dispatcher: DataPrepDispatcher::new(worker),
            fallback: FallbackChartFactory::new(page.clone()),
            tables: DataTableVisibilityController::new(page.clone()),
            signals: SignalBus::new(config.signal_capacity),
            library_requested: false,
            work: HashMap::new(),
            page,
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    pub fn registry(&self) -> &LoadingRegistry {
        &self.registry
    }

    pub fn library(&self) -> Rc<LibraryAvailabilityMonitor> {
        self.library.clone()
    }

    pub fn dispatcher(&self) -> DataPrepDispatcher {
        self.dispatcher.clone()
    }

    pub fn tables(&self) -> &DataTableVisibilityController {
        &self.tables
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn state(&self, widget_id: &str) -> Option<WidgetState> {
        self.registry.state(widget_id)
    }

    pub fn all_resolved(&self) -> bool {
        self.registry.all_resolved()
    }

    pub fn attach_timeout(&mut self, widget_id: &str, handle: TimeoutHandle) {
        self.registry.attach_timeout(widget_id, handle);
    }

    pub fn track_work(&mut self, widget_id: &str, handle: AbortHandle) {
        if self.registry.is_resolved(widget_id) {
            handle.abort();
            return;
        }
        self.work.insert(widget_id.to_string(), handle);
    }

    fn apply(&mut self, widget_id: &str, event: WidgetEvent) -> bool {
        match self.registry.transition(widget_id, event) {
            Ok(changed) => changed.is_some(),
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Supervisor,
                    "invalid_transition",
                    obj(&[("widget_id", v_str(widget_id)), ("msg", v_str(&err.to_string()))]),
                );
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Passes
    // -------------------------------------------------------------------------

    /// One full, idempotent sweep over the page and the registry.
    pub fn run_pass(&mut self, reason: PassReason, now: Instant) -> Vec<Job> {
        self.pass(reason, now).0
    }

    /// Runs a pass and also returns the ids it registered.
    fn pass(&mut self, reason: PassReason, now: Instant) -> (Vec<Job>, Vec<String>) {
        let mut jobs = Vec::new();
        let registered = self.discover(now, &mut jobs);
        for widget_id in self.registry.overdue(now) {
            self.time_out(&widget_id);
        }
        self.library.refresh();
        self.advance_ready(&mut jobs);
        log_pass(
            &reason.label(),
            self.registry.len(),
            self.registry.terminal_count(),
            &self.registry.snapshot_hash(),
        );
        (jobs, registered)
    }

    fn discover(&mut self, now: Instant, jobs: &mut Vec<Job>) -> Vec<String> {
        let mut registered = Vec::new();
        for widget_id in self.page.visible_loading_indicators() {
            if self.registry.is_known(&widget_id) {
                continue;
            }
            let table = table_id(&widget_id);
            let data_table = self.page.contains(&table).then_some(table);
            let record = self.registry.register(&widget_id, now);
            record.data_table = data_table;
            let deadline = record.deadline;
            self.apply(&widget_id, WidgetEvent::Discovered);
            registered.push(widget_id.clone());
            jobs.push(Job::ArmTimeout { widget_id, deadline });
        }
        registered
    }

    fn advance_ready(&mut self, jobs: &mut Vec<Job>) {
        let waiting = self.registry.in_state(WidgetState::AwaitingLibrary);
        if waiting.is_empty() {
            return;
        }
        if !self.library.is_ready() {
            if !self.library_requested {
                self.library_requested = true;
                jobs.push(Job::EnsureLibrary);
            }
            return;
        }
        for widget_id in waiting {
            if self.apply(&widget_id, WidgetEvent::LibraryReady) {
                let seed = self.page.attr(&chart_id(&widget_id), "data-seed");
                let request = PrepareRequest::from_seed_attr(seed.as_deref());
                jobs.push(Job::Prepare { widget_id, request });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Async outcomes
    // -------------------------------------------------------------------------

    pub fn on_library(&mut self, status: LibraryStatus) -> Vec<Job> {
        log(
            Level::Info,
            Domain::Supervisor,
            "library_resolved",
            obj(&[("status", v_str(status.as_str()))]),
        );
        if !status.is_ready() {
            // let the next pass ask again
            self.library_requested = false;
        }
        let mut jobs = Vec::new();
        self.advance_ready(&mut jobs);
        jobs
    }

    pub fn on_data(&mut self, widget_id: &str, result: Result<ChartData, DataPrepError>) -> Vec<Job> {
        self.work.remove(widget_id);
        if self.registry.state(widget_id) != Some(WidgetState::AwaitingData) {
            log(
                Level::Debug,
                Domain::Supervisor,
                "late_data_ignored",
                obj(&[("widget_id", v_str(widget_id))]),
            );
            return Vec::new();
        }
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                self.fail(widget_id, err.into());
                return Vec::new();
            }
        };
        let Some(library) = self.library.chart_library() else {
            self.fail(widget_id, RenderError::Draw("no chart library installed".to_string()).into());
            return Vec::new();
        };
        let host = HostElement {
            page: self.page.clone(),
            id: chart_id(widget_id),
        };
        match library.construct(host, ChartOptions::from_data(&data)) {
            Ok(chart) => vec![Job::Render {
                widget_id: widget_id.to_string(),
                chart,
            }],
            Err(err) => {
                self.fail(widget_id, err.into());
                Vec::new()
            }
        }
    }

    pub fn on_render(&mut self, widget_id: &str, result: Result<Box<dyn ChartInstance>, RenderError>) {
        self.work.remove(widget_id);
        let awaiting = self.registry.state(widget_id) == Some(WidgetState::AwaitingData);
        match result {
            Err(err) if awaiting => self.fail(widget_id, err.into()),
            Err(_) => {}
            Ok(mut chart) if !awaiting => {
                // drew over a fallback that won the race; put the fallback back
                chart.destroy();
                if self.registry.state(widget_id) == Some(WidgetState::FallbackRendered) {
                    self.fallback.create_fallback(widget_id);
                }
            }
            Ok(chart) => self.complete_render(widget_id, chart),
        }
    }

    fn complete_render(&mut self, widget_id: &str, chart: Box<dyn ChartInstance>) {
        if !self.apply(widget_id, WidgetEvent::Rendered) {
            return;
        }
        let host = chart_id(widget_id);
        self.page.set_hidden(&loading_id(widget_id), true);
        self.page.remove_class(&host, PLACEHOLDER_CLASS);
        self.page.add_class(&host, LOADED_CLASS);
        self.page.set_attr(&host, "aria-busy", "false");

        let handle: ChartHandle = Rc::new(RefCell::new(chart));
        if let Some(record) = self.registry.get_mut(widget_id) {
            record.chart = Rc::downgrade(&handle);
        }
        self.page.attach_chart(&host, handle);

        let elapsed_ms = self
            .registry
            .get(widget_id)
            .map(|r| r.started_at.elapsed().as_millis() as u64)
            .unwrap_or_default();
        log(
            Level::Info,
            Domain::Supervisor,
            "rendered",
            obj(&[
                ("widget_id", v_str(widget_id)),
                ("elapsed_ms", json!(elapsed_ms)),
                ("library", v_str(self.library.status().as_str())),
            ]),
        );
        self.signals.emit(Signal::WidgetRendered {
            widget_id: widget_id.to_string(),
            fallback: false,
        });
    }

    /// Timer backstop. Firing for a resolved widget is a no-op.
    pub fn on_timeout(&mut self, widget_id: &str) {
        if self.registry.is_resolved(widget_id) {
            return;
        }
        self.time_out(widget_id);
    }

    /// Late content reported by the mutation watcher. Only ids this pass
    /// actually registered are announced.
    pub fn on_content_added(&mut self, reported: Vec<String>, now: Instant) -> Vec<Job> {
        let (jobs, widget_ids) = self.pass(PassReason::Mutation, now);
        if widget_ids.is_empty() {
            log(
                Level::Debug,
                Domain::Supervisor,
                "content_added_known",
                obj(&[("reported", json!(reported))]),
            );
        } else {
            self.signals.emit(Signal::NewWidgetsDiscovered { widget_ids });
        }
        jobs
    }

    // -------------------------------------------------------------------------
    // Degradation
    // -------------------------------------------------------------------------

    fn time_out(&mut self, widget_id: &str) {
        let Some(state) = self.registry.state(widget_id) else {
            return;
        };
        if state.is_terminal() {
            return;
        }
        let err = if state == WidgetState::AwaitingLibrary {
            self.library.last_error().unwrap_or(SupervisorError::LibraryTimeout {
                attempts: self.config.library_poll_attempts,
            })
        } else {
            SupervisorError::DataPrepTimeout {
                timeout_ms: self.config.widget_timeout_ms,
            }
        };
        self.registry.record_error(widget_id, err.kind());
        self.apply(widget_id, WidgetEvent::Deadline);
        self.degrade(widget_id, &err);
    }

    fn fail(&mut self, widget_id: &str, err: SupervisorError) {
        self.apply(widget_id, WidgetEvent::Failed(err.kind()));
        self.degrade(widget_id, &err);
    }

    /// Failed | TimedOut -> FallbackRendered, exactly once.
    fn degrade(&mut self, widget_id: &str, err: &SupervisorError) {
        if !matches!(
            self.registry.state(widget_id),
            Some(WidgetState::Failed) | Some(WidgetState::TimedOut)
        ) {
            return;
        }
        if let Some(handle) = self.work.remove(widget_id) {
            handle.abort();
        }
        self.fallback.create_fallback(widget_id);
        self.tables.reveal(widget_id);
        self.fallback.show_error_banner(widget_id, ERROR_BANNER_TEXT);
        self.apply(widget_id, WidgetEvent::FallbackApplied);

        log_fallback(widget_id, err.kind().as_str(), &err.to_string());
        self.signals.emit(Signal::WidgetRendered {
            widget_id: widget_id.to_string(),
            fallback: true,
        });
    }

    // -------------------------------------------------------------------------
    // Extras
    // -------------------------------------------------------------------------

    /// Push new series into a rendered chart. False if the chart is gone.
    pub fn refresh_series(&self, widget_id: &str, series: Vec<Series>) -> bool {
        let Some(chart) = self.registry.get(widget_id).and_then(|r| r.chart.upgrade()) else {
            return false;
        };
        let Ok(mut chart) = chart.try_borrow_mut() else {
            return false;
        };
        chart.update_series(series);
        true
    }

    pub fn summary(&self) -> Vec<WidgetSummary> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(&id))
            .map(|r| WidgetSummary {
                widget_id: r.id.clone(),
                state: r.state,
                error: r.last_error,
                table_visible: self.tables.is_visible(&r.id),
                elapsed_ms: r.started_at.elapsed().as_millis() as u64,
                history: r.history.clone(),
            })
            .collect()
    }

    /// Forget everything. In-flight work and timers are cancelled.
    pub fn reset(&mut self) {
        for (_, handle) in self.work.drain() {
            handle.abort();
        }
        self.registry.reset();
        self.library.reset();
        self.library_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ScriptedWorker, SimulatedLibraryHost};
    use crate::page::FALLBACK_CLASS;
    use crate::sim::REAL_CHART_CLASS;

    fn supervisor(host: SimulatedLibraryHost) -> (RenderSupervisor, PageHandle, Rc<SimulatedLibraryHost>) {
        let page = PageHandle::new();
        let host = Rc::new(host);
        let sup = RenderSupervisor::new(
            SupervisorConfig::default(),
            page.clone(),
            host.clone(),
            Rc::new(ScriptedWorker::new()),
        );
        (sup, page, host)
    }

    fn sample_data() -> ChartData {
        ChartData {
            series: vec![Series {
                name: "arr".into(),
                data: vec![1.0, 2.0],
            }],
            categories: vec!["a".into(), "b".into()],
            chart_type: None,
        }
    }

    #[test]
    fn test_first_pass_discovers_and_requests_library() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::absent());
        page.insert_widget("alpha");
        let now = Instant::now();

        let jobs = sup.run_pass(PassReason::Manual, now);
        assert!(matches!(jobs[0], Job::ArmTimeout { ref widget_id, .. } if widget_id == "alpha"));
        assert!(matches!(jobs[1], Job::EnsureLibrary));
        assert_eq!(sup.state("alpha"), Some(WidgetState::AwaitingLibrary));
        assert_eq!(
            sup.registry().get("alpha").unwrap().data_table.as_deref(),
            Some("alpha-data-table")
        );

        // second pass: nothing new to do
        assert!(sup.run_pass(PassReason::Manual, now).is_empty());
    }

    #[test]
    fn test_ready_library_dispatches_once() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("alpha");
        page.set_attr("alpha-chart", "data-seed", r#"{"metric":"arr"}"#);
        let now = Instant::now();

        let jobs = sup.run_pass(PassReason::Manual, now);
        // present library is picked up by refresh without an ensure round trip
        let prepares: Vec<_> = jobs
            .iter()
            .filter_map(|j| match j {
                Job::Prepare { widget_id, request } => Some((widget_id.clone(), request.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(prepares.len(), 1);
        assert_eq!(prepares[0].1.seed["metric"], "arr");
        assert_eq!(sup.state("alpha"), Some(WidgetState::AwaitingData));
        assert!(sup.run_pass(PassReason::Manual, now).is_empty());
    }

    #[test]
    fn test_data_rejection_degrades() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("gamma");
        sup.run_pass(PassReason::Manual, Instant::now());
        let mut signals = sup.subscribe();

        let jobs = sup.on_data("gamma", Err(DataPrepError::Collaborator("boom".into())));
        assert!(jobs.is_empty());
        assert_eq!(sup.state("gamma"), Some(WidgetState::FallbackRendered));
        assert_eq!(
            sup.registry().get("gamma").unwrap().last_error,
            Some(FailureKind::DataPrepFailure)
        );
        assert!(sup.tables().is_visible("gamma"));
        assert_eq!(
            signals.try_recv().unwrap(),
            Signal::WidgetRendered { widget_id: "gamma".into(), fallback: true }
        );
    }

    #[test]
    fn test_construct_failure_degrades() {
        let (mut sup, page, host) = supervisor(SimulatedLibraryHost::present());
        host.chart_library().fail_construct(true);
        page.insert_widget("alpha");
        sup.run_pass(PassReason::Manual, Instant::now());

        assert!(sup.on_data("alpha", Ok(sample_data())).is_empty());
        assert_eq!(sup.state("alpha"), Some(WidgetState::FallbackRendered));
        assert_eq!(
            sup.registry().get("alpha").unwrap().last_error,
            Some(FailureKind::RenderConstructionFailure)
        );
    }

    #[test]
    fn test_overdue_pass_falls_back_once() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("beta");
        page.insert_error_banner("beta");
        let t0 = Instant::now();
        sup.run_pass(PassReason::Manual, t0);

        let late = t0 + Duration::from_secs(10);
        sup.run_pass(PassReason::Manual, late);
        sup.run_pass(PassReason::Manual, late);
        sup.on_timeout("beta");

        assert_eq!(sup.state("beta"), Some(WidgetState::FallbackRendered));
        let fallbacks = page
            .children("beta-chart")
            .iter()
            .filter(|c| c.class == FALLBACK_CLASS)
            .count();
        assert_eq!(fallbacks, 1);
        assert_eq!(page.is_hidden("beta-error"), Some(false));
        assert_eq!(
            sup.registry().get("beta").unwrap().last_error,
            Some(FailureKind::DataPrepTimeout)
        );
    }

    #[test]
    fn test_late_data_after_fallback_ignored() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("beta");
        let t0 = Instant::now();
        sup.run_pass(PassReason::Manual, t0);
        sup.on_timeout("beta");
        assert!(sup.on_data("beta", Ok(sample_data())).is_empty());
        assert_eq!(sup.state("beta"), Some(WidgetState::FallbackRendered));
    }

    #[tokio::test]
    async fn test_render_then_refresh_series() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("alpha");
        sup.run_pass(PassReason::Manual, Instant::now());

        let mut jobs = sup.on_data("alpha", Ok(sample_data()));
        let Some(Job::Render { mut chart, .. }) = jobs.pop() else {
            panic!("expected a render job");
        };
        chart.render().await.unwrap();
        sup.on_render("alpha", Ok(chart));

        assert_eq!(sup.state("alpha"), Some(WidgetState::Rendered));
        assert_eq!(page.is_hidden("alpha-loading"), Some(true));
        assert!(!sup.tables().is_visible("alpha"));
        assert!(sup.refresh_series("alpha", vec![]));
        assert_eq!(page.children("alpha-chart")[0].text, "line x0");

        page.remove("alpha-chart");
        assert!(!sup.refresh_series("alpha", vec![]));
    }

    #[tokio::test]
    async fn test_render_after_fallback_restores_single_fallback() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("alpha");
        sup.run_pass(PassReason::Manual, Instant::now());

        let mut jobs = sup.on_data("alpha", Ok(sample_data()));
        let Some(Job::Render { mut chart, .. }) = jobs.pop() else {
            panic!("expected a render job");
        };
        chart.render().await.unwrap();
        sup.on_timeout("alpha");
        assert_eq!(sup.state("alpha"), Some(WidgetState::FallbackRendered));

        sup.on_render("alpha", Ok(chart));

        let children = page.children("alpha-chart");
        assert_eq!(children.iter().filter(|c| c.class == FALLBACK_CLASS).count(), 1);
        assert!(!children.iter().any(|c| c.class == REAL_CHART_CLASS));
        assert_eq!(sup.state("alpha"), Some(WidgetState::FallbackRendered));
    }

    #[tokio::test]
    async fn test_content_added_announces_only_new_widgets() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("alpha");
        let now = Instant::now();
        sup.run_pass(PassReason::Manual, now);

        let mut jobs = sup.on_data("alpha", Ok(sample_data()));
        let Some(Job::Render { mut chart, .. }) = jobs.pop() else {
            panic!("expected a render job");
        };
        chart.render().await.unwrap();
        sup.on_render("alpha", Ok(chart));
        assert_eq!(sup.state("alpha"), Some(WidgetState::Rendered));

        let mut signals = sup.subscribe();
        page.set_hidden("alpha-loading", false);
        assert!(sup.on_content_added(vec!["alpha".into()], now).is_empty());
        assert!(signals.try_recv().is_err());
        assert_eq!(sup.state("alpha"), Some(WidgetState::Rendered));

        page.insert_widget("delta");
        sup.on_content_added(vec!["alpha".into(), "delta".into()], now);
        assert_eq!(
            signals.try_recv().unwrap(),
            Signal::NewWidgetsDiscovered { widget_ids: vec!["delta".into()] }
        );
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut sup, page, _) = supervisor(SimulatedLibraryHost::present());
        page.insert_widget("alpha");
        sup.run_pass(PassReason::Manual, Instant::now());
        sup.reset();
        assert!(sup.registry().is_empty());
        assert_eq!(sup.library().status(), LibraryStatus::Unknown);
    }
}
