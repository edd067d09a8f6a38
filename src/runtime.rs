//! Drives a [`RenderSupervisor`] on the current thread.
//!
//! All in-flight work (library resolution, data preparation, chart renders,
//! per-widget deadlines and the scheduled passes) lives in one
//! `FuturesUnordered`. Each completion is turned into a [`Wake`] and handed
//! to the supervisor, whose synchronous handlers decide what to start next.
//! Nothing is spawned, so the supervisor never needs to be `Send`.

use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use tokio::time::{sleep_until, Instant};

use crate::dataprep::ChartData;
use crate::error::{DataPrepError, RenderError};
use crate::library::{ChartInstance, LibraryStatus};
use crate::logging::{log, obj, Domain, Level};
use crate::registry::TimeoutHandle;
use crate::supervisor::{Job, PassReason, RenderSupervisor};
use crate::watcher::{ContentSource, MutationWatcher};

/// Completion of one piece of in-flight work.
pub enum Wake {
    Pass(Duration),
    Library(LibraryStatus),
    Data {
        widget_id: String,
        result: Result<ChartData, DataPrepError>,
    },
    Render {
        widget_id: String,
        result: Result<Box<dyn ChartInstance>, RenderError>,
    },
    Timeout(String),
    /// An aborted timer or task.
    Cancelled,
}

enum Step {
    Wake(Wake),
    Batch(Option<Vec<String>>),
    Stop,
}

pub struct Runtime {
    supervisor: RenderSupervisor,
    watcher: Option<MutationWatcher>,
    inflight: FuturesUnordered<LocalBoxFuture<'static, Wake>>,
    passes_pending: usize,
}

async fn next_watch(watcher: &mut Option<MutationWatcher>) -> Option<Vec<String>> {
    match watcher {
        Some(w) => w.next_batch().await,
        None => std::future::pending().await,
    }
}

impl Runtime {
    pub fn new(supervisor: RenderSupervisor) -> Self {
        Self {
            supervisor,
            watcher: None,
            inflight: FuturesUnordered::new(),
            passes_pending: 0,
        }
    }

    /// Feed late content from `source` into the supervisor.
    pub fn with_watcher(mut self, source: &dyn ContentSource) -> Self {
        let debounce = self.supervisor.config().mutation_debounce();
        self.watcher = Some(MutationWatcher::new(source, debounce));
        self
    }

    pub fn supervisor(&self) -> &RenderSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut RenderSupervisor {
        &mut self.supervisor
    }

    pub fn into_supervisor(self) -> RenderSupervisor {
        self.supervisor
    }

    /// Schedule the pass sequence relative to now (page readiness).
    pub fn start(&mut self) {
        let origin = Instant::now();
        for offset in self.supervisor.config().pass_schedule() {
            self.passes_pending += 1;
            self.inflight.push(
                async move {
                    sleep_until(origin + offset).await;
                    Wake::Pass(offset)
                }
                .boxed_local(),
            );
        }
        log(
            Level::Info,
            Domain::System,
            "runtime_start",
            obj(&[("passes", json!(self.passes_pending))]),
        );
    }

    /// Run one pass immediately, outside the schedule.
    pub fn pass_now(&mut self) {
        let jobs = self.supervisor.run_pass(PassReason::Manual, Instant::now());
        self.execute(jobs);
    }

    /// Every scheduled pass has run and every known widget is terminal.
    pub fn is_settled(&self) -> bool {
        self.passes_pending == 0 && self.supervisor.all_resolved()
    }

    /// Process events until `deadline`.
    pub async fn run_until(&mut self, deadline: Instant) {
        while self.step(deadline).await {}
    }

    /// Process events until settled or `limit` elapses. Returns whether it settled.
    pub async fn run_until_settled(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_settled() {
                log(Level::Info, Domain::System, "settled", obj(&[]));
                return true;
            }
            if !self.step(deadline).await {
                return self.is_settled();
            }
        }
    }

    /// Wait for and handle one event. False once `deadline` is reached.
    async fn step(&mut self, deadline: Instant) -> bool {
        let has_inflight = !self.inflight.is_empty();
        let step = tokio::select! {
            Some(wake) = self.inflight.next(), if has_inflight => Step::Wake(wake),
            batch = next_watch(&mut self.watcher) => Step::Batch(batch),
            _ = sleep_until(deadline) => Step::Stop,
        };
        match step {
            Step::Wake(wake) => self.handle(wake),
            Step::Batch(Some(widget_ids)) => {
                let jobs = self.supervisor.on_content_added(widget_ids, Instant::now());
                self.execute(jobs);
            }
            Step::Batch(None) => self.watcher = None,
            Step::Stop => return false,
        }
        true
    }

    fn handle(&mut self, wake: Wake) {
        let jobs = match wake {
            Wake::Pass(offset) => {
                self.passes_pending = self.passes_pending.saturating_sub(1);
                self.supervisor.run_pass(PassReason::Scheduled(offset), Instant::now())
            }
            Wake::Library(status) => self.supervisor.on_library(status),
            Wake::Data { widget_id, result } => self.supervisor.on_data(&widget_id, result),
            Wake::Render { widget_id, result } => {
                self.supervisor.on_render(&widget_id, result);
                Vec::new()
            }
            Wake::Timeout(widget_id) => {
                self.supervisor.on_timeout(&widget_id);
                Vec::new()
            }
            Wake::Cancelled => Vec::new(),
        };
        self.execute(jobs);
    }

    fn execute(&mut self, jobs: Vec<Job>) {
        for job in jobs {
            match job {
                Job::EnsureLibrary => {
                    let monitor = self.supervisor.library();
                    self.inflight
                        .push(async move { Wake::Library(monitor.ensure_available().await) }.boxed_local());
                }
                Job::ArmTimeout { widget_id, deadline } => {
                    let (handle, registration) = AbortHandle::new_pair();
                    self.supervisor.attach_timeout(&widget_id, TimeoutHandle::new(handle));
                    let timer = Abortable::new(sleep_until(deadline), registration);
                    self.inflight.push(
                        async move {
                            match timer.await {
                                Ok(()) => Wake::Timeout(widget_id),
                                Err(_) => Wake::Cancelled,
                            }
                        }
                        .boxed_local(),
                    );
                }
                Job::Prepare { widget_id, request } => {
                    let dispatcher = self.supervisor.dispatcher();
                    let (handle, registration) = AbortHandle::new_pair();
                    self.supervisor.track_work(&widget_id, handle);
                    let id = widget_id.clone();
                    let work = Abortable::new(
                        async move { dispatcher.prepare(&id, request).await },
                        registration,
                    );
                    self.inflight.push(
                        async move {
                            match work.await {
                                Ok(result) => Wake::Data { widget_id, result },
                                Err(_) => Wake::Cancelled,
                            }
                        }
                        .boxed_local(),
                    );
                }
                Job::Render { widget_id, mut chart } => {
                    let (handle, registration) = AbortHandle::new_pair();
                    self.supervisor.track_work(&widget_id, handle);
                    let work = Abortable::new(
                        async move {
                            let drawn = chart.render().await;
                            drawn.map(|()| chart)
                        },
                        registration,
                    );
                    self.inflight.push(
                        async move {
                            match work.await {
                                Ok(result) => Wake::Render { widget_id, result },
                                Err(_) => Wake::Cancelled,
                            }
                        }
                        .boxed_local(),
                    );
                }
            }
        }
    }
}
