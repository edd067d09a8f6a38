//! Charting library surface and availability.
//!
//! The rest of the crate only talks to [`ChartLibrary`] / [`ChartInstance`].
//! Whether those are backed by the real library or by the
//! [`polyfill::PolyfillLibrary`] is decided here, once per page session.
//!
//! ```text
//! Unknown ──► Loading ──► Available
//!                │            ▲
//!                ▼            │ (real library arrives late)
//!             Failed ──► PolyfillInstalled
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;

use crate::dataprep::{ChartData, Series};
use crate::error::{LoaderError, RenderError, SupervisorError};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::page::PageHandle;
use crate::retry::{poll_until, RetryPolicy};

pub mod polyfill;

pub use polyfill::PolyfillLibrary;

pub type ChartCell = RefCell<Box<dyn ChartInstance>>;
pub type ChartHandle = Rc<ChartCell>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryStatus {
    Unknown,
    Loading,
    Available,
    PolyfillInstalled,
    Failed,
}

impl LibraryStatus {
    /// Available and PolyfillInstalled both let widgets proceed.
    pub fn is_ready(&self) -> bool {
        matches!(self, LibraryStatus::Available | LibraryStatus::PolyfillInstalled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Unknown => "unknown",
            LibraryStatus::Loading => "loading",
            LibraryStatus::Available => "available",
            LibraryStatus::PolyfillInstalled => "polyfill_installed",
            LibraryStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LibraryStatus::Unknown => 0,
            LibraryStatus::Loading => 1,
            LibraryStatus::Failed => 2,
            LibraryStatus::PolyfillInstalled => 3,
            LibraryStatus::Available => 4,
        }
    }

    /// Transitions only move forward. Available is final.
    pub fn can_advance_to(&self, next: LibraryStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Options handed to a chart constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub chart_type: String,
    pub series: Vec<Series>,
    pub categories: Vec<String>,
    pub animate: bool,
}

impl ChartOptions {
    pub fn from_data(data: &ChartData) -> Self {
        Self {
            chart_type: data.chart_type.clone().unwrap_or_else(|| "line".to_string()),
            series: data.series.clone(),
            categories: data.categories.clone(),
            animate: true,
        }
    }
}

/// The element a chart draws into.
#[derive(Debug, Clone)]
pub struct HostElement {
    pub page: PageHandle,
    pub id: String,
}

pub trait ChartLibrary {
    fn name(&self) -> &str;

    fn construct(&self, host: HostElement, options: ChartOptions) -> Result<Box<dyn ChartInstance>, RenderError>;
}

#[async_trait(?Send)]
pub trait ChartInstance {
    async fn render(&mut self) -> Result<(), RenderError>;
    fn update_options(&mut self, options: ChartOptions, redraw: bool, animate: bool);
    fn update_series(&mut self, series: Vec<Series>);
    fn destroy(&mut self);
}

/// The page environment the library would be loaded into.
#[async_trait(?Send)]
pub trait LibraryHost {
    /// The real library, once its global has initialised.
    fn library(&self) -> Option<Rc<dyn ChartLibrary>>;
    fn loader_present(&self, src: &str) -> bool;
    /// Inject a loader script; resolves on its load or error callback.
    async fn inject_loader(&self, src: &str) -> Result<(), LoaderError>;
}

pub struct LibraryAvailabilityMonitor {
    host: Rc<dyn LibraryHost>,
    loader_src: String,
    poll: RetryPolicy,
    status: Cell<LibraryStatus>,
    polyfill: RefCell<Option<Rc<PolyfillLibrary>>>,
    last_error: RefCell<Option<SupervisorError>>,
}

impl std::fmt::Debug for LibraryAvailabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryAvailabilityMonitor")
            .field("loader_src", &self.loader_src)
            .field("status", &self.status.get())
            .finish()
    }
}

impl LibraryAvailabilityMonitor {
    pub fn new(host: Rc<dyn LibraryHost>, loader_src: &str, poll: RetryPolicy) -> Self {
        Self {
            host,
            loader_src: loader_src.to_string(),
            poll,
            status: Cell::new(LibraryStatus::Unknown),
            polyfill: RefCell::new(None),
            last_error: RefCell::new(None),
        }
    }

    pub fn status(&self) -> LibraryStatus {
        self.status.get()
    }

    pub fn is_ready(&self) -> bool {
        self.status.get().is_ready()
    }

    pub fn last_error(&self) -> Option<SupervisorError> {
        self.last_error.borrow().clone()
    }

    fn advance(&self, next: LibraryStatus) -> LibraryStatus {
        let current = self.status.get();
        if current.can_advance_to(next) {
            self.status.set(next);
            log(
                Level::Info,
                Domain::Library,
                "status",
                obj(&[("from", v_str(current.as_str())), ("to", v_str(next.as_str()))]),
            );
        }
        self.status.get()
    }

    fn fail(&self, err: SupervisorError) {
        log(
            Level::Warn,
            Domain::Library,
            err.kind().as_str(),
            obj(&[("msg", v_str(&err.to_string())), ("src", v_str(&self.loader_src))]),
        );
        self.last_error.borrow_mut().get_or_insert(err);
    }

    /// Resolve to a ready status. Never fails: every failure path ends in the polyfill.
    pub async fn ensure_available(&self) -> LibraryStatus {
        let current = self.refresh();
        if current.is_ready() {
            return current;
        }
        self.advance(LibraryStatus::Loading);

        if !self.host.loader_present(&self.loader_src) {
            log(
                Level::Info,
                Domain::Library,
                "inject_loader",
                obj(&[("src", v_str(&self.loader_src))]),
            );
            // a loader whose callbacks never fire gets the same budget as the poll
            let injected = timeout(self.poll.deadline(), self.host.inject_loader(&self.loader_src)).await;
            match injected {
                Err(_elapsed) => {
                    self.advance(LibraryStatus::Failed);
                    self.fail(SupervisorError::LibraryTimeout {
                        attempts: self.poll.max_attempts,
                    });
                    return self.install_polyfill();
                }
                Ok(Err(err)) => {
                    self.fail(SupervisorError::LibraryLoadFailure(err.to_string()));
                    return self.install_polyfill();
                }
                Ok(Ok(())) => {
                    if self.host.library().is_some() {
                        return self.advance(LibraryStatus::Available);
                    }
                }
            }
        }

        let host = self.host.clone();
        match poll_until(&self.poll, "library", || host.library().is_some()).await {
            Ok(attempt) => {
                log(
                    Level::Debug,
                    Domain::Library,
                    "poll_ready",
                    obj(&[("attempt", json!(attempt))]),
                );
                self.advance(LibraryStatus::Available)
            }
            Err(exhausted) => {
                self.advance(LibraryStatus::Failed);
                self.fail(SupervisorError::LibraryTimeout { attempts: exhausted.attempts });
                self.install_polyfill()
            }
        }
    }

    /// Install the stand-in library. A real library that already arrived wins.
    pub fn install_polyfill(&self) -> LibraryStatus {
        if self.status.get() == LibraryStatus::Available {
            return LibraryStatus::Available;
        }
        self.polyfill
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(PolyfillLibrary::new()));
        self.advance(LibraryStatus::PolyfillInstalled)
    }

    /// Pick up a real library that initialised after the polyfill went in.
    /// Charts already drawn by the polyfill are left alone.
    pub fn refresh(&self) -> LibraryStatus {
        if self.status.get() != LibraryStatus::Available && self.host.library().is_some() {
            return self.advance(LibraryStatus::Available);
        }
        self.status.get()
    }

    /// Library to construct new charts with: the real one when available.
    pub fn chart_library(&self) -> Option<Rc<dyn ChartLibrary>> {
        match self.refresh() {
            LibraryStatus::Available => self.host.library(),
            LibraryStatus::PolyfillInstalled => self
                .polyfill
                .borrow()
                .as_ref()
                .map(|p| p.clone() as Rc<dyn ChartLibrary>),
            _ => None,
        }
    }

    pub fn reset(&self) {
        self.status.set(LibraryStatus::Unknown);
        self.polyfill.borrow_mut().take();
        self.last_error.borrow_mut().take();
    }
}
