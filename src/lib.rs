//! chartguard: keeps chart widgets on a page from hanging in a loading state.
//!
//! Every widget with a visible loading indicator ends up either rendered by
//! the charting library or replaced by an inert fallback with its data
//! table revealed, within a bounded time and exactly once.

pub mod config;
pub mod dataprep;
pub mod datatable;
pub mod error;
pub mod fallback;
pub mod library;
pub mod lifecycle;
pub mod logging;
pub mod page;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod signals;
pub mod sim;
pub mod supervisor;
pub mod watcher;

pub use config::SupervisorConfig;
pub use lifecycle::WidgetState;
pub use page::PageHandle;
pub use runtime::Runtime;
pub use supervisor::RenderSupervisor;
