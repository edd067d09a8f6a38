//! Error taxonomy.
//!
//! None of these reach the end user. The supervisor converts every
//! [`SupervisorError`] into the `FallbackRendered` terminal state and logs
//! the [`FailureKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::WidgetState;

/// Tag stored on a widget record once something went wrong for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LibraryLoadFailure,
    LibraryTimeout,
    DataPrepFailure,
    DataPrepTimeout,
    RenderConstructionFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::LibraryLoadFailure => "library_load_failure",
            FailureKind::LibraryTimeout => "library_timeout",
            FailureKind::DataPrepFailure => "data_prep_failure",
            FailureKind::DataPrepTimeout => "data_prep_timeout",
            FailureKind::RenderConstructionFailure => "render_construction_failure",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SupervisorError {
    #[error("chart library loader failed: {0}")]
    LibraryLoadFailure(String),
    #[error("chart library did not initialise after {attempts} polls")]
    LibraryTimeout { attempts: u32 },
    #[error("data preparation failed: {0}")]
    DataPrepFailure(#[from] DataPrepError),
    #[error("no data before the {timeout_ms}ms deadline")]
    DataPrepTimeout { timeout_ms: u64 },
    #[error("chart construction failed: {0}")]
    RenderConstructionFailure(#[from] RenderError),
}

impl SupervisorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SupervisorError::LibraryLoadFailure(_) => FailureKind::LibraryLoadFailure,
            SupervisorError::LibraryTimeout { .. } => FailureKind::LibraryTimeout,
            SupervisorError::DataPrepFailure(_) => FailureKind::DataPrepFailure,
            SupervisorError::DataPrepTimeout { .. } => FailureKind::DataPrepTimeout,
            SupervisorError::RenderConstructionFailure(_) => {
                FailureKind::RenderConstructionFailure
            }
        }
    }
}

/// Failures at the data collaborator boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataPrepError {
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unexpected action '{0}' in response")]
    UnexpectedAction(String),
    #[error("response for '{got}' delivered to '{expected}'")]
    WidgetMismatch { expected: String, got: String },
}

/// Failures constructing or drawing a chart.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("host element '{0}' not found")]
    MissingHost(String),
    #[error("invalid chart options: {0}")]
    InvalidOptions(String),
    #[error("render failed: {0}")]
    Draw(String),
}

/// Failure reported by the loader script's error callback.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("loader '{src}' failed: {reason}")]
pub struct LoaderError {
    pub src: String,
    pub reason: String,
}

/// Event that has no edge out of the widget's current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition: {event} on {}", .from.as_str())]
pub struct TransitionError {
    pub from: WidgetState,
    pub event: &'static str,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("widget timeout must be greater than zero")]
    ZeroTimeout,
    #[error("pass schedule must contain at least one offset")]
    EmptySchedule,
    #[error("library poll attempts must be greater than zero")]
    ZeroPollAttempts,
    #[error("signal capacity must be greater than zero")]
    ZeroSignalCapacity,
    #[error("loader src '{src}' is not a valid url: {source}")]
    LoaderSrc {
        src: String,
        #[source]
        source: url::ParseError,
    },
}
