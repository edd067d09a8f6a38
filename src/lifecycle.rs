use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Idle,
    AwaitingLibrary,
    AwaitingData,
    Rendered,
    TimedOut,
    Failed,
    FallbackRendered,
}

impl WidgetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WidgetState::Rendered | WidgetState::FallbackRendered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetState::Idle => "idle",
            WidgetState::AwaitingLibrary => "awaiting_library",
            WidgetState::AwaitingData => "awaiting_data",
            WidgetState::Rendered => "rendered",
            WidgetState::TimedOut => "timed_out",
            WidgetState::Failed => "failed",
            WidgetState::FallbackRendered => "fallback_rendered",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// A loading indicator for the widget was seen.
    Discovered,
    /// The charting library (real or polyfill) is usable.
    LibraryReady,
    /// Data arrived and the chart rendered.
    Rendered,
    Failed(FailureKind),
    /// The per-widget deadline elapsed.
    Deadline,
    /// Fallback visual and data table are in place.
    FallbackApplied,
}

impl WidgetEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetEvent::Discovered => "discovered",
            WidgetEvent::LibraryReady => "library_ready",
            WidgetEvent::Rendered => "rendered",
            WidgetEvent::Failed(_) => "failed",
            WidgetEvent::Deadline => "deadline",
            WidgetEvent::FallbackApplied => "fallback_applied",
        }
    }
}

/// Next state for `event`. Terminal states absorb every event.
pub fn apply_event(state: WidgetState, event: &WidgetEvent) -> Result<WidgetState, TransitionError> {
    use WidgetEvent as E;
    use WidgetState as S;

    match (state, event) {
        (S::Rendered, _) | (S::FallbackRendered, _) => Ok(state),

        (S::Idle, E::Discovered) => Ok(S::AwaitingLibrary),
        (_, E::Discovered) => Ok(state),

        (S::AwaitingLibrary, E::LibraryReady) => Ok(S::AwaitingData),
        (S::AwaitingData, E::LibraryReady) => Ok(state),

        (S::AwaitingData, E::Rendered) => Ok(S::Rendered),
        (S::AwaitingData, E::Failed(_)) => Ok(S::Failed),

        (S::Idle, E::Deadline) | (S::AwaitingLibrary, E::Deadline) | (S::AwaitingData, E::Deadline) => {
            Ok(S::TimedOut)
        }
        (S::TimedOut, E::Deadline) | (S::Failed, E::Deadline) => Ok(state),

        (S::TimedOut, E::FallbackApplied) | (S::Failed, E::FallbackApplied) => Ok(S::FallbackRendered),

        (from, event) => Err(TransitionError {
            from,
            event: event.as_str(),
        }),
    }
}
