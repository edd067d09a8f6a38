//! Notifications for layers that sit beside the supervisor (accessibility
//! annotation, analytics) and must not reach into its state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// The widget reached a terminal state; `fallback` marks the degraded path.
    WidgetRendered { widget_id: String, fallback: bool },
    NewWidgetsDiscovered { widget_ids: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; having no subscribers is fine.
    pub fn emit(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}
