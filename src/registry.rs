//! Per-widget loading records.
//!
//! Records are created on first discovery and never removed during a page
//! session. Once a record is terminal every further operation on it is a
//! no-op, which is what makes repeated supervisor passes safe.

use std::collections::HashMap;
use std::rc::Weak;
use std::time::Duration;

use futures_util::future::AbortHandle;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::error::{FailureKind, TransitionError};
use crate::library::ChartCell;
use crate::lifecycle::{apply_event, WidgetEvent, WidgetState};
use crate::logging::{log, log_transition, obj, v_str, Domain, Level};

/// Cancellable handle to a scheduled timeout check.
#[derive(Debug, Clone)]
pub struct TimeoutHandle(AbortHandle);

impl TimeoutHandle {
    pub fn new(handle: AbortHandle) -> Self {
        Self(handle)
    }

    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}

#[derive(Debug, Clone)]
pub struct WidgetRecord {
    pub id: String,
    pub state: WidgetState,
    pub started_at: Instant,
    pub deadline: Instant,
    pub timeout: Option<TimeoutHandle>,
    /// Id of the paired data table, if the page had one at discovery.
    pub data_table: Option<String>,
    /// Non-owning; the host element keeps the chart alive.
    pub chart: Weak<ChartCell>,
    pub last_error: Option<FailureKind>,
    pub history: Vec<WidgetState>,
}

impl WidgetRecord {
    fn new(id: &str, now: Instant, timeout: Duration) -> Self {
        Self {
            id: id.to_string(),
            state: WidgetState::Idle,
            started_at: now,
            deadline: now + timeout,
            timeout: None,
            data_table: None,
            chart: Weak::new(),
            last_error: None,
            history: vec![WidgetState::Idle],
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.is_terminal()
    }

    fn cancel_timeout(&mut self) {
        if let Some(handle) = self.timeout.take() {
            handle.cancel();
        }
    }
}

#[derive(Debug)]
pub struct LoadingRegistry {
    records: HashMap<String, WidgetRecord>,
    timeout: Duration,
}

impl LoadingRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            records: HashMap::new(),
            timeout,
        }
    }

    /// Create-or-return. An existing record keeps its original start time.
    pub fn register(&mut self, id: &str, now: Instant) -> &mut WidgetRecord {
        let timeout = self.timeout;
        self.records.entry(id.to_string()).or_insert_with(|| {
            log(
                Level::Info,
                Domain::Registry,
                "register",
                obj(&[("widget_id", v_str(id)), ("timeout_ms", json!(timeout.as_millis() as u64))]),
            );
            WidgetRecord::new(id, now, timeout)
        })
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&WidgetRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut WidgetRecord> {
        self.records.get_mut(id)
    }

    pub fn state(&self, id: &str) -> Option<WidgetState> {
        self.records.get(id).map(|r| r.state)
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.records.get(id).map_or(false, WidgetRecord::is_resolved)
    }

    /// Apply one lifecycle event. Returns the (from, to) pair when the state
    /// changed. Reaching a terminal state cancels the pending timeout.
    pub fn transition(
        &mut self,
        id: &str,
        event: WidgetEvent,
    ) -> Result<Option<(WidgetState, WidgetState)>, TransitionError> {
        let Some(record) = self.records.get_mut(id) else {
            return Ok(None);
        };
        let from = record.state;
        let to = apply_event(from, &event)?;
        if let WidgetEvent::Failed(kind) = event {
            record.last_error.get_or_insert(kind);
        }
        if from == to {
            return Ok(None);
        }
        record.state = to;
        record.history.push(to);
        if to.is_terminal() {
            record.cancel_timeout();
        }
        log_transition(id, from.as_str(), to.as_str(), event.as_str());
        Ok(Some((from, to)))
    }

    /// Force a non-terminal record to its resolved state.
    ///
    /// `rendered` selects Rendered, otherwise the widget is walked through
    /// TimedOut/Failed into FallbackRendered. Returns false if it was already
    /// terminal or unknown.
    pub fn mark_resolved(&mut self, id: &str, rendered: bool) -> bool {
        let Some(state) = self.state(id) else {
            return false;
        };
        if state.is_terminal() {
            return false;
        }
        let steps: &[WidgetEvent] = match (rendered, state) {
            (true, WidgetState::AwaitingData) => &[WidgetEvent::Rendered],
            (true, WidgetState::Idle) => &[WidgetEvent::Discovered, WidgetEvent::LibraryReady, WidgetEvent::Rendered],
            (true, WidgetState::AwaitingLibrary) => &[WidgetEvent::LibraryReady, WidgetEvent::Rendered],
            _ => &[WidgetEvent::Deadline, WidgetEvent::FallbackApplied],
        };
        for step in steps {
            if self.transition(id, step.clone()).is_err() {
                break;
            }
        }
        self.is_resolved(id)
    }

    pub fn record_error(&mut self, id: &str, kind: FailureKind) {
        if let Some(record) = self.records.get_mut(id) {
            record.last_error.get_or_insert(kind);
        }
    }

    /// Store the widget's timeout handle. A resolved widget cancels it on the spot.
    pub fn attach_timeout(&mut self, id: &str, handle: TimeoutHandle) {
        match self.records.get_mut(id) {
            Some(record) if !record.is_resolved() => {
                record.cancel_timeout();
                record.timeout = Some(handle);
            }
            _ => handle.cancel(),
        }
    }

    /// Non-terminal widgets whose deadline has passed.
    pub fn overdue(&self, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .values()
            .filter(|r| !r.is_resolved() && r.deadline <= now)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn in_state(&self, state: WidgetState) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn terminal_count(&self) -> usize {
        self.records.values().filter(|r| r.is_resolved()).count()
    }

    pub fn all_resolved(&self) -> bool {
        self.records.values().all(WidgetRecord::is_resolved)
    }

    /// SHA-256 over sorted (id, state) pairs.
    pub fn snapshot_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for id in self.ids() {
            if let Some(record) = self.records.get(&id) {
                hasher.update(id.as_bytes());
                hasher.update(b"=");
                hasher.update(record.state.as_str().as_bytes());
                hasher.update(b";");
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Drop every record, cancelling pending timeouts first.
    pub fn reset(&mut self) {
        for record in self.records.values_mut() {
            record.cancel_timeout();
        }
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LoadingRegistry {
        LoadingRegistry::new(Duration::from_secs(10))
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = registry();
        let t0 = Instant::now();
        let started = reg.register("alpha", t0).started_at;
        let again = reg.register("alpha", t0 + Duration::from_secs(3)).started_at;
        assert_eq!(started, again);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("alpha").unwrap().deadline, t0 + Duration::from_secs(10));
    }

    #[test]
    fn test_terminal_cancels_timeout() {
        let mut reg = registry();
        reg.register("alpha", Instant::now());
        let (handle, _registration) = AbortHandle::new_pair();
        reg.attach_timeout("alpha", TimeoutHandle::new(handle.clone()));

        reg.transition("alpha", WidgetEvent::Discovered).unwrap();
        reg.transition("alpha", WidgetEvent::LibraryReady).unwrap();
        assert!(!handle.is_aborted());
        reg.transition("alpha", WidgetEvent::Rendered).unwrap();
        assert!(handle.is_aborted());
        assert!(reg.is_resolved("alpha"));
        assert!(reg.get("alpha").unwrap().timeout.is_none());
    }

    #[test]
    fn test_attach_after_resolution_cancels_immediately() {
        let mut reg = registry();
        reg.register("alpha", Instant::now());
        assert!(reg.mark_resolved("alpha", true));
        let (handle, _registration) = AbortHandle::new_pair();
        reg.attach_timeout("alpha", TimeoutHandle::new(handle.clone()));
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_mark_resolved_at_most_once() {
        let mut reg = registry();
        reg.register("beta", Instant::now());
        reg.transition("beta", WidgetEvent::Discovered).unwrap();
        assert!(reg.mark_resolved("beta", false));
        assert!(!reg.mark_resolved("beta", false));
        assert!(!reg.mark_resolved("beta", true));
        assert_eq!(reg.state("beta"), Some(WidgetState::FallbackRendered));
        assert_eq!(
            reg.get("beta").unwrap().history,
            vec![
                WidgetState::Idle,
                WidgetState::AwaitingLibrary,
                WidgetState::TimedOut,
                WidgetState::FallbackRendered
            ]
        );
        assert!(!reg.mark_resolved("ghost", true));
    }

    #[test]
    fn test_overdue_skips_terminal() {
        let mut reg = registry();
        let t0 = Instant::now();
        reg.register("a", t0);
        reg.register("b", t0);
        reg.register("c", t0 + Duration::from_secs(5));
        reg.mark_resolved("b", true);
        assert_eq!(reg.overdue(t0 + Duration::from_secs(10)), vec!["a".to_string()]);
        assert_eq!(
            reg.overdue(t0 + Duration::from_secs(15)),
            vec!["a".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_failed_records_first_error_only() {
        let mut reg = registry();
        reg.register("a", Instant::now());
        reg.transition("a", WidgetEvent::Discovered).unwrap();
        reg.transition("a", WidgetEvent::LibraryReady).unwrap();
        reg.transition("a", WidgetEvent::Failed(FailureKind::DataPrepFailure)).unwrap();
        reg.record_error("a", FailureKind::DataPrepTimeout);
        assert_eq!(reg.get("a").unwrap().last_error, Some(FailureKind::DataPrepFailure));
    }

    #[test]
    fn test_snapshot_hash_tracks_state_not_order() {
        let t0 = Instant::now();
        let mut a = registry();
        a.register("x", t0);
        a.register("y", t0);
        let mut b = registry();
        b.register("y", t0);
        b.register("x", t0);
        assert_eq!(a.snapshot_hash(), b.snapshot_hash());

        b.transition("x", WidgetEvent::Discovered).unwrap();
        assert_ne!(a.snapshot_hash(), b.snapshot_hash());
        assert_eq!(a.snapshot_hash().len(), 64);
    }

    #[test]
    fn test_reset_cancels_and_clears() {
        let mut reg = registry();
        reg.register("a", Instant::now());
        let (handle, _registration) = AbortHandle::new_pair();
        reg.attach_timeout("a", TimeoutHandle::new(handle.clone()));
        reg.reset();
        assert!(handle.is_aborted());
        assert!(reg.is_empty());
    }
}
