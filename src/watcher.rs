//! Late content discovery.
//!
//! The watcher consumes raw [`MutationRecord`]s from any [`ContentSource`],
//! keeps only those that introduce a loading indicator or chart placeholder,
//! and hands the supervisor one debounced batch of widget ids at a time.
//! Attribute churn (including the supervisor's own writes) is ignored, so a
//! pass can never re-trigger itself.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, Instant};

use crate::logging::{log, obj, Domain, Level};
use crate::page::{widget_id_of, MutationRecord, PageHandle, LOADING_CLASS, PLACEHOLDER_CLASS};

/// Anything that can report content added to the visual tree.
pub trait ContentSource {
    fn on_content_added(&self) -> UnboundedReceiver<MutationRecord>;
}

impl ContentSource for PageHandle {
    fn on_content_added(&self) -> UnboundedReceiver<MutationRecord> {
        self.observe()
    }
}

/// Hand-fed content events, for harnesses without a real tree.
#[derive(Debug)]
pub struct SyntheticContent {
    tx: UnboundedSender<MutationRecord>,
    rx: RefCell<Option<UnboundedReceiver<MutationRecord>>>,
}

impl Default for SyntheticContent {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticContent {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tx,
            rx: RefCell::new(Some(rx)),
        }
    }

    pub fn push(&self, record: MutationRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    pub fn added(&self, element_id: &str, class: &str) -> bool {
        self.push(MutationRecord::ElementAdded {
            id: element_id.to_string(),
            classes: vec![class.to_string()],
        })
    }
}

impl ContentSource for SyntheticContent {
    /// Single consumer; later calls get a closed stream.
    fn on_content_added(&self) -> UnboundedReceiver<MutationRecord> {
        self.rx.borrow_mut().take().unwrap_or_else(|| unbounded_channel().1)
    }
}

fn is_widget_class(class: &str) -> bool {
    class == LOADING_CLASS || class == PLACEHOLDER_CLASS
}

/// Widget id a record introduces, if it introduces one at all.
pub fn relevant_widget(record: &MutationRecord) -> Option<String> {
    match record {
        MutationRecord::ElementAdded { id, classes } if classes.iter().any(|c| is_widget_class(c)) => {
            widget_id_of(id).map(str::to_string)
        }
        MutationRecord::Attribute { target, name, value } if target.ends_with("-loading") => {
            let shown = match (name.as_str(), value.as_deref()) {
                ("hidden", Some("false")) => true,
                ("class", Some(v)) => v.split_whitespace().any(|c| c == LOADING_CLASS),
                _ => false,
            };
            if shown {
                widget_id_of(target).map(str::to_string)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[derive(Debug)]
pub struct MutationWatcher {
    rx: UnboundedReceiver<MutationRecord>,
    debounce: Duration,
    pending: BTreeSet<String>,
    quiet_at: Option<Instant>,
    closed: bool,
}

impl MutationWatcher {
    pub fn new(source: &dyn ContentSource, debounce: Duration) -> Self {
        Self {
            rx: source.on_content_added(),
            debounce,
            pending: BTreeSet::new(),
            quiet_at: None,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    fn absorb(&mut self, record: MutationRecord) {
        if let Some(widget_id) = relevant_widget(&record) {
            self.pending.insert(widget_id);
            self.quiet_at = Some(Instant::now() + self.debounce);
        }
    }

    fn take(&mut self) -> Vec<String> {
        self.quiet_at = None;
        let batch: Vec<String> = std::mem::take(&mut self.pending).into_iter().collect();
        log(
            Level::Debug,
            Domain::Watcher,
            "batch",
            obj(&[("widget_ids", json!(batch))]),
        );
        batch
    }

    /// Next debounced batch. `None` once the source is closed and drained.
    ///
    /// Cancel-safe: pending ids and the quiet deadline live on `self`, so
    /// dropping the future mid-debounce loses nothing.
    pub async fn next_batch(&mut self) -> Option<Vec<String>> {
        loop {
            if self.pending.is_empty() {
                if self.closed {
                    return None;
                }
                match self.rx.recv().await {
                    Some(record) => self.absorb(record),
                    None => self.closed = true,
                }
                continue;
            }
            if self.closed {
                return Some(self.take());
            }
            let quiet_at = self.quiet_at.unwrap_or_else(Instant::now);
            tokio::select! {
                record = self.rx.recv() => match record {
                    Some(record) => self.absorb(record),
                    None => self.closed = true,
                },
                _ = sleep_until(quiet_at) => return Some(self.take()),
            }
        }
    }
}
