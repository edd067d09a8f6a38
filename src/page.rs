//! Headless model of the visual tree the supervisor reads and writes.
//!
//! Each widget `w` is a unit of related elements:
//!
//! ```text
//! w-loading          loading indicator (class chart-loading)
//! w-chart            chart host        (class chart-placeholder)
//! w-data-table       tabular fallback  (hidden until revealed)
//! w-table-toggle     toggle control for the table
//! w-error            optional error banner
//! ```
//!
//! Every mutation is broadcast to observers as a [`MutationRecord`], the same
//! way a browser mutation observer would see it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::library::ChartHandle;

pub const LOADING_CLASS: &str = "chart-loading";
pub const PLACEHOLDER_CLASS: &str = "chart-placeholder";
pub const LOADED_CLASS: &str = "chart-loaded";
pub const FALLBACK_CLASS: &str = "chart-fallback";

pub const SHOW_TABLE_LABEL: &str = "Show data table";
pub const HIDE_TABLE_LABEL: &str = "Hide data table";

pub fn loading_id(widget_id: &str) -> String {
    format!("{}-loading", widget_id)
}

pub fn chart_id(widget_id: &str) -> String {
    format!("{}-chart", widget_id)
}

pub fn table_id(widget_id: &str) -> String {
    format!("{}-data-table", widget_id)
}

pub fn toggle_id(widget_id: &str) -> String {
    format!("{}-table-toggle", widget_id)
}

pub fn error_id(widget_id: &str) -> String {
    format!("{}-error", widget_id)
}

/// Inverse of the id patterns above for the indicator and host elements.
pub fn widget_id_of(element_id: &str) -> Option<&str> {
    element_id
        .strip_suffix("-loading")
        .or_else(|| element_id.strip_suffix("-chart"))
        .filter(|w| !w.is_empty())
}

/// Leaf content inside an element (an svg frame, a caption, a table row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub tag: String,
    pub class: String,
    pub text: String,
}

impl Fragment {
    pub fn new(tag: &str, class: &str, text: &str) -> Self {
        Self {
            tag: tag.to_string(),
            class: class.to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub id: String,
    pub classes: BTreeSet<String>,
    pub hidden: bool,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<Fragment>,
}

impl Element {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.insert(class.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn class_attr(&self) -> String {
        self.classes.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    ElementAdded { id: String, classes: Vec<String> },
    ElementRemoved { id: String },
    ChildrenChanged { target: String },
    Attribute { target: String, name: String, value: Option<String> },
}

#[derive(Default)]
struct VisualTree {
    elements: BTreeMap<String, Element>,
    charts: HashMap<String, ChartHandle>,
    observers: Vec<UnboundedSender<MutationRecord>>,
}

impl VisualTree {
    fn notify(&mut self, record: MutationRecord) {
        self.observers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    fn attribute(&mut self, target: &str, name: &str, value: Option<String>) {
        self.notify(MutationRecord::Attribute {
            target: target.to_string(),
            name: name.to_string(),
            value,
        });
    }
}

/// Shared handle to the page. Borrows are never held across an await.
#[derive(Clone, Default)]
pub struct PageHandle {
    tree: Rc<RefCell<VisualTree>>,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("PageHandle")
            .field("elements", &tree.elements.len())
            .field("charts", &tree.charts.len())
            .finish()
    }
}

impl PageHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every subsequent mutation.
    pub fn observe(&self) -> UnboundedReceiver<MutationRecord> {
        let (tx, rx) = unbounded_channel();
        self.tree.borrow_mut().observers.push(tx);
        rx
    }

    pub fn insert(&self, element: Element) {
        let mut tree = self.tree.borrow_mut();
        let record = MutationRecord::ElementAdded {
            id: element.id.clone(),
            classes: element.classes.iter().cloned().collect(),
        };
        tree.elements.insert(element.id.clone(), element);
        tree.notify(record);
    }

    /// Insert the full element set for one widget, still loading.
    pub fn insert_widget(&self, widget_id: &str) {
        self.insert(
            Element::new(&loading_id(widget_id))
                .with_class(LOADING_CLASS)
                .with_attr("role", "status")
                .with_text("Loading chart..."),
        );
        self.insert(
            Element::new(&chart_id(widget_id))
                .with_class(PLACEHOLDER_CLASS)
                .with_attr("aria-busy", "true"),
        );
        self.insert(
            Element::new(&table_id(widget_id))
                .with_class("chart-data-table")
                .with_attr("aria-hidden", "true")
                .hidden(true),
        );
        self.insert(
            Element::new(&toggle_id(widget_id))
                .with_class("chart-table-toggle")
                .with_attr("aria-expanded", "false")
                .with_attr("aria-controls", &table_id(widget_id))
                .with_text(SHOW_TABLE_LABEL),
        );
    }

    pub fn insert_error_banner(&self, widget_id: &str) {
        self.insert(
            Element::new(&error_id(widget_id))
                .with_class("chart-error")
                .with_attr("role", "alert")
                .hidden(true),
        );
    }

    pub fn remove(&self, id: &str) -> Option<Element> {
        let mut tree = self.tree.borrow_mut();
        tree.charts.remove(id);
        let removed = tree.elements.remove(id);
        if removed.is_some() {
            tree.notify(MutationRecord::ElementRemoved { id: id.to_string() });
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tree.borrow().elements.contains_key(id)
    }

    pub fn element(&self, id: &str) -> Option<Element> {
        self.tree.borrow().elements.get(id).cloned()
    }

    pub fn attr(&self, id: &str, name: &str) -> Option<String> {
        self.tree
            .borrow()
            .elements
            .get(id)
            .and_then(|e| e.attr(name).map(str::to_string))
    }

    pub fn is_hidden(&self, id: &str) -> Option<bool> {
        self.tree.borrow().elements.get(id).map(|e| e.hidden)
    }

    pub fn has_class(&self, id: &str, class: &str) -> bool {
        self.tree
            .borrow()
            .elements
            .get(id)
            .map_or(false, |e| e.has_class(class))
    }

    pub fn children(&self, id: &str) -> Vec<Fragment> {
        self.tree
            .borrow()
            .elements
            .get(id)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    /// Returns true when the flag actually changed.
    pub fn set_hidden(&self, id: &str, hidden: bool) -> bool {
        let mut tree = self.tree.borrow_mut();
        let changed = match tree.elements.get_mut(id) {
            Some(e) if e.hidden != hidden => {
                e.hidden = hidden;
                true
            }
            _ => false,
        };
        if changed {
            tree.attribute(id, "hidden", Some(hidden.to_string()));
        }
        changed
    }

    pub fn set_attr(&self, id: &str, name: &str, value: &str) -> bool {
        let mut tree = self.tree.borrow_mut();
        let changed = match tree.elements.get_mut(id) {
            Some(e) if e.attr(name) != Some(value) => {
                e.attrs.insert(name.to_string(), value.to_string());
                true
            }
            _ => false,
        };
        if changed {
            tree.attribute(id, name, Some(value.to_string()));
        }
        changed
    }

    pub fn add_class(&self, id: &str, class: &str) -> bool {
        self.update_classes(id, |classes| classes.insert(class.to_string()))
    }

    pub fn remove_class(&self, id: &str, class: &str) -> bool {
        self.update_classes(id, |classes| classes.remove(class))
    }

    fn update_classes<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        let mut tree = self.tree.borrow_mut();
        let value = match tree.elements.get_mut(id) {
            Some(e) => {
                if f(&mut e.classes) {
                    Some(e.class_attr())
                } else {
                    None
                }
            }
            None => None,
        };
        match value {
            Some(v) => {
                tree.attribute(id, "class", Some(v));
                true
            }
            None => false,
        }
    }

    pub fn set_text(&self, id: &str, text: &str) -> bool {
        let mut tree = self.tree.borrow_mut();
        let changed = match tree.elements.get_mut(id) {
            Some(e) if e.text != text => {
                e.text = text.to_string();
                true
            }
            _ => false,
        };
        if changed {
            tree.notify(MutationRecord::ChildrenChanged { target: id.to_string() });
        }
        changed
    }

    pub fn replace_children(&self, id: &str, children: Vec<Fragment>) -> bool {
        let mut tree = self.tree.borrow_mut();
        let found = match tree.elements.get_mut(id) {
            Some(e) => {
                e.children = children;
                true
            }
            None => false,
        };
        if found {
            tree.notify(MutationRecord::ChildrenChanged { target: id.to_string() });
        }
        found
    }

    /// Ids of widgets whose loading indicator is currently shown.
    pub fn visible_loading_indicators(&self) -> Vec<String> {
        self.tree
            .borrow()
            .elements
            .values()
            .filter(|e| !e.hidden && e.has_class(LOADING_CLASS))
            .filter_map(|e| e.id.strip_suffix("-loading"))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The host element keeps the chart alive; dropping the host drops it.
    pub fn attach_chart(&self, host_id: &str, chart: ChartHandle) {
        self.tree.borrow_mut().charts.insert(host_id.to_string(), chart);
    }

    pub fn detach_chart(&self, host_id: &str) -> Option<ChartHandle> {
        self.tree.borrow_mut().charts.remove(host_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_patterns_round_trip() {
        assert_eq!(widget_id_of(&loading_id("alpha")), Some("alpha"));
        assert_eq!(widget_id_of(&chart_id("revenue-2024")), Some("revenue-2024"));
        assert_eq!(widget_id_of("alpha-data-table"), None);
        assert_eq!(widget_id_of("-loading"), None);
    }

    #[test]
    fn test_insert_widget_layout() {
        let page = PageHandle::new();
        page.insert_widget("alpha");

        assert_eq!(page.visible_loading_indicators(), vec!["alpha".to_string()]);
        assert_eq!(page.is_hidden("alpha-data-table"), Some(true));
        assert_eq!(page.attr("alpha-data-table", "aria-hidden").as_deref(), Some("true"));
        assert_eq!(page.attr("alpha-table-toggle", "aria-expanded").as_deref(), Some("false"));
        assert!(page.has_class("alpha-chart", PLACEHOLDER_CLASS));
    }

    #[test]
    fn test_hidden_indicator_not_listed() {
        let page = PageHandle::new();
        page.insert_widget("alpha");
        page.insert_widget("beta");
        page.set_hidden("alpha-loading", true);
        assert_eq!(page.visible_loading_indicators(), vec!["beta".to_string()]);
    }

    #[test]
    fn test_mutations_only_on_change() {
        let page = PageHandle::new();
        page.insert(Element::new("x"));
        let mut rx = page.observe();

        assert!(page.set_hidden("x", true));
        assert!(!page.set_hidden("x", true));
        assert!(page.add_class("x", "a"));
        assert!(!page.add_class("x", "a"));
        assert!(!page.set_attr("missing", "k", "v"));

        assert_eq!(
            rx.try_recv().unwrap(),
            MutationRecord::Attribute {
                target: "x".into(),
                name: "hidden".into(),
                value: Some("true".into())
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MutationRecord::Attribute {
                target: "x".into(),
                name: "class".into(),
                value: Some("a".into())
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_class_updates_record_full_class_list() {
        let page = PageHandle::new();
        page.insert(Element::new("x"));
        let mut rx = page.observe();

        assert!(page.add_class("x", "b"));
        assert!(page.add_class("x", "a"));
        assert!(page.has_class("x", "a"));
        assert!(page.remove_class("x", "b"));
        assert!(!page.remove_class("x", "b"));
        assert!(!page.add_class("missing", "a"));
        assert!(!page.has_class("x", "b"));

        let values: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|record| match record {
                MutationRecord::Attribute { value, .. } => value,
                other => panic!("unexpected record {other:?}"),
            })
            .collect();
        assert_eq!(
            values,
            vec![Some("b".to_string()), Some("a b".to_string()), Some("a".to_string())]
        );
    }

    #[test]
    fn test_dropped_observer_pruned() {
        let page = PageHandle::new();
        let rx = page.observe();
        drop(rx);
        page.insert(Element::new("y"));
        assert!(page.tree.borrow().observers.is_empty());
    }
}
