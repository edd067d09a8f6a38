//! Paired data table visibility.
//!
//! The table, its toggle label, `aria-expanded` on the toggle and
//! `aria-hidden` on the table always change together.

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::page::{table_id, toggle_id, PageHandle, HIDE_TABLE_LABEL, SHOW_TABLE_LABEL};

#[derive(Debug, Clone)]
pub struct DataTableVisibilityController {
    page: PageHandle,
}

impl DataTableVisibilityController {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }

    pub fn has_table(&self, widget_id: &str) -> bool {
        self.page.contains(&table_id(widget_id))
    }

    pub fn is_visible(&self, widget_id: &str) -> bool {
        self.page.is_hidden(&table_id(widget_id)) == Some(false)
    }

    /// Returns true when the table went from hidden to shown.
    pub fn reveal(&self, widget_id: &str) -> bool {
        self.set_visible(widget_id, true)
    }

    pub fn hide(&self, widget_id: &str) -> bool {
        self.set_visible(widget_id, false)
    }

    /// What a click on the toggle control does.
    pub fn toggle(&self, widget_id: &str) -> bool {
        let show = !self.is_visible(widget_id);
        self.set_visible(widget_id, show);
        show
    }

    fn set_visible(&self, widget_id: &str, visible: bool) -> bool {
        let table = table_id(widget_id);
        if !self.page.contains(&table) {
            return false;
        }
        let changed = self.page.set_hidden(&table, !visible);
        self.page.set_attr(&table, "aria-hidden", if visible { "false" } else { "true" });

        let toggle = toggle_id(widget_id);
        self.page.set_attr(&toggle, "aria-expanded", if visible { "true" } else { "false" });
        self.page.set_text(&toggle, if visible { HIDE_TABLE_LABEL } else { SHOW_TABLE_LABEL });

        if changed {
            log(
                Level::Debug,
                Domain::Table,
                if visible { "revealed" } else { "hidden" },
                obj(&[("widget_id", v_str(widget_id))]),
            );
        }
        changed
    }
}
