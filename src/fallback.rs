use crate::logging::{log, obj, v_str, Domain, Level};
use crate::page::{chart_id, error_id, loading_id, Fragment, PageHandle, FALLBACK_CLASS, LOADED_CLASS, PLACEHOLDER_CLASS};

pub const FALLBACK_CAPTION: &str = "Chart unavailable. The data is shown in the table below.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    Created,
    AlreadyPresent,
    /// No chart host on the page; only the loading indicator was cleared.
    MissingHost,
}

/// Swaps a widget's host contents for an inert frame.
#[derive(Debug, Clone)]
pub struct FallbackChartFactory {
    page: PageHandle,
}

impl FallbackChartFactory {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }

    pub fn has_fallback(&self, widget_id: &str) -> bool {
        self.page
            .children(&chart_id(widget_id))
            .iter()
            .any(|c| c.class == FALLBACK_CLASS)
    }

    /// Idempotent: a second call on the same widget inserts nothing.
    pub fn create_fallback(&self, widget_id: &str) -> FallbackOutcome {
        let host = chart_id(widget_id);
        self.page.set_hidden(&loading_id(widget_id), true);

        if !self.page.contains(&host) {
            log(
                Level::Warn,
                Domain::Fallback,
                "missing_host",
                obj(&[("widget_id", v_str(widget_id))]),
            );
            return FallbackOutcome::MissingHost;
        }
        if self.has_fallback(widget_id) {
            return FallbackOutcome::AlreadyPresent;
        }

        if let Some(chart) = self.page.detach_chart(&host) {
            if let Ok(mut guard) = chart.try_borrow_mut() {
                guard.destroy();
            }
        }
        self.page.replace_children(
            &host,
            vec![
                Fragment::new("svg", FALLBACK_CLASS, ""),
                Fragment::new("p", "chart-fallback-caption", FALLBACK_CAPTION),
            ],
        );
        self.page.remove_class(&host, PLACEHOLDER_CLASS);
        self.page.add_class(&host, LOADED_CLASS);
        self.page.set_attr(&host, "aria-busy", "false");
        log(
            Level::Info,
            Domain::Fallback,
            "created",
            obj(&[("widget_id", v_str(widget_id))]),
        );
        FallbackOutcome::Created
    }

    /// Show the widget's error banner if the page has one.
    pub fn show_error_banner(&self, widget_id: &str, message: &str) -> bool {
        let banner = error_id(widget_id);
        if !self.page.contains(&banner) {
            return false;
        }
        self.page.set_text(&banner, message);
        self.page.set_hidden(&banner, false);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_idempotent() {
        let page = PageHandle::new();
        page.insert_widget("beta");
        let factory = FallbackChartFactory::new(page.clone());

        assert_eq!(factory.create_fallback("beta"), FallbackOutcome::Created);
        assert_eq!(factory.create_fallback("beta"), FallbackOutcome::AlreadyPresent);

        let children = page.children("beta-chart");
        assert_eq!(children.iter().filter(|c| c.class == FALLBACK_CLASS).count(), 1);
        assert!(page.has_class("beta-chart", LOADED_CLASS));
        assert!(!page.has_class("beta-chart", PLACEHOLDER_CLASS));
        assert_eq!(page.is_hidden("beta-loading"), Some(true));
        assert_eq!(page.attr("beta-chart", "aria-busy").as_deref(), Some("false"));
    }

    #[test]
    fn test_missing_host_still_clears_indicator() {
        let page = PageHandle::new();
        page.insert(crate::page::Element::new("gamma-loading").with_class(crate::page::LOADING_CLASS));
        let factory = FallbackChartFactory::new(page.clone());
        assert_eq!(factory.create_fallback("gamma"), FallbackOutcome::MissingHost);
        assert!(page.visible_loading_indicators().is_empty());
    }

    #[test]
    fn test_error_banner_optional() {
        let page = PageHandle::new();
        page.insert_widget("beta");
        let factory = FallbackChartFactory::new(page.clone());
        assert!(!factory.show_error_banner("beta", "Chart failed to load"));

        page.insert_error_banner("beta");
        assert!(factory.show_error_banner("beta", "Chart failed to load"));
        assert_eq!(page.is_hidden("beta-error"), Some(false));
        assert_eq!(page.element("beta-error").unwrap().text, "Chart failed to load");
    }
}
