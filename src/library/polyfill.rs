//! Minimal stand-in for the charting library.
//!
//! Covers exactly the surface the supervisor calls. Rendering draws an inert
//! frame plus a one-line caption into the host and always resolves.

use async_trait::async_trait;

use super::{ChartInstance, ChartLibrary, ChartOptions, HostElement};
use crate::dataprep::Series;
use crate::error::RenderError;
use crate::page::Fragment;

pub const POLYFILL_CLASS: &str = "chart-polyfill";

#[derive(Debug, Default)]
pub struct PolyfillLibrary;

impl PolyfillLibrary {
    pub fn new() -> Self {
        Self
    }
}

impl ChartLibrary for PolyfillLibrary {
    fn name(&self) -> &str {
        "polyfill"
    }

    fn construct(&self, host: HostElement, options: ChartOptions) -> Result<Box<dyn ChartInstance>, RenderError> {
        Ok(Box::new(PolyfillChart {
            host,
            options,
            destroyed: false,
        }))
    }
}

#[derive(Debug)]
pub struct PolyfillChart {
    host: HostElement,
    options: ChartOptions,
    destroyed: bool,
}

impl PolyfillChart {
    fn caption(&self) -> String {
        let points: usize = self.options.series.iter().map(|s| s.data.len()).sum();
        format!(
            "{} chart: {} series, {} points",
            self.options.chart_type,
            self.options.series.len(),
            points
        )
    }

    fn draw(&self) -> bool {
        if self.destroyed {
            return false;
        }
        self.host.page.replace_children(
            &self.host.id,
            vec![
                Fragment::new("svg", POLYFILL_CLASS, ""),
                Fragment::new("figcaption", "chart-caption", &self.caption()),
            ],
        )
    }
}

#[async_trait(?Send)]
impl ChartInstance for PolyfillChart {
    async fn render(&mut self) -> Result<(), RenderError> {
        // resolves even without a host; nothing to draw into is not an error here
        self.draw();
        Ok(())
    }

    fn update_options(&mut self, options: ChartOptions, redraw: bool, _animate: bool) {
        self.options = options;
        if redraw {
            self.draw();
        }
    }

    fn update_series(&mut self, series: Vec<Series>) {
        self.options.series = series;
        self.draw();
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.host.page.replace_children(&self.host.id, Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{chart_id, PageHandle};

    fn options() -> ChartOptions {
        ChartOptions {
            chart_type: "bar".to_string(),
            series: vec![Series {
                name: "revenue".to_string(),
                data: vec![1.0, 2.0, 3.0],
            }],
            categories: vec!["q1".into(), "q2".into(), "q3".into()],
            animate: false,
        }
    }

    #[tokio::test]
    async fn test_render_draws_inert_frame() {
        let page = PageHandle::new();
        page.insert_widget("alpha");
        let host = HostElement { page: page.clone(), id: chart_id("alpha") };
        let mut chart = PolyfillLibrary::new().construct(host, options()).unwrap();

        chart.render().await.unwrap();
        let children = page.children("alpha-chart");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].class, POLYFILL_CLASS);
        assert_eq!(children[1].text, "bar chart: 1 series, 3 points");

        chart.update_series(vec![]);
        assert_eq!(page.children("alpha-chart")[1].text, "bar chart: 0 series, 0 points");

        chart.destroy();
        assert!(page.children("alpha-chart").is_empty());
        // destroyed charts stay inert
        chart.update_options(options(), true, false);
        assert!(page.children("alpha-chart").is_empty());
    }

    #[tokio::test]
    async fn test_render_without_host_still_resolves() {
        let page = PageHandle::new();
        let host = HostElement { page: page.clone(), id: "ghost-chart".to_string() };
        let mut chart = PolyfillLibrary::new().construct(host, options()).unwrap();
        assert_eq!(chart.render().await, Ok(()));
        assert!(!page.contains("ghost-chart"));
    }
}
