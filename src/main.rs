//! Demo driver: builds an in-memory page, runs the supervisor over it and
//! prints a JSON summary of how every widget ended up.
//!
//! ```text
//! WIDGETS="alpha:2000,beta:never,gamma:fail,late:800@12000" LIBRARY_MODE=slow chartguard
//! ```

use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{sleep_until, Instant};

use chartguard::logging::{log, obj, run_id, v_str, Domain, Level};
use chartguard::page::chart_id;
use chartguard::signals::Signal;
use chartguard::sim::{Plan, ScriptedWorker, SimulatedLibraryHost};
use chartguard::{PageHandle, RenderSupervisor, Runtime, SupervisorConfig};

const DEFAULT_WIDGETS: &str = "alpha:2000,beta:never,gamma:fail";

#[derive(Debug, Clone, PartialEq)]
struct WidgetSpec {
    id: String,
    plan: Plan,
    /// Inserted after page readiness instead of up front.
    insert_at: Option<Duration>,
}

/// `id[:plan][@insert_ms]`, comma separated.
fn parse_widgets(raw: &str) -> Result<Vec<WidgetSpec>> {
    let mut widgets = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (head, insert_at) = match item.split_once('@') {
            Some((head, at)) => {
                let ms: u64 = at.parse().with_context(|| format!("bad insert time in '{}'", item))?;
                (head, Some(Duration::from_millis(ms)))
            }
            None => (item, None),
        };
        let (id, plan) = match head.split_once(':') {
            Some((id, plan)) => match Plan::parse(plan) {
                Some(plan) => (id, plan),
                None => bail!("unknown plan '{}' for widget '{}'", plan, id),
            },
            None => (head, Plan::After(Duration::ZERO)),
        };
        if id.is_empty() {
            bail!("empty widget id in '{}'", item);
        }
        widgets.push(WidgetSpec {
            id: id.to_string(),
            plan,
            insert_at,
        });
    }
    Ok(widgets)
}

fn library_host(mode: &str) -> Result<SimulatedLibraryHost> {
    Ok(match mode {
        "present" => SimulatedLibraryHost::present(),
        "slow" => SimulatedLibraryHost::arriving_after(Duration::from_secs(3)),
        "absent" => SimulatedLibraryHost::absent(),
        other => bail!("LIBRARY_MODE must be present|slow|absent, got '{}'", other),
    })
}

fn insert_widget(page: &PageHandle, widget_id: &str) {
    page.insert_widget(widget_id);
    page.insert_error_banner(widget_id);
    page.set_attr(
        &chart_id(widget_id),
        "data-seed",
        &json!({ "widget": widget_id }).to_string(),
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = SupervisorConfig::from_env();
    config.validate().context("invalid supervisor configuration")?;
    let widgets = parse_widgets(&std::env::var("WIDGETS").unwrap_or_else(|_| DEFAULT_WIDGETS.to_string()))?;
    let mode = std::env::var("LIBRARY_MODE").unwrap_or_else(|_| "present".to_string());
    let host = Rc::new(library_host(&mode)?);

    let page = PageHandle::new();
    let worker = ScriptedWorker::new();
    for w in &widgets {
        worker.plan(&w.id, w.plan.clone());
        if w.insert_at.is_none() {
            insert_widget(&page, &w.id);
        }
    }
    log(
        Level::Info,
        Domain::System,
        "demo_start",
        obj(&[
            ("library_mode", v_str(&mode)),
            ("widgets", json!(widgets.iter().map(|w| w.id.as_str()).collect::<Vec<_>>())),
            ("timeout_ms", json!(config.widget_timeout_ms)),
        ]),
    );

    let supervisor = RenderSupervisor::new(config.clone(), page.clone(), host, Rc::new(worker));
    let mut signals = supervisor.subscribe();
    let mut runtime = Runtime::new(supervisor).with_watcher(&page);
    let origin = Instant::now();
    runtime.start();

    let mut late: Vec<(Duration, &str)> = widgets
        .iter()
        .filter_map(|w| w.insert_at.map(|at| (at, w.id.as_str())))
        .collect();
    late.sort();
    let last_insert = late.last().map(|(at, _)| *at).unwrap_or_default();
    let inserts = async {
        for (at, id) in &late {
            sleep_until(origin + *at).await;
            insert_widget(&page, id);
        }
    };
    tokio::join!(
        runtime.run_until(origin + last_insert + config.mutation_debounce()),
        inserts
    );

    let last_pass = config.pass_schedule().last().copied().unwrap_or_default();
    let settled = runtime
        .run_until_settled(last_pass + config.widget_timeout() + Duration::from_secs(1))
        .await;

    let (mut rendered, mut degraded, mut discovered) = (0u32, 0u32, 0u32);
    loop {
        match signals.try_recv() {
            Ok(Signal::WidgetRendered { fallback: false, .. }) => rendered += 1,
            Ok(Signal::WidgetRendered { fallback: true, .. }) => degraded += 1,
            Ok(Signal::NewWidgetsDiscovered { widget_ids }) => discovered += widget_ids.len() as u32,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    let supervisor = runtime.supervisor();
    let report = json!({
        "run_id": run_id(),
        "settled": settled,
        "library": supervisor.library().status(),
        "signals": {
            "rendered": rendered,
            "fallback": degraded,
            "late_discovered": discovered,
        },
        "widgets": supervisor.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !settled {
        bail!("widgets still loading after the last pass plus timeout");
    }
    Ok(())
}
