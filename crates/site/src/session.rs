//! A simulated page visit.
//!
//! Hints go to an [`InMemoryHead`] that a fake network settles after a fixed
//! latency, and sections are laid out top to bottom on a [`SimulatedViewport`]
//! that the session scrolls. All waiting goes through tokio timers, so a
//! paused test runtime replays a session instantly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use datawise_preload::report::schedule_report;
use datawise_preload::{
    ConnectOptions, FetchPriority, HintKind, HintOutcome, InMemoryHead, PreloadPerformanceSummary,
    Preloader,
};
use datawise_progressive::{
    LoadError, LoadableUnit, NodeId, Priority, ProgressiveScheduler, Rect, SimulatedViewport,
    UnitOptions, UnitState,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{SectionSpec, SitePreloadConfig};

/// What the visitor does during a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub route: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Scroll offsets visited in order
    pub scroll: Vec<f64>,
    /// Links hovered after scrolling
    pub hover: Vec<String>,
    /// Time spent at each scroll offset
    pub dwell_ms: u64,
    /// Time to wait at the end for late tiers
    pub linger_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            route: "/".to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            scroll: Vec::new(),
            hover: Vec::new(),
            dwell_ms: 400,
            linger_ms: 2500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintReport {
    pub url: String,
    pub kind: HintKind,
    pub priority: FetchPriority,
    pub outcome: HintOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReport {
    pub id: String,
    pub priority: Priority,
    pub state: UnitState,
    pub visible: bool,
    /// Milliseconds from session start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering_started_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a session, printed as JSON by the binary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub route: String,
    pub viewport_width: u32,
    pub summary: PreloadPerformanceSummary,
    pub hints: Vec<HintReport>,
    /// Markup of every element appended to the document head
    pub head: Vec<String>,
    pub sections: Vec<SectionReport>,
}

struct Network {
    head: Arc<InMemoryHead>,
    failures: Vec<String>,
    latency: Duration,
}

impl Network {
    fn new(head: Arc<InMemoryHead>, preloader: &Preloader, config: &SitePreloadConfig) -> Self {
        let failures = config
            .simulated_failures
            .iter()
            .filter_map(|href| match preloader.registry().resolve(href, HintKind::Preload) {
                Ok(key) => Some(key.url),
                Err(err) => {
                    log::warn!("Ignoring simulated failure {}: {}", href, err);
                    None
                }
            })
            .collect();

        Self {
            head,
            failures,
            latency: Duration::from_millis(config.network_latency_ms),
        }
    }

    /// Wait one round trip, then settle everything in flight
    async fn round_trip(&self) {
        tokio::time::sleep(self.latency).await;
        for url in &self.failures {
            self.head.settle_failure(url, "simulated network error");
        }
        let settled = self.head.settle_all_success();
        if settled > 0 {
            log::debug!("Network settled {} hints", settled);
        }
    }
}

type Section = LoadableUnit<String>;

fn section_unit(scheduler: &ProgressiveScheduler, spec: &SectionSpec) -> Section {
    let mut options = UnitOptions::new(spec.priority).with_id(&spec.id);
    if let Some(min_height) = &spec.min_height {
        options = options.with_min_height(min_height);
    }
    if let Some(skeleton) = &spec.skeleton {
        options = options.with_skeleton(skeleton.clone());
    }

    let id = spec.id.clone();
    let load = Duration::from_millis(spec.load_ms);
    let fail = spec.fail;
    scheduler.unit(options, move || {
        let id = id.clone();
        async move {
            tokio::time::sleep(load).await;
            if fail {
                return Err(LoadError::failed(format!("{} chunk failed to load", id)));
            }
            log::info!("Section {} loaded", id);
            Ok(id)
        }
    })
}

/// Lay sections out top to bottom and mount them
fn mount_sections(
    scheduler: &ProgressiveScheduler,
    viewport: &SimulatedViewport,
    config: &SitePreloadConfig,
    width: f64,
) -> Result<Vec<Section>> {
    let mut top = 0.0;
    let mut units = Vec::with_capacity(config.sections.len());
    for (index, spec) in config.sections.iter().enumerate() {
        let node = NodeId(index as u64 + 1);
        viewport.insert_node(node, Rect::new(0.0, top, width, spec.height));
        top += spec.height;

        let unit = section_unit(scheduler, spec);
        unit.mount(node)
            .with_context(|| format!("Failed to mount section {}", spec.id))?;
        units.push(unit);
    }
    Ok(units)
}

fn since(start: Instant, at: Option<Instant>) -> Option<u64> {
    at.map(|at| at.saturating_duration_since(start).as_millis() as u64)
}

/// Run one page visit and report what was preloaded and rendered
pub async fn run_session(config: &SitePreloadConfig, options: &SessionOptions) -> Result<SessionReport> {
    let start = Instant::now();
    let head = Arc::new(InMemoryHead::new());
    let preloader = Preloader::with_config(config.preloader.clone(), head.clone())
        .context("Invalid preloader configuration")?;
    let network = Network::new(Arc::clone(&head), &preloader, config);
    let report = schedule_report(&preloader);

    log::info!(
        "Visiting {} at {}x{}",
        options.route,
        options.viewport_width,
        options.viewport_height
    );

    config.critical.apply(&preloader, options.viewport_width);
    for domain in config.dns_prefetch_domains() {
        preloader.prefetch_dns(domain, &ConnectOptions::default());
    }
    for domain in &config.preconnect_domains {
        preloader.preconnect(domain, &ConnectOptions::default());
    }
    config.third_party.apply(&preloader);
    if config.enable_route_preloading {
        let issued = config.routes.preload_for_route(&preloader, &options.route);
        log::debug!("Route {} preloaded {} resources", options.route, issued);
    }
    let logos = config.logos.clone().spawn(preloader.clone());

    let width = f64::from(options.viewport_width);
    let viewport = SimulatedViewport::new(width, f64::from(options.viewport_height));
    let scheduler = ProgressiveScheduler::new(config.scheduler.clone(), Arc::new(viewport.clone()))?;
    let sections = mount_sections(&scheduler, &viewport, config, width)?;

    network.round_trip().await;

    for &offset in &options.scroll {
        log::debug!("Scrolling to {}px", offset);
        viewport.scroll_to(offset);
        tokio::time::sleep(Duration::from_millis(options.dwell_ms)).await;
        network.round_trip().await;
    }

    for link in &options.hover {
        let issued = config.routes.preload_on_hover(&preloader, link);
        log::debug!("Hovering {} preloaded {} resources", link, issued);
    }

    logos.await.context("Staged logo preload panicked")?;
    network.round_trip().await;
    tokio::time::sleep(Duration::from_millis(options.linger_ms)).await;

    if let Some(report) = report {
        report.await.context("Performance report task panicked")?;
    }
    let summary = preloader.summary();

    let hints = preloader
        .hints()
        .into_iter()
        .map(|hint| HintReport {
            load_time_ms: hint.duration().map(|d| d.as_secs_f64() * 1000.0),
            url: hint.url,
            kind: hint.kind,
            priority: hint.priority,
            outcome: hint.outcome,
            error: hint.error_detail,
        })
        .collect();

    let sections = sections
        .iter()
        .map(|unit| SectionReport {
            id: unit.id().to_string(),
            priority: unit.priority(),
            state: unit.state(),
            visible: unit.is_visible(),
            rendering_started_ms: since(start, unit.rendering_started_at()),
            loaded_ms: since(start, unit.loaded_at()),
            error: unit.error().map(|err| err.to_string()),
        })
        .collect();

    Ok(SessionReport {
        route: options.route.clone(),
        viewport_width: options.viewport_width,
        summary,
        hints,
        head: head.elements().iter().map(|element| element.to_html()).collect(),
        sections,
    })
}
