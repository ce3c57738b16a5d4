//! Page-level preload plans.
//!
//! These are the declarative tables page composition hands to the preloader:
//! per-route resources, the critical first-paint set, staged logo carousels and
//! third-party warm-up. The preloader itself knows nothing about routes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::PreloadError;
use crate::hint::{ConnectOptions, CrossOrigin, FetchPriority, PreloadOptions, ResourceAs};
use crate::preloader::Preloader;

/// One resource to preload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub href: String,
    pub options: PreloadOptions,
}

impl ResourceSpec {
    pub fn new(href: &str, options: PreloadOptions) -> Self {
        Self {
            href: href.to_string(),
            options,
        }
    }
}

/// Preload every spec in order; returns how many were handed to the preloader
pub fn preload_all(preloader: &Preloader, specs: &[ResourceSpec]) -> usize {
    for spec in specs {
        preloader.preload(&spec.href, &spec.options);
    }
    specs.len()
}

/// Static route → resources table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteResources {
    routes: BTreeMap<String, Vec<ResourceSpec>>,
}

impl RouteResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: &str, specs: Vec<ResourceSpec>) -> Self {
        self.routes.insert(route.to_string(), specs);
        self
    }

    pub fn resources_for(&self, route: &str) -> Option<&[ResourceSpec]> {
        self.routes.get(route).map(Vec::as_slice)
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Preload the resources registered for `route`. Unknown routes issue nothing.
    pub fn preload_for_route(&self, preloader: &Preloader, route: &str) -> usize {
        match self.resources_for(route) {
            Some(specs) => preload_all(preloader, specs),
            None => 0,
        }
    }

    /// Preload the route behind a hovered link.
    ///
    /// `link_href` may be absolute or relative to the preloader's base URL; only
    /// its path is matched against the table.
    pub fn preload_on_hover(&self, preloader: &Preloader, link_href: &str) -> usize {
        match link_pathname(link_href, preloader.registry().base_url()) {
            Some(path) => self.preload_for_route(preloader, &path),
            None => 0,
        }
    }
}

fn link_pathname(link_href: &str, base: Option<&Url>) -> Option<String> {
    Url::options()
        .base_url(base)
        .parse(link_href)
        .ok()
        .map(|url| url.path().to_string())
}

/// Parse a `data-preload` attribute: a JSON array of `{href, options}` objects
pub fn parse_preload_attribute(raw: &str) -> Result<Vec<ResourceSpec>, PreloadError> {
    Ok(serde_json::from_str(raw)?)
}

/// Preload the resources listed in a `data-preload` attribute.
///
/// A malformed attribute is logged and skipped.
pub fn preload_from_attribute(preloader: &Preloader, raw: &str) -> usize {
    match parse_preload_attribute(raw) {
        Ok(specs) => preload_all(preloader, &specs),
        Err(err) => {
            log::warn!("Failed to parse preload data: {}", err);
            0
        }
    }
}

/// Resources needed for the first paint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CriticalResourcePlan {
    /// Viewports at or below this width get the mobile hero
    pub mobile_breakpoint_px: u32,
    pub hero_mobile: Option<ResourceSpec>,
    pub hero_desktop: Option<ResourceSpec>,
    /// Preloaded regardless of viewport (logo, ...)
    pub always: Vec<ResourceSpec>,
    pub dns_prefetch: Vec<String>,
    pub preconnect: Vec<String>,
    pub preconnect_cross_origin: Option<CrossOrigin>,
}

impl Default for CriticalResourcePlan {
    fn default() -> Self {
        Self {
            mobile_breakpoint_px: 640,
            hero_mobile: None,
            hero_desktop: None,
            always: Vec::new(),
            dns_prefetch: Vec::new(),
            preconnect: Vec::new(),
            preconnect_cross_origin: None,
        }
    }
}

impl CriticalResourcePlan {
    /// Issue every hint of the plan for a viewport `viewport_width` pixels wide
    pub fn apply(&self, preloader: &Preloader, viewport_width: u32) {
        let hero = if viewport_width <= self.mobile_breakpoint_px {
            self.hero_mobile.as_ref()
        } else {
            self.hero_desktop.as_ref()
        };
        if let Some(hero) = hero {
            preloader.preload(&hero.href, &hero.options);
        }

        preload_all(preloader, &self.always);

        for domain in &self.dns_prefetch {
            preloader.prefetch_dns(domain, &ConnectOptions::default());
        }

        let connect = ConnectOptions {
            cross_origin: self.preconnect_cross_origin,
        };
        for domain in &self.preconnect {
            preloader.preconnect(domain, &connect);
        }
    }
}

/// Preload a list of images in two waves: the first `immediate` at high
/// priority, the rest at low priority after `deferred_delay_ms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StagedPreloadPlan {
    pub urls: Vec<String>,
    pub immediate: usize,
    pub deferred_delay_ms: u64,
}

impl Default for StagedPreloadPlan {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            immediate: 6,
            deferred_delay_ms: 1000,
        }
    }
}

impl StagedPreloadPlan {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Self::default()
        }
    }

    /// Issue the first wave, wait, then issue the second wave
    pub async fn apply(&self, preloader: &Preloader) {
        let split = self.immediate.min(self.urls.len());
        let (first, rest) = self.urls.split_at(split);

        let high = PreloadOptions::image().with_fetch_priority(FetchPriority::High);
        for url in first {
            preloader.preload(url, &high);
        }

        if rest.is_empty() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(self.deferred_delay_ms)).await;

        let low = PreloadOptions::image().with_fetch_priority(FetchPriority::Low);
        for url in rest {
            preloader.preload(url, &low);
        }
    }

    /// Run [`apply`](Self::apply) in the background on the current runtime
    pub fn spawn(self, preloader: Preloader) -> JoinHandle<()> {
        tokio::spawn(async move { self.apply(&preloader).await })
    }
}

/// Warm-up for analytics and identity scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThirdPartyPlan {
    pub enabled: bool,
    /// Script URLs preloaded at low priority
    pub scripts: Vec<String>,
    pub preconnect: Vec<String>,
}

impl Default for ThirdPartyPlan {
    fn default() -> Self {
        Self {
            enabled: true,
            scripts: Vec::new(),
            preconnect: Vec::new(),
        }
    }
}

impl ThirdPartyPlan {
    pub fn apply(&self, preloader: &Preloader) {
        if !self.enabled {
            return;
        }

        let options = PreloadOptions::new(ResourceAs::Script)
            .with_fetch_priority(FetchPriority::Low);
        for script in &self.scripts {
            preloader.preload(script, &options);
        }
        for domain in &self.preconnect {
            preloader.preconnect(domain, &ConnectOptions::default());
        }
    }
}
