use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PreloadError;
use crate::events::{EventBus, PreloadEvent, SubscriptionId};
use crate::head::{DocumentHead, HintElement, SettleCallback};
use crate::hint::{
    ConnectOptions, FetchPriority, HintKey, HintKind, HintOutcome, PreinitAs, PreinitOptions,
    PreloadOptions, ResourceAs, ResourceHint,
};
use crate::registry::{PreloadPerformanceSummary, Registration, ResourceRegistry};

/// Configuration for the [`Preloader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreloaderConfig {
    /// Page origin that relative hrefs resolve against
    pub base_url: Option<String>,
    /// Whether to log a performance report after the initial load
    pub enable_performance_monitoring: bool,
    /// Delay before the performance report is logged, in milliseconds
    pub report_delay_ms: u64,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            enable_performance_monitoring: true,
            report_delay_ms: 3000,
        }
    }
}

impl PreloaderConfig {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            ..Self::default()
        }
    }
}

/// Issues resource hints through a [`DocumentHead`] and records them in a
/// shared [`ResourceRegistry`].
///
/// All four primitives are fire-and-forget: they never return an error and
/// never panic. Invalid hrefs are logged and skipped, host failures are
/// recorded as failed hints, and completions are published on [`Preloader::events`].
/// Cloning is cheap and every clone shares the same registry and event bus.
#[derive(Clone)]
pub struct Preloader {
    config: PreloaderConfig,
    registry: Arc<ResourceRegistry>,
    events: Arc<EventBus<PreloadEvent>>,
    head: Arc<dyn DocumentHead>,
}

impl Preloader {
    /// Create a preloader with default configuration (absolute URLs only)
    pub fn new(head: Arc<dyn DocumentHead>) -> Self {
        Self {
            config: PreloaderConfig::default(),
            registry: Arc::new(ResourceRegistry::new()),
            events: Arc::new(EventBus::new()),
            head,
        }
    }

    /// Create a preloader with custom configuration
    pub fn with_config(config: PreloaderConfig, head: Arc<dyn DocumentHead>) -> Result<Self, PreloadError> {
        let registry = match &config.base_url {
            Some(base) => {
                let base_url = Url::parse(base).map_err(|err| PreloadError::InvalidUrl {
                    href: base.clone(),
                    reason: err.to_string(),
                })?;
                ResourceRegistry::with_base_url(base_url)
            }
            None => ResourceRegistry::new(),
        };

        Ok(Self {
            config,
            registry: Arc::new(registry),
            events: Arc::new(EventBus::new()),
            head,
        })
    }

    pub fn config(&self) -> &PreloaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus<PreloadEvent>> {
        &self.events
    }

    /// Subscribe to completion events
    pub fn on_complete<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PreloadEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Ask the browser to start fetching `href` for later use
    pub fn preload(&self, href: &str, options: &PreloadOptions) {
        let registration = self.registry.register(
            href,
            HintKind::Preload,
            Some(options.destination),
            options.effective_priority(),
        );

        self.issue(registration, |url| {
            HintElement::link("preload", url)
                .with_attr("as", options.destination.as_str())
                .with_optional_attr("crossorigin", options.cross_origin.map(|c| c.as_str()))
                .with_optional_attr("integrity", options.integrity.as_deref())
                .with_optional_attr("type", options.mime_type.as_deref())
                .with_optional_attr("media", options.media.as_deref())
                .with_optional_attr("fetchpriority", options.fetch_priority.map(|p| p.as_str()))
                .with_optional_attr("importance", options.importance.map(|p| p.as_str()))
        });
    }

    /// Fetch `href` and apply it immediately as a script or stylesheet
    pub fn preinit(&self, href: &str, options: &PreinitOptions) {
        let registration = self.registry.register(
            href,
            HintKind::Preinit,
            Some(ResourceAs::from(options.destination)),
            FetchPriority::Auto,
        );

        self.issue(registration, |url| {
            let element = match options.destination {
                PreinitAs::Script => HintElement::script(url).with_attr("async", ""),
                PreinitAs::Style => HintElement::link("stylesheet", url),
            };
            let element = element
                .with_optional_attr("crossorigin", options.cross_origin.map(|c| c.as_str()))
                .with_optional_attr("integrity", options.integrity.as_deref());

            match options.destination {
                PreinitAs::Style => element
                    .with_optional_attr("data-precedence", options.precedence.map(|p| p.as_str())),
                PreinitAs::Script => element,
            }
        });
    }

    /// Resolve DNS for the origin of `href`. Invalid hrefs are ignored.
    pub fn prefetch_dns(&self, href: &str, options: &ConnectOptions) {
        self.connect_hint(href, HintKind::DnsPrefetch, options);
    }

    /// Warm DNS, TCP and TLS for the origin of `href`. Invalid hrefs are ignored.
    pub fn preconnect(&self, href: &str, options: &ConnectOptions) {
        self.connect_hint(href, HintKind::Preconnect, options);
    }

    fn connect_hint(&self, href: &str, kind: HintKind, options: &ConnectOptions) {
        let registration = self.registry.register(href, kind, None, FetchPriority::Auto);
        self.issue(registration, |origin| {
            HintElement::link(kind.as_str(), origin)
                .with_optional_attr("crossorigin", options.cross_origin.map(|c| c.as_str()))
        });
    }

    /// Append the element for a freshly created registration
    fn issue<F>(&self, registration: Registration, build: F)
    where
        F: FnOnce(&str) -> HintElement,
    {
        let hint = match registration {
            Registration::Created(hint) => hint,
            Registration::Existing(hint) => {
                log::trace!("{} hint for {} already issued", hint.kind, hint.url);
                return;
            }
            Registration::Rejected(_) => return,
        };

        let key = hint.key();
        let element = build(&hint.url);
        log::debug!("Issuing {}", element.to_html());

        if let Err(err) = self.head.append(element, self.settle_callback(key.clone())) {
            log::warn!("Failed to issue {} hint for {}: {}", key.kind, key.url, err);
            settle(&self.registry, &self.events, &key, Err(err.to_string()));
        }
    }

    fn settle_callback(&self, key: HintKey) -> SettleCallback {
        let registry = Arc::clone(&self.registry);
        let events = Arc::clone(&self.events);
        Box::new(move |result| settle(&registry, &events, &key, result))
    }

    /// Current performance summary
    pub fn summary(&self) -> PreloadPerformanceSummary {
        self.registry.summarize()
    }

    /// Snapshot of every hint issued so far
    pub fn hints(&self) -> Vec<ResourceHint> {
        self.registry.hints()
    }

    /// Forget every hint. Intended for tests and dev tooling.
    pub fn clear_metrics(&self) {
        self.registry.clear();
    }
}

impl std::fmt::Debug for Preloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preloader")
            .field("config", &self.config)
            .field("hints", &self.registry.len())
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

/// Record the outcome of a hint and publish it.
///
/// Nothing is published when the entry is no longer pending, e.g. after a
/// `clear_metrics` raced with the element's load event.
fn settle(
    registry: &ResourceRegistry,
    events: &EventBus<PreloadEvent>,
    key: &HintKey,
    result: Result<(), String>,
) {
    let (outcome, detail) = match result {
        Ok(()) => (HintOutcome::Success, None),
        Err(detail) => (HintOutcome::Failure, Some(detail)),
    };

    if !registry.complete(key, outcome, detail) {
        return;
    }

    log::debug!("{} hint for {} settled: {:?}", key.kind, key.url, outcome);
    events.emit(&PreloadEvent::Complete {
        key: key.clone(),
        outcome,
        summary: registry.summarize(),
    });
}
