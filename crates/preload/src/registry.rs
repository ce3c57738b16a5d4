use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

use crate::error::PreloadError;
use crate::hint::{FetchPriority, HintKey, HintKind, HintOutcome, ResourceAs, ResourceHint};

/// Result of registering a hint
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// First request for this `(url, kind)`; the hint is now pending
    Created(ResourceHint),
    /// The pair was already registered; nothing changed
    Existing(ResourceHint),
    /// The href could not be canonicalized; nothing was recorded
    Rejected(PreloadError),
}

impl Registration {
    /// Whether the caller should go on and issue the platform hint
    pub fn is_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }

    pub fn hint(&self) -> Option<&ResourceHint> {
        match self {
            Registration::Created(hint) | Registration::Existing(hint) => Some(hint),
            Registration::Rejected(_) => None,
        }
    }
}

/// Aggregate view over every registered hint, recomputed on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadPerformanceSummary {
    /// Distinct `(url, kind)` pairs registered since the last clear
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / completed`, or 0 when nothing has completed
    pub success_rate: f64,
    /// Mean time to completion over completed hints, in milliseconds
    pub average_load_time_ms: f64,
    pub preloaded_resources: usize,
    pub preinitialized_resources: usize,
    pub prefetched_domains: usize,
    pub preconnected_domains: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Position of each key in `hints`
    index: HashMap<HintKey, usize>,
    /// Hints in registration order
    hints: Vec<ResourceHint>,
}

/// Deduplicating ledger of every resource hint issued during the page session.
///
/// Constructed once at application start and shared by reference (usually
/// through the [`Preloader`](crate::Preloader) that owns it).
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    /// Base URL that relative hrefs resolve against (the page origin)
    base_url: Option<Url>,
    state: RwLock<RegistryState>,
}

impl ResourceRegistry {
    /// Create a registry that only accepts absolute URLs
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that resolves relative hrefs against `base_url`
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url: Some(base_url),
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Canonicalize `href` for `kind` against this registry's base URL
    pub fn resolve(&self, href: &str, kind: HintKind) -> Result<HintKey, PreloadError> {
        HintKey::resolve(href, kind, self.base_url.as_ref())
    }

    /// Register a hint for `href`.
    ///
    /// Malformed hrefs are logged and returned as [`Registration::Rejected`];
    /// this never panics.
    pub fn register(
        &self,
        href: &str,
        kind: HintKind,
        sub_kind: Option<ResourceAs>,
        priority: FetchPriority,
    ) -> Registration {
        match self.resolve(href, kind) {
            Ok(key) => self.register_key(key, sub_kind, priority),
            Err(err) => {
                log::warn!("Skipping {} hint for {:?}: {}", kind, href, err);
                Registration::Rejected(err)
            }
        }
    }

    /// Register an already canonical key
    pub fn register_key(
        &self,
        key: HintKey,
        sub_kind: Option<ResourceAs>,
        priority: FetchPriority,
    ) -> Registration {
        let mut state = self.state.write();

        if let Some(&position) = state.index.get(&key) {
            return Registration::Existing(state.hints[position].clone());
        }

        let hint = ResourceHint::pending(key.clone(), sub_kind, priority);
        let position = state.hints.len();
        state.hints.push(hint.clone());
        state.index.insert(key, position);

        log::debug!("Registered {} hint for {}", hint.kind, hint.url);
        Registration::Created(hint)
    }

    /// Settle the pending hint for `key`.
    ///
    /// Returns false (and changes nothing) when there is no matching pending entry.
    pub fn complete(&self, key: &HintKey, outcome: HintOutcome, error_detail: Option<String>) -> bool {
        if outcome == HintOutcome::Pending {
            return false;
        }

        let mut state = self.state.write();
        let Some(&position) = state.index.get(key) else {
            return false;
        };

        let hint = &mut state.hints[position];
        if !hint.is_pending() {
            return false;
        }

        hint.outcome = outcome;
        hint.completed_at = Some(Instant::now());
        hint.error_detail = error_detail;
        true
    }

    /// Convenience wrapper that canonicalizes `href` first
    pub fn complete_href(
        &self,
        href: &str,
        kind: HintKind,
        outcome: HintOutcome,
        error_detail: Option<String>,
    ) -> bool {
        match self.resolve(href, kind) {
            Ok(key) => self.complete(&key, outcome, error_detail),
            Err(_) => false,
        }
    }

    pub fn get(&self, key: &HintKey) -> Option<ResourceHint> {
        let state = self.state.read();
        state.index.get(key).map(|&position| state.hints[position].clone())
    }

    pub fn contains(&self, key: &HintKey) -> bool {
        self.state.read().index.contains_key(key)
    }

    /// Snapshot of every hint in registration order
    pub fn hints(&self) -> Vec<ResourceHint> {
        self.state.read().hints.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the performance summary from the current entries
    pub fn summarize(&self) -> PreloadPerformanceSummary {
        let state = self.state.read();
        let mut summary = PreloadPerformanceSummary {
            total: state.hints.len(),
            ..PreloadPerformanceSummary::default()
        };

        let mut total_time = Duration::ZERO;
        for hint in &state.hints {
            match hint.kind {
                HintKind::Preload => summary.preloaded_resources += 1,
                HintKind::Preinit => summary.preinitialized_resources += 1,
                HintKind::DnsPrefetch => summary.prefetched_domains += 1,
                HintKind::Preconnect => summary.preconnected_domains += 1,
            }

            match hint.outcome {
                HintOutcome::Pending => continue,
                HintOutcome::Success => summary.successful += 1,
                HintOutcome::Failure => summary.failed += 1,
            }
            summary.completed += 1;
            total_time += hint.duration().unwrap_or_default();
        }

        if summary.completed > 0 {
            summary.success_rate = summary.successful as f64 / summary.completed as f64;
            summary.average_load_time_ms =
                total_time.as_secs_f64() * 1000.0 / summary.completed as f64;
        }

        summary
    }

    /// Drop every entry. Intended for test isolation.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.index.clear();
        state.hints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::with_base_url(Url::parse("https://datawise.bet").unwrap())
    }

    #[test]
    fn test_register_is_idempotent_per_url_and_kind() {
        let registry = registry();

        let first = registry.register("/hero.webp", HintKind::Preload, Some(ResourceAs::Image), FetchPriority::High);
        let second = registry.register("https://datawise.bet/hero.webp", HintKind::Preload, Some(ResourceAs::Image), FetchPriority::Low);
        assert!(first.is_created());
        assert!(matches!(second, Registration::Existing(ref hint) if hint.priority == FetchPriority::High));

        // Same URL under another kind is a separate entry
        let third = registry.register("/hero.webp", HintKind::Preinit, Some(ResourceAs::Image), FetchPriority::Auto);
        assert!(third.is_created());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rejected_registration_records_nothing() {
        let registry = ResourceRegistry::new();
        let result = registry.register("/relative-without-base.png", HintKind::Preload, None, FetchPriority::Auto);
        assert!(matches!(result, Registration::Rejected(PreloadError::InvalidUrl { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_complete_only_touches_pending_entries() {
        let registry = registry();
        let key = registry.resolve("/app.js", HintKind::Preinit).unwrap();

        assert!(!registry.complete(&key, HintOutcome::Success, None));

        registry.register_key(key.clone(), Some(ResourceAs::Script), FetchPriority::Auto);
        assert!(registry.complete(&key, HintOutcome::Failure, Some("404".into())));
        assert!(!registry.complete(&key, HintOutcome::Success, None));

        let hint = registry.get(&key).unwrap();
        assert_eq!(hint.outcome, HintOutcome::Failure);
        assert_eq!(hint.error_detail.as_deref(), Some("404"));
        assert!(hint.completed_at.is_some());
    }

    #[test]
    fn test_summary_of_empty_registry_has_zero_rate() {
        let summary = registry().summarize();
        assert_eq!(summary, PreloadPerformanceSummary::default());
        assert!(!summary.success_rate.is_nan());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_counts_and_durations() {
        let registry = registry();
        let a = registry.resolve("/a.webp", HintKind::Preload).unwrap();
        let b = registry.resolve("/b.webp", HintKind::Preload).unwrap();
        registry.register_key(a.clone(), Some(ResourceAs::Image), FetchPriority::High);
        registry.register_key(b.clone(), Some(ResourceAs::Image), FetchPriority::High);
        registry.register("https://fonts.googleapis.com", HintKind::DnsPrefetch, None, FetchPriority::Auto);
        registry.register("https://fonts.gstatic.com", HintKind::Preconnect, None, FetchPriority::Auto);

        tokio::time::advance(Duration::from_millis(100)).await;
        registry.complete(&a, HintOutcome::Success, None);
        tokio::time::advance(Duration::from_millis(200)).await;
        registry.complete(&b, HintOutcome::Failure, Some("error".into()));

        let summary = registry.summarize();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.average_load_time_ms, 200.0);
        assert_eq!(summary.preloaded_resources, 2);
        assert_eq!(summary.prefetched_domains, 1);
        assert_eq!(summary.preconnected_domains, 1);
    }

    #[test]
    fn test_clear_resets_dedup_and_metrics() {
        let registry = registry();
        registry.register("/a.webp", HintKind::Preload, None, FetchPriority::Auto);
        registry.clear();
        assert_eq!(registry.summarize().total, 0);
        assert!(registry.register("/a.webp", HintKind::Preload, None, FetchPriority::Auto).is_created());
    }
}
