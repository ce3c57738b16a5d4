use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::{Priority, SchedulerConfig};
use crate::error::ProgressiveError;
use crate::intersection::IntersectionHost;
use crate::loader::ContentLoader;
use crate::unit::{LoadableUnit, UnitEnv, UnitOptions};

/// Builds loadable units that share one tier policy, intersection host and
/// runtime.
///
/// There is no admission control: any number of units may be rendering at
/// once. [`active_units`](Self::active_units) reports how many are.
#[derive(Clone)]
pub struct ProgressiveScheduler {
    config: Arc<SchedulerConfig>,
    env: UnitEnv,
    next_id: Arc<AtomicU64>,
}

impl ProgressiveScheduler {
    /// Create a scheduler on the current tokio runtime
    pub fn new(config: SchedulerConfig, host: Arc<dyn IntersectionHost>) -> Result<Self, ProgressiveError> {
        let runtime = Handle::try_current().map_err(|e| ProgressiveError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(config, host, runtime))
    }

    pub fn with_runtime(config: SchedulerConfig, host: Arc<dyn IntersectionHost>, runtime: Handle) -> Self {
        log::debug!(
            "Progressive scheduler ready ({} tiers, virtualization {})",
            config.tiers.len(),
            config.virtualization
        );
        Self {
            config: Arc::new(config),
            env: UnitEnv {
                host,
                runtime,
                rendering: Arc::new(AtomicUsize::new(0)),
            },
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Units currently rendering, across every unit this scheduler built
    pub fn active_units(&self) -> usize {
        self.env.rendering.load(Ordering::SeqCst)
    }

    /// Wrap `loader` into a single unit
    pub fn unit<C, L>(&self, options: UnitOptions, loader: L) -> LoadableUnit<C>
    where
        C: Send + Sync + 'static,
        L: ContentLoader<C> + 'static,
    {
        self.build(options, Arc::new(loader))
    }

    /// Wrap `loader` into a reusable factory; every unit it creates has the
    /// same options and loader but its own lifecycle
    pub fn with_progressive_loading<C, L>(&self, loader: L, options: UnitOptions) -> UnitFactory<C>
    where
        C: Send + Sync + 'static,
        L: ContentLoader<C> + 'static,
    {
        UnitFactory {
            scheduler: self.clone(),
            loader: Arc::new(loader),
            options,
        }
    }

    /// Imperative counterpart of a unit, for callers that render themselves
    pub fn manual(&self, priority: Priority) -> ManualProgress {
        ManualProgress::new(
            priority,
            self.config.policy(priority).delay(),
            self.env.runtime.clone(),
        )
    }

    fn build<C>(&self, options: UnitOptions, loader: Arc<dyn ContentLoader<C>>) -> LoadableUnit<C>
    where
        C: Send + Sync + 'static,
    {
        let id = options.id.clone().unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}", options.priority, n)
        });
        LoadableUnit::new(id, options, &self.config, loader, self.env.clone())
    }
}

impl std::fmt::Debug for ProgressiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveScheduler")
            .field("config", &self.config)
            .field("active_units", &self.active_units())
            .finish()
    }
}

/// Reusable unit factory returned by [`ProgressiveScheduler::with_progressive_loading`]
pub struct UnitFactory<C> {
    scheduler: ProgressiveScheduler,
    loader: Arc<dyn ContentLoader<C>>,
    options: UnitOptions,
}

impl<C: Send + Sync + 'static> UnitFactory<C> {
    pub fn create(&self) -> LoadableUnit<C> {
        self.scheduler.build(self.options.clone(), Arc::clone(&self.loader))
    }

    /// Create a unit with adjusted options, e.g. a per-instance id
    pub fn create_with<F>(&self, adjust: F) -> LoadableUnit<C>
    where
        F: FnOnce(UnitOptions) -> UnitOptions,
    {
        self.scheduler
            .build(adjust(self.options.clone()), Arc::clone(&self.loader))
    }

    pub fn options(&self) -> &UnitOptions {
        &self.options
    }
}

/// Visibility and load flags driven by the caller instead of a gate.
///
/// `trigger_load` marks the content loaded after the tier delay; critical
/// priority starts out loaded.
pub struct ManualProgress {
    priority: Priority,
    delay: Duration,
    runtime: Handle,
    loaded: Arc<AtomicBool>,
    visible: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ManualProgress {
    fn new(priority: Priority, delay: Duration, runtime: Handle) -> Self {
        Self {
            priority,
            delay,
            runtime,
            loaded: Arc::new(AtomicBool::new(priority == Priority::Critical)),
            visible: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    /// Start the tier timer. Does nothing when already loaded or pending.
    pub fn trigger_load(&self) {
        if self.is_loaded() {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let loaded = Arc::clone(&self.loaded);
        let delay = self.delay;
        *timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            loaded.store(true, Ordering::SeqCst);
        }));
    }
}

impl Drop for ManualProgress {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for ManualProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualProgress")
            .field("priority", &self.priority)
            .field("loaded", &self.is_loaded())
            .field("visible", &self.is_visible())
            .finish()
    }
}
