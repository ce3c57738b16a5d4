//! Loadable units.
//!
//! A [`LoadableUnit`] wraps a [`ContentLoader`] and walks a strictly ordered
//! state machine:
//!
//! ```text
//! Unmounted -> WaitingVisible -> WaitingDelay -> Rendering -> Loaded
//!          \_______________ critical ______________/
//! ```
//!
//! The visibility gate opens the first edge, a one-shot timer the second and
//! the loader's completion the last. Everything after the gate runs in one
//! spawned task, so unmounting aborts it along with any pending timer.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{Priority, SchedulerConfig};
use crate::error::{LoadError, ProgressiveError};
use crate::intersection::{IntersectionHost, NodeId};
use crate::loader::ContentLoader;
use crate::margin::RootMargin;
use crate::skeleton::Skeleton;
use crate::visibility::{GateOptions, VisibilityWatcher};

/// Lifecycle of a unit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitState {
    Unmounted,
    WaitingVisible,
    WaitingDelay,
    Rendering,
    Loaded,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Unmounted => "unmounted",
            UnitState::WaitingVisible => "waiting-visible",
            UnitState::WaitingDelay => "waiting-delay",
            UnitState::Rendering => "rendering",
            UnitState::Loaded => "loaded",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type LoadCallback = Arc<dyn Fn() + Send + Sync>;

/// Per-unit options. Unset fields fall back to the scheduler configuration.
#[derive(Clone, Default)]
pub struct UnitOptions {
    pub priority: Priority,
    /// Reserved layout height until loaded (CSS length)
    pub min_height: Option<String>,
    /// Gate lookahead overriding the tier default
    pub preload_margin: Option<RootMargin>,
    pub skeleton: Option<Skeleton>,
    pub id: Option<String>,
    pub enable_virtualization: Option<bool>,
    /// Fired once, when the content has loaded
    pub on_load: Option<LoadCallback>,
}

impl UnitOptions {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn with_min_height(mut self, min_height: &str) -> Self {
        self.min_height = Some(min_height.to_string());
        self
    }

    pub fn with_preload_margin(mut self, margin: RootMargin) -> Self {
        self.preload_margin = Some(margin);
        self
    }

    pub fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_virtualization(mut self, enabled: bool) -> Self {
        self.enable_virtualization = Some(enabled);
        self
    }

    pub fn with_on_load<F>(mut self, on_load: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(on_load));
        self
    }
}

impl fmt::Debug for UnitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOptions")
            .field("priority", &self.priority)
            .field("min_height", &self.min_height)
            .field("preload_margin", &self.preload_margin)
            .field("skeleton", &self.skeleton)
            .field("id", &self.id)
            .field("enable_virtualization", &self.enable_virtualization)
            .field("on_load", &self.on_load.is_some())
            .finish()
    }
}

/// What the host should render for a unit right now
#[derive(Debug)]
pub enum View<C> {
    /// Empty box of `min_height`, used by virtualized off-screen units
    Reservation { min_height: String },
    /// Box of `min_height` holding an optional skeleton
    Placeholder {
        skeleton: Option<Skeleton>,
        min_height: String,
    },
    Content(Arc<C>),
}

impl<C> Clone for View<C> {
    fn clone(&self) -> Self {
        match self {
            View::Reservation { min_height } => View::Reservation {
                min_height: min_height.clone(),
            },
            View::Placeholder {
                skeleton,
                min_height,
            } => View::Placeholder {
                skeleton: skeleton.clone(),
                min_height: min_height.clone(),
            },
            View::Content(content) => View::Content(Arc::clone(content)),
        }
    }
}

impl<C> View<C> {
    pub fn is_content(&self) -> bool {
        matches!(self, View::Content(_))
    }
}

/// Runtime pieces shared by every unit of a scheduler
#[derive(Clone)]
pub(crate) struct UnitEnv {
    pub(crate) host: Arc<dyn IntersectionHost>,
    pub(crate) runtime: Handle,
    /// Units currently in `Rendering`
    pub(crate) rendering: Arc<AtomicUsize>,
}

struct UnitInner<C> {
    state: UnitState,
    cancelled: bool,
    /// Counted in `UnitEnv::rendering`
    counted: bool,
    content: Option<Arc<C>>,
    error: Option<LoadError>,
    rendering_started_at: Option<Instant>,
    loaded_at: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl<C> UnitInner<C> {
    fn begin_rendering(&mut self, rendering: &AtomicUsize) {
        self.state = UnitState::Rendering;
        self.rendering_started_at = Some(Instant::now());
        self.counted = true;
        rendering.fetch_add(1, Ordering::SeqCst);
    }

    fn end_rendering(&mut self, rendering: &AtomicUsize) {
        if std::mem::take(&mut self.counted) {
            rendering.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Everything the background task needs, detached from the unit itself
struct Driver<C> {
    id: String,
    inner: Arc<Mutex<UnitInner<C>>>,
    loader: Arc<dyn ContentLoader<C>>,
    rendering: Arc<AtomicUsize>,
    on_load: Option<LoadCallback>,
}

impl<C> Clone for Driver<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            inner: Arc::clone(&self.inner),
            loader: Arc::clone(&self.loader),
            rendering: Arc::clone(&self.rendering),
            on_load: self.on_load.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Driver<C> {
    /// Wait out the tier delay, then load
    async fn delayed(self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
        {
            let mut inner = self.inner.lock();
            if inner.cancelled || inner.state != UnitState::WaitingDelay {
                return;
            }
            inner.begin_rendering(&self.rendering);
        }
        log::debug!("Unit {} rendering", self.id);
        self.load().await;
    }

    async fn load(self) {
        let result = self.loader.load().await;

        let fire = {
            let mut inner = self.inner.lock();
            if inner.cancelled {
                return;
            }
            inner.end_rendering(&self.rendering);
            inner.task = None;

            match result {
                Ok(content) => {
                    inner.content = Some(Arc::new(content));
                    inner.state = UnitState::Loaded;
                    inner.loaded_at = Some(Instant::now());
                    true
                }
                Err(err) => {
                    log::warn!("Unit {} failed to load: {}", self.id, err);
                    inner.error = Some(err);
                    false
                }
            }
        };

        if fire {
            log::debug!("Unit {} loaded", self.id);
            if let Some(on_load) = &self.on_load {
                on_load();
            }
        }
    }
}

/// Visibility-gated, delayed, cancellable wrapper around a [`ContentLoader`].
///
/// Dropping a unit unmounts it.
pub struct LoadableUnit<C> {
    id: String,
    priority: Priority,
    delay: std::time::Duration,
    min_height: String,
    skeleton: Option<Skeleton>,
    virtualization: bool,
    watcher: VisibilityWatcher,
    runtime: Handle,
    driver: Driver<C>,
}

impl<C: Send + Sync + 'static> LoadableUnit<C> {
    pub(crate) fn new(
        id: String,
        options: UnitOptions,
        config: &SchedulerConfig,
        loader: Arc<dyn ContentLoader<C>>,
        env: UnitEnv,
    ) -> Self {
        let policy = config.policy(options.priority);
        let min_height = options
            .min_height
            .unwrap_or_else(|| config.default_min_height.clone());
        let gate = GateOptions::new(
            options.preload_margin.unwrap_or(policy.root_margin),
            config.threshold,
        );
        let skeleton = options
            .skeleton
            .or_else(|| Skeleton::for_priority(options.priority, &min_height));

        Self {
            priority: options.priority,
            delay: policy.delay(),
            skeleton,
            virtualization: options.enable_virtualization.unwrap_or(config.virtualization),
            watcher: VisibilityWatcher::new(env.host, gate),
            runtime: env.runtime,
            driver: Driver {
                id: id.clone(),
                inner: Arc::new(Mutex::new(UnitInner {
                    state: UnitState::Unmounted,
                    cancelled: false,
                    counted: false,
                    content: None,
                    error: None,
                    rendering_started_at: None,
                    loaded_at: None,
                    task: None,
                })),
                loader,
                rendering: env.rendering,
                on_load: options.on_load,
            },
            id,
            min_height,
        }
    }

    /// Attach the unit to `node` and start its lifecycle.
    ///
    /// Critical units enter `Rendering` before this returns. A unit mounts
    /// once; mounting again, or after unmounting, is an error.
    pub fn mount(&self, node: NodeId) -> Result<(), ProgressiveError> {
        {
            let mut inner = self.driver.inner.lock();
            if inner.cancelled {
                return Err(ProgressiveError::Detached { id: self.id.clone() });
            }
            if inner.state != UnitState::Unmounted {
                return Err(ProgressiveError::AlreadyMounted { id: self.id.clone() });
            }

            if self.priority == Priority::Critical {
                inner.begin_rendering(&self.driver.rendering);
                inner.task = Some(self.runtime.spawn(self.driver.clone().load()));
                log::debug!("Unit {} rendering immediately", self.id);
                return Ok(());
            }

            inner.state = UnitState::WaitingVisible;
        }

        log::trace!("Unit {} waiting for {} to become visible", self.id, node);
        let driver = self.driver.clone();
        let runtime = self.runtime.clone();
        let delay = self.delay;
        self.watcher.start(node, move || {
            let deadline = Instant::now() + delay;
            let mut inner = driver.inner.lock();
            if inner.cancelled || inner.state != UnitState::WaitingVisible {
                return;
            }
            inner.state = UnitState::WaitingDelay;
            log::debug!("Unit {} visible, rendering in {:?}", driver.id, delay);
            let task = driver.clone().delayed(deadline);
            inner.task = Some(runtime.spawn(task));
        });
        Ok(())
    }

    pub fn view(&self) -> Result<View<C>, LoadError> {
        let inner = self.driver.inner.lock();
        if let Some(err) = &inner.error {
            return Err(err.clone());
        }
        if let Some(content) = &inner.content {
            return Ok(View::Content(Arc::clone(content)));
        }

        if self.virtualization && !self.watcher.is_visible() && inner.state < UnitState::Rendering {
            return Ok(View::Reservation {
                min_height: self.min_height.clone(),
            });
        }
        Ok(View::Placeholder {
            skeleton: self.skeleton.clone(),
            min_height: self.min_height.clone(),
        })
    }
}

impl<C> LoadableUnit<C> {
    /// Cancel everything in flight. No transition and no `on_load` happens
    /// afterwards; the unit keeps the state it had.
    pub fn unmount(&self) {
        let task = {
            let mut inner = self.driver.inner.lock();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            inner.end_rendering(&self.driver.rendering);
            inner.task.take()
        };

        if let Some(task) = task {
            task.abort();
        }
        self.watcher.stop();
        log::trace!("Unit {} unmounted", self.id);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn min_height(&self) -> &str {
        &self.min_height
    }

    pub fn state(&self) -> UnitState {
        self.driver.inner.lock().state
    }

    pub fn is_visible(&self) -> bool {
        self.watcher.is_visible()
    }

    pub fn is_cancelled(&self) -> bool {
        self.driver.inner.lock().cancelled
    }

    pub fn rendering_started_at(&self) -> Option<Instant> {
        self.driver.inner.lock().rendering_started_at
    }

    pub fn loaded_at(&self) -> Option<Instant> {
        self.driver.inner.lock().loaded_at
    }

    pub fn content(&self) -> Option<Arc<C>> {
        self.driver.inner.lock().content.clone()
    }

    pub fn error(&self) -> Option<LoadError> {
        self.driver.inner.lock().error.clone()
    }
}

impl<C> Drop for LoadableUnit<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<C> fmt::Debug for LoadableUnit<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadableUnit")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("state", &self.state())
            .field("visible", &self.is_visible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::{IntersectionEntry, Rect, SimulatedViewport};
    use std::time::Duration;

    fn env(viewport: &SimulatedViewport) -> UnitEnv {
        UnitEnv {
            host: Arc::new(viewport.clone()),
            runtime: Handle::current(),
            rendering: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn make_unit<C, L>(viewport: &SimulatedViewport, options: UnitOptions, loader: L) -> LoadableUnit<C>
    where
        C: Send + Sync + 'static,
        L: ContentLoader<C> + 'static,
    {
        LoadableUnit::new(
            "test".into(),
            options,
            &SchedulerConfig::default(),
            Arc::new(loader),
            env(viewport),
        )
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_state_order() {
        assert!(UnitState::Unmounted < UnitState::WaitingVisible);
        assert!(UnitState::WaitingDelay < UnitState::Rendering);
        assert!(UnitState::Rendering < UnitState::Loaded);
        assert_eq!(serde_json::to_string(&UnitState::WaitingDelay).unwrap(), "\"waiting-delay\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_screen_unit_shows_skeleton() {
        let viewport = SimulatedViewport::default();
        let node = NodeId(1);
        viewport.insert_node(node, Rect::new(0.0, 10_000.0, 100.0, 100.0));
        let unit = make_unit(&viewport, UnitOptions::new(Priority::Medium).with_min_height("300px"), || async { Ok::<_, LoadError>("body") });

        unit.mount(node).unwrap();
        assert_eq!(unit.state(), UnitState::WaitingVisible);
        match unit.view().unwrap() {
            View::Placeholder { skeleton, min_height } => {
                assert_eq!(min_height, "300px");
                assert_eq!(skeleton, Some(Skeleton::Section { height: "300px".into() }));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtualized_unit_reserves_space_until_visible() {
        let viewport = SimulatedViewport::default();
        let node = NodeId(1);
        viewport.insert_node(node, Rect::new(0.0, 10_000.0, 100.0, 100.0));
        let unit = make_unit(
            &viewport,
            UnitOptions::new(Priority::High).with_virtualization(true),
            || async { Ok::<_, LoadError>(42u32) },
        );

        unit.mount(node).unwrap();
        assert!(matches!(unit.view(), Ok(View::Reservation { .. })));

        viewport.deliver(node, IntersectionEntry::visible(node));
        assert_eq!(unit.state(), UnitState::WaitingDelay);
        assert!(matches!(unit.view(), Ok(View::Placeholder { .. })));

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(unit.state(), UnitState::Loaded);
        assert_eq!(unit.content().as_deref(), Some(&42));
        assert!(unit.view().unwrap().is_content());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_failure_reaches_view_without_loading() {
        let viewport = SimulatedViewport::default();
        let node = NodeId(1);
        viewport.insert_node(node, Rect::new(0.0, 0.0, 100.0, 100.0));
        let loads = Arc::new(AtomicUsize::new(0));
        let on_load = Arc::clone(&loads);
        let unit: LoadableUnit<()> = make_unit(
            &viewport,
            UnitOptions::new(Priority::Critical).with_on_load(move || {
                on_load.fetch_add(1, Ordering::SeqCst);
            }),
            || async { Err(LoadError::failed("chunk 404")) },
        );

        unit.mount(node).unwrap();
        settle().await;

        assert_eq!(unit.state(), UnitState::Rendering);
        assert_eq!(unit.view().unwrap_err(), LoadError::failed("chunk 404"));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(unit.driver.rendering.load(Ordering::SeqCst), 0);
        assert!(unit.driver.inner.lock().task.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_twice_and_after_unmount_fail() {
        let viewport = SimulatedViewport::default();
        let unit = make_unit(&viewport, UnitOptions::new(Priority::Low), || async { Ok::<_, LoadError>(()) });

        unit.mount(NodeId(1)).unwrap();
        assert_eq!(
            unit.mount(NodeId(1)),
            Err(ProgressiveError::AlreadyMounted { id: "test".into() })
        );

        unit.unmount();
        assert!(matches!(unit.mount(NodeId(1)), Err(ProgressiveError::Detached { .. })));
        assert_eq!(viewport.live_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_while_rendering_drops_result() {
        let viewport = SimulatedViewport::default();
        let unit = make_unit(&viewport, UnitOptions::new(Priority::Critical), || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, LoadError>("late")
        });

        unit.mount(NodeId(1)).unwrap();
        assert_eq!(unit.driver.rendering.load(Ordering::SeqCst), 1);

        unit.unmount();
        assert_eq!(unit.driver.rendering.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(unit.state(), UnitState::Rendering);
        assert!(unit.content().is_none());
    }
}
