use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use datawise_progressive::{
    GateOptions, IntersectionEntry, LoadError, LoadableUnit, NodeId, Priority,
    ProgressiveScheduler, Rect, SchedulerConfig, SimulatedViewport, UnitOptions, UnitState,
    View, VisibilityWatcher,
};
use futures::future::{self, BoxFuture, FutureExt};
use pretty_assertions::assert_eq;
use tokio::time::Instant;

fn page() -> SimulatedViewport {
    let viewport = SimulatedViewport::new(1280.0, 800.0);
    viewport.insert_node(NodeId(1), Rect::new(0.0, 0.0, 1280.0, 300.0));
    viewport.insert_node(NodeId(2), Rect::new(0.0, 300.0, 1280.0, 300.0));
    viewport.insert_node(NodeId(3), Rect::new(0.0, 600.0, 1280.0, 300.0));
    viewport.insert_node(NodeId(99), Rect::new(0.0, 20_000.0, 1280.0, 300.0));
    viewport
}

fn scheduler(viewport: &SimulatedViewport) -> ProgressiveScheduler {
    ProgressiveScheduler::new(SchedulerConfig::default(), Arc::new(viewport.clone()))
        .expect("inside a tokio runtime")
}

type Loaded = Result<&'static str, LoadError>;

fn section(name: &'static str) -> impl Fn() -> future::Ready<Loaded> + Send + Sync {
    move || future::ok(name)
}

/// Loader whose content takes 50ms to arrive
fn slow_section(name: &'static str) -> impl Fn() -> BoxFuture<'static, Loaded> + Send + Sync {
    move || {
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(name)
        }
        .boxed()
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Let spawned tasks reach their timers, move the clock, then let them react
async fn advance_ms(ms: u64) {
    settle().await;
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

fn load_counter() -> (Arc<AtomicUsize>, UnitOptions) {
    let loads = Arc::new(AtomicUsize::new(0));
    let hook = Arc::clone(&loads);
    let options = UnitOptions::default().with_on_load(move || {
        hook.fetch_add(1, Ordering::SeqCst);
    });
    (loads, options)
}

#[test]
fn test_visibility_never_reverts_and_ignores_retriggers() {
    let viewport = page();
    let node = NodeId(99);
    let watcher = VisibilityWatcher::new(Arc::new(viewport.clone()), GateOptions::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    watcher.start(node, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(!watcher.is_visible());

    assert_eq!(viewport.deliver(node, IntersectionEntry::visible(node)), 1);
    assert!(watcher.is_visible());

    // Observer is gone: re-triggering reaches nobody
    assert_eq!(viewport.deliver(node, IntersectionEntry::visible(node)), 0);
    assert_eq!(viewport.deliver(node, IntersectionEntry::hidden(node)), 0);
    viewport.scroll_to(0.0);
    viewport.scroll_to(19_800.0);

    assert!(watcher.is_visible());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(viewport.live_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_critical_unit_renders_synchronously_without_gate() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let unit = scheduler.unit(UnitOptions::new(Priority::Critical), slow_section("hero"));

    unit.mount(NodeId(99)).unwrap();
    assert_eq!(unit.state(), UnitState::Rendering);
    assert_eq!(unit.rendering_started_at(), Some(Instant::now()));
    assert_eq!(viewport.observers_created(), 0);
    assert!(matches!(unit.view(), Ok(View::Placeholder { skeleton: None, .. })));

    advance_ms(50).await;
    assert_eq!(unit.state(), UnitState::Loaded);
    assert_eq!(unit.content().as_deref(), Some(&"hero"));
}

#[tokio::test(start_paused = true)]
async fn test_low_priority_waits_full_delay_after_visibility() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let unit = scheduler.unit(UnitOptions::new(Priority::Low), section("faq"));

    unit.mount(NodeId(99)).unwrap();
    assert_eq!(unit.state(), UnitState::WaitingVisible);

    advance_ms(5_000).await;
    assert_eq!(unit.state(), UnitState::WaitingVisible);

    let visible_at = Instant::now();
    viewport.scroll_to(19_500.0);
    assert_eq!(unit.state(), UnitState::WaitingDelay);

    advance_ms(799).await;
    assert_eq!(unit.state(), UnitState::WaitingDelay);

    advance_ms(1).await;
    assert_eq!(unit.state(), UnitState::Loaded);
    let started = unit.rendering_started_at().unwrap();
    assert!(started >= visible_at + Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn test_unmount_during_delay_suppresses_on_load() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let (loads, options) = load_counter();
    let unit = scheduler.unit(options, section("pricing"));

    // Medium priority by default; node 1 is on screen
    unit.mount(NodeId(1)).unwrap();
    assert_eq!(unit.state(), UnitState::WaitingDelay);

    advance_ms(150).await;
    unit.unmount();
    assert!(unit.is_cancelled());

    advance_ms(10_000).await;
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(unit.state(), UnitState::WaitingDelay);
    assert!(unit.rendering_started_at().is_none());
    assert_eq!(scheduler.active_units(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_on_load_fires_exactly_once() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let (loads, options) = load_counter();
    let unit = scheduler.unit(options, section("testimonials"));

    unit.mount(NodeId(2)).unwrap();
    advance_ms(300).await;
    assert_eq!(unit.state(), UnitState::Loaded);

    unit.unmount();
    advance_ms(1_000).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tiers_render_in_priority_order() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let start = Instant::now();

    let critical = scheduler.unit(UnitOptions::new(Priority::Critical), slow_section("hero"));
    let medium = scheduler.unit(UnitOptions::new(Priority::Medium), slow_section("features"));
    let deferred = scheduler.unit(UnitOptions::new(Priority::Deferred), slow_section("footer"));
    let units: [&LoadableUnit<&'static str>; 3] = [&critical, &medium, &deferred];

    for (unit, node) in units.iter().zip([NodeId(1), NodeId(2), NodeId(3)]) {
        unit.mount(node).unwrap();
    }

    assert_eq!(critical.state(), UnitState::Rendering);
    assert_eq!(medium.state(), UnitState::WaitingDelay);
    assert_eq!(deferred.state(), UnitState::WaitingDelay);

    advance_ms(299).await;
    assert_eq!(medium.state(), UnitState::WaitingDelay);
    advance_ms(1).await;
    assert!(medium.state() >= UnitState::Rendering);
    assert!(deferred.state() < UnitState::Rendering);
    // Critical content arrived at 50ms; medium is the only unit loading
    assert_eq!(scheduler.active_units(), 1);

    advance_ms(1_699).await;
    assert_eq!(deferred.state(), UnitState::WaitingDelay);
    advance_ms(1).await;
    assert!(deferred.state() >= UnitState::Rendering);

    advance_ms(50).await;
    for unit in units {
        assert_eq!(unit.state(), UnitState::Loaded);
    }

    let critical_at = critical.rendering_started_at().unwrap();
    let medium_at = medium.rendering_started_at().unwrap();
    let deferred_at = deferred.rendering_started_at().unwrap();
    assert_eq!(critical_at, start);
    assert!(medium_at <= start + Duration::from_millis(300));
    assert!(deferred_at <= start + Duration::from_millis(2000));
    assert!(medium_at < deferred_at);
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_leaves_no_timers_behind() {
    let viewport = page();
    let scheduler = scheduler(&viewport);
    let (loads, options) = load_counter();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    let unit = scheduler.unit(
        UnitOptions {
            priority: Priority::High,
            ..options
        },
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<(), _>(LoadError::failed("chunk load failed")))
        },
    );

    unit.mount(NodeId(1)).unwrap();
    advance_ms(100).await;

    assert_eq!(unit.state(), UnitState::Rendering);
    assert_eq!(unit.error(), Some(LoadError::failed("chunk load failed")));
    assert!(unit.view().is_err());

    advance_ms(60_000).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.active_units(), 0);
}
