use std::sync::Arc;
use std::time::Duration;

use datawise_preload::{
    ConnectOptions, FetchPriority, HintKind, HintOutcome, InMemoryHead, PreinitOptions,
    PreloadEvent, PreloadOptions, Preloader, PreloaderConfig, ResourceSpec, RouteResources,
    StagedPreloadPlan,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn site_preloader() -> (Preloader, Arc<InMemoryHead>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let head = Arc::new(InMemoryHead::new());
    let preloader = Preloader::with_config(
        PreloaderConfig::with_base_url("https://datawise.bet"),
        head.clone(),
    )
    .expect("valid base URL");
    (preloader, head)
}

fn record_events(preloader: &Preloader) -> Arc<Mutex<Vec<PreloadEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    preloader.on_complete(move |event| sink.lock().push(event.clone()));
    events
}

#[test]
fn test_each_primitive_is_idempotent() {
    let (preloader, head) = site_preloader();

    for _ in 0..2 {
        preloader.preload("/lovable-uploads/DatawiseLogo.webp", &PreloadOptions::image());
        preloader.preinit("/vendor/identity-widget.js", &PreinitOptions::script());
        preloader.prefetch_dns("https://www.googletagmanager.com", &ConnectOptions::default());
        preloader.preconnect("https://fonts.gstatic.com", &ConnectOptions::anonymous());
    }

    assert_eq!(preloader.hints().len(), 4);
    assert_eq!(head.elements().len(), 4);
    for rel in ["preload", "dns-prefetch", "preconnect"] {
        assert_eq!(head.elements_with_rel(rel).len(), 1, "{rel}");
    }
}

#[test]
fn test_connect_hints_dedupe_by_origin() {
    let (preloader, head) = site_preloader();
    preloader.preconnect("https://fonts.gstatic.com/a.woff2", &ConnectOptions::default());
    preloader.preconnect("https://fonts.gstatic.com/b.woff2", &ConnectOptions::default());
    assert_eq!(head.elements_with_rel("preconnect").len(), 1);
}

#[test]
fn test_malformed_urls_never_register_connect_hints() {
    let (preloader, head) = site_preloader();

    for href in ["http://", "https://exa mple.com", "https://[::1", "javascript:void(0)", "data:text/plain,hi"] {
        preloader.prefetch_dns(href, &ConnectOptions::default());
        preloader.preconnect(href, &ConnectOptions::anonymous());
    }

    assert_eq!(preloader.summary().total, 0);
    assert!(head.elements().is_empty());
}

#[test]
fn test_completion_events_carry_current_summary() {
    let (preloader, head) = site_preloader();
    let events = record_events(&preloader);

    preloader.preload("/a.webp", &PreloadOptions::image());
    preloader.preload("/b.webp", &PreloadOptions::image());
    assert!(events.lock().is_empty());

    head.settle_success("https://datawise.bet/a.webp");
    head.settle_failure("https://datawise.bet/b.webp", "error");

    let events = events.lock();
    assert_eq!(events.len(), 2);

    let PreloadEvent::Complete { key, outcome, summary } = &events[1];
    assert_eq!(key.kind, HintKind::Preload);
    assert_eq!(key.url, "https://datawise.bet/b.webp");
    assert_eq!(*outcome, HintOutcome::Failure);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.success_rate, 0.5);
    assert_eq!(events[0].summary().completed, 1);
}

#[test]
fn test_total_counts_distinct_registrations_since_clear() {
    let (preloader, head) = site_preloader();

    let hrefs = ["/a.webp", "/b.webp", "/a.webp", "https://datawise.bet/b.webp", "/c.webp"];
    for href in hrefs {
        preloader.preload(href, &PreloadOptions::image());
    }
    preloader.preinit("/a.webp", &PreinitOptions::script());

    let summary = preloader.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.success_rate, 0.0);

    head.settle_all_success();
    preloader.clear_metrics();
    assert_eq!(preloader.summary().total, 0);

    preloader.preload("/a.webp", &PreloadOptions::image());
    assert_eq!(preloader.summary().total, 1);
}

#[test]
fn test_route_table_and_hover_share_one_hint() {
    let (preloader, head) = site_preloader();
    let hero = ResourceSpec::new(
        "/lovable-uploads/HeroImage.webp",
        PreloadOptions::image()
            .with_type("image/webp")
            .with_fetch_priority(FetchPriority::High),
    );
    let routes = RouteResources::new().with_route("/", vec![hero]);

    routes.preload_for_route(&preloader, "/");
    routes.preload_on_hover(&preloader, "https://datawise.bet/");

    let url = "https://datawise.bet/lovable-uploads/HeroImage.webp";
    assert_eq!(head.count_for_href(url), 1);
    let matching = preloader.hints().into_iter().filter(|hint| hint.url == url).count();
    assert_eq!(matching, 1);
    assert_eq!(preloader.summary().total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_staged_plan_defers_remaining_logos() {
    let (preloader, head) = site_preloader();
    let urls = (0..8).map(|i| format!("/lovable-uploads/logo-{i}.webp")).collect();
    let plan = StagedPreloadPlan::new(urls);

    let mut staged = tokio_test::task::spawn(plan.apply(&preloader));
    tokio_test::assert_pending!(staged.poll());
    assert_eq!(head.elements().len(), 6);
    assert!(head
        .elements()
        .iter()
        .all(|element| element.attr("fetchpriority") == Some("high")));

    tokio::time::advance(Duration::from_millis(999)).await;
    tokio_test::assert_pending!(staged.poll());
    assert_eq!(head.elements().len(), 6);

    tokio::time::advance(Duration::from_millis(1)).await;
    tokio_test::assert_ready!(staged.poll());

    let elements = head.elements();
    assert_eq!(elements.len(), 8);
    assert_eq!(elements[7].attr("fetchpriority"), Some("low"));
}
