#![no_main]

use std::sync::Arc;

use datawise_preload::{
    parse_preload_attribute, preload_from_attribute, AutoSettle, InMemoryHead, Preloader,
    PreloaderConfig,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if raw.len() > 10_000 {
        return;
    }

    let parsed = parse_preload_attribute(raw);

    let head = Arc::new(InMemoryHead::with_auto_settle(AutoSettle::Success));
    let Ok(preloader) = Preloader::with_config(
        PreloaderConfig::with_base_url("https://datawise.bet"),
        head.clone(),
    ) else {
        return;
    };

    let issued = preload_from_attribute(&preloader, raw);
    match parsed {
        Ok(specs) => assert_eq!(issued, specs.len()),
        Err(_) => assert_eq!(issued, 0),
    }

    // Never more elements than distinct hints
    assert_eq!(head.elements().len(), preloader.registry().len());
});
