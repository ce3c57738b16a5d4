#![no_main]

use datawise_progressive::{Rect, RootMargin};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if raw.len() > 1_000 {
        return;
    }

    let Ok(margin) = raw.parse::<RootMargin>() else {
        return;
    };

    let printed = margin.to_string();
    let reparsed: RootMargin = printed
        .parse()
        .unwrap_or_else(|err| panic!("{printed:?} does not parse back: {err}"));
    assert_eq!(reparsed, margin);

    let _ = margin.expand(Rect::new(0.0, 0.0, 1280.0, 800.0));
});
