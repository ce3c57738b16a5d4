#![no_main]

use arbitrary::Arbitrary;
use datawise_preload::hint::HintKey;
use datawise_preload::{FetchPriority, HintKind, ResourceRegistry};
use libfuzzer_sys::fuzz_target;
use url::Url;

#[derive(Debug, Arbitrary)]
struct Input {
    href: String,
    relative: bool,
    kind: u8,
}

fuzz_target!(|input: Input| {
    if input.href.len() > 10_000 {
        return;
    }

    let kind = match input.kind % 4 {
        0 => HintKind::Preload,
        1 => HintKind::Preinit,
        2 => HintKind::DnsPrefetch,
        _ => HintKind::Preconnect,
    };

    let registry = if input.relative {
        match Url::parse("https://datawise.bet/") {
            Ok(base) => ResourceRegistry::with_base_url(base),
            Err(_) => return,
        }
    } else {
        ResourceRegistry::new()
    };

    let Ok(key) = HintKey::resolve(&input.href, kind, registry.base_url()) else {
        assert!(!registry.register(&input.href, kind, None, FetchPriority::Auto).is_created());
        return;
    };

    // A canonical key resolves to itself
    let again = HintKey::resolve(&key.url, kind, registry.base_url());
    assert_eq!(again.ok().as_ref(), Some(&key));

    // Registering twice yields one entry
    assert!(registry.register(&input.href, kind, None, FetchPriority::Auto).is_created());
    assert!(!registry.register(&key.url, kind, None, FetchPriority::Auto).is_created());
    assert_eq!(registry.len(), 1);
});
