//! Datawise resource preloading
//!
//! A deduplicating registry of browser resource hints (preload, preinit,
//! dns-prefetch, preconnect), the primitives that issue them through a
//! document-head host, and the page-level preload plans built on top.
//! Hints are an optimization: nothing in this crate panics or propagates an
//! error because a hint could not be issued.

pub mod error;
pub mod events;
pub mod head;
pub mod hint;
pub mod plan;
pub mod preloader;
pub mod registry;
pub mod report;

/// Re-export common types for easier usage
pub use error::PreloadError;
pub use events::{EventBus, PreloadEvent, SubscriptionId};
pub use head::{AutoSettle, DocumentHead, ElementTag, HintElement, InMemoryHead, SettleCallback};
pub use hint::{
    ConnectOptions, CrossOrigin, FetchPriority, HintKey, HintKind, HintOutcome, PreinitAs,
    PreinitOptions, Precedence, PreloadOptions, ResourceAs, ResourceHint,
};
pub use plan::{
    preload_all, preload_from_attribute, parse_preload_attribute, CriticalResourcePlan,
    ResourceSpec, RouteResources, StagedPreloadPlan, ThirdPartyPlan,
};
pub use preloader::{Preloader, PreloaderConfig};
pub use registry::{PreloadPerformanceSummary, Registration, ResourceRegistry};
