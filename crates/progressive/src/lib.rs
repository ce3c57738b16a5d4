//! Datawise progressive loading
//!
//! Visibility-gated, priority-tiered loading of heavy page sections. A
//! [`LoadableUnit`] waits for its node to near the viewport, waits out its
//! tier's delay, then runs a [`ContentLoader`] while the host shows a skeleton
//! in a reserved box. Visibility comes from an [`IntersectionHost`]; tokio
//! drives the timers and loads.

pub mod config;
pub mod error;
pub mod intersection;
pub mod loader;
pub mod manager;
pub mod margin;
pub mod scheduler;
pub mod skeleton;
pub mod unit;
pub mod visibility;

pub use config::{Priority, SchedulerConfig, TierPolicy};
pub use error::{LoadError, ProgressiveError};
pub use intersection::{
    IntersectionCallback, IntersectionEntry, IntersectionHost, NodeId, ObserverHandle, Rect,
    SimulatedViewport,
};
pub use loader::ContentLoader;
pub use manager::ProgressiveLoadingManager;
pub use margin::{MarginLength, RootMargin};
pub use scheduler::{ManualProgress, ProgressiveScheduler, UnitFactory};
pub use skeleton::Skeleton;
pub use unit::{LoadCallback, LoadableUnit, UnitOptions, UnitState, View};
pub use visibility::{GateOptions, VisibilityWatcher};
