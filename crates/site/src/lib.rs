//! Datawise site session
//!
//! Wires the preload and progressive crates together the way the marketing
//! site does and replays a page visit against simulated hosts.

pub mod config;
pub mod session;

pub use config::{SectionSpec, SitePreloadConfig};
pub use session::{run_session, HintReport, SectionReport, SessionOptions, SessionReport};
