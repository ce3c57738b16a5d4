use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::intersection::{IntersectionCallback, IntersectionEntry, IntersectionHost, NodeId, ObserverHandle};
use crate::margin::RootMargin;

/// Configuration of a visibility gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateOptions {
    /// Lookahead added to the viewport
    pub root_margin: RootMargin,
    /// Minimum visible fraction
    pub threshold: f64,
}

impl Default for GateOptions {
    /// Trigger early: `800px` of lookahead and any overlap at all
    fn default() -> Self {
        Self {
            root_margin: RootMargin::px(800.0),
            threshold: 0.0,
        }
    }
}

impl GateOptions {
    pub fn new(root_margin: RootMargin, threshold: f64) -> Self {
        Self {
            root_margin,
            threshold,
        }
    }

    pub fn with_root_margin(mut self, root_margin: RootMargin) -> Self {
        self.root_margin = root_margin;
        self
    }
}

#[derive(Default)]
struct WatcherState {
    visible: bool,
    observer: Option<Box<dyn ObserverHandle>>,
    /// Bumped by every `start`/`stop` so late callbacks from a replaced
    /// observation are ignored
    generation: u64,
}

/// One-shot visibility gate for a single node.
///
/// Reports visibility exactly once: the first entry that intersects (or has a
/// non-zero ratio) flips [`is_visible`](Self::is_visible) to true for good,
/// disconnects the observer and runs the `on_visible` callback. Entries that
/// arrive afterwards are ignored.
pub struct VisibilityWatcher {
    host: Arc<dyn IntersectionHost>,
    options: GateOptions,
    state: Arc<Mutex<WatcherState>>,
}

impl VisibilityWatcher {
    pub fn new(host: Arc<dyn IntersectionHost>, options: GateOptions) -> Self {
        Self {
            host,
            options,
            state: Arc::new(Mutex::new(WatcherState::default())),
        }
    }

    pub fn options(&self) -> &GateOptions {
        &self.options
    }

    /// Attach to `node`. Returns false without observing when the gate has
    /// already reported visible. Attaching again replaces the previous node.
    pub fn start<F>(&self, node: NodeId, on_visible: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let (generation, previous) = {
            let mut state = self.state.lock();
            if state.visible {
                log::trace!("Visibility gate for {} already open", node);
                return false;
            }
            state.generation += 1;
            (state.generation, state.observer.take())
        };
        if let Some(mut previous) = previous {
            previous.disconnect();
        }

        let on_visible = Mutex::new(Some(on_visible));
        let state = Arc::clone(&self.state);
        let callback: IntersectionCallback = Arc::new(move |entry: IntersectionEntry| {
            if !(entry.is_intersecting || entry.intersection_ratio > 0.0) {
                return;
            }

            let observer = {
                let mut state = state.lock();
                if state.visible || state.generation != generation {
                    return;
                }
                state.visible = true;
                state.observer.take()
            };

            log::debug!("{} became visible", entry.target);
            if let Some(mut observer) = observer {
                observer.disconnect();
            }
            let on_visible = on_visible.lock().take();
            if let Some(on_visible) = on_visible {
                on_visible();
            }
        });

        let mut observer = self.host.observe(node, &self.options, callback);

        // The host may have reported visibility before handing back the observer
        let mut state = self.state.lock();
        if state.visible || state.generation != generation {
            drop(state);
            observer.disconnect();
        } else {
            state.observer = Some(observer);
        }
        true
    }

    /// Detach without reporting visibility
    pub fn stop(&self) {
        let observer = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.observer.take()
        };
        if let Some(mut observer) = observer {
            observer.disconnect();
        }
    }

    /// Whether the gate has opened. Never goes back to false.
    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// Whether an observer is currently attached
    pub fn is_observing(&self) -> bool {
        self.state.lock().observer.is_some()
    }
}

impl Drop for VisibilityWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for VisibilityWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityWatcher")
            .field("options", &self.options)
            .field("visible", &self.is_visible())
            .field("observing", &self.is_observing())
            .finish()
    }
}
