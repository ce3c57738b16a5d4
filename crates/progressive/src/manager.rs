use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::intersection::{IntersectionCallback, IntersectionEntry, IntersectionHost, NodeId, ObserverHandle};
use crate::margin::{MarginLength, RootMargin};
use crate::visibility::GateOptions;

type TargetCallback = Box<dyn FnOnce() + Send>;

struct Target {
    generation: u64,
    observer: Option<Box<dyn ObserverHandle>>,
    callback: Option<TargetCallback>,
}

#[derive(Default)]
struct ManagerState {
    targets: HashMap<NodeId, Target>,
    next_generation: u64,
}

/// Shared gate for many targets.
///
/// Every target gets `500px 0px` of vertical lookahead. A target's callback
/// runs at most once, on its first intersecting entry, and the target is
/// unobserved right before.
pub struct ProgressiveLoadingManager {
    host: Arc<dyn IntersectionHost>,
    options: GateOptions,
    state: Arc<Mutex<ManagerState>>,
}

impl ProgressiveLoadingManager {
    pub fn new(host: Arc<dyn IntersectionHost>) -> Self {
        let margin = RootMargin::vertical(MarginLength::Px(500.0), MarginLength::ZERO);
        Self::with_options(host, GateOptions::new(margin, 0.0))
    }

    pub fn with_options(host: Arc<dyn IntersectionHost>, options: GateOptions) -> Self {
        Self {
            host,
            options,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Run `callback` once when `node` intersects. Replaces an earlier
    /// registration for the same node.
    pub fn observe<F>(&self, node: NodeId, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.unobserve(node);

        let generation = {
            let mut state = self.state.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            state.targets.insert(
                node,
                Target {
                    generation,
                    observer: None,
                    callback: Some(Box::new(callback)),
                },
            );
            generation
        };

        let state = Arc::clone(&self.state);
        let on_entry: IntersectionCallback = Arc::new(move |entry: IntersectionEntry| {
            if !entry.is_intersecting {
                return;
            }

            let target = {
                let mut state = state.lock();
                let current = state
                    .targets
                    .get(&entry.target)
                    .is_some_and(|target| target.generation == generation);
                if current {
                    state.targets.remove(&entry.target)
                } else {
                    None
                }
            };

            if let Some(mut target) = target {
                if let Some(mut observer) = target.observer.take() {
                    observer.disconnect();
                }
                if let Some(callback) = target.callback.take() {
                    log::trace!("{} entered the loading zone", entry.target);
                    callback();
                }
            }
        });

        let mut observer = self.host.observe(node, &self.options, on_entry);

        // The target may already have fired while the host was attaching
        let mut state = self.state.lock();
        if let Some(target) = state
            .targets
            .get_mut(&node)
            .filter(|target| target.generation == generation)
        {
            target.observer = Some(observer);
            return;
        }
        drop(state);
        observer.disconnect();
    }

    /// Stop watching `node` without running its callback
    pub fn unobserve(&self, node: NodeId) -> bool {
        let target = self.state.lock().targets.remove(&node);
        match target {
            Some(mut target) => {
                if let Some(mut observer) = target.observer.take() {
                    observer.disconnect();
                }
                true
            }
            None => false,
        }
    }

    /// Stop watching every target
    pub fn disconnect(&self) {
        let targets: Vec<Target> = self.state.lock().targets.drain().map(|(_, target)| target).collect();
        for mut target in targets {
            if let Some(mut observer) = target.observer.take() {
                observer.disconnect();
            }
        }
    }

    /// Targets still waiting to intersect
    pub fn len(&self) -> usize {
        self.state.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ProgressiveLoadingManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ProgressiveLoadingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveLoadingManager")
            .field("options", &self.options)
            .field("targets", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::{Rect, SimulatedViewport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (SimulatedViewport, ProgressiveLoadingManager, Arc<AtomicUsize>) {
        let viewport = SimulatedViewport::new(1000.0, 800.0);
        let manager = ProgressiveLoadingManager::new(Arc::new(viewport.clone()));
        (viewport, manager, Arc::new(AtomicUsize::new(0)))
    }

    fn bump(hits: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let hits = Arc::clone(hits);
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fires_once_per_target_with_vertical_lookahead() {
        let (viewport, manager, hits) = setup();
        // Just below the 500px lookahead
        viewport.insert_node(NodeId(1), Rect::new(0.0, 1301.0, 100.0, 100.0));
        viewport.insert_node(NodeId(2), Rect::new(0.0, 3000.0, 100.0, 100.0));

        manager.observe(NodeId(1), bump(&hits));
        manager.observe(NodeId(2), bump(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(manager.len(), 2);

        viewport.scroll_to(10.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);

        viewport.scroll_to(0.0);
        viewport.scroll_to(10.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        viewport.scroll_to(2500.0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(manager.is_empty());
        assert_eq!(viewport.live_observers(), 0);
    }

    #[test]
    fn test_horizontal_margin_is_zero() {
        let (viewport, manager, hits) = setup();
        viewport.insert_node(NodeId(1), Rect::new(1100.0, 0.0, 100.0, 100.0));
        manager.observe(NodeId(1), bump(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unobserve_and_disconnect() {
        let (viewport, manager, hits) = setup();
        for id in 1..=3 {
            viewport.insert_node(NodeId(id), Rect::new(0.0, 5000.0, 100.0, 100.0));
            manager.observe(NodeId(id), bump(&hits));
        }

        assert!(manager.unobserve(NodeId(1)));
        assert!(!manager.unobserve(NodeId(1)));
        assert_eq!(viewport.live_observers(), 2);

        manager.disconnect();
        assert!(manager.is_empty());
        assert_eq!(viewport.live_observers(), 0);

        viewport.scroll_to(4800.0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_already_visible_target_fires_during_observe() {
        let (viewport, manager, hits) = setup();
        viewport.insert_node(NodeId(9), Rect::new(0.0, 0.0, 100.0, 100.0));
        manager.observe(NodeId(9), bump(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
        assert_eq!(viewport.live_observers(), 0);
    }
}
