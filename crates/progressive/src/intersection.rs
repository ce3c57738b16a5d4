//! Intersection observation host.
//!
//! The scheduler never talks to a real browser. Visibility comes from an
//! [`IntersectionHost`], which behaves like an intersection observer scoped to
//! one target: it reports an initial entry and then one entry every time the
//! target's intersection status changes, until disconnected.
//! [`SimulatedViewport`] is a geometric host for tests and the site simulator.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::margin::RootMargin;
use crate::visibility::GateOptions;

/// Opaque identifier of a DOM node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Axis-aligned rectangle in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Overlap of two rectangles. Edge-adjacent rectangles intersect with an
    /// empty area, as they do for intersection observers.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right < x || bottom < y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

/// One observation delivered to an observer callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub is_intersecting: bool,
    /// Visible fraction of the target, `0.0..=1.0`
    pub intersection_ratio: f64,
}

impl IntersectionEntry {
    pub fn visible(target: NodeId) -> Self {
        Self {
            target,
            is_intersecting: true,
            intersection_ratio: 1.0,
        }
    }

    pub fn hidden(target: NodeId) -> Self {
        Self {
            target,
            is_intersecting: false,
            intersection_ratio: 0.0,
        }
    }
}

pub type IntersectionCallback = Arc<dyn Fn(IntersectionEntry) + Send + Sync>;

/// Stops an observation. Disconnecting twice is a no-op.
pub trait ObserverHandle: Send {
    fn disconnect(&mut self);
}

/// Platform primitive that reports when a node nears the viewport
pub trait IntersectionHost: Send + Sync {
    /// Observe `target` until the returned handle is disconnected.
    ///
    /// The host may invoke `callback` before returning.
    fn observe(
        &self,
        target: NodeId,
        options: &GateOptions,
        callback: IntersectionCallback,
    ) -> Box<dyn ObserverHandle>;
}

struct Observer {
    id: u64,
    target: NodeId,
    root_margin: RootMargin,
    threshold: f64,
    callback: IntersectionCallback,
    last_status: bool,
}

struct ViewportState {
    width: f64,
    height: f64,
    scroll_y: f64,
    nodes: HashMap<NodeId, Rect>,
    observers: Vec<Observer>,
    next_observer: u64,
    observers_created: usize,
}

type Notification = (IntersectionCallback, IntersectionEntry);

impl ViewportState {
    fn root(&self) -> Rect {
        Rect::new(0.0, self.scroll_y, self.width, self.height)
    }

    fn entry_for(&self, target: NodeId, root_margin: &RootMargin) -> IntersectionEntry {
        let Some(rect) = self.nodes.get(&target) else {
            return IntersectionEntry::hidden(target);
        };

        let root = root_margin.expand(self.root());
        match rect.intersection(&root) {
            Some(overlap) => {
                let ratio = if rect.area() > 0.0 {
                    (overlap.area() / rect.area()).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                IntersectionEntry {
                    target,
                    is_intersecting: true,
                    intersection_ratio: ratio,
                }
            }
            None => IntersectionEntry::hidden(target),
        }
    }

    /// Recompute every observer and collect the ones whose status changed
    fn reevaluate(&mut self) -> Vec<Notification> {
        let entries: Vec<IntersectionEntry> = self
            .observers
            .iter()
            .map(|observer| self.entry_for(observer.target, &observer.root_margin))
            .collect();

        let mut notifications = Vec::new();
        for (observer, entry) in self.observers.iter_mut().zip(entries) {
            let status = passes(&entry, observer.threshold);
            if status != observer.last_status {
                observer.last_status = status;
                notifications.push((Arc::clone(&observer.callback), entry));
            }
        }
        notifications
    }
}

fn passes(entry: &IntersectionEntry, threshold: f64) -> bool {
    entry.is_intersecting && entry.intersection_ratio >= threshold
}

fn notify(notifications: Vec<Notification>) -> usize {
    let count = notifications.len();
    for (callback, entry) in notifications {
        callback(entry);
    }
    count
}

/// Geometric intersection host: a vertical scroll position over a document of
/// positioned nodes.
///
/// Callbacks always run after the internal lock is released, so they may
/// observe, disconnect or scroll again.
#[derive(Clone)]
pub struct SimulatedViewport {
    state: Arc<Mutex<ViewportState>>,
}

impl SimulatedViewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewportState {
                width,
                height,
                scroll_y: 0.0,
                nodes: HashMap::new(),
                observers: Vec::new(),
                next_observer: 0,
                observers_created: 0,
            })),
        }
    }

    /// Place (or move) a node
    pub fn insert_node(&self, node: NodeId, rect: Rect) -> usize {
        let notifications = {
            let mut state = self.state.lock();
            state.nodes.insert(node, rect);
            state.reevaluate()
        };
        notify(notifications)
    }

    pub fn remove_node(&self, node: NodeId) -> usize {
        let notifications = {
            let mut state = self.state.lock();
            state.nodes.remove(&node);
            state.reevaluate()
        };
        notify(notifications)
    }

    /// Scroll to `scroll_y`; returns how many observers were notified
    pub fn scroll_to(&self, scroll_y: f64) -> usize {
        let notifications = {
            let mut state = self.state.lock();
            state.scroll_y = scroll_y.max(0.0);
            state.reevaluate()
        };
        notify(notifications)
    }

    pub fn resize(&self, width: f64, height: f64) -> usize {
        let notifications = {
            let mut state = self.state.lock();
            state.width = width;
            state.height = height;
            state.reevaluate()
        };
        notify(notifications)
    }

    pub fn scroll_y(&self) -> f64 {
        self.state.lock().scroll_y
    }

    /// Force `entry` onto every live observer of `node`, regardless of geometry.
    /// Returns how many observers received it.
    pub fn deliver(&self, node: NodeId, entry: IntersectionEntry) -> usize {
        let notifications: Vec<Notification> = {
            let mut state = self.state.lock();
            state
                .observers
                .iter_mut()
                .filter(|observer| observer.target == node)
                .map(|observer| {
                    observer.last_status = passes(&entry, observer.threshold);
                    (Arc::clone(&observer.callback), entry)
                })
                .collect()
        };
        notify(notifications)
    }

    /// Observers that have not been disconnected
    pub fn live_observers(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn live_observers_for(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .observers
            .iter()
            .filter(|observer| observer.target == node)
            .count()
    }

    /// Observers created since construction
    pub fn observers_created(&self) -> usize {
        self.state.lock().observers_created
    }
}

impl Default for SimulatedViewport {
    fn default() -> Self {
        Self::new(1280.0, 800.0)
    }
}

impl std::fmt::Debug for SimulatedViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedViewport")
            .field("size", &(state.width, state.height))
            .field("scroll_y", &state.scroll_y)
            .field("nodes", &state.nodes.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl IntersectionHost for SimulatedViewport {
    fn observe(
        &self,
        target: NodeId,
        options: &GateOptions,
        callback: IntersectionCallback,
    ) -> Box<dyn ObserverHandle> {
        let (id, entry) = {
            let mut state = self.state.lock();
            let id = state.next_observer;
            state.next_observer += 1;
            state.observers_created += 1;

            let entry = state.entry_for(target, &options.root_margin);
            state.observers.push(Observer {
                id,
                target,
                root_margin: options.root_margin,
                threshold: options.threshold,
                callback: Arc::clone(&callback),
                last_status: passes(&entry, options.threshold),
            });
            (id, entry)
        };

        log::trace!("Observer {} attached to {}", id, target);
        callback(entry);

        Box::new(SimulatedObserver {
            id,
            viewport: Arc::downgrade(&self.state),
        })
    }
}

struct SimulatedObserver {
    id: u64,
    viewport: Weak<Mutex<ViewportState>>,
}

impl ObserverHandle for SimulatedObserver {
    fn disconnect(&mut self) {
        let Some(state) = self.viewport.upgrade() else {
            return;
        };
        self.viewport = Weak::new();

        // The detached callback may own the last reference to another handle,
        // so it is dropped only after the lock is released.
        let detached: Vec<Observer> = {
            let mut state = state.lock();
            let (detached, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.observers)
                .into_iter()
                .partition(|observer| observer.id == self.id);
            state.observers = kept;
            detached
        };
        drop(detached);
    }
}

impl Drop for SimulatedObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn recorder() -> (IntersectionCallback, Arc<PlMutex<Vec<IntersectionEntry>>>) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: IntersectionCallback = Arc::new(move |entry| sink.lock().push(entry));
        (callback, seen)
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(a.intersection(&Rect::new(50.0, 50.0, 100.0, 100.0)), Some(Rect::new(50.0, 50.0, 50.0, 50.0)));
        assert_eq!(a.intersection(&Rect::new(0.0, 100.0, 10.0, 10.0)), Some(Rect::new(0.0, 100.0, 10.0, 0.0)));
        assert_eq!(a.intersection(&Rect::new(0.0, 101.0, 10.0, 10.0)), None);
    }

    #[test]
    fn test_initial_entry_and_status_changes() {
        let viewport = SimulatedViewport::new(1000.0, 800.0);
        let node = NodeId(1);
        viewport.insert_node(node, Rect::new(0.0, 2000.0, 1000.0, 400.0));

        let (callback, seen) = recorder();
        let options = GateOptions::new(RootMargin::px(200.0), 0.0);
        let _handle = viewport.observe(node, &options, callback);
        assert_eq!(seen.lock().len(), 1);
        assert!(!seen.lock()[0].is_intersecting);

        // Margin-expanded root ends at 1199, still short of the node
        assert_eq!(viewport.scroll_to(199.0), 0);
        // Viewport bottom 1800 plus the 200px margin touches the node
        assert_eq!(viewport.scroll_to(1000.0), 1);
        assert!(seen.lock()[1].is_intersecting);
        // No change, no callback
        assert_eq!(viewport.scroll_to(1100.0), 0);
    }

    #[test]
    fn test_disconnect_stops_callbacks() {
        let viewport = SimulatedViewport::default();
        let node = NodeId(7);
        viewport.insert_node(node, Rect::new(0.0, 5000.0, 100.0, 100.0));

        let (callback, seen) = recorder();
        let mut handle = viewport.observe(node, &GateOptions::default(), callback);
        assert_eq!(viewport.live_observers(), 1);

        handle.disconnect();
        handle.disconnect();
        assert_eq!(viewport.live_observers(), 0);
        assert_eq!(viewport.deliver(node, IntersectionEntry::visible(node)), 0);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(viewport.observers_created(), 1);
    }

    #[test]
    fn test_dropping_handle_disconnects() {
        let viewport = SimulatedViewport::default();
        let (callback, _seen) = recorder();
        drop(viewport.observe(NodeId(1), &GateOptions::default(), callback));
        assert_eq!(viewport.live_observers(), 0);
    }
}
