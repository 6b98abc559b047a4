//! Viewer fan-out.
//!
//! Every connected viewer owns a single-slot queue holding the latest
//! [`DeviceSnapshot`]. A push replaces whatever the viewer has not read
//! yet, so a stalled viewer costs one snapshot of memory and converges on
//! the next read. Pushes never block, so they can be issued while the
//! registry lock is held and always leave in mutation order.

use dashmap::DashMap;
use ledbridge_protocol::DeviceSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Unique identifier for a connected viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer_{}", self.0)
    }
}

/// Receiving half of a viewer's push queue.
#[derive(Debug)]
pub struct ViewerUpdates {
    rx: watch::Receiver<DeviceSnapshot>,
}

impl ViewerUpdates {
    /// Wait for the next unread snapshot.
    ///
    /// Returns `None` once the viewer has been removed from the hub.
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<DeviceSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Take the unread snapshot, if any, without waiting.
    pub fn try_next(&mut self) -> Option<DeviceSnapshot> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }
}

/// Registry of connected viewers.
#[derive(Debug, Default)]
pub struct ViewerHub {
    viewers: DashMap<ViewerId, watch::Sender<DeviceSnapshot>>,
    next_id: AtomicU64,
}

impl ViewerHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer.
    ///
    /// Returns its identifier and the receiving end of its push queue.
    /// Nothing is readable until the first push.
    pub fn register(&self) -> (ViewerId, ViewerUpdates) {
        let id = ViewerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = watch::channel(DeviceSnapshot::default());
        self.viewers.insert(id, tx);
        debug!(viewer = %id, viewers = self.viewers.len(), "Viewer registered");
        (id, ViewerUpdates { rx })
    }

    /// Remove a viewer.
    ///
    /// Returns `true` if the viewer was registered.
    pub fn remove(&self, id: ViewerId) -> bool {
        let removed = self.viewers.remove(&id).is_some();
        if removed {
            debug!(viewer = %id, viewers = self.viewers.len(), "Viewer removed");
        }
        removed
    }

    /// Push a snapshot to a single viewer.
    ///
    /// Returns `false` and drops the viewer if its queue is closed.
    pub fn push_to(&self, id: ViewerId, snapshot: DeviceSnapshot) -> bool {
        let delivered = match self.viewers.get(&id) {
            Some(tx) => tx.send(snapshot).is_ok(),
            None => return false,
        };

        if !delivered {
            self.remove(id);
        }
        delivered
    }

    /// Push a snapshot to every viewer.
    ///
    /// Viewers whose queue is closed are dropped. Returns the number of
    /// viewers that received the snapshot.
    pub fn broadcast(&self, snapshot: &DeviceSnapshot) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.viewers.iter() {
            if entry.value().send(snapshot.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*entry.key());
            }
        }

        for id in closed {
            self.remove(id);
        }

        trace!(recipients = delivered, devices = snapshot.len(), "Broadcast snapshot");
        delivered
    }

    /// Get the number of connected viewers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Check if no viewer is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}
