//! Bounded live buffer with published snapshots
//!
//! The sink appends to a [`LiveBuffer`] from the reader thread while the
//! presentation layer reads on its own schedule. After each append the
//! buffer publishes a complete immutable copy through its
//! [`SnapshotHandle`]; a reader holding an older snapshot keeps a valid
//! view and the next `load()` returns the new one.

use crate::types::LivePoint;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Immutable view of the live buffer, most recent point last
pub type LiveSnapshot = Arc<[LivePoint]>;

/// Cloneable handle to the latest published snapshot
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    current: Arc<RwLock<LiveSnapshot>>,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::from(Vec::new()))),
        }
    }
}

impl SnapshotHandle {
    /// Latest published snapshot
    pub fn load(&self) -> LiveSnapshot {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, snapshot: LiveSnapshot) {
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Fixed-capacity ring of live points, oldest evicted first
#[derive(Debug)]
pub struct LiveBuffer {
    points: VecDeque<LivePoint>,
    capacity: usize,
    snapshot: SnapshotHandle,
}

impl LiveBuffer {
    /// Create an empty buffer holding at most `capacity` points (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
            snapshot: SnapshotHandle::default(),
        }
    }

    /// Append a point, evicting the oldest at capacity, and publish
    pub fn push(&mut self, point: LivePoint) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.publish();
    }

    /// Remove every point and publish the empty snapshot
    pub fn clear(&mut self) {
        self.points.clear();
        self.publish();
    }

    /// Number of points held
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of points held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate points oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LivePoint> + Clone {
        self.points.iter()
    }

    /// Handle for readers on other threads
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> LiveSnapshot {
        self.snapshot.load()
    }

    fn publish(&self) {
        let snapshot: LiveSnapshot = self.points.iter().cloned().collect();
        self.snapshot.publish(snapshot);
    }
}
