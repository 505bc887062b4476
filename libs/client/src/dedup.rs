//! Duplicate suppression for inbound notifications.
//!
//! Two independent guards, both bounded with oldest-first eviction:
//! an id cache that drops any notification already processed, and a
//! per-entity throttle that drops bursts for the same subject inside the
//! dedup window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parlay_common::Notification;

/// Outcome of [`NotificationFilter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    DuplicateId,
    Throttled,
}

/// Insertion-ordered set with a fixed capacity.
#[derive(Debug)]
pub struct BoundedIdSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedIdSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Returns `false` if `id` was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.members.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

pub struct NotificationFilter {
    window: Duration,
    entity_capacity: usize,
    processed: BoundedIdSet,
    last_seen: HashMap<String, Instant>,
    entity_order: VecDeque<String>,
}

impl NotificationFilter {
    pub fn new(window: Duration, processed_capacity: usize, entity_capacity: usize) -> Self {
        Self {
            window,
            entity_capacity: entity_capacity.max(1),
            processed: BoundedIdSet::new(processed_capacity),
            last_seen: HashMap::new(),
            entity_order: VecDeque::new(),
        }
    }

    pub fn check(&mut self, notification: &Notification) -> Verdict {
        self.check_at(&notification.id, &notification.entity_id, Instant::now())
    }

    /// Decide whether a notification is admitted at `now`, recording it if so.
    pub fn check_at(&mut self, id: &str, entity_id: &str, now: Instant) -> Verdict {
        if self.processed.contains(id) {
            return Verdict::DuplicateId;
        }
        if let Some(last) = self.last_seen.get(entity_id) {
            if now.saturating_duration_since(*last) < self.window {
                return Verdict::Throttled;
            }
        }

        self.processed.insert(id);
        self.touch_entity(entity_id, now);
        Verdict::Admit
    }

    /// Record an id delivered through another path (e.g. the initial list).
    pub fn mark_processed(&mut self, id: &str) {
        self.processed.insert(id);
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn clear(&mut self) {
        self.processed.clear();
        self.last_seen.clear();
        self.entity_order.clear();
    }

    fn touch_entity(&mut self, entity_id: &str, now: Instant) {
        if self.last_seen.insert(entity_id.to_string(), now).is_none() {
            self.entity_order.push_back(entity_id.to_string());
        }
        while self.entity_order.len() > self.entity_capacity {
            if let Some(evicted) = self.entity_order.pop_front() {
                self.last_seen.remove(&evicted);
            }
        }
    }
}
