/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Topic registry: the static per-topic scheduling policy.
//!
//! ```text
//! broker ──(topic, payload)──►  TopicRegistry::get(topic)  ──►  TopicRoute  ──►  SlotScheduler
//!                                  ↑ unmatched topics stop here
//! ```
//!
//! The registry is built once from the configuration file and never mutated
//! afterwards.  It is shared behind an `Arc` between the relay (which filters
//! unmatched topics) and the scheduler (which reads the placement policy).

use std::collections::BTreeMap;
use std::time::Duration;

// ── Repetition budget ─────────────────────────────────────────────────────────

/// How many more times a slot may be republished after the current delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repetitions {
    /// No `repetitions` key in the configuration – republish forever.
    #[default]
    Indefinite,
    /// `Remaining(0)` publishes once more and retires the slot.
    Remaining(u32),
}

impl Repetitions {
    /// Builds the budget from the optional configuration value.
    pub fn from_config(v: Option<u32>) -> Self {
        match v {
            Some(n) => Repetitions::Remaining(n),
            None => Repetitions::Indefinite,
        }
    }

    /// Consumes one repetition.
    ///
    /// Returns `None` when the budget was already exhausted, i.e. the slot
    /// must not be re-enqueued.
    pub fn consume(self) -> Option<Self> {
        match self {
            Repetitions::Indefinite => Some(Repetitions::Indefinite),
            Repetitions::Remaining(0) => None,
            Repetitions::Remaining(n) => Some(Repetitions::Remaining(n - 1)),
        }
    }
}

// ── TopicRoute ────────────────────────────────────────────────────────────────

/// Scheduling policy for one input topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRoute {
    pub topic: String,

    /// Number of rotation positions the topic may occupy at once.  Always ≥ 1
    /// (enforced at configuration load).
    pub slot_count: usize,

    pub repetitions: Repetitions,

    /// Staleness window measured from the moment a value is (re-)enqueued.
    pub expiry: Option<Duration>,

    /// Priority slots are placed at the head of the rotation queue.
    pub priority: bool,
}

impl TopicRoute {
    /// A route with every field at its configuration default:
    /// one slot, indefinite repetitions, no expiry, not prioritary.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            slot_count: 1,
            repetitions: Repetitions::Indefinite,
            expiry: None,
            priority: false,
        }
    }

    pub fn with_slots(mut self, slot_count: usize) -> Self {
        self.slot_count = slot_count;
        self
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = Repetitions::Remaining(repetitions);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn prioritary(mut self) -> Self {
        self.priority = true;
        self
    }
}

// ── TopicRegistry ─────────────────────────────────────────────────────────────

/// Immutable topic → [`TopicRoute`] table.
///
/// `BTreeMap` keeps subscription order deterministic across runs.
#[derive(Debug, Default, Clone)]
pub struct TopicRegistry {
    routes: BTreeMap<String, TopicRoute>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the route for `route.topic`.
    pub fn insert(&mut self, route: TopicRoute) {
        self.routes.insert(route.topic.clone(), route);
    }

    pub fn get(&self, topic: &str) -> Option<&TopicRoute> {
        self.routes.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.routes.contains_key(topic)
    }

    /// Every registered input topic, in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<TopicRoute> for TopicRegistry {
    fn from_iter<I: IntoIterator<Item = TopicRoute>>(iter: I) -> Self {
        let mut registry = TopicRegistry::new();
        for route in iter {
            registry.insert(route);
        }
        registry
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
