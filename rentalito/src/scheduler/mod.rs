/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Slot scheduler: fair, paced interleaving of many topics onto one display.
//!
//! [`SlotScheduler`] keeps a rotation queue of [`Slot`]s.  Each inbound message
//! lands in the next rotation position of its topic, either refreshing the
//! slot already queued for that position or creating a new one.  Every
//! [`tick`](SlotScheduler::tick) pops the head of the queue, renders it, and
//! re-appends it while its repetition budget lasts.
//!
//! # Ordering rules
//!
//! | Event | Non-priority route | Priority route |
//! |---|---|---|
//! | New identity | append at tail | push at head |
//! | Known identity (still queued) | refresh in place | refresh and move to head |
//! | Republished, budget left | re-append at tail | re-append at tail |
//!
//! Ordering is decided at insert time only; `tick` always takes the head.
//!
//! # Pacing
//! After each publish no further slot is dequeued until
//! `now + Pacing::delay_for(text)`.  Dropping an expired slot does **not**
//! consume pacing time, so a run of stale slots drains on consecutive ticks.
//!
//! # Example
//! ```rust,ignore
//! let mut scheduler = SlotScheduler::new(Arc::new(registry), renderer, Pacing::default());
//! scheduler.on_message("/home/temp", b"21.5", Instant::now());
//! if let TickOutcome::Published { text, .. } = scheduler.tick(Instant::now()) {
//!     outbound.publish(&publish_to, &text)?;
//! }
//! ```

pub mod pacing;
pub mod slot;

pub use pacing::Pacing;
pub use slot::Slot;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::render::Render;
use crate::routes::{Repetitions, TopicRegistry};

// ── Tick outcome ──────────────────────────────────────────────────────────────

/// What a single [`SlotScheduler::tick`] call did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing queued, or still inside the pacing window.
    Idle,

    /// The head slot was past its deadline and was discarded unpublished.
    Expired { topic: String, index: usize },

    /// `text` must be published on the output topic.  The scheduler stays
    /// quiet for `delay`.
    Published {
        topic: String,
        index: usize,
        text: String,
        delay: Duration,
    },
}

// ── SlotScheduler ─────────────────────────────────────────────────────────────

/// Owns the rotation queue, the per-topic rotation counters and the pacing
/// timer.
///
/// All state is per instance; nothing is global, so independent schedulers
/// (one per test, for instance) never interfere.
pub struct SlotScheduler<R: Render> {
    registry: Arc<TopicRegistry>,
    renderer: R,
    pacing: Pacing,

    queue: VecDeque<Slot>,

    /// topic → rotation index handed out to the most recent message.
    last_index: HashMap<String, usize>,

    /// `None` until the first publish.
    next_allowed: Option<Instant>,
}

impl<R: Render> SlotScheduler<R> {
    pub fn new(registry: Arc<TopicRegistry>, renderer: R, pacing: Pacing) -> Self {
        Self {
            registry,
            renderer,
            pacing,
            queue: VecDeque::new(),
            last_index: HashMap::new(),
            next_allowed: None,
        }
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Upserts the slot for the next rotation position of `topic`.
    ///
    /// Topics without a route are ignored; the relay filters them out before
    /// this point.
    pub fn on_message(&mut self, topic: &str, raw: &[u8], now: Instant) {
        let (slot_count, repetitions, expiry, priority) = match self.registry.get(topic) {
            Some(r) => (r.slot_count, r.repetitions, r.expiry, r.priority),
            None => {
                debug!(topic = %topic, "no route for topic, message ignored");
                return;
            }
        };

        let index = self.advance_index(topic, slot_count);
        // A deadline past the end of `Instant` is as good as none.
        let expires_at = expiry.and_then(|e| now.checked_add(e));

        match self.position_of(topic, index) {
            Some(pos) => {
                let slot = &mut self.queue[pos];
                slot.value = raw.to_vec();
                slot.repetitions = repetitions;
                slot.expires_at = expires_at;

                if priority && pos != 0 {
                    if let Some(slot) = self.queue.remove(pos) {
                        self.queue.push_front(slot);
                    }
                }
                debug!(topic = %topic, index, position = pos, priority, "slot refreshed");
            }
            None => {
                let slot = Slot {
                    topic: topic.to_string(),
                    index,
                    value: raw.to_vec(),
                    repetitions,
                    expires_at,
                };
                if priority {
                    self.queue.push_front(slot);
                } else {
                    self.queue.push_back(slot);
                }
                debug!(topic = %topic, index, priority, queued = self.queue.len(), "slot created");
            }
        }
    }

    /// Queues an immortal, indefinitely repeating slot with no originating
    /// message (e.g. a clock topic whose value the renderer produces).
    ///
    /// Seeding an identity that is already queued is a no-op.
    pub fn seed(&mut self, topic: &str, raw: &[u8]) {
        if self.position_of(topic, 0).is_some() {
            return;
        }
        self.queue.push_back(Slot {
            topic: topic.to_string(),
            index: 0,
            value: raw.to_vec(),
            repetitions: Repetitions::Indefinite,
            expires_at: None,
        });
        info!(topic = %topic, "synthetic slot seeded");
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Dequeues and renders the head slot if the pacing window allows it.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if matches!(self.next_allowed, Some(t) if now < t) {
            return TickOutcome::Idle;
        }
        let Some(slot) = self.queue.pop_front() else {
            return TickOutcome::Idle;
        };

        if slot.is_expired(now) {
            debug!(topic = %slot.topic, index = slot.index, "slot expired, dropped");
            return TickOutcome::Expired {
                topic: slot.topic,
                index: slot.index,
            };
        }

        let text = self.renderer.render(&slot.topic, &slot.value);
        let delay = self.pacing.delay_for(&text);
        // `delay_for` never exceeds `MAX_DELAY`, a day past any real `now`.
        self.next_allowed = Some(now + delay);

        let topic = slot.topic.clone();
        let index = slot.index;

        match slot.repetitions.consume() {
            Some(repetitions) => {
                trace!(topic = %topic, index, ?repetitions, "slot re-enqueued");
                self.queue.push_back(Slot {
                    repetitions,
                    ..slot
                });
            }
            None => debug!(topic = %topic, index, "slot exhausted, retired"),
        }

        TickOutcome::Published {
            topic,
            index,
            text,
            delay,
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued slots, head first.
    pub fn queued(&self) -> impl Iterator<Item = &Slot> {
        self.queue.iter()
    }

    pub fn next_allowed(&self) -> Option<Instant> {
        self.next_allowed
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn advance_index(&mut self, topic: &str, slot_count: usize) -> usize {
        let slot_count = slot_count.max(1);
        let next = match self.last_index.get(topic) {
            Some(last) => (last + 1) % slot_count,
            None => 0,
        };
        self.last_index.insert(topic.to_string(), next);
        next
    }

    fn position_of(&self, topic: &str, index: usize) -> Option<usize> {
        self.queue.iter().position(|s| s.is_identity(topic, index))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
