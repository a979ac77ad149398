/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! A queued value waiting for its turn on the display.

use std::time::Instant;

use crate::routes::Repetitions;

/// One live `(topic, index)` entry of the rotation queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub topic: String,

    /// Rotation position within the topic, `0 .. slot_count`.
    pub index: usize,

    /// Raw payload as received; rendered only when the slot is dequeued.
    pub value: Vec<u8>,

    pub repetitions: Repetitions,

    /// `None` means the slot never goes stale.
    pub expires_at: Option<Instant>,
}

impl Slot {
    pub fn is_identity(&self, topic: &str, index: usize) -> bool {
        self.index == index && self.topic == topic
    }

    /// Strictly past the deadline; a slot dequeued exactly at `expires_at`
    /// is still delivered.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }
}
