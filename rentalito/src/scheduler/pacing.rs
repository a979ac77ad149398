/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reading-time pacing.
//!
//! After every publish the display needs time to scroll the text past the
//! reader.  The delay is
//!
//! ```text
//! delay = max(minimum_time, chars(last_segment(text)) × time_length_ratio)
//! ```
//!
//! where `last_segment` is the text after the final `|`.  Renderers emit
//! compound values such as `"{date}|{time}"` and only the trailing field is
//! assumed to scroll.

use std::time::Duration;

/// Field separator in compound rendered values.
pub const SEGMENT_DELIMITER: char = '|';

/// Default `general.minimum_time`, in seconds.
pub const DEFAULT_MINIMUM_TIME_SECS: f64 = 5.0;

/// Default `general.time_length_ratio`, in seconds per character.
pub const DEFAULT_TIME_LENGTH_RATIO: f64 = 0.5;

/// Upper bound for any single display delay.  Longer requests saturate here
/// so that deadlines computed from them never overflow an `Instant`.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Process-wide pacing constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub minimum_time: Duration,
    /// Seconds of display time per character of the last segment.
    pub time_length_ratio: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            minimum_time: Duration::from_secs_f64(DEFAULT_MINIMUM_TIME_SECS),
            time_length_ratio: DEFAULT_TIME_LENGTH_RATIO,
        }
    }
}

impl Pacing {
    pub fn new(minimum_time: Duration, time_length_ratio: f64) -> Self {
        Self {
            minimum_time,
            time_length_ratio,
        }
    }

    /// How long the display is busy after showing `text`, at most
    /// [`MAX_DELAY`].
    pub fn delay_for(&self, text: &str) -> Duration {
        let length = last_segment(text).chars().count();
        let by_length = Duration::try_from_secs_f64(length as f64 * self.time_length_ratio)
            .unwrap_or(MAX_DELAY);
        self.minimum_time.max(by_length).min(MAX_DELAY)
    }
}

/// Text after the last [`SEGMENT_DELIMITER`], or the whole text when there is
/// none.
pub fn last_segment(text: &str) -> &str {
    match text.rfind(SEGMENT_DELIMITER) {
        Some(pos) => &text[pos + SEGMENT_DELIMITER.len_utf8()..],
        None => text,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment_splits_on_final_delimiter() {
        assert_eq!(last_segment("2024-01-01|12:00:00"), "12:00:00");
        assert_eq!(last_segment("a|b|c"), "c");
        assert_eq!(last_segment("plain"), "plain");
        assert_eq!(last_segment("trailing|"), "");
    }

    #[test]
    fn compound_text_uses_minimum_when_tail_is_short() {
        // tail "12:00:00" = 8 chars → 4 s < 5 s minimum
        let p = Pacing::default();
        assert_eq!(p.delay_for("2024-01-01|12:00:00"), Duration::from_secs(5));
    }

    #[test]
    fn long_plain_text_scales_with_length() {
        let p = Pacing::default();
        let text = "abcdefghijklmnopqrst"; // 20 chars → 10 s
        assert_eq!(p.delay_for(text), Duration::from_secs(10));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let p = Pacing::new(Duration::ZERO, 1.0);
        // 4 characters, 8 bytes
        assert_eq!(p.delay_for("ñáéí"), Duration::from_secs(4));
    }

    #[test]
    fn huge_ratio_saturates_instead_of_overflowing() {
        let p = Pacing::new(Duration::ZERO, 1e30);
        assert_eq!(p.delay_for("hello"), MAX_DELAY);

        let p = Pacing::new(Duration::MAX, 0.5);
        assert_eq!(p.delay_for("hello"), MAX_DELAY);
    }

    #[test]
    fn empty_text_waits_the_minimum() {
        let p = Pacing::new(Duration::from_millis(1500), 0.5);
        assert_eq!(p.delay_for(""), Duration::from_millis(1500));
    }
}
