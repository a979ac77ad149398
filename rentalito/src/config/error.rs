/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured validation errors for `rentalito.yaml`.
//!
//! YAML syntax and I/O problems are reported through `anyhow` with file
//! context by the loader; everything here is a *semantic* problem in a file
//! that parsed fine.  Each variant names the offending key so the operator
//! can fix the file without reading code.

use thiserror::Error;

use crate::render::FilterError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// `general.publish_to` is absent or empty.
    #[error("general.publish_to is required and must not be empty")]
    MissingPublishTo,

    /// `slots: 0` would leave a route with no rotation position.
    #[error("route '{topic}': slots must be at least 1")]
    ZeroSlots { topic: String },

    /// Zero, negative, NaN, or too large to be a `Duration`.
    #[error("route '{topic}': expires must be a positive, representable number of seconds (got {value})")]
    InvalidExpiry { topic: String, value: f64 },

    /// `minimum_time` or `time_length_ratio` is negative or not finite, or
    /// `minimum_time` does not fit a `Duration`.
    #[error("general.{field} must be a finite, non-negative number in range (got {value})")]
    InvalidPacing { field: &'static str, value: f64 },

    #[error("mqtt.qos must be 0, 1 or 2 (got {0})")]
    InvalidQos(u8),

    #[error("mqtt.client_id must not be empty when clean_session is off")]
    MissingClientId,

    #[error(transparent)]
    Filter(#[from] FilterError),
}
