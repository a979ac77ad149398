/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Rentalito – paced MQTT republisher for scrolling LED displays.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/      – rentalito.yaml loading and validation
//! ├── routes       – topic registry (slots, repetitions, expiry, priority)
//! ├── render/      – payload → display text filters, synthetic clock topics
//! ├── scheduler/   – rotation queue, repetition budget, pacing
//! ├── broker/      – MQTT session (rumqttc) and the Outbound seam
//! ├── relay        – single owner of the scheduler; event + tick loop
//! └── daemon/      – pidfile, signals, start / stop / restart
//! ```

pub mod broker;
pub mod config;
pub mod daemon;
pub mod relay;
pub mod render;
pub mod routes;
pub mod scheduler;
