/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Configuration loading for `rentalito.yaml`.
//!
//! The expected YAML structure is:
//! ```yaml
//! general:
//!   pidfile: /tmp/rentalito.pid
//!   stdout: /var/log/rentalito.log
//!   stderr: /var/log/rentalito.err
//!   debug: false
//!   minimum_time: 5
//!   time_length_ratio: 0.5
//!   publish_to: /display/text
//!   routes:
//!     /home/temperature: { slots: 1, repetitions: 2, expires: 60, prioritary: 1 }
//!     /home/news: { slots: 3 }
//!     /clock/time:
//! mqtt:
//!   client_id: rentalito
//!   host: localhost
//!   port: 1883
//!   keepalive: 60
//!   clean_session: true
//!   qos: 0
//!   retain: false
//!   status_topic: /service/rentalito/status
//!   set_will: true
//! processor:
//!   filters:
//!     /clock/time:
//!       - { type: clock, format: "%d/%m/%Y|%H:%M" }
//! ```
//!
//! Every section and key except `general.publish_to` is optional.

pub mod error;

pub use error::ConfigError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::broker::BrokerSettings;
use crate::render::{FilterSpec, ValueRenderer};
use crate::routes::{Repetitions, TopicRegistry, TopicRoute};
use crate::scheduler::pacing::{Pacing, DEFAULT_MINIMUM_TIME_SECS, DEFAULT_TIME_LENGTH_RATIO};

/// Config file name used when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "rentalito.yaml";

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralSection,
    #[serde(default)]
    mqtt: MqttSection,
    #[serde(default)]
    processor: ProcessorSection,
}

#[derive(Debug, Deserialize)]
struct GeneralSection {
    #[serde(default = "default_pidfile")]
    pidfile: PathBuf,
    #[serde(default = "default_null_device")]
    stdout: PathBuf,
    #[serde(default = "default_null_device")]
    stderr: PathBuf,
    #[serde(default)]
    debug: Flag,
    #[serde(default = "default_minimum_time")]
    minimum_time: f64,
    #[serde(default = "default_time_length_ratio")]
    time_length_ratio: f64,
    publish_to: Option<String>,
    /// A bare `topic:` line (null value) is a route with all defaults.
    #[serde(default)]
    routes: BTreeMap<String, Option<RouteEntry>>,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            pidfile: default_pidfile(),
            stdout: default_null_device(),
            stderr: default_null_device(),
            debug: Flag::default(),
            minimum_time: default_minimum_time(),
            time_length_ratio: default_time_length_ratio(),
            publish_to: None,
            routes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RouteEntry {
    #[serde(default = "default_slots")]
    slots: usize,
    /// Absent → republish indefinitely.
    repetitions: Option<u32>,
    /// Seconds.
    expires: Option<f64>,
    #[serde(default)]
    prioritary: Flag,
}

#[derive(Debug, Deserialize)]
struct MqttSection {
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Seconds.
    #[serde(default = "default_keepalive")]
    keepalive: u64,
    #[serde(default = "default_true")]
    clean_session: Flag,
    #[serde(default)]
    qos: u8,
    #[serde(default)]
    retain: Flag,
    status_topic: Option<String>,
    #[serde(default)]
    set_will: Flag,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            host: default_host(),
            port: default_port(),
            keepalive: default_keepalive(),
            clean_session: default_true(),
            qos: 0,
            retain: Flag::default(),
            status_topic: None,
            set_will: Flag::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProcessorSection {
    #[serde(default)]
    filters: BTreeMap<String, Vec<FilterSpec>>,
}

/// Boolean that also accepts `0` / `1`, as older config files use both.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(n) => n != 0,
        }
    }
}

fn default_pidfile() -> PathBuf {
    PathBuf::from("/tmp/rentalito.pid")
}

fn default_null_device() -> PathBuf {
    PathBuf::from("/dev/null")
}

fn default_minimum_time() -> f64 {
    DEFAULT_MINIMUM_TIME_SECS
}

fn default_time_length_ratio() -> f64 {
    DEFAULT_TIME_LENGTH_RATIO
}

fn default_slots() -> usize {
    1
}

fn default_client_id() -> String {
    BrokerSettings::default().client_id
}

fn default_host() -> String {
    BrokerSettings::default().host
}

fn default_port() -> u16 {
    BrokerSettings::default().port
}

fn default_keepalive() -> u64 {
    BrokerSettings::default().keep_alive.as_secs()
}

fn default_true() -> Flag {
    Flag::Bool(true)
}

// ── Public data structures ────────────────────────────────────────────────────

/// Process management settings from the `general` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonSettings {
    pub pidfile: PathBuf,
    /// Where the detached daemon's stdout goes.
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct RentalitoConfig {
    pub daemon: DaemonSettings,
    /// Default log level becomes `debug` instead of `info`.
    pub debug: bool,
    pub pacing: Pacing,
    /// Output topic every rendered value is published on.
    pub publish_to: String,
    pub registry: TopicRegistry,
    pub broker: BrokerSettings,
    pub renderer: ValueRenderer,
}

impl RentalitoConfig {
    /// Reads and validates `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is structurally
    /// invalid, or a [`ConfigError`] rule is violated.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserializes as `null`; treat it as all defaults.
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };
        Ok(Self::from_file(file)?)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let ConfigFile {
            general,
            mqtt,
            processor,
        } = file;

        let publish_to = general
            .publish_to
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingPublishTo)?;

        let minimum_time = checked_pacing("minimum_time", general.minimum_time)?;
        let minimum_time = Duration::try_from_secs_f64(minimum_time).map_err(|_| {
            ConfigError::InvalidPacing {
                field: "minimum_time",
                value: minimum_time,
            }
        })?;
        let pacing = Pacing::new(
            minimum_time,
            checked_pacing("time_length_ratio", general.time_length_ratio)?,
        );

        let mut registry = TopicRegistry::new();
        for (topic, entry) in general.routes {
            let route = build_route(topic, entry.unwrap_or_else(default_route_entry))?;
            debug!(
                "  Route: {} | slots: {} | repetitions: {:?} | expiry: {:?} | priority: {}",
                route.topic, route.slot_count, route.repetitions, route.expiry, route.priority,
            );
            registry.insert(route);
        }
        if registry.is_empty() {
            warn!("No routes configured, nothing will be relayed");
        }

        if mqtt.qos > 2 {
            return Err(ConfigError::InvalidQos(mqtt.qos));
        }
        let clean_session = mqtt.clean_session.is_set();
        if !clean_session && mqtt.client_id.is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        let broker = BrokerSettings {
            client_id: mqtt.client_id,
            host: mqtt.host,
            port: mqtt.port,
            keep_alive: Duration::from_secs(mqtt.keepalive),
            clean_session,
            qos: mqtt.qos,
            retain: mqtt.retain.is_set(),
            status_topic: mqtt.status_topic.filter(|t| !t.is_empty()),
            set_will: mqtt.set_will.is_set(),
        };

        let mut renderer = ValueRenderer::new();
        for (topic, chain) in processor.filters {
            for spec in chain {
                renderer.add_filter(topic.clone(), spec)?;
            }
        }

        info!(
            routes = registry.len(),
            publish_to = %publish_to,
            minimum_time = ?pacing.minimum_time,
            time_length_ratio = pacing.time_length_ratio,
            "Configuration loaded"
        );

        Ok(Self {
            daemon: DaemonSettings {
                pidfile: general.pidfile,
                stdout: general.stdout,
                stderr: general.stderr,
            },
            debug: general.debug.is_set(),
            pacing,
            publish_to,
            registry,
            broker,
            renderer,
        })
    }
}

fn default_route_entry() -> RouteEntry {
    RouteEntry {
        slots: default_slots(),
        ..Default::default()
    }
}

fn build_route(topic: String, entry: RouteEntry) -> Result<TopicRoute, ConfigError> {
    if entry.slots == 0 {
        return Err(ConfigError::ZeroSlots { topic });
    }
    let expiry = match entry.expires {
        None => None,
        Some(value) => match Duration::try_from_secs_f64(value) {
            Ok(expiry) if !expiry.is_zero() => Some(expiry),
            _ => return Err(ConfigError::InvalidExpiry { topic, value }),
        },
    };
    Ok(TopicRoute {
        topic,
        slot_count: entry.slots,
        repetitions: Repetitions::from_config(entry.repetitions),
        expiry,
        priority: entry.prioritary.is_set(),
    })
}

fn checked_pacing(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidPacing { field, value })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
