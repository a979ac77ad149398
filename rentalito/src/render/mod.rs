/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Value rendering: raw MQTT payload → display text.
//!
//! Every topic owns an ordered chain of [`FilterSpec`]s.  A payload is decoded
//! once and then threaded through the chain; a topic without filters renders
//! as the decoded payload itself.
//!
//! ```yaml
//! processor:
//!   filters:
//!     /home/temperature:
//!       - { type: round, decimals: 1 }
//!       - { type: format, template: "Temp {value}C" }
//!     /clock/time:
//!       - { type: clock, format: "%d/%m/%Y|%H:%M" }
//! ```
//!
//! A `clock` filter ignores its input entirely, so its topic needs no external
//! producer.  Such topics are reported by [`ValueRenderer::synthetic_topics`]
//! and seeded into the scheduler at startup.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ── Render seam ───────────────────────────────────────────────────────────────

/// Anything that can turn a topic payload into display text.
///
/// The scheduler is generic over this trait so tests can plug in a fixed
/// renderer without going through filter configuration.
pub trait Render {
    fn render(&self, topic: &str, raw: &[u8]) -> String;
}

// ── Filter specification ──────────────────────────────────────────────────────

/// Largest `decimals` a round filter accepts; `f64` carries no more
/// significant digits than this.
pub const MAX_DECIMALS: usize = 17;

/// One transformation step, as written in the `processor.filters` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Substitutes `{value}` and `{topic}` in `template`.
    Format { template: String },

    /// Rounds a numeric value to `decimals` places.  Non-numeric input passes
    /// through untouched.
    Round { decimals: usize },

    /// Table lookup.  Unmatched values fall back to `default`, or pass through
    /// when no default is given.
    Map {
        values: HashMap<String, String>,
        #[serde(default)]
        default: Option<String>,
    },

    /// Local wall-clock time in chrono `strftime` syntax.
    Clock { format: String },
}

/// Why a filter could not be registered.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("topic '{topic}': format filter has an empty template")]
    EmptyTemplate { topic: String },

    #[error("topic '{topic}': invalid clock format '{format}'")]
    InvalidClockFormat { topic: String, format: String },

    #[error(
        "topic '{topic}': round filter allows at most {max} decimals (got {decimals})",
        max = MAX_DECIMALS
    )]
    TooManyDecimals { topic: String, decimals: usize },
}

impl FilterSpec {
    fn validate(&self, topic: &str) -> Result<(), FilterError> {
        match self {
            FilterSpec::Format { template } if template.is_empty() => {
                Err(FilterError::EmptyTemplate {
                    topic: topic.to_string(),
                })
            }
            FilterSpec::Round { decimals } if *decimals > MAX_DECIMALS => {
                Err(FilterError::TooManyDecimals {
                    topic: topic.to_string(),
                    decimals: *decimals,
                })
            }
            FilterSpec::Clock { format } => {
                // chrono panics while *displaying* a broken format, so reject
                // it up front.
                let broken = format.is_empty()
                    || StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
                if broken {
                    Err(FilterError::InvalidClockFormat {
                        topic: topic.to_string(),
                        format: format.clone(),
                    })
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    fn apply<'a>(&self, topic: &str, value: Cow<'a, str>) -> Cow<'a, str> {
        match self {
            FilterSpec::Format { template } => Cow::Owned(expand_template(template, topic, &value)),
            FilterSpec::Round { decimals } => match value.trim().parse::<f64>() {
                Ok(v) => Cow::Owned(format!("{:.*}", decimals, v)),
                Err(_) => value,
            },
            FilterSpec::Map { values, default } => match values.get(value.as_ref()) {
                Some(mapped) => Cow::Owned(mapped.clone()),
                None => match default {
                    Some(d) => Cow::Owned(d.clone()),
                    None => value,
                },
            },
            FilterSpec::Clock { format } => Cow::Owned(Local::now().format(format).to_string()),
        }
    }
}

// ── ValueRenderer ─────────────────────────────────────────────────────────────

/// Per-topic filter chains.
#[derive(Debug, Default, Clone)]
pub struct ValueRenderer {
    filters: BTreeMap<String, Vec<FilterSpec>>,
}

impl ValueRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `spec` to the chain for `topic`.
    ///
    /// # Errors
    /// Rejects empty format templates and unparsable clock formats.
    pub fn add_filter(
        &mut self,
        topic: impl Into<String>,
        spec: FilterSpec,
    ) -> Result<(), FilterError> {
        let topic = topic.into();
        spec.validate(&topic)?;
        debug!(topic = %topic, filter = ?spec, "filter registered");
        self.filters.entry(topic).or_default().push(spec);
        Ok(())
    }

    /// Renders `raw` for `topic`.  Never fails.
    pub fn process(&self, topic: &str, raw: &[u8]) -> String {
        let mut value = decode_payload(raw);
        if let Some(chain) = self.filters.get(topic) {
            for spec in chain {
                value = spec.apply(topic, value);
            }
        }
        value.into_owned()
    }

    /// Topics that carry a clock filter and therefore produce their own
    /// values.
    pub fn synthetic_topics(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .filter(|(_, chain)| chain.iter().any(|f| matches!(f, FilterSpec::Clock { .. })))
            .map(|(topic, _)| topic.as_str())
    }
}

impl Render for ValueRenderer {
    fn render(&self, topic: &str, raw: &[u8]) -> String {
        self.process(topic, raw)
    }
}

/// Substitutes `{value}` and `{topic}` in one pass, so placeholders that
/// appear inside the substituted text are left alone.
fn expand_template(template: &str, topic: &str, value: &str) -> String {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{value}") {
            out.push_str(value);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{topic}") {
            out.push_str(topic);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// UTF-8 payloads are used as-is; anything else is kept as opaque bytes via
/// lossy decoding rather than failing the message.
pub fn decode_payload(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn format(template: &str) -> FilterSpec {
        FilterSpec::Format {
            template: template.to_string(),
        }
    }

    #[test]
    fn topic_without_filters_renders_payload() {
        let r = ValueRenderer::new();
        assert_eq!(r.process("/a", b"hello"), "hello");
    }

    #[test]
    fn invalid_utf8_falls_back_to_lossy_bytes() {
        let r = ValueRenderer::new();
        let out = r.process("/a", &[b'o', b'k', 0xFF]);
        assert!(out.starts_with("ok"));
        assert_eq!(out.chars().count(), 3);
    }

    #[test]
    fn format_substitutes_value_and_topic() {
        let mut r = ValueRenderer::new();
        r.add_filter("/home/temp", format("{topic}: {value}C")).unwrap();
        assert_eq!(r.process("/home/temp", b"21"), "/home/temp: 21C");
    }

    #[test]
    fn placeholders_inside_payload_are_not_expanded() {
        let mut r = ValueRenderer::new();
        r.add_filter("/t", format("[{value}] on {topic} {other}")).unwrap();
        assert_eq!(r.process("/t", b"{topic}"), "[{topic}] on /t {other}");
        assert_eq!(r.process("/t", b"{value}"), "[{value}] on /t {other}");
    }

    #[test]
    fn round_then_format_chain_runs_in_order() {
        let mut r = ValueRenderer::new();
        r.add_filter("/t", FilterSpec::Round { decimals: 1 }).unwrap();
        r.add_filter("/t", format("Temp {value}C")).unwrap();
        assert_eq!(r.process("/t", b"21.456"), "Temp 21.5C");
    }

    #[test]
    fn round_leaves_non_numeric_values_alone() {
        let mut r = ValueRenderer::new();
        r.add_filter("/t", FilterSpec::Round { decimals: 2 }).unwrap();
        assert_eq!(r.process("/t", b"n/a"), "n/a");
    }

    #[test]
    fn map_uses_table_then_default_then_passthrough() {
        let values: HashMap<String, String> =
            [("1".to_string(), "OPEN".to_string())].into_iter().collect();

        let mut with_default = ValueRenderer::new();
        with_default
            .add_filter(
                "/door",
                FilterSpec::Map {
                    values: values.clone(),
                    default: Some("CLOSED".into()),
                },
            )
            .unwrap();
        assert_eq!(with_default.process("/door", b"1"), "OPEN");
        assert_eq!(with_default.process("/door", b"0"), "CLOSED");

        let mut without_default = ValueRenderer::new();
        without_default
            .add_filter(
                "/door",
                FilterSpec::Map {
                    values,
                    default: None,
                },
            )
            .unwrap();
        assert_eq!(without_default.process("/door", b"0"), "0");
    }

    #[test]
    fn clock_ignores_payload() {
        let mut r = ValueRenderer::new();
        r.add_filter(
            "/clock",
            FilterSpec::Clock {
                format: "%Y|%H".into(),
            },
        )
        .unwrap();
        let out = r.process("/clock", b"whatever");
        let (year, hour) = out.split_once('|').unwrap();
        assert_eq!(year.len(), 4);
        assert_eq!(hour.len(), 2);
    }

    #[test]
    fn synthetic_topics_are_the_clock_topics() {
        let mut r = ValueRenderer::new();
        r.add_filter("/a", format("{value}")).unwrap();
        r.add_filter(
            "/clock/time",
            FilterSpec::Clock {
                format: "%H:%M".into(),
            },
        )
        .unwrap();
        let synthetic: Vec<_> = r.synthetic_topics().collect();
        assert_eq!(synthetic, vec!["/clock/time"]);
    }

    #[test]
    fn broken_filters_are_rejected() {
        let mut r = ValueRenderer::new();
        assert_eq!(
            r.add_filter("/a", format("")),
            Err(FilterError::EmptyTemplate { topic: "/a".into() })
        );
        assert!(matches!(
            r.add_filter(
                "/c",
                FilterSpec::Clock {
                    format: "%Q".into()
                }
            ),
            Err(FilterError::InvalidClockFormat { .. })
        ));
        assert_eq!(
            r.add_filter("/r", FilterSpec::Round { decimals: 1000 }),
            Err(FilterError::TooManyDecimals {
                topic: "/r".into(),
                decimals: 1000
            })
        );
        r.add_filter("/r", FilterSpec::Round { decimals: MAX_DECIMALS })
            .unwrap();
        assert_eq!(r.process("/a", b"x"), "x", "rejected filter must not be kept");
    }

    #[test]
    fn filter_spec_deserializes_from_tagged_yaml() {
        let yaml = r#"
- { type: round, decimals: 1 }
- { type: format, template: "T {value}" }
- type: map
  values: { "1": "ON" }
- { type: clock, format: "%H:%M" }
"#;
        let specs: Vec<FilterSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0], FilterSpec::Round { decimals: 1 });
        assert!(matches!(specs[2], FilterSpec::Map { default: None, .. }));
    }
}
