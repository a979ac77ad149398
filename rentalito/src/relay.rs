/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The relay: sole owner of the [`SlotScheduler`].
//!
//! One task runs [`Relay::run`], which multiplexes three inputs with
//! `tokio::select!`:
//!
//! * broker events (connect / message / disconnect …) from the pump channel,
//! * a fixed [`TICK_INTERVAL`] timer driving [`SlotScheduler::tick`],
//! * the shutdown token.
//!
//! Because all three are handled on the same task, inbound upserts and
//! outbound dequeues are strictly serialized without any lock.
//!
//! Ticks are skipped while the broker session is down.  The MQTT client
//! replays queued requests unthrottled on reconnect, so publishing into a
//! dead session would release a burst once the link returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::broker::{BrokerEvent, Outbound};
use crate::render::Render;
use crate::routes::TopicRegistry;
use crate::scheduler::{SlotScheduler, TickOutcome};

/// How often the scheduler is asked whether the display is free.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    /// The broker refused or never answered the initial connection.
    #[error("could not connect to the MQTT broker: {reason}")]
    ConnectFailed { reason: String },
}

pub struct Relay<O: Outbound, R: Render> {
    scheduler: SlotScheduler<R>,
    registry: Arc<TopicRegistry>,
    outbound: O,
    publish_to: String,
    /// Between `Connected` and the next `Disconnected`.
    connected: bool,
}

impl<O: Outbound, R: Render> Relay<O, R> {
    /// `registry` must be the same table the scheduler was built with.
    pub fn new(
        scheduler: SlotScheduler<R>,
        registry: Arc<TopicRegistry>,
        outbound: O,
        publish_to: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            registry,
            outbound,
            publish_to: publish_to.into(),
            connected: false,
        }
    }

    pub fn scheduler(&self) -> &SlotScheduler<R> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut SlotScheduler<R> {
        &mut self.scheduler
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ── Event handling ────────────────────────────────────────────────────────

    /// Applies one broker event.
    ///
    /// # Errors
    /// [`RelayError::ConnectFailed`] is fatal; the caller must stop.
    pub fn handle_event(&mut self, event: BrokerEvent, now: Instant) -> Result<(), RelayError> {
        match event {
            BrokerEvent::Connected => {
                info!("Connected to MQTT broker");
                self.connected = true;
                if let Err(e) = self.outbound.announce(true) {
                    warn!(error = %e, "could not announce liveness");
                }
                for topic in self.registry.topics() {
                    debug!(topic = %topic, "Subscribing");
                    if let Err(e) = self.outbound.subscribe(topic) {
                        warn!(topic = %topic, error = %e, "subscription request failed");
                    }
                }
            }
            BrokerEvent::ConnectFailed { reason } => {
                return Err(RelayError::ConnectFailed { reason });
            }
            BrokerEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Disconnected from MQTT broker, rotation paused");
                self.connected = false;
            }
            BrokerEvent::Subscribed { pkid } => {
                info!(pkid, "Subscription acknowledged");
            }
            BrokerEvent::Message { topic, payload } => {
                if !self.registry.contains(&topic) {
                    trace!(topic = %topic, "unrouted topic dropped");
                    return Ok(());
                }
                self.scheduler.on_message(&topic, &payload, now);
            }
        }
        Ok(())
    }

    /// Runs one scheduler tick and publishes whatever it yields.
    ///
    /// Nothing is dequeued while disconnected; queued slots wait for the
    /// next `Connected`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.connected {
            return TickOutcome::Idle;
        }
        let outcome = self.scheduler.tick(now);
        if let TickOutcome::Published {
            topic, text, delay, ..
        } = &outcome
        {
            debug!(
                from = %topic,
                to = %self.publish_to,
                text = %text,
                delay = ?delay,
                "Republishing"
            );
            if let Err(e) = self.outbound.publish(&self.publish_to, text) {
                warn!(error = %e, "publish failed, value skipped");
            }
        }
        outcome
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    /// Runs until `shutdown` fires, the event channel closes, or the initial
    /// connection fails.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<BrokerEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), RelayError> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now())?,
                    None => {
                        warn!("Broker event channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
            }
        }

        if let Err(e) = self.outbound.announce(false) {
            debug!(error = %e, "could not announce shutdown");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
