/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! MQTT broker session.
//!
//! The session is split in two halves so that nothing but the relay task ever
//! touches the rotation queue:
//!
//! ```text
//!                ┌──────────── pump task ────────────┐
//!  broker ◄────► │ rumqttc::EventLoop::poll()        │ ──(BrokerEvent, mpsc)──►  Relay
//!                └───────────────────────────────────┘                              │
//!  broker ◄──────────────── MqttOutbound (rumqttc::AsyncClient::try_*) ◄────────────┘
//! ```
//!
//! # Connection policy
//! * A failure before the first successful `CONNACK` is fatal: the pump emits
//!   [`BrokerEvent::ConnectFailed`] and exits.
//! * A failure after that emits [`BrokerEvent::Disconnected`], waits
//!   [`RECONNECT_DELAY`] and polls again, which makes rumqttc reconnect.  The
//!   wait races the shutdown token, so a stop request is never held up by it.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet,
    QoS,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Fixed pause between a lost connection and the next attempt.  No backoff
/// growth.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Capacity of the rumqttc request queue and of the event channel.
const CHANNEL_CAPACITY: usize = 64;

/// Payloads announced on the status topic.
const STATUS_ONLINE: &str = "1";
const STATUS_OFFLINE: &str = "0";

// ── Settings ──────────────────────────────────────────────────────────────────

/// Session parameters from the `mqtt` section of the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub clean_session: bool,
    /// 0, 1 or 2 (validated at configuration load).
    pub qos: u8,
    pub retain: bool,
    /// Topic on which liveness (`1` / `0`) is announced.
    pub status_topic: Option<String>,
    /// Register a last will of `0` on `status_topic`.
    pub set_will: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            client_id: String::from("rentalito"),
            host: String::from("localhost"),
            port: 1883,
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            qos: 0,
            retain: false,
            status_topic: None,
            set_will: false,
        }
    }
}

impl BrokerSettings {
    pub fn qos(&self) -> QoS {
        match self.qos {
            2 => QoS::ExactlyOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::AtMostOnce,
        }
    }

    /// rumqttc options for this session, including the last will.
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(self.clean_session);

        if let (true, Some(topic)) = (self.set_will, &self.status_topic) {
            options.set_last_will(LastWill::new(
                topic.clone(),
                STATUS_OFFLINE,
                self.qos(),
                true,
            ));
        }
        options
    }
}

// ── Events & errors ───────────────────────────────────────────────────────────

/// Session events delivered to the relay, replacing the on_connect /
/// on_message / on_disconnect / on_subscribe callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    /// The initial connection attempt failed.  The pump has stopped.
    ConnectFailed { reason: String },
    /// The session dropped; a reconnect follows after [`RECONNECT_DELAY`].
    Disconnected { reason: String },
    Subscribed { pkid: u16 },
    Message { topic: String, payload: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request could not be queued towards the event loop (queue full or
    /// event loop gone).
    #[error("broker request rejected: {0}")]
    Client(#[from] ClientError),
}

// ── Outbound seam ─────────────────────────────────────────────────────────────

/// Non-blocking requests the relay makes to the broker session.
pub trait Outbound {
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError>;
    /// Publishes liveness on the status topic, when one is configured.
    fn announce(&self, online: bool) -> Result<(), BrokerError>;
}

/// [`Outbound`] backed by a rumqttc client.
#[derive(Clone)]
pub struct MqttOutbound {
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    status_topic: Option<String>,
}

impl MqttOutbound {
    /// Sends DISCONNECT; the pump then sees the event loop close.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl Outbound for MqttOutbound {
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.client.try_subscribe(topic, self.qos)?;
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, self.qos, self.retain, payload.as_bytes().to_vec())?;
        Ok(())
    }

    fn announce(&self, online: bool) -> Result<(), BrokerError> {
        let Some(topic) = &self.status_topic else {
            return Ok(());
        };
        let payload = if online { STATUS_ONLINE } else { STATUS_OFFLINE };
        self.client
            .try_publish(topic.as_str(), self.qos, true, payload.as_bytes().to_vec())?;
        Ok(())
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A running broker session.
pub struct MqttBroker {
    pub outbound: MqttOutbound,
    pub events: mpsc::Receiver<BrokerEvent>,
    pub pump: JoinHandle<()>,
}

impl MqttBroker {
    /// Starts connecting to the broker.  The connection itself happens inside
    /// the pump task; its outcome arrives as the first [`BrokerEvent`].
    pub fn spawn(settings: &BrokerSettings, cancel: CancellationToken) -> Self {
        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "Connecting to MQTT broker"
        );

        let (client, eventloop) = AsyncClient::new(settings.mqtt_options(), CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pump = tokio::spawn(pump(eventloop, tx, cancel));

        Self {
            outbound: MqttOutbound {
                client,
                qos: settings.qos(),
                retain: settings.retain,
                status_topic: settings.status_topic.clone(),
            },
            events: rx,
            pump,
        }
    }
}

async fn pump(mut eventloop: EventLoop, events: mpsc::Sender<BrokerEvent>, cancel: CancellationToken) {
    let mut connected_once = false;

    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(event) => match translate(event) {
                Some(BrokerEvent::Connected) => {
                    connected_once = true;
                    BrokerEvent::Connected
                }
                Some(BrokerEvent::ConnectFailed { reason }) if connected_once => {
                    BrokerEvent::Disconnected { reason }
                }
                Some(other) => other,
                None => continue,
            },
            Err(e) if !connected_once => BrokerEvent::ConnectFailed {
                reason: e.to_string(),
            },
            Err(e) => BrokerEvent::Disconnected {
                reason: e.to_string(),
            },
        };

        let stop = matches!(event, BrokerEvent::ConnectFailed { .. });
        let wait = matches!(event, BrokerEvent::Disconnected { .. });

        if stop {
            error!(?event, "initial broker connection failed");
        } else if wait {
            warn!(?event, delay = ?RECONNECT_DELAY, "broker connection lost, reconnecting");
        }

        if events.send(event).await.is_err() {
            debug!("relay gone, stopping broker pump");
            break;
        }
        if stop {
            break;
        }
        if wait {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }
    debug!("broker pump stopped");
}

/// Maps one rumqttc event onto the relay's vocabulary.  Outgoing traffic,
/// pings and acks the relay does not care about map to `None`.
fn translate(event: Event) -> Option<BrokerEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            if ack.code == ConnectReturnCode::Success {
                Some(BrokerEvent::Connected)
            } else {
                Some(BrokerEvent::ConnectFailed {
                    reason: format!("{:?}", ack.code),
                })
            }
        }
        Event::Incoming(Packet::SubAck(ack)) => Some(BrokerEvent::Subscribed { pkid: ack.pkid }),
        Event::Incoming(Packet::Publish(p)) => Some(BrokerEvent::Message {
            topic: p.topic,
            payload: p.payload.to_vec(),
        }),
        Event::Incoming(Packet::Disconnect) => Some(BrokerEvent::Disconnected {
            reason: String::from("broker sent DISCONNECT"),
        }),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish, SubAck, SubscribeReasonCode};

    #[test]
    fn default_settings_match_config_defaults() {
        let s = BrokerSettings::default();
        assert_eq!(s.host, "localhost");
        assert_eq!(s.port, 1883);
        assert_eq!(s.keep_alive, Duration::from_secs(60));
        assert!(s.clean_session);
        assert_eq!(s.qos(), QoS::AtMostOnce);
    }

    #[test]
    fn qos_levels_map_to_rumqttc() {
        let mut s = BrokerSettings::default();
        s.qos = 1;
        assert_eq!(s.qos(), QoS::AtLeastOnce);
        s.qos = 2;
        assert_eq!(s.qos(), QoS::ExactlyOnce);
    }

    #[test]
    fn will_is_only_set_with_a_status_topic() {
        let mut s = BrokerSettings {
            set_will: true,
            ..Default::default()
        };
        assert!(s.mqtt_options().last_will().is_none());

        s.status_topic = Some("/service/rentalito/status".into());
        let will = s.mqtt_options().last_will().unwrap();
        assert_eq!(will.topic, "/service/rentalito/status");
        assert_eq!(&will.message[..], b"0");
        assert!(will.retain);
    }

    #[test]
    fn connack_success_is_connected() {
        let ev = Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        assert_eq!(translate(ev), Some(BrokerEvent::Connected));
    }

    #[test]
    fn connack_refusal_is_connect_failure() {
        let ev = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(translate(ev), Some(BrokerEvent::ConnectFailed { .. })));
    }

    #[test]
    fn publish_becomes_message() {
        let ev = Event::Incoming(Packet::Publish(Publish::new(
            "/home/temp",
            QoS::AtMostOnce,
            "21.5",
        )));
        assert_eq!(
            translate(ev),
            Some(BrokerEvent::Message {
                topic: "/home/temp".into(),
                payload: b"21.5".to_vec(),
            })
        );
    }

    #[test]
    fn suback_reports_packet_id() {
        let ev = Event::Incoming(Packet::SubAck(SubAck::new(
            7,
            vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        )));
        assert_eq!(translate(ev), Some(BrokerEvent::Subscribed { pkid: 7 }));
    }

    #[test]
    fn pings_are_ignored() {
        assert_eq!(translate(Event::Incoming(Packet::PingResp)), None);
    }
}
