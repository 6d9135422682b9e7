//! Session Controller: the single owner of the broker link, the connection flag,
//! the event log and the last received message.
//!
//! Inbound traffic never touches this state directly. The link's delivery loop
//! pushes [`DeliveryEvent`]s into a channel and the owner applies them with
//! [`SessionController::drain_events`].

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::event_log::{EventLog, DEFAULT_LOG_CAPACITY};
use crate::mqtt::config::{BrokerConfig, ANALOG_TOPIC};
use crate::mqtt::message_manager::{AnalogCommand, ControlCommand, DeliveryEvent, SwitchState};
use crate::mqtt::mqtt_handler::{BrokerLink, Connector, HandlerError};

pub const NO_MESSAGE_YET: &str = "No message received yet.";

const DEFAULT_EVENT_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connect to the MQTT broker first.")]
    NotConnected,

    #[error("Error connecting to broker: {0}")]
    Connection(#[source] HandlerError),

    #[error("{0}")]
    Request(#[source] HandlerError),

    #[error("Could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Still busy with earlier actions, try again.")]
    Busy,

    #[error("Session worker is not running")]
    WorkerGone,
}

/// Sizes of the controller's buffers.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub log_capacity: usize,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub messages_received: usize,
    pub messages_sent: usize,
    pub acks_received: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Read-only copy of the session state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub last_message: String,
    pub log: Vec<String>,
    /// Log entries dropped by the retention cap
    pub log_evicted: usize,
    pub stats: SessionStats,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            connected: false,
            last_message: NO_MESSAGE_YET.to_string(),
            log: Vec::new(),
            log_evicted: 0,
            stats: SessionStats::default(),
        }
    }
}

pub struct SessionController<C: Connector> {
    connector: C,
    settings: SessionSettings,
    client: Option<C::Link>,
    connected: bool,
    events: Option<mpsc::Receiver<DeliveryEvent>>,
    log: EventLog,
    last_message: String,
    stats: SessionStats,
    revision: u64,
}

impl<C: Connector> SessionController<C> {
    pub fn new(connector: C, settings: SessionSettings) -> Self {
        Self {
            connector,
            settings,
            client: None,
            connected: false,
            events: None,
            log: EventLog::with_capacity(settings.log_capacity),
            last_message: NO_MESSAGE_YET.to_string(),
            stats: SessionStats::default(),
            revision: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Bumped on every state change; lets the owner skip unchanged snapshots.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.connected,
            last_message: self.last_message.clone(),
            log: self.log.lines(),
            log_evicted: self.log.evicted(),
            stats: self.stats.clone(),
        }
    }

    fn record(&mut self, event: impl Into<String>) {
        self.log.push(event);
        self.revision += 1;
    }

    fn link(&self) -> Result<&C::Link, SessionError> {
        match (&self.client, self.connected) {
            (Some(link), true) => Ok(link),
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Opens a new broker session and starts its delivery loop.
    ///
    /// An existing link is torn down first. On failure the client handle is
    /// always cleared, never left pointing at a previous session.
    pub async fn connect(&mut self, broker: &BrokerConfig) -> Result<String, SessionError> {
        self.teardown().await;

        let (tx, rx) = mpsc::channel(self.settings.event_capacity.max(1));
        match self.connector.connect(broker, tx).await {
            Ok(link) => {
                self.client = Some(link);
                self.connected = true;
                self.events = Some(rx);
                self.stats.last_activity = Some(Local::now());
                info!("Connected to {}:{}", broker.host, broker.port);
                self.record("Connected to MQTT broker");
                Ok("Connected to broker".to_string())
            }
            Err(e) => {
                self.client = None;
                self.connected = false;
                self.events = None;
                error!("Connecting to {}:{} failed: {}", broker.host, broker.port, e);
                self.record(format!("Error connecting: {}", e));
                Err(SessionError::Connection(e))
            }
        }
    }

    /// Sends `{"Act1": ..}` to the control topic.
    pub async fn switch(
        &mut self,
        broker: &BrokerConfig,
        state: SwitchState,
    ) -> Result<String, SessionError> {
        let command = ControlCommand { act1: state };
        self.publish(&broker.control_topic, &command).await?;
        self.record(format!("Act1 sent: {}", state));
        Ok(format!("Act1 set to {}", state))
    }

    /// Sends `{"Analog": value}` to the fixed analog topic.
    ///
    /// The value is sent as given; the selector on the page bounds it.
    pub async fn send_analog(&mut self, value: f64) -> Result<String, SessionError> {
        let command = AnalogCommand { analog: value };
        self.publish(ANALOG_TOPIC, &command).await?;
        self.record(format!("Analog value sent: {}", value));
        Ok(format!("Analog value {} sent", value))
    }

    async fn publish<P: Serialize>(&mut self, topic: &str, payload: &P) -> Result<(), SessionError> {
        let link = self.link()?;
        let body = serde_json::to_vec(payload)?;

        debug!("Publishing {} bytes to {}", body.len(), topic);
        let result = link.publish(topic, body).await;
        if let Err(e) = result {
            warn!("Publish to {} rejected: {}", topic, e);
            self.record(format!("Error publishing to {}: {}", topic, e));
            return Err(SessionError::Request(e));
        }

        self.stats.messages_sent += 1;
        self.stats.last_activity = Some(Local::now());
        Ok(())
    }

    pub async fn subscribe(&mut self, broker: &BrokerConfig) -> Result<String, SessionError> {
        let topic = broker.sensor_topic.clone();
        let link = self.link()?;

        let result = link.subscribe(&topic).await;
        if let Err(e) = result {
            warn!("Subscribe to {} rejected: {}", topic, e);
            self.record(format!("Error subscribing to {}: {}", topic, e));
            return Err(SessionError::Request(e));
        }

        info!("Subscribed to {}", topic);
        self.record(format!("Subscribed to topic: {}", topic));
        Ok(format!("Subscribed to '{}'", topic))
    }

    /// Sends DISCONNECT, stops the delivery loop and releases the client handle.
    pub async fn disconnect(&mut self) -> Result<String, SessionError> {
        self.link()?;
        self.drain_events();

        let result = match self.client.as_mut() {
            Some(link) => link.disconnect().await,
            None => Ok(()),
        };
        self.client = None;
        self.connected = false;
        self.events = None;

        match result {
            Ok(()) => {
                info!("Disconnected from broker");
                self.record("Disconnected from MQTT broker");
            }
            Err(e) => {
                // The handle is released either way.
                warn!("Disconnect request failed: {}", e);
                self.record(format!("Disconnected from MQTT broker ({})", e));
            }
        }
        Ok("Disconnected from broker".to_string())
    }

    /// Drops the current link without touching the log.
    async fn teardown(&mut self) {
        self.drain_events();
        if let Some(mut link) = self.client.take() {
            debug!("Replacing existing broker link");
            if let Err(e) = link.disconnect().await {
                debug!("Previous link did not disconnect cleanly: {}", e);
            }
        }
        self.connected = false;
        self.events = None;
    }

    /// Applies every delivery event queued so far. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                pending.push(event);
            }
        }

        let applied = pending.len();
        for event in pending {
            match event {
                DeliveryEvent::Message { topic, payload } => self.on_message(&topic, &payload),
                DeliveryEvent::PublishAck => self.on_publish_ack(),
                DeliveryEvent::ConnectionLost(reason) => self.on_connection_lost(&reason),
            }
        }
        applied
    }

    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.stats.messages_received += 1;
        self.stats.last_activity = Some(Local::now());

        match std::str::from_utf8(payload) {
            Ok(data) => {
                debug!("Message on {}: {}", topic, data);
                self.last_message = format!("Message received: `{}`", data);
                self.record(format!("Message received: {}", data));
            }
            Err(e) => {
                warn!("Undecodable payload on {}: {}", topic, e);
                self.record(format!(
                    "Could not decode message on {} ({} bytes): {}",
                    topic,
                    payload.len(),
                    e
                ));
            }
        }
    }

    fn on_publish_ack(&mut self) {
        self.stats.acks_received += 1;
        self.record("Message published successfully.");
    }

    fn on_connection_lost(&mut self, reason: &str) {
        error!("Connection lost: {}", reason);
        self.client = None;
        self.connected = false;
        self.record(format!("Connection lost: {}", reason));
    }
}
