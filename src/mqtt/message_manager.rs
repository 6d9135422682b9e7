use serde::Serialize;
use std::fmt;

/// State of the first actuator on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "ON"),
            SwitchState::Off => write!(f, "OFF"),
        }
    }
}

/// `{"Act1": "ON"}` / `{"Act1": "OFF"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlCommand {
    #[serde(rename = "Act1")]
    pub act1: SwitchState,
}

/// `{"Analog": 42.5}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalogCommand {
    #[serde(rename = "Analog")]
    pub analog: f64,
}

/// Range of the analog selector on the page.
pub const ANALOG_MIN: f64 = 0.0;
pub const ANALOG_MAX: f64 = 100.0;
pub const ANALOG_DEFAULT: f64 = 50.0;

/// Everything the delivery loop hands over to the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// A publish arrived on one of the subscribed topics. Payload is raw bytes,
    /// decoding happens on the receiving side.
    Message { topic: String, payload: Vec<u8> },
    /// The broker confirmed one of our publishes.
    PublishAck,
    /// The transport failed and the delivery loop stopped.
    ConnectionLost(String),
}

impl DeliveryEvent {
    pub fn message(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        DeliveryEvent::Message {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
