use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Topic the analog value is always published to. Not operator-editable.
pub const ANALOG_TOPIC: &str = "cmqtt_a";

/// Broker target and topics as currently entered by the operator.
///
/// Read fresh for every operation, so editing a field before connecting changes
/// the next connect target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub control_topic: String,
    pub sensor_topic: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.mqttdashboard.com".to_string(),
            port: 1883,
            control_topic: "cmqtt_s".to_string(),
            sensor_topic: "Sensores".to_string(),
        }
    }
}

/// Client-side knobs that the page does not expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub client_id: String,
    /// 0, 1 or 2. Anything else falls back to 1.
    pub qos: u8,
    pub retain: bool,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub clean_session: bool,
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: "mqtt-control-panel".to_string(),
            qos: 1,
            retain: false,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            clean_session: true,
            request_capacity: 10,
        }
    }
}

impl MqttConfig {
    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        // rumqttc rejects keep-alive values below one second
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
