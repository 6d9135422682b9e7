//! # MQTT Integration Module
//!
//! Broker access for the control panel: connection settings, the payloads sent
//! to the device, and the rumqttc-backed client with its background delivery
//! loop.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker target, topics and client options
//! ├── message_manager.rs  - Outbound payloads and inbound delivery events
//! └── mqtt_handler.rs     - Connector/link traits and the rumqttc implementation
//! ```
//!
//! ## Defaults
//!
//! - QoS 1 for publish and subscribe, so publish acknowledgements are real
//!   broker PUBACKs
//! - retain off, clean session on, keep-alive 30 s
//! - connect gives up after 10 s without a CONNACK
//!
//! All of them can be changed in the `[mqtt]` section of the config file.
//!
//! ## No Reconnect
//!
//! When the transport fails the delivery loop reports the loss and stops. The
//! operator reconnects by hand.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
