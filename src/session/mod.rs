//! # Session Module
//!
//! Holds everything that belongs to one operator session: the broker link, the
//! connection flag, the event log and the last received message.
//!
//! ```text
//! session/
//! ├── event_log.rs       - Bounded, timestamped event log
//! ├── controller.rs      - Session state and the connect/publish/subscribe operations
//! └── session_worker.rs  - Task owning the controller, fed by UI actions
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! UI ──[PanelAction]──► SessionWorker ──► SessionController ──► BrokerLink
//!  ▲                          │  ▲                                   │
//!  └──[SessionSnapshot]───────┘  └─────────[DeliveryEvent]───────────┘
//! ```
//!
//! The controller is never shared. The delivery loop and the UI only talk to it
//! through channels, so no lock guards the session state.

pub mod controller;
pub mod event_log;
pub mod session_worker;
