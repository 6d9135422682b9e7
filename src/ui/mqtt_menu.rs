use eframe::egui::{self, RichText, ScrollArea, Slider, Ui};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::mqtt::config::{BrokerConfig, ANALOG_TOPIC};
use crate::mqtt::message_manager::{SwitchState, ANALOG_DEFAULT, ANALOG_MAX, ANALOG_MIN};
use crate::session::controller::{SessionError, SessionSnapshot};
use crate::session::session_worker::{ActionResult, PanelAction, SessionHandle};

use super::common::{create_frame, Notice, UiColors};

const LOG_HEIGHT: f32 = 200.0;

/// State of the control page
pub struct MQTTMenuData {
    session: SessionHandle,
    snapshots: watch::Receiver<SessionSnapshot>,
    snapshot: SessionSnapshot,
    /// Edited in the sidebar, passed along with every action
    broker: BrokerConfig,
    analog_value: f64,
    pending: Vec<oneshot::Receiver<ActionResult>>,
    notice: Option<Notice>,
}

impl MQTTMenuData {
    pub fn new(session: SessionHandle, broker: BrokerConfig) -> Self {
        let snapshots = session.snapshots();
        let snapshot = snapshots.borrow().clone();
        Self {
            session,
            snapshots,
            snapshot,
            broker,
            analog_value: ANALOG_DEFAULT,
            pending: Vec::new(),
            notice: None,
        }
    }

    /// Picks up answers to earlier actions and the newest session snapshot.
    pub fn poll(&mut self) {
        let mut finished = Vec::new();
        self.pending.retain_mut(|response| match response.try_recv() {
            Ok(result) => {
                finished.push(Notice::from(result));
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                finished.push(Notice::from_error(&SessionError::WorkerGone));
                false
            }
        });
        if let Some(notice) = finished.pop() {
            debug!("Action finished: {}", notice);
            self.notice = Some(notice);
        }

        if self.snapshots.has_changed().unwrap_or(false) {
            self.snapshot = self.snapshots.borrow_and_update().clone();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.connected
    }

    fn dispatch(&mut self, action: impl FnOnce(oneshot::Sender<ActionResult>) -> PanelAction) {
        match self.session.request(action) {
            Ok(response) => self.pending.push(response),
            Err(e) => self.notice = Some(Notice::from_error(&e)),
        }
    }

    /// Broker address and topics
    pub fn settings(&mut self, ui: &mut Ui) {
        ui.heading("MQTT Settings");
        ui.add_space(4.0);

        ui.label("Broker");
        ui.text_edit_singleline(&mut self.broker.host);
        ui.label("Port");
        ui.add(egui::DragValue::new(&mut self.broker.port).range(1..=u16::MAX));
        ui.label("Control topic");
        ui.text_edit_singleline(&mut self.broker.control_topic);
        ui.label("Sensor topic");
        ui.text_edit_singleline(&mut self.broker.sensor_topic);

        ui.add_space(4.0);
        ui.label(RichText::new(format!("Analog topic: {}", ANALOG_TOPIC)).weak());
    }

    pub fn render(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.button("Connect to broker").clicked() {
                info!("Connect requested for {}:{}", self.broker.host, self.broker.port);
                let broker = self.broker.clone();
                self.dispatch(|response_tx| PanelAction::Connect {
                    broker,
                    response_tx,
                });
            }
            if ui.button("Disconnect").clicked() {
                self.dispatch(|response_tx| PanelAction::Disconnect { response_tx });
            }
        });

        ui.add_space(4.0);
        let (on, off, subscribe) = ui.columns(3, |columns| {
            (
                columns[0].button("ON").clicked(),
                columns[1].button("OFF").clicked(),
                columns[2].button("Subscribe to sensors").clicked(),
            )
        });
        for (clicked, state) in [(on, SwitchState::On), (off, SwitchState::Off)] {
            if clicked {
                let broker = self.broker.clone();
                self.dispatch(|response_tx| PanelAction::Switch {
                    broker,
                    state,
                    response_tx,
                });
            }
        }
        if subscribe {
            let broker = self.broker.clone();
            self.dispatch(|response_tx| PanelAction::Subscribe {
                broker,
                response_tx,
            });
        }

        ui.add_space(4.0);
        ui.add(
            Slider::new(&mut self.analog_value, ANALOG_MIN..=ANALOG_MAX)
                .text("Analog value"),
        );
        if ui.button("Send analog value").clicked() {
            let value = self.analog_value;
            self.dispatch(|response_tx| PanelAction::SendAnalog { value, response_tx });
        }

        if let Some(notice) = &self.notice {
            ui.add_space(4.0);
            notice.show(ui);
        }

        ui.separator();
        ui.heading("Last received message");
        ui.label(self.snapshot.last_message.as_str());

        ui.separator();
        ui.heading("Event log");
        self.event_log(ui);

        ui.label(RichText::new(stats_line(&self.snapshot)).weak());
    }

    fn event_log(&self, ui: &mut Ui) {
        create_frame(UiColors::EXTREME_BG, UiColors::BORDER).show(ui, |ui| {
            ScrollArea::vertical()
                .id_salt("event_log")
                .max_height(LOG_HEIGHT)
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.snapshot.log {
                        ui.monospace(line);
                    }
                });
        });
    }
}

fn stats_line(snapshot: &SessionSnapshot) -> String {
    let stats = &snapshot.stats;
    let last_activity = stats
        .last_activity
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mut line = format!(
        "sent: {}  acknowledged: {}  received: {}  last activity: {}",
        stats.messages_sent, stats.acks_received, stats.messages_received, last_activity
    );
    if snapshot.log_evicted > 0 {
        line.push_str(&format!("  older log entries dropped: {}", snapshot.log_evicted));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    #[test]
    fn stats_line_before_any_traffic() {
        assert_eq!(
            stats_line(&SessionSnapshot::default()),
            "sent: 0  acknowledged: 0  received: 0  last activity: never"
        );
    }

    #[test]
    fn stats_line_shows_activity_and_dropped_entries() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.stats.messages_sent = 2;
        snapshot.stats.acks_received = 1;
        snapshot.stats.last_activity = Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 9).single();
        snapshot.log_evicted = 7;

        assert_eq!(
            stats_line(&snapshot),
            "sent: 2  acknowledged: 1  received: 0  last activity: 14:03:09  older log entries dropped: 7"
        );
    }
}
