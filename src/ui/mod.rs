//! # Control Panel User Interface
//!
//! A single eframe/egui page driving one device session:
//!
//! - **Top Panel**: title and connection indicator
//! - **Side Panel**: broker address, port and topics
//! - **Central Panel**: connect/disconnect, ON/OFF, subscribe, analog slider,
//!   last received message and the event log
//!
//! The page never talks to the broker itself. Every button becomes a
//! [`PanelAction`](crate::session::session_worker::PanelAction) for the session
//! worker, and the page renders from the latest snapshot the worker published.
//! Nothing here blocks on the network.
//!
//! Repaints are requested every 33 ms so inbound messages show up without
//! operator input.

pub mod common;
pub mod mqtt_menu;

use eframe::egui::{self, Context, RichText};
use std::time::Duration;
use tracing::info;

use crate::mqtt::config::BrokerConfig;
use crate::session::session_worker::SessionHandle;

use self::common::UiColors;
use self::mqtt_menu::MQTTMenuData;

const REPAINT_INTERVAL: Duration = Duration::from_millis(33);

pub struct PanelUI {
    mqtt_menu_data: MQTTMenuData,
}

impl PanelUI {
    pub fn new(cc: &eframe::CreationContext<'_>, session: SessionHandle, broker: BrokerConfig) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        info!("UI ready, broker preset {}:{}", broker.host, broker.port);
        Self {
            mqtt_menu_data: MQTTMenuData::new(session, broker),
        }
    }

    fn status_indicator(&self, ui: &mut egui::Ui) {
        let (color, text) = if self.mqtt_menu_data.is_connected() {
            (UiColors::ACTIVE, "connected")
        } else {
            (UiColors::INACTIVE, "disconnected")
        };
        ui.colored_label(color, "\u{2B24}");
        ui.label(RichText::new(text).color(color));
    }
}

impl eframe::App for PanelUI {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.mqtt_menu_data.poll();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("MQTT Control");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    self.status_indicator(ui);
                });
            });
        });

        egui::SidePanel::left("broker_settings")
            .resizable(false)
            .show(ctx, |ui| {
                self.mqtt_menu_data.settings(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.mqtt_menu_data.render(ui);
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
