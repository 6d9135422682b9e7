pub mod config;
pub mod mqtt;
pub mod session;
pub mod ui;

use crate::config::PanelConfig;
use crate::mqtt::mqtt_handler::MqttConnector;
use crate::session::controller::SessionController;
use crate::session::session_worker::SessionWorker;
use crate::ui::PanelUI;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = PanelConfig::default_path();
    let config = PanelConfig::load_or_default(&config_path).await;
    info!("Loaded configuration from {}", config_path.display());

    let connector = MqttConnector::new(config.mqtt.clone());
    let controller = SessionController::new(connector, config.session.settings());
    let worker = SessionWorker::spawn(
        controller,
        Duration::from_millis(config.session.refresh_ms.max(1)),
    );
    let session = worker.handle();
    let broker = config.broker.clone();

    info!("Starting UI");
    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([820.0, 640.0])
            .with_title("MQTT Control"),
        ..Default::default()
    };

    let ui_result = eframe::run_native(
        "MQTT Control",
        native_options,
        Box::new(|cc| Ok(Box::new(PanelUI::new(cc, session, broker)))),
    );

    info!("UI closed, shutting down session");
    worker.shutdown().await;

    ui_result.map_err(|e| eyre!("UI terminated with error: {}", e))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
