use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::{SessionController, SessionError, SessionSnapshot};
use crate::mqtt::config::BrokerConfig;
use crate::mqtt::message_manager::SwitchState;
use crate::mqtt::mqtt_handler::Connector;

/// Matches the page's repaint interval.
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(33);

const ACTION_CAPACITY: usize = 32;

macro_rules! handle_action {
    ($action:expr, $response_tx:expr) => {
        if $response_tx.send($action.await).is_err() {
            warn!("Action response dropped before it was read");
        }
    };
}

pub type ActionResult = Result<String, SessionError>;

/// Operator actions, each answered through its own oneshot.
#[derive(Debug)]
pub enum PanelAction {
    Connect {
        broker: BrokerConfig,
        response_tx: oneshot::Sender<ActionResult>,
    },
    Switch {
        broker: BrokerConfig,
        state: SwitchState,
        response_tx: oneshot::Sender<ActionResult>,
    },
    SendAnalog {
        value: f64,
        response_tx: oneshot::Sender<ActionResult>,
    },
    Subscribe {
        broker: BrokerConfig,
        response_tx: oneshot::Sender<ActionResult>,
    },
    Disconnect {
        response_tx: oneshot::Sender<ActionResult>,
    },
}

/// Cloneable front of the [`SessionWorker`] handed to the UI.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<PanelAction>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Queues an action without blocking. The answer arrives on the returned receiver.
    pub fn request(
        &self,
        action: impl FnOnce(oneshot::Sender<ActionResult>) -> PanelAction,
    ) -> Result<oneshot::Receiver<ActionResult>, SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        match self.tx.try_send(action(response_tx)) {
            Ok(()) => Ok(response_rx),
            Err(TrySendError::Full(_)) => Err(SessionError::Busy),
            Err(TrySendError::Closed(_)) => Err(SessionError::WorkerGone),
        }
    }

    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}

/// Task that owns the [`SessionController`].
///
/// Actions arrive over an mpsc channel and run one at a time. Between actions
/// the worker drains the delivery channel every `refresh` and publishes a new
/// [`SessionSnapshot`] whenever the state changed.
pub struct SessionWorker {
    handle: SessionHandle,
    shutdown: CancellationToken,
    worker_handle: JoinHandle<()>,
}

impl SessionWorker {
    pub fn spawn<C: Connector + 'static>(
        mut controller: SessionController<C>,
        refresh: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<PanelAction>(ACTION_CAPACITY);
        let (snapshot_tx, snapshot) = watch::channel(controller.snapshot());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let worker_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut published = controller.revision();

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    action = rx.recv() => match action {
                        Some(action) => handle(&mut controller, action).await,
                        None => break,
                    },
                    _ = ticker.tick() => {
                        controller.drain_events();
                    }
                }

                if controller.revision() != published {
                    published = controller.revision();
                    snapshot_tx.send_replace(controller.snapshot());
                }
            }

            if controller.is_connected() {
                if let Err(e) = controller.disconnect().await {
                    debug!("Disconnect on shutdown: {}", e);
                }
                snapshot_tx.send_replace(controller.snapshot());
            }
            info!("Session worker stopped");
        });

        Self {
            handle: SessionHandle { tx, snapshot },
            shutdown,
            worker_handle,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stops the worker, disconnecting from the broker if needed.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.worker_handle.await {
            warn!("Session worker ended abnormally: {}", e);
        }
    }
}

async fn handle<C: Connector>(controller: &mut SessionController<C>, action: PanelAction) {
    match action {
        PanelAction::Connect {
            broker,
            response_tx,
        } => {
            handle_action!(controller.connect(&broker), response_tx);
        }
        PanelAction::Switch {
            broker,
            state,
            response_tx,
        } => {
            handle_action!(controller.switch(&broker, state), response_tx);
        }
        PanelAction::SendAnalog { value, response_tx } => {
            handle_action!(controller.send_analog(value), response_tx);
        }
        PanelAction::Subscribe {
            broker,
            response_tx,
        } => {
            handle_action!(controller.subscribe(&broker), response_tx);
        }
        PanelAction::Disconnect { response_tx } => {
            handle_action!(controller.disconnect(), response_tx);
        }
    }
    controller.drain_events();
}
