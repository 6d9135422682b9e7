use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{BrokerConfig, MqttConfig};
use super::message_manager::DeliveryEvent;

/// How long a graceful disconnect may take before the delivery loop is cancelled.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid connection settings: {0}")]
    InvalidSettings(String),

    #[error("{0}")]
    Connection(String),

    #[error("Broker refused the connection: {0}")]
    Refused(String),

    #[error("No answer from broker within {0:?}")]
    Timeout(Duration),

    #[error("Request rejected by client: {0}")]
    Request(String),
}

impl From<ClientError> for HandlerError {
    fn from(e: ClientError) -> Self {
        HandlerError::Request(e.to_string())
    }
}

/// Opens connections to a broker.
///
/// `connect` returns once the broker has accepted the session. From then on the
/// link's background delivery loop pushes everything it receives into `events`.
#[async_trait]
pub trait Connector: Send + Sync {
    type Link: BrokerLink + 'static;

    async fn connect(
        &self,
        broker: &BrokerConfig,
        events: mpsc::Sender<DeliveryEvent>,
    ) -> Result<Self::Link, HandlerError>;
}

/// A live broker session. Dropping it stops the delivery loop.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), HandlerError>;

    async fn subscribe(&self, topic: &str) -> Result<(), HandlerError>;

    async fn disconnect(&mut self) -> Result<(), HandlerError>;
}

/// [`Connector`] backed by rumqttc.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    settings: MqttConfig,
}

impl MqttConnector {
    pub fn new(settings: MqttConfig) -> Self {
        Self { settings }
    }

    fn options(&self, broker: &BrokerConfig) -> Result<MqttOptions, HandlerError> {
        let client_id = self.settings.client_id.trim();
        if client_id.is_empty() || client_id != self.settings.client_id {
            return Err(HandlerError::InvalidSettings(format!(
                "client id '{}' must be non-empty without surrounding whitespace",
                self.settings.client_id
            )));
        }
        let host = broker.host.trim();
        if host.is_empty() {
            return Err(HandlerError::InvalidSettings(
                "broker host is empty".to_string(),
            ));
        }
        if broker.port == 0 {
            return Err(HandlerError::InvalidSettings(
                "port 0 is not a valid broker port".to_string(),
            ));
        }

        let mut options = MqttOptions::new(client_id, host, broker.port);
        options
            .set_keep_alive(self.settings.keep_alive())
            .set_clean_session(self.settings.clean_session);
        Ok(options)
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Link = MqttLink;

    async fn connect(
        &self,
        broker: &BrokerConfig,
        events: mpsc::Sender<DeliveryEvent>,
    ) -> Result<MqttLink, HandlerError> {
        let options = self.options(broker)?;
        info!("Connecting to {}:{}", broker.host, broker.port);

        let (client, mut eventloop) =
            AsyncClient::new(options, self.settings.request_capacity.max(1));

        let timeout = self.settings.connect_timeout();
        match tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(HandlerError::Timeout(timeout)),
        }
        info!("Broker {}:{} accepted the session", broker.host, broker.port);

        let qos = self.settings.qos();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_delivery_loop(eventloop, events, qos, token.clone()));

        Ok(MqttLink {
            client,
            qos,
            retain: self.settings.retain,
            token,
            handle: Some(handle),
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), HandlerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(HandlerError::Refused(format!("{:?}", ack.code)))
                };
            }
            Ok(other) => debug!("Event before CONNACK: {:?}", other),
            Err(e) => return Err(HandlerError::Connection(e.to_string())),
        }
    }
}

/// Whether `event` is the broker's confirmation of one of our publishes.
///
/// QoS 0 has no broker acknowledgement, so the outgoing write counts.
fn is_publish_ack(qos: QoS, event: &Event) -> bool {
    match (qos, event) {
        (QoS::AtMostOnce, Event::Outgoing(Outgoing::Publish(_))) => true,
        (QoS::AtLeastOnce, Event::Incoming(Packet::PubAck(_))) => true,
        (QoS::ExactlyOnce, Event::Incoming(Packet::PubComp(_))) => true,
        _ => false,
    }
}

async fn run_delivery_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<DeliveryEvent>,
    qos: QoS,
    token: CancellationToken,
) {
    debug!("Delivery loop started");
    loop {
        let polled = tokio::select! {
            _ = token.cancelled() => {
                debug!("Delivery loop cancelled");
                break;
            }
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::Publish(publish))) => DeliveryEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(event) if is_publish_ack(qos, &event) => DeliveryEvent::PublishAck,
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect sent, stopping delivery loop");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("MQTT connection error: {}", e);
                let lost = DeliveryEvent::ConnectionLost(e.to_string());
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = events.send(lost) => {}
                }
                break;
            }
        };

        // A full channel must not keep the loop from seeing cancellation.
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Delivery loop cancelled while delivering");
                break;
            }
            sent = events.send(event) => {
                if sent.is_err() {
                    warn!("Event receiver dropped, stopping delivery loop");
                    break;
                }
            }
        }
    }
    debug!("Delivery loop stopped");
}

pub struct MqttLink {
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), HandlerError> {
        self.client
            .publish(topic, self.qos, self.retain, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), HandlerError> {
        self.client.subscribe(topic, self.qos).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), HandlerError> {
        // Queued without waiting, so a stalled event loop cannot block the request.
        let request = self.client.try_disconnect();

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle)
                .await
                .is_err()
            {
                warn!("Delivery loop did not stop in time, cancelling");
                self.token.cancel();
                let _ = handle.await;
            }
        }
        self.token.cancel();

        request.map_err(HandlerError::from)
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{PubAck, PubComp};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const WAIT: Duration = Duration::from_secs(5);

    async fn local_broker() -> (TcpListener, BrokerConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let broker = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
            ..BrokerConfig::default()
        };
        (listener, broker)
    }

    /// Accepts one client, reads its CONNECT and accepts the session.
    async fn accept_session(listener: &TcpListener) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Fixed header; the CONNECT sent by these tests is shorter than 128 bytes.
        let mut header = [0u8; 2];
        socket.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x10);
        let mut connect = vec![0u8; header[1] as usize];
        socket.read_exact(&mut connect).await.unwrap();
        socket.write_all(&CONNACK).await.unwrap();
        socket
    }

    /// QoS 0 PUBLISH with a one-byte remaining length.
    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let remaining = 2 + topic.len() + payload.len();
        assert!(remaining < 128);
        let mut packet = vec![0x30, remaining as u8, 0x00, topic.len() as u8];
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    async fn read_until_closed(mut socket: TcpStream) {
        let mut sink = Vec::new();
        let _ = socket.read_to_end(&mut sink).await;
    }

    #[test]
    fn acknowledgement_follows_the_configured_qos() {
        let puback = Event::Incoming(Packet::PubAck(PubAck::new(1)));
        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(1)));
        let written = Event::Outgoing(Outgoing::Publish(0));

        assert!(is_publish_ack(QoS::AtLeastOnce, &puback));
        assert!(!is_publish_ack(QoS::AtLeastOnce, &written));
        assert!(is_publish_ack(QoS::ExactlyOnce, &pubcomp));
        assert!(!is_publish_ack(QoS::ExactlyOnce, &puback));
        assert!(is_publish_ack(QoS::AtMostOnce, &written));
    }

    #[test]
    fn rejects_settings_the_client_cannot_use() {
        let connector = MqttConnector::new(MqttConfig::default());

        let empty_host = BrokerConfig {
            host: "  ".to_string(),
            ..BrokerConfig::default()
        };
        assert!(matches!(
            connector.options(&empty_host),
            Err(HandlerError::InvalidSettings(_))
        ));

        let zero_port = BrokerConfig {
            port: 0,
            ..BrokerConfig::default()
        };
        assert!(matches!(
            connector.options(&zero_port),
            Err(HandlerError::InvalidSettings(_))
        ));

        let padded_id = MqttConnector::new(MqttConfig {
            client_id: " panel".to_string(),
            ..MqttConfig::default()
        });
        assert!(padded_id.options(&BrokerConfig::default()).is_err());
    }

    #[tokio::test]
    async fn unreachable_broker_fails_without_a_link() {
        let connector = MqttConnector::new(MqttConfig {
            connect_timeout_secs: 5,
            ..MqttConfig::default()
        });
        // Nothing listens on port 1 of the loopback interface.
        let broker = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..BrokerConfig::default()
        };
        let (tx, _rx) = mpsc::channel(8);

        let result = connector.connect(&broker, tx).await;
        assert!(matches!(
            result,
            Err(HandlerError::Connection(_)) | Err(HandlerError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn incoming_publish_becomes_a_message() {
        let (listener, broker) = local_broker().await;
        let server = tokio::spawn(async move {
            let mut socket = accept_session(&listener).await;
            socket
                .write_all(&publish_packet("Sensores", br#"{"Temp":21}"#))
                .await
                .unwrap();
            read_until_closed(socket).await;
        });

        let (tx, mut rx) = mpsc::channel(8);
        let mut link = MqttConnector::new(MqttConfig::default())
            .connect(&broker, tx)
            .await
            .unwrap();

        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        match event {
            Some(DeliveryEvent::Message { topic, payload }) => {
                assert_eq!(topic, "Sensores");
                assert_eq!(payload, br#"{"Temp":21}"#.to_vec());
            }
            other => panic!("expected a message, got {:?}", other),
        }

        link.disconnect().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn dropped_connection_is_reported_once() {
        let (listener, broker) = local_broker().await;
        let server = tokio::spawn(async move {
            let socket = accept_session(&listener).await;
            drop(socket);
        });

        let (tx, mut rx) = mpsc::channel(8);
        let _link = MqttConnector::new(MqttConfig::default())
            .connect(&broker, tx)
            .await
            .unwrap();
        server.await.unwrap();

        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert!(matches!(event, Some(DeliveryEvent::ConnectionLost(_))));

        // The loop has stopped and released its sender.
        let after = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn disconnect_stops_the_delivery_loop_within_grace() {
        let (listener, broker) = local_broker().await;
        let server = tokio::spawn(async move {
            let socket = accept_session(&listener).await;
            read_until_closed(socket).await;
        });

        let (tx, mut rx) = mpsc::channel(8);
        let mut link = MqttConnector::new(MqttConfig::default())
            .connect(&broker, tx)
            .await
            .unwrap();

        let result = tokio::time::timeout(DISCONNECT_GRACE, link.disconnect()).await;
        assert!(matches!(result, Ok(Ok(()))));

        let after = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert!(after.is_none());
        server.abort();
    }

    #[tokio::test]
    async fn disconnect_completes_while_the_event_channel_is_full() {
        let (listener, broker) = local_broker().await;
        let server = tokio::spawn(async move {
            let mut socket = accept_session(&listener).await;
            let packet = publish_packet("Sensores", b"{}");
            let flood: Vec<u8> = packet.iter().copied().cycle().take(packet.len() * 5000).collect();
            let _ = socket.write_all(&flood).await;
            read_until_closed(socket).await;
        });

        // Kept alive but never drained.
        let (tx, _rx) = mpsc::channel(100);
        let mut link = MqttConnector::new(MqttConfig::default())
            .connect(&broker, tx)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let result = tokio::time::timeout(DISCONNECT_GRACE + WAIT, link.disconnect()).await;
        assert!(result.is_ok(), "disconnect did not return");
        server.abort();
    }
}
