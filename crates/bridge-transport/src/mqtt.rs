//! MQTT broker link.
//!
//! [`MqttLink`] is the publishing half and is shared with the command
//! router. [`BrokerEventLoop`] drives the session: it (re)subscribes after
//! every successful connect and forwards incoming publishes to the
//! ingress queue.

use async_trait::async_trait;
use bytes::Bytes;
use ledbridge_core::{BrokerMessage, PublishError, Publisher, TopicMap};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::TransportError;
use crate::options::BrokerOptions;

/// Publishing handle to the broker.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
}

impl MqttLink {
    /// Create a broker link.
    ///
    /// No network traffic happens until the returned event loop runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new(
        options: &BrokerOptions,
        topics: &TopicMap,
    ) -> Result<(Self, BrokerEventLoop), TransportError> {
        options.validate()?;

        let (client, eventloop) =
            AsyncClient::new(options.to_mqtt_options(), options.request_capacity);
        let connected = Arc::new(AtomicBool::new(false));

        info!(
            host = %options.host,
            port = options.port,
            client_id = %options.client_id,
            "Broker link created"
        );

        let link = Self {
            client: client.clone(),
            qos: options.qos(),
            connected: connected.clone(),
        };
        let event_loop = BrokerEventLoop {
            client,
            eventloop,
            connected,
            subscriptions: topics.subscriptions(),
            qos: options.qos(),
            reconnect_delay: options.reconnect_delay,
        };

        Ok((link, event_loop))
    }

    /// Ask the broker to close the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the event loop is gone.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.client.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttLink {
    /// Queue a publish on the live session.
    ///
    /// Fails immediately when the session is down or the request queue
    /// is full; never waits for queue space.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        if !self.connected.load(Ordering::Acquire) {
            debug!(topic = %topic, "Publish refused, broker not connected");
            return Err(PublishError::NotConnected);
        }

        trace!(topic = %topic, bytes = payload.len(), "Queueing publish");
        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }
}

/// Drives the MQTT session.
pub struct BrokerEventLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    subscriptions: Vec<String>,
    qos: QoS,
    reconnect_delay: Duration,
}

impl BrokerEventLoop {
    /// Topic filters subscribed on every connect.
    #[must_use]
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Poll the session until the ingress queue closes.
    ///
    /// Connection failures are logged and retried after the reconnect
    /// delay; the registry keeps its last known state meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::IngressClosed`] once nobody consumes
    /// broker messages any more.
    pub async fn run(mut self, ingress: mpsc::Sender<BrokerMessage>) -> Result<(), TransportError> {
        info!("Broker event loop started");

        loop {
            let event = tokio::select! {
                biased;

                () = ingress.closed() => {
                    self.set_connected(false);
                    warn!("Ingress queue closed, stopping broker event loop");
                    return Err(TransportError::IngressClosed);
                }

                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    trace!(topic = %publish.topic, bytes = publish.payload.len(), "Broker message");
                    let message = BrokerMessage::new(publish.topic, publish.payload);
                    if ingress.send(message).await.is_err() {
                        self.set_connected(false);
                        warn!("Ingress queue closed, stopping broker event loop");
                        return Err(TransportError::IngressClosed);
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("Connected to broker");
                        self.set_connected(true);
                        self.subscribe_all();
                    } else {
                        warn!(code = ?ack.code, "Broker refused connection");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "Subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.set_connected(false);
                    warn!("Broker closed the session");
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_connected(false);
                    let e = TransportError::from(e);
                    error!(error = %e, "Broker link error, retrying in {:?}", self.reconnect_delay);
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Queue subscriptions without blocking the event loop.
    fn subscribe_all(&self) {
        for filter in &self.subscriptions {
            match self.client.try_subscribe(filter.as_str(), self.qos) {
                Ok(()) => debug!(filter = %filter, "Subscribing"),
                Err(e) => {
                    let e = TransportError::from(e);
                    error!(filter = %filter, error = %e, "Failed to subscribe");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn local_options(port: u16) -> BrokerOptions {
        BrokerOptions {
            reconnect_delay: Duration::from_millis(10),
            ..BrokerOptions::new("127.0.0.1", port)
        }
    }

    /// Read one MQTT packet, returning its type and body.
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await.unwrap();
        (header >> 4, body)
    }

    /// Accept a client, expect CONNECT and accept the session.
    async fn accept_session(listener: &TcpListener) -> TcpStream {
        let (mut stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let (kind, _) = read_packet(&mut stream).await;
        assert_eq!(kind, 1, "expected CONNECT");
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
        stream
    }

    /// Collect SUBSCRIBE filters until both bridge filters were seen.
    async fn read_subscriptions(stream: &mut TcpStream) -> Vec<String> {
        let mut filters: Vec<String> = Vec::new();
        while filters.len() < 2 {
            let (kind, body) = timeout(WAIT, read_packet(stream)).await.unwrap();
            if kind != 8 {
                continue;
            }
            // SUBACK with the same packet id, granting QoS 0.
            stream
                .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
                .await
                .unwrap();

            let len = usize::from(u16::from_be_bytes([body[2], body[3]]));
            let filter = String::from_utf8(body[4..4 + len].to_vec()).unwrap();
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }
        filters.sort();
        filters
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    #[tokio::test]
    async fn test_link_subscriptions() {
        let (_link, event_loop) =
            MqttLink::new(&BrokerOptions::default(), &TopicMap::default()).unwrap();

        assert_eq!(event_loop.subscriptions(), ["led/clients", "led/effects/#"]);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let mut options = BrokerOptions::default();
        options.qos = 7;

        assert!(matches!(
            MqttLink::new(&options, &TopicMap::default()),
            Err(TransportError::InvalidOptions(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_refused_before_connect() {
        let (link, _event_loop) =
            MqttLink::new(&BrokerOptions::default(), &TopicMap::default()).unwrap();

        let result = link.publish("led/effect", Bytes::from_static(b"{}")).await;
        assert!(matches!(result, Err(PublishError::NotConnected)));
    }

    #[tokio::test]
    async fn test_publish_never_waits_with_broker_down() {
        let (link, event_loop) = MqttLink::new(&local_options(1), &TopicMap::default()).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        tokio::spawn(event_loop.run(tx));

        for _ in 0..100 {
            let result = timeout(
                Duration::from_secs(1),
                link.publish("led/effect", Bytes::from_static(b"{}")),
            )
            .await
            .expect("publish must not wait on an unreachable broker");
            assert!(matches!(result, Err(PublishError::NotConnected)));
        }
    }

    #[tokio::test]
    async fn test_publish_rejected_when_queue_full() {
        let mut options = BrokerOptions::default();
        options.request_capacity = 2;
        let (link, _event_loop) = MqttLink::new(&options, &TopicMap::default()).unwrap();
        // Session marked up, but nobody drains the request queue.
        link.connected.store(true, Ordering::Release);

        for _ in 0..2 {
            link.publish("led/effect", Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }
        let result = link.publish("led/effect", Bytes::from_static(b"{}")).await;
        assert!(matches!(result, Err(PublishError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_event_loop_stops_when_ingress_closes() {
        let (link, event_loop) = MqttLink::new(&local_options(1), &TopicMap::default()).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(event_loop.run(tx));

        // Let it fail and retry a few times before the bridge goes away.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        drop(rx);

        let result = timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(TransportError::IngressClosed)));
        assert!(!link.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_session_subscribes_forwards_and_resubscribes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (link, event_loop) =
            MqttLink::new(&local_options(port), &TopicMap::default()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(event_loop.run(tx));

        let mut stream = accept_session(&listener).await;
        assert_eq!(
            read_subscriptions(&mut stream).await,
            ["led/clients", "led/effects/#"]
        );

        // Incoming publishes reach the ingress queue unchanged.
        let payload = br#"{"client_id":"A","status":"connected"}"#;
        stream
            .write_all(&publish_packet("led/clients", payload))
            .await
            .unwrap();
        let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(message.topic, "led/clients");
        assert_eq!(&message.payload[..], &payload[..]);

        // Commands go out on the live session.
        link.publish("led/effect", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        loop {
            let (kind, body) = timeout(WAIT, read_packet(&mut stream)).await.unwrap();
            if kind == 3 {
                assert_eq!(&body[2..12], b"led/effect");
                break;
            }
        }

        // A new session is subscribed again.
        drop(stream);
        let mut stream = accept_session(&listener).await;
        assert_eq!(
            read_subscriptions(&mut stream).await,
            ["led/clients", "led/effects/#"]
        );
    }
}
