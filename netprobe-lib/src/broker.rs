use std::net::SocketAddr;
use std::time::Duration;
use async_trait::async_trait;
use log::{info, debug, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use crate::message::BridgeFrame;

/// Errors returned by publish sinks.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("UDP send error: {0}")]
    Udp(#[from] std::io::Error),
}

/// Anything the publisher can push a serialized payload into.
#[async_trait]
pub trait Publish: Send {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Release the connection. Called once, after the last publish.
    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// MQTT client with its event loop driven on a background task.
pub struct MqttSink {
    client: AsyncClient,
    driver: Option<JoinHandle<()>>,
}

impl MqttSink {
    /// Connect to `host:port` and wait for CONNACK, so a refused connection
    /// fails here rather than on the first publish.
    pub async fn connect(host: &str, port: u16) -> Result<Self, BrokerError> {
        let client_id = format!("netprobe-route-publisher-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        loop {
            if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
                info!("Connected to MQTT broker {}:{} ({:?})", host, port, ack.code);
                break;
            }
        }

        let driver = tokio::spawn(drive(eventloop));
        Ok(Self { client, driver: Some(driver) })
    }
}

async fn drive(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                warn!("MQTT event loop stopped: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl Publish for MqttSink {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client.disconnect().await?;
        if let Some(driver) = self.driver.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, driver).await.is_err() {
                warn!("MQTT event loop did not stop within {:?}", DISCONNECT_GRACE);
            }
        }
        info!("Disconnected from MQTT broker");
        Ok(())
    }
}

/// Fire-and-forget UDP sink speaking the relay's `topic\npayload` framing.
pub struct UdpBridgeSink {
    socket: UdpSocket,
    relay:  SocketAddr,
}

impl UdpBridgeSink {
    pub async fn bind(relay: SocketAddr) -> Result<Self, BrokerError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        info!("Publishing through UDP relay {}", relay);
        Ok(Self { socket, relay })
    }
}

#[async_trait]
impl Publish for UdpBridgeSink {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let body = BridgeFrame::new(topic, payload).encode();
        let sent = self.socket.send_to(body.as_bytes(), self.relay).await?;
        debug!("UDP relay wrote {} bytes", sent);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bridge_sink_frames_topic_and_payload() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sink = UdpBridgeSink::bind(relay.local_addr().unwrap()).await.unwrap();

        sink.publish("realtime/3dpoints", r#"{"timestamp":0}"#).await.unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = relay.recv_from(&mut buf).await.unwrap();
        let frame = BridgeFrame::parse(std::str::from_utf8(&buf[..n]).unwrap()).unwrap();
        assert_eq!(frame.topic, "realtime/3dpoints");
        assert_eq!(frame.payload, r#"{"timestamp":0}"#);
        sink.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn mqtt_connect_refused_is_an_error() {
        // grab a free port, then close it so nothing is listening
        let port = {
            let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            free.local_addr().unwrap().port()
        };
        let result = MqttSink::connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }

    #[tokio::test]
    async fn mqtt_sink_publishes_qos0_then_disconnects() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // minimal broker: acknowledge CONNECT, then collect everything until the client hangs up
        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let n = stream.read(&mut connect).await.unwrap();
            assert!(n > 0);
            assert_eq!(connect[0], 0x10, "first packet must be CONNECT");
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let mut sink = MqttSink::connect("127.0.0.1", port).await.unwrap();
        sink.publish("realtime/3dpoints", "{}").await.unwrap();
        sink.disconnect().await.unwrap();

        let bytes = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .expect("client never closed the connection")
            .unwrap();

        // PUBLISH, QoS 0, retain off
        assert_eq!(bytes[0], 0x30);
        assert!(bytes.windows(17).any(|w| w == b"realtime/3dpoints"));
        assert!(bytes.windows(2).any(|w| w == b"{}"));
        assert!(bytes.ends_with(&[0xE0, 0x00]), "last packet must be DISCONNECT: {:02x?}", bytes);
    }
}
