use std::borrow::Cow;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use log::{info, debug, error};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{self, MissedTickBehavior};
use crate::context::Context;
use crate::message::{BridgeFrame, Message};

/// Largest datagram the listener reads; longer ones are truncated by the OS.
pub const RECV_BUFFER_SIZE: usize = 2048;
pub const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5653));
pub const DEFAULT_SEND_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6565));
pub const DEFAULT_MESSAGE: &str = "topicA\nGood Bye\nnice;to:meet,you!";
pub const SEND_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("UDP receive error: {0}")]
    Recv(#[source] std::io::Error),

    #[error("UDP send error to {dest}: {source}")]
    Send {
        dest: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("send interval must be greater than zero")]
    ZeroInterval,
}

/// UTF-8 decode that never fails: invalid sequences become U+FFFD.
pub fn decode_payload(data: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(data)
}

pub async fn bind_listener(addr: SocketAddr) -> Result<UdpSocket, HarnessError> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| HarnessError::Bind { addr, source })
}

/// Ephemeral socket for sending; the OS picks address and port.
pub async fn bind_sender() -> Result<UdpSocket, HarnessError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], 0));
    UdpSocket::bind(addr)
        .await
        .map_err(|source| HarnessError::Bind { addr, source })
}

/// Receive datagrams on `socket` and broadcast each as `Message::Datagram`
/// until `ctx` is shut down.
pub async fn run_listener(socket: UdpSocket, ctx: Context) -> Result<(), HarnessError> {
    if let Ok(addr) = socket.local_addr() {
        info!("[Listener] Listening on {}", addr);
    }

    let cancelled = ctx.cancelled();
    tokio::pin!(cancelled);
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        let (n, source) = tokio::select! {
            biased;
            _ = &mut cancelled => break,
            received = socket.recv_from(&mut buf) => received.map_err(HarnessError::Recv)?,
        };

        let text = decode_payload(&buf[..n]).into_owned();
        info!("[Listener] Received {} bytes from {}", n, source);
        if let Some(frame) = BridgeFrame::parse(&text) {
            debug!("[Listener] Datagram carries topic '{}'", frame.topic);
        }

        // no subscriber means nobody prints; the datagram is still consumed
        let _ = ctx.tx.send(Message::Datagram { source, text });
    }

    info!("[Listener] Stopped");
    Ok(())
}

/// Send `message` to `dest` every `interval`, first send immediately, until
/// `ctx` is shut down. Returns the number of datagrams sent.
/// A zero `interval` is rejected with `HarnessError::ZeroInterval`.
pub async fn run_sender(
    socket: &UdpSocket,
    dest: SocketAddr,
    message: &str,
    interval: Duration,
    ctx: &Context,
) -> Result<u64, HarnessError> {
    if interval.is_zero() {
        return Err(HarnessError::ZeroInterval);
    }
    info!("[Sender] Sending to {} every {:?}", dest, interval);

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let cancelled = ctx.cancelled();
    tokio::pin!(cancelled);

    let mut sent = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => break,
            _ = ticker.tick() => {}
        }

        match socket.send_to(message.as_bytes(), dest).await {
            Ok(n) => {
                debug!("[Sender] Sent {} bytes", n);
                sent += 1;
            }
            Err(source) => {
                error!("[Sender] Send to {} failed: {}", dest, source);
                return Err(HarnessError::Send { dest, source });
            }
        }
    }

    info!("[Sender] Stopped after {} datagrams", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_passes_valid_utf8_through() {
        let decoded = decode_payload(DEFAULT_MESSAGE.as_bytes());
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, DEFAULT_MESSAGE);
    }

    #[test]
    fn decode_replaces_invalid_sequences() {
        let decoded = decode_payload(&[b'o', b'k', 0xff, 0xfe, b'!']);
        assert_eq!(decoded, "ok\u{FFFD}\u{FFFD}!");

        // truncated multi-byte sequence
        let decoded = decode_payload(&[0xe3, 0x81]);
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn decode_never_panics_on_any_byte() {
        for b in 0..=255u8 {
            let data = [b, b.wrapping_add(0x80), 0xc0, b];
            let decoded = decode_payload(&data);
            assert!(!decoded.is_empty());
        }
        assert_eq!(decode_payload(&[]), "");
    }

    #[tokio::test(start_paused = true)]
    async fn first_send_goes_out_before_the_interval() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = sink.local_addr().unwrap();
        let socket = bind_sender().await.unwrap();
        let ctx = Context::new(4);
        let start = time::Instant::now();

        let sender = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                run_sender(&socket, dest, "ping", Duration::from_secs(1), &ctx).await
            })
        };

        let mut buf = [0u8; 16];
        let (n, _) = sink.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        ctx.shutdown();

        let sent = sender.await.unwrap().unwrap();
        assert_eq!(sent, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let socket = bind_sender().await.unwrap();
        let ctx = Context::new(4);
        let err = run_sender(&socket, DEFAULT_SEND_ADDR, "ping", Duration::ZERO, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::ZeroInterval));
    }

    #[tokio::test]
    async fn binding_a_taken_port_fails() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = first.local_addr().unwrap();
        let err = bind_listener(addr).await.unwrap_err();
        assert!(matches!(err, HarnessError::Bind { addr: a, .. } if a == addr));
    }
}
