use std::net::SocketAddr;
use serde::{Deserialize, Serialize};

/// One sample on a route, recomputed every tick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u32,
    pub x:  f64,
    pub y:  f64,
    pub z:  f64,
}

/// Payload published once per tick: whole seconds since start plus one point per route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotMessage {
    pub timestamp: u64,
    pub points:    Vec<Point>,
}

impl PlotMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `topic\npayload` framing understood by the UDP → MQTT relay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeFrame {
    pub topic:   String,
    pub payload: String,
}

impl BridgeFrame {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }

    pub fn encode(&self) -> String {
        format!("{}\n{}", self.topic, self.payload)
    }

    /// Splits on the first newline; text without one is not a frame.
    pub fn parse(text: &str) -> Option<Self> {
        let (topic, payload) = text.split_once('\n')?;
        Some(Self::new(topic, payload))
    }
}

/// Events fanned out over the context's broadcast channel:
/// - `Datagram`  for every packet the harness listener receives
/// - `Published` after the publisher hands a payload to its sink
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    Datagram  { source: SocketAddr, text: String },
    Published { topic: String, payload: String },
}
