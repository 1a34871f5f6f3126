//! netprobe-lib: synthetic route publishing and a UDP send/receive harness

pub mod broker;
pub mod config;
pub mod context;
pub mod harness;
pub mod message;
pub mod publisher;
pub mod route;

// re-exports for ergonomic imports:
pub use broker::{BrokerError, MqttSink, Publish, UdpBridgeSink};
pub use config::{HarnessSettings, PublisherSettings, Transport};
pub use context::Context;
pub use message::{BridgeFrame, Message, PlotMessage, Point};
pub use harness::{run_listener, run_sender};
pub use publisher::{run_publisher, PublisherConfig};
