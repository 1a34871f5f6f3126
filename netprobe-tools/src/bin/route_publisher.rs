// src/bin/route_publisher.rs

use dotenv::dotenv;
use std::error::Error;
use log::{info, warn, error};
use tokio::sync::broadcast::error::RecvError;
use netprobe_lib::{
    Context,
    Message,
    MqttSink,
    Publish,
    PublisherConfig,
    PublisherSettings,
    Transport,
    UdpBridgeSink,
    run_publisher,
};

/* RUST_LOG=info cargo run -p netprobe-tools --bin route-publisher
   PUBLISH_TRANSPORT=udp sends through the UDP relay instead of MQTT */

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // a .env file is optional; every setting has a default
    dotenv().ok();

    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));

    let settings = PublisherSettings::from_env()?;

    let mut sink: Box<dyn Publish> = match &settings.transport {
        Transport::Mqtt { host, port } => {
            info!("Broker: {}:{}", host, port);
            Box::new(MqttSink::connect(host, *port).await?)
        }
        Transport::UdpBridge { relay } => {
            info!("Relay : udp://{}", relay);
            Box::new(UdpBridgeSink::bind(*relay).await?)
        }
    };

    let ctx = Context::new(16);
    ctx.listen_for_interrupt();

    // published payloads → stdout
    let mut rx = ctx.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Message::Published { topic, payload }) => {
                    println!("Published to {}: {}", topic, payload);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Printer lagged, dropped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let config = PublisherConfig { dump: settings.dump, ..PublisherConfig::default() };
    info!("Topic : {} (one message every {:?})", config.topic, config.tick);

    run_publisher(sink.as_mut(), &config, &ctx).await?;
    info!("Publisher exited cleanly");
    Ok(())
}
