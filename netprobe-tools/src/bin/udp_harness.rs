// src/bin/udp_harness.rs

use dotenv::dotenv;
use std::error::Error;
use log::{info, warn, error};
use tokio::sync::broadcast::error::RecvError;
use netprobe_lib::harness::{bind_listener, bind_sender, DEFAULT_MESSAGE, SEND_INTERVAL};
use netprobe_lib::{Context, HarnessSettings, Message, run_listener, run_sender};

/* RUST_LOG=info cargo run -p netprobe-tools --bin udp-harness
   UDP_SEND_ADDR=127.0.0.1:5653 loops the sender back into the listener */

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));

    let settings = HarnessSettings::from_env()?;
    let ctx = Context::new(64);
    ctx.listen_for_interrupt();

    // ──────── 1) Printer: listener events → stdout ────────
    let mut rx = ctx.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Message::Datagram { source, text }) => {
                    println!("[Listener] Received from {}:", source);
                    println!("{}", text);
                    println!("{}", "-".repeat(40));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Printer lagged, dropped {} datagrams", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ──────── 2) Listener: detached, never joined ────────
    let listener = bind_listener(settings.listen).await?;
    let listener_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_listener(listener, listener_ctx).await {
            error!("Listener failed: {}", e);
        }
    });

    // ──────── 3) Sender on the main path ────────
    let sender = bind_sender().await?;
    info!("Listen: {}  Send: {}", settings.listen, settings.send);
    run_sender(&sender, settings.send, DEFAULT_MESSAGE, SEND_INTERVAL, &ctx).await?;
    Ok(())
}
