use std::path::PathBuf;
use std::time::Duration;
use log::{info, debug, error};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::{self, Instant, MissedTickBehavior};
use crate::broker::{BrokerError, Publish};
use crate::context::Context;
use crate::message::{Message, PlotMessage};
use crate::route::{self, DEFAULT_PERIOD, ROUTES};

pub const TOPIC: &str = "realtime/3dpoints";
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("publish failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("dump file write failed: {0}")]
    Dump(#[from] std::io::Error),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub topic:  String,
    pub period: Duration,
    pub tick:   Duration,
    /// Append every payload as one NDJSON line here.
    pub dump:   Option<PathBuf>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic:  TOPIC.to_string(),
            period: DEFAULT_PERIOD,
            tick:   TICK,
            dump:   None,
        }
    }
}

/// Message for the tick `elapsed` after start: one point per route.
pub fn build_message(elapsed: Duration, period: Duration) -> PlotMessage {
    let angle = route::angle(elapsed.as_secs_f64(), period.as_secs_f64());
    PlotMessage {
        timestamp: elapsed.as_secs(),
        points:    ROUTES.iter().map(|r| r.point_at(angle)).collect(),
    }
}

/// Publish one message per tick into `sink` until `ctx` is shut down, then
/// disconnect the sink. Returns the number of messages published.
/// A zero `tick` or `period` is rejected before anything is sent.
pub async fn run_publisher<S: Publish + ?Sized>(
    sink: &mut S,
    config: &PublisherConfig,
    ctx: &Context,
) -> Result<u64, PublisherError> {
    if config.tick.is_zero() {
        return Err(PublisherError::ZeroDuration("tick"));
    }
    if config.period.is_zero() {
        return Err(PublisherError::ZeroDuration("period"));
    }

    let mut dump = match &config.dump {
        Some(path) => {
            info!("Dumping payloads to {}", path.display());
            Some(OpenOptions::new().create(true).append(true).open(path).await?)
        }
        None => None,
    };

    let start = Instant::now();
    let mut ticker = time::interval_at(start, config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cancelled = ctx.cancelled();
    tokio::pin!(cancelled);

    let mut published = 0u64;
    loop {
        let deadline = tokio::select! {
            biased;
            _ = &mut cancelled => break,
            at = ticker.tick() => at,
        };

        let message = build_message(deadline - start, config.period);
        let payload = message.to_json()?;

        if let Err(e) = sink.publish(&config.topic, &payload).await {
            error!("Failed to publish to {}: {}", config.topic, e);
            return Err(e.into());
        }
        debug!("Published to {}: {}", config.topic, payload);
        published += 1;

        if let Some(file) = dump.as_mut() {
            file.write_all(payload.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }

        // nobody listening is fine
        let _ = ctx.tx.send(Message::Published { topic: config.topic.clone(), payload });
    }

    if let Some(mut file) = dump {
        file.flush().await?;
    }
    sink.disconnect().await?;
    info!("Publisher stopped after {} messages", published);
    Ok(published)
}
