use log::{info, error};
use tokio::sync::{broadcast, watch};
use crate::message::Message;

/// Broadcast channel for harness/publisher events plus the shutdown flag
/// every long-running loop selects on.
#[derive(Clone)]
pub struct Context {
    pub tx: broadcast::Sender<Message>,
    shutdown: watch::Sender<bool>,
}

impl Context {
    /// Create a new Context with an event channel of the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        Self { tx, shutdown }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `shutdown` has been called, immediately if it already was.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            // the sender lives in `self`; an Err only means every Context is gone
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }

    /// Flip the shutdown flag on Ctrl-C.
    pub fn listen_for_interrupt(&self) {
        let ctx = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted by user, shutting down"),
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            }
            ctx.shutdown();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_shutdown() {
        let ctx = Context::new(4);
        let waiter = tokio::spawn(ctx.cancelled());
        assert!(!ctx.is_shutdown());
        ctx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_is_immediate_when_already_shut_down() {
        let ctx = Context::new(4);
        ctx.shutdown();
        tokio::time::timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .expect("late subscriber missed shutdown");
    }
}
