//! Callback bridge.
//!
//! Background tasks never touch session or handler state. They hand a
//! [`Callback`] to the bridge instead, and the event loop runs it on its own
//! task between platform events.

use tokio::sync::mpsc;
use tracing::warn;

use super::dispatcher::Dispatcher;
use super::session::Session;

/// Default bridge capacity. Each upload enqueues at most two callbacks.
pub const CALLBACK_CAPACITY: usize = 32;

/// Work deferred to the event loop.
pub type Callback = Box<dyn FnOnce(&mut Dispatcher, &mut Session) + Send + 'static>;

/// Producer half. Cheap to clone and safe to move into background tasks.
#[derive(Clone)]
pub struct CallbackSender {
    tx: mpsc::Sender<Callback>,
}

impl CallbackSender {
    /// Queue a callback, waiting for room if the bridge is full.
    ///
    /// Returns `false` if the event loop has shut down.
    pub async fn enqueue<F>(&self, callback: F) -> bool
    where
        F: FnOnce(&mut Dispatcher, &mut Session) + Send + 'static,
    {
        if self.tx.send(Box::new(callback)).await.is_err() {
            warn!("Callback dropped: event loop is gone");
            return false;
        }
        true
    }
}

/// Consumer half. Owned by the event loop.
pub struct CallbackReceiver {
    rx: mpsc::Receiver<Callback>,
}

impl CallbackReceiver {
    /// Wait for the next callback.
    pub async fn recv(&mut self) -> Option<Callback> {
        self.rx.recv().await
    }

    /// Take a queued callback without waiting.
    pub fn try_recv(&mut self) -> Option<Callback> {
        self.rx.try_recv().ok()
    }
}

/// Create a bounded callback bridge.
pub fn channel(capacity: usize) -> (CallbackSender, CallbackReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (CallbackSender { tx }, CallbackReceiver { rx })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::bot::session::testing::session;
    use crate::platform::testing::RecordingOutgoing;

    #[tokio::test]
    async fn test_callbacks_run_in_enqueue_order() {
        let (tx, mut rx) = channel(4);
        let outgoing = RecordingOutgoing::new();
        let mut session = session(Arc::new(outgoing.clone()), tx.clone());
        let mut dispatcher = Dispatcher::new("UBOT").unwrap();

        tokio::spawn(async move {
            tx.enqueue(|_, s: &mut Session| s.send("first", "C1")).await;
            tx.enqueue(|_, s: &mut Session| s.send("second", "C1")).await;
        })
        .await
        .unwrap();

        while let Some(callback) = rx.try_recv() {
            callback(&mut dispatcher, &mut session);
        }
        assert_eq!(outgoing.sent_to("C1"), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_full_bridge_waits_instead_of_dropping() {
        let (tx, mut rx) = channel(1);
        tx.enqueue(|_, _| {}).await;

        let producer = tokio::spawn({
            let tx = tx.clone();
            async move { tx.enqueue(|_, _| {}).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert!(rx.recv().await.is_some());
        assert!(producer.await.unwrap());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_reports_false() {
        let (tx, rx) = channel(1);
        drop(rx);
        assert!(!tx.enqueue(|_, _| {}).await);
    }
}
