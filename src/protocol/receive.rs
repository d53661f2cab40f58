//! The handler's input side: request body, then the disconnect signal.

use bytes::Bytes;
use tokio::sync::watch;

use super::ReceiveEvent;

/// Adapter-owned signal raised once the response has been written and flushed.
///
/// Every [`Receive`] created from it observes the change; dropping the signal
/// also counts as a disconnect, since the exchange cannot continue.
#[derive(Debug)]
pub struct ResponseSent {
    tx: watch::Sender<bool>,
}

impl ResponseSent {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Marks the response as fully written. Idempotent.
    pub fn mark(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_sent(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ResponseSent {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer of [`ReceiveEvent`]s for one exchange.
///
/// The first pull always yields the whole request body with
/// `more_body == false`. Later pulls never end the sequence: they yield
/// [`ReceiveEvent::Disconnect`] once the response is sent, every time.
/// Before that, [`try_recv`](Self::try_recv) yields
/// [`ReceiveEvent::Pending`] and [`recv`](Self::recv) waits.
///
/// `recv` must not be awaited for the disconnect before the handler has
/// yielded its final body event: the response is only written after the
/// handler yields it, so such a wait never completes.
#[derive(Debug)]
pub struct Receive {
    body: Option<Bytes>,
    sent: watch::Receiver<bool>,
}

impl Receive {
    pub fn new(body: Bytes, sent: &ResponseSent) -> Self {
        Self {
            body: Some(body),
            sent: sent.subscribe(),
        }
    }

    /// Returns the next event, waiting for the disconnect if necessary.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn recv(&mut self) -> ReceiveEvent {
        if let Some(event) = self.take_body() {
            return event;
        }
        // Err means the adapter is gone, which is a disconnect as well.
        let _ = self.sent.wait_for(|sent| *sent).await;
        ReceiveEvent::Disconnect
    }

    /// Returns the next event without waiting.
    pub fn try_recv(&mut self) -> ReceiveEvent {
        if let Some(event) = self.take_body() {
            return event;
        }
        if *self.sent.borrow() || self.sent.has_changed().is_err() {
            ReceiveEvent::Disconnect
        } else {
            ReceiveEvent::Pending
        }
    }

    /// Reads the request body, skipping it if it was already taken.
    pub fn body(&mut self) -> Bytes {
        self.take_body()
            .and_then(ReceiveEvent::into_body)
            .unwrap_or_default()
    }

    fn take_body(&mut self) -> Option<ReceiveEvent> {
        self.body.take().map(|body| ReceiveEvent::Request {
            body,
            more_body: false,
        })
    }
}
