//! Client mailbox
//!
//! A bounded FIFO of outbound frames with many producers (every room the
//! client belongs to, plus its own read pump for replies) and a single
//! consumer (the client's write pump).
//!
//! Retirement is a flag checked before every enqueue rather than a close of
//! the channel, so a room that still holds the mailbox after its owner left
//! gets a `Retired` error instead of racing the shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::error::DeliveryError;
use crate::message::Outbound;

/// Create a mailbox holding at most `capacity` undelivered frames
pub fn channel(capacity: usize) -> (Mailbox, MailboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (retired_tx, retired_rx) = watch::channel(false);
    let mailbox = Mailbox {
        tx,
        state: Arc::new(MailboxState {
            retired: retired_tx,
            dropped: AtomicU64::new(0),
        }),
    };
    let receiver = MailboxReceiver {
        rx,
        retired: retired_rx,
    };
    (mailbox, receiver)
}

#[derive(Debug)]
struct MailboxState {
    retired: watch::Sender<bool>,
    dropped: AtomicU64,
}

/// Producer side of a client mailbox
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::Sender<Outbound>,
    state: Arc<MailboxState>,
}

impl Mailbox {
    /// Enqueue without waiting
    pub fn try_deliver(&self, msg: impl Into<Outbound>) -> Result<(), DeliveryError> {
        if self.is_retired() {
            return Err(DeliveryError::Retired);
        }
        self.tx.try_send(msg.into()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::MailboxSaturated,
            TrySendError::Closed(_) => DeliveryError::Retired,
        })
    }

    pub fn is_retired(&self) -> bool {
        *self.state.retired.borrow()
    }

    /// Refuse further deliveries and stop the write pump once it has drained
    /// what is already queued. Idempotent.
    pub fn retire(&self) {
        self.state.retired.send_replace(true);
    }

    /// Count a message dropped under the `Drop` backpressure policy
    pub(crate) fn record_drop(&self) -> u64 {
        self.state.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Messages dropped for this recipient so far
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    /// Watch for retirement from another task
    pub fn retirement(&self) -> Retirement {
        Retirement(self.state.retired.subscribe())
    }
}

/// Resolves once the mailbox it was taken from is retired
#[derive(Debug)]
pub struct Retirement(watch::Receiver<bool>);

impl Retirement {
    pub async fn wait(&mut self) {
        // An error means every producer is gone, which is just as final.
        let _ = self.0.wait_for(|retired| *retired).await;
    }
}

/// Consumer side of a client mailbox, owned by the write pump
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::Receiver<Outbound>,
    retired: watch::Receiver<bool>,
}

impl MailboxReceiver {
    /// Next queued frame
    ///
    /// After retirement the frames already queued are still handed out, then
    /// `None` is returned.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if *self.retired.borrow() {
            return self.rx.try_recv().ok();
        }
        tokio::select! {
            biased;
            msg = self.rx.recv() => return msg,
            _ = self.retired.wait_for(|retired| *retired) => {}
        }
        self.rx.try_recv().ok()
    }
}
