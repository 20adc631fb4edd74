//! Notification hand-off
//!
//! Worker threads never invoke consumer callbacks inline. Change
//! notifications queue on a bounded channel and the single owning context
//! drains them itself, so every callback runs on that context.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;

use log::warn;

/// Change notification raised by a live view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent<T> {
    /// Batch of records added to the view membership
    Added(Vec<T>),

    /// Batch of records removed from the view membership
    Removed(Vec<T>),

    /// The membership settled after a refresh
    Updated,
}

/// Sending half of the notification channel, held by views.
///
/// Sending blocks when the channel is full; a closed channel (the owning
/// context stopped listening) drops the event with a warning instead of
/// failing the refresh.
#[derive(Debug, Clone)]
pub struct ViewNotifier<T> {
    tx: SyncSender<ViewEvent<T>>,
}

impl<T> ViewNotifier<T> {
    /// Queue an event for the owning context
    pub fn send(&self, event: ViewEvent<T>) {
        if self.tx.send(event).is_err() {
            warn!("notification dropped: owning context stopped listening");
        }
    }
}

/// Receiving half of the notification channel, drained by the owning
/// context
#[derive(Debug)]
pub struct ViewEvents<T> {
    rx: Receiver<ViewEvent<T>>,
}

impl<T> ViewEvents<T> {
    /// Drain everything currently queued, invoking `handle` per event;
    /// returns the number of events handled
    pub fn drain(&self, mut handle: impl FnMut(ViewEvent<T>)) -> usize {
        let mut handled = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    handle(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ViewEvent<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Create a bounded notification channel with the given capacity
pub fn channel<T>(capacity: usize) -> (ViewNotifier<T>, ViewEvents<T>) {
    let (tx, rx) = sync_channel(capacity);
    (ViewNotifier { tx }, ViewEvents { rx })
}
