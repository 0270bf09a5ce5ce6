//! Contains the cancellation signal an in-flight update observes
//! between two attempts.

use futures::future;
use tokio::sync::watch;

/// Creates a new cancellation pair: the [`CancelHandle`] fires the signal,
/// every clone of the [`CancelToken`] observes it.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fires the cancellation signal.
    ///
    /// Updates observing the token stop before their next attempt; an
    /// attempt already committing runs to completion.
    pub fn cancel(&self) {
        // Only fails when every token has been dropped, i.e. nobody is listening.
        let _ = self.tx.send(true);
    }
}

/// Receiving half of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Returns a token that never fires.
    pub fn never() -> Self {
        let (_, token) = cancellation();
        token
    }

    /// Returns `true` if the signal has been fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the signal has been fired.
    ///
    /// Pends forever if the [`CancelHandle`] is dropped without firing.
    pub async fn cancelled(&mut self) {
        while !self.is_cancelled() {
            if self.rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
    }
}
