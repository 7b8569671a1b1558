//! Cooperative cancellation.

use std::sync::Arc;
use tokio::sync::watch;

/// A clonable cancellation signal.
///
/// Cancellation is edge-triggered and sticky: once cancelled, every clone
/// observes it, and [`CancelToken::cancelled`] resolves immediately for all
/// future callers.
///
/// ```rust
/// use aegis_core::CancelToken;
///
/// # async fn example() {
/// let token = CancelToken::new();
/// let worker = token.clone();
///
/// tokio::spawn(async move {
///     worker.cancelled().await;
///     // wind down
/// });
///
/// token.cancel();
/// # }
/// ```
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        // The sender lives inside this token, so changed() only errors if
        // every token is dropped, in which case cancellation can no longer
        // be signalled and pending waits park forever by contract.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_sticky_and_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn clones_observe_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();

        let handle = tokio::spawn(async move {
            clone.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
