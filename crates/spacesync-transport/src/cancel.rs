//! Request cancellation

use std::sync::Arc;
use tokio::sync::watch;

/// Shared flag that aborts the requests it was passed to.
///
/// A cancelled request resolves with `Error::Cancelled`; whether the server
/// acted on it is unknown.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`CancellationToken::cancel`] was called
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
