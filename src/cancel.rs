//! Cooperative cancellation shared by retry delays, poll ticks, and batch
//! workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::ApiError;

/// Cloneable cancellation flag. Every clone observes the same state.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// Creates a signal in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so the wait only ends on cancel.
        receiver.wait_for(|flag| *flag).await.ok();
    }

    /// Returns [`ApiError::Cancelled`] when cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Cancelled`] once [`Self::cancel`] has been called.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.is_cancelled() {
            Err(ApiError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Cancelled`] if cancellation wins the race.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ApiError> {
        self.check()?;
        tokio::select! {
            () = self.cancelled() => Err(ApiError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drives `future` to completion unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Cancelled`] if cancellation wins the race.
    pub async fn run<F, T>(&self, future: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.check()?;
        tokio::select! {
            () = self.cancelled() => Err(ApiError::Cancelled),
            result = future => result,
        }
    }
}
