//! Cancellation token shared between a call and whoever may abandon it.
//!
//! The client's cancellable call races the HTTP exchange against a token, and
//! the server hands each handler a token that fires when the exchange is
//! abandoned (caller disconnected, or shutdown forced past the grace period).

use tokio_util::sync::{DropGuard, WaitForCancellationFuture};

/// A cancellation token for cooperative cancellation of async operations.
///
/// Wraps [`tokio_util::sync::CancellationToken`] and adds [`check`](Self::check)
/// for code that polls instead of awaiting. Clones share state: when `cancel()`
/// is called on any clone, all clones observe it.
///
/// # Example
///
/// ```
/// use httprpc::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation, waking every task parked in
    /// [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Wait until cancellation is requested.
    ///
    /// Resolves immediately if the token is already cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.0.cancelled()
    }

    /// Create a child token.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent untouched.
    pub fn child_token(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }

    /// Returns a guard that cancels this token when dropped. Call
    /// `disarm()` on the guard to let go without cancelling.
    pub fn drop_guard(&self) -> DropGuard {
        self.0.clone().drop_guard()
    }
}

impl From<tokio_util::sync::CancellationToken> for CancellationToken {
    fn from(token: tokio_util::sync::CancellationToken) -> Self {
        Self(token)
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::RpcError {
    fn from(_: CancelledError) -> Self {
        crate::error::RpcError::Cancelled
    }
}
