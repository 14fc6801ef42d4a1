//! Task context threaded through every asynchronous operation.
//!
//! A [`TaskContext`] bundles a shared [`CancelToken`] with a tracing span so
//! that nested operations log under their parent and all stop at the next
//! suspension point once cancellation is requested.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info_span, Span};

use crate::errors::{Result, WinappError};

/// Clonable cancellation signal. All clones observe the same state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so wait_for only returns once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for one logical operation: cancellation plus a logging span.
#[derive(Clone, Debug)]
pub struct TaskContext {
    token: CancelToken,
    span: Span,
}

impl TaskContext {
    /// Creates a root context with a fresh cancellation token.
    pub fn new(operation: &str) -> Self {
        Self::with_token(operation, CancelToken::new())
    }

    /// Creates a root context bound to an existing token (e.g. wired to Ctrl-C).
    pub fn with_token(operation: &str, token: CancelToken) -> Self {
        let span = info_span!("task", operation = operation);
        Self { token, span }
    }

    /// Creates a nested context sharing this context's token.
    pub fn child(&self, operation: &str) -> Self {
        let span = info_span!(parent: &self.span, "task", operation = operation);
        Self {
            token: self.token.clone(),
            span,
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `Err(Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(WinappError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Runs `fut` to completion unless cancellation wins first; the future is
    /// dropped on cancellation.
    pub async fn run_cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(WinappError::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_child_shares_token() {
        let ctx = TaskContext::new("root");
        let child = ctx.child("nested");
        ctx.token().cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(WinappError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_cancellable_completes() {
        let ctx = TaskContext::new("ok");
        let value = ctx.run_cancellable(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_cancellable_observes_cancel() {
        let ctx = TaskContext::new("slow");
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result: Result<()> = ctx
            .run_cancellable(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_short_circuits() {
        let ctx = TaskContext::new("pre");
        ctx.token().cancel();
        let result = ctx.run_cancellable(async { Ok(1) }).await;
        assert!(matches!(result, Err(WinappError::Cancelled)));
    }
}
