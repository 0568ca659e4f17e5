//! Cancellable execution context.
//!
//! A [`Context`] is threaded through providers, filters and handlers. It can be
//! cancelled exactly once with a [`CancelCause`]; every clone observes the
//! same cancellation. Child contexts are cancelled together with their parent
//! and may carry their own deadline.
//!
//! A context may also carry a progress sink: human-readable lines that an
//! inbound request handler streams back to its caller while a task runs.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CancelCause;

/// One level of the cancellation tree.
///
/// A node's cause is written before its token is cancelled, so whoever sees a
/// cancelled token also finds a cause on this node or one of its ancestors.
struct Node {
    token: CancellationToken,
    cause: OnceLock<CancelCause>,
    parent: Option<Arc<Node>>,
}

impl Node {
    fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: OnceLock::new(),
            parent: None,
        }
    }

    fn child_of(parent: &Arc<Node>) -> Self {
        Self {
            token: parent.token.child_token(),
            cause: OnceLock::new(),
            parent: Some(Arc::clone(parent)),
        }
    }

    fn cancel(&self, cause: CancelCause) -> bool {
        if self.token.is_cancelled() || self.cause.set(cause).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    fn cause(&self) -> Option<CancelCause> {
        match self.cause.get() {
            Some(cause) => Some(cause.clone()),
            None => self.parent.as_ref()?.cause(),
        }
    }
}

/// Shared cancellable context with an attached cause.
#[derive(Clone)]
pub struct Context {
    node: Arc<Node>,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl Context {
    /// Create a root context that is only cancelled explicitly.
    pub fn new() -> Self {
        Self {
            node: Arc::new(Node::root()),
            progress: None,
        }
    }

    /// Cancel the context. Only the first cause is kept; returns whether this
    /// call was the one that cancelled it.
    pub fn cancel(&self, cause: CancelCause) -> bool {
        let cancelled = self.node.cancel(cause);
        if cancelled {
            tracing::debug!(cause = ?self.cause(), "Context cancelled");
        }
        cancelled
    }

    /// The cancellation cause, if the context has been cancelled.
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.node.token.is_cancelled() {
            return None;
        }
        self.node.cause()
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.token.is_cancelled()
    }

    /// Wait until the context is cancelled and return the cause.
    pub async fn cancelled(&self) -> CancelCause {
        self.node.token.cancelled().await;
        // Tokens are only cancelled through `Node::cancel`, which records a cause first.
        self.node.cause().unwrap_or_else(|| CancelCause::Aborted {
            reason: "cancelled without a cause".into(),
        })
    }

    /// Derive a child context that is cancelled when `self` is.
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(Node::child_of(&self.node)),
            progress: self.progress.clone(),
        }
    }

    /// Derive a child context that is additionally cancelled with
    /// [`CancelCause::DeadlineExceeded`] once `timeout` elapses.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let child = self.child();
        let node = Arc::downgrade(&child.node);
        let token = child.node.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(node) = node.upgrade() {
                        node.cancel(CancelCause::DeadlineExceeded { after: timeout });
                    }
                }
            }
        });

        child
    }

    /// Attach a progress sink. Lines passed to [`Context::report`] are sent to it.
    pub fn with_progress(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Send a progress line to the attached sink, if any.
    pub fn report(&self, line: impl Into<String>) {
        if let Some(ref sink) = self.progress {
            // A disconnected client just stops receiving progress.
            let _ = sink.send(line.into());
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cause", &self.cause())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
