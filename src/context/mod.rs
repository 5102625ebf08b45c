//! Cancellation and deadline signals.
//!
//! A [`Context`] is an immutable, cheaply clonable signal that becomes done
//! exactly once, either because a [`CancelHandle`] fired, a deadline passed,
//! or a parent context finished. Once done it stays done and keeps reporting
//! the same kind of cause.
//!
//! Contexts are checked lazily: no timer task is spawned for deadlines, so
//! they can be created outside a runtime and only [`Context::done`] needs one.

mod join;

pub use join::join;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context finished.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Cancelled through a [`CancelHandle`].
    #[error("context cancelled: {0}")]
    Cancelled(String),

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    /// Build a cancellation cause.
    pub fn cancelled(cause: impl Into<String>) -> Self {
        Self::Cancelled(cause.into())
    }
}

/// Cancellation/deadline signal shared by everything working on one call or session.
#[derive(Clone)]
pub struct Context {
    node: Arc<Node>,
}

enum Node {
    Background,
    Cancel { parent: Context, signal: watch::Receiver<Option<ContextError>> },
    Deadline { parent: Context, at: Instant },
    Join { local: Context, session: Context },
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self::from_node(Node::Background)
    }

    fn from_node(node: Node) -> Self {
        Self { node: Arc::new(node) }
    }

    /// Derive a child that can be cancelled independently of this context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (sender, signal) = watch::channel(None);
        let ctx = Self::from_node(Node::Cancel { parent: self.clone(), signal });
        (ctx, CancelHandle { sender: Arc::new(sender) })
    }

    /// Derive a child that is done at `at` at the latest.
    pub fn with_deadline(&self, at: Instant) -> Self {
        Self::from_node(Node::Deadline { parent: self.clone(), at })
    }

    /// Derive a child that is done after `timeout` at the latest.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The cause, if this context is done.
    pub fn err(&self) -> Option<ContextError> {
        match &*self.node {
            Node::Background => None,
            Node::Cancel { parent, signal } => signal.borrow().clone().or_else(|| parent.err()),
            Node::Deadline { parent, at } => parent
                .err()
                .or_else(|| (Instant::now() >= *at).then_some(ContextError::DeadlineExceeded)),
            Node::Join { local, session } => local.err().or_else(|| session.err()),
        }
    }

    /// Whether this context is done.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The earliest deadline this context is subject to.
    pub fn deadline(&self) -> Option<Instant> {
        match &*self.node {
            Node::Background => None,
            Node::Cancel { parent, .. } => parent.deadline(),
            Node::Deadline { parent, at } => earliest(Some(*at), parent.deadline()),
            Node::Join { local, session } => earliest(local.deadline(), session.deadline()),
        }
    }

    /// Resolve once this context is done, yielding the cause.
    pub fn done(&self) -> BoxFuture<'_, ContextError> {
        match &*self.node {
            Node::Background => future::pending().boxed(),
            Node::Cancel { parent, signal } => {
                let mut signal = signal.clone();
                async move {
                    tokio::select! {
                        biased;
                        cause = wait_cancelled(&mut signal) => cause,
                        cause = parent.done() => cause,
                    }
                }
                .boxed()
            }
            Node::Deadline { parent, at } => {
                let at = *at;
                async move {
                    tokio::select! {
                        biased;
                        cause = parent.done() => cause,
                        () = tokio::time::sleep_until(at) => ContextError::DeadlineExceeded,
                    }
                }
                .boxed()
            }
            Node::Join { local, session } => async move {
                tokio::select! {
                    biased;
                    cause = local.done() => cause,
                    cause = session.done() => cause,
                }
            }
            .boxed(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("err", &self.err())
            .field("deadline", &self.deadline())
            .finish()
    }
}

async fn wait_cancelled(signal: &mut watch::Receiver<Option<ContextError>>) -> ContextError {
    loop {
        if let Some(cause) = signal.borrow_and_update().clone() {
            return cause;
        }
        if signal.changed().await.is_err() {
            // Handle dropped without cancelling: this source never fires.
            return future::pending().await;
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Cancels the context it was created with.
///
/// Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<Option<ContextError>>>,
}

impl CancelHandle {
    /// Cancel with a generic cause.
    pub fn cancel(&self) -> bool {
        self.cancel_with("cancelled by caller")
    }

    /// Cancel with the given cause.
    ///
    /// Returns `false` if the context was already cancelled; the first cause wins.
    pub fn cancel_with(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        self.sender.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(ContextError::Cancelled(cause));
            true
        })
    }

    /// Whether this handle has fired.
    pub fn is_cancelled(&self) -> bool {
        self.sender.borrow().is_some()
    }
}
