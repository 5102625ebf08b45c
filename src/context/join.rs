//! Joining a call-scoped context with a session-scoped one.

use super::{Context, Node};

/// Combine two independent contexts into one that is done as soon as either is.
///
/// The result's deadline is the earlier of both inputs and its cause is the
/// cause of whichever input finished (`local` is reported when both are done).
/// Neither input is cancelled by the joined context.
pub fn join(local: &Context, session: &Context) -> Context {
    Context::from_node(Node::Join { local: local.clone(), session: session.clone() })
}
