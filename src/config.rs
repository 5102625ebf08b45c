//! The native configuration interface.
//!
//! Plugins implement [`Config`] in-process. The host never calls a plugin's
//! implementation directly; it talks to a [`ConfigClient`](crate::ConfigClient),
//! which implements the same trait by calling across the process boundary.

use async_trait::async_trait;

use crate::codec::ConfigData;
use crate::context::Context;
use crate::error::Result;

/// Configuration lifecycle of a plugin.
///
/// Implementations must be safe to call concurrently: the bridge does not
/// serialize calls across outstanding requests.
#[async_trait]
pub trait Config: Send + Sync + 'static {
    /// The target-machine object handed to validation.
    type Machine: Send + Sync + 'static;

    /// One-time setup, run before the implementation serves any request.
    fn init(&self) {}

    /// Names of the attributes this configuration understands.
    async fn config_attributes(&self) -> Result<Vec<String>>;

    /// Turn raw configuration into loaded configuration.
    async fn config_load(&self, ctx: &Context, data: ConfigData) -> Result<ConfigData>;

    /// Validate configuration against a machine.
    ///
    /// An empty list means valid. Problems with the configuration are
    /// reported in the list, not as an error.
    async fn config_validate(
        &self,
        ctx: &Context,
        data: ConfigData,
        machine: &Self::Machine,
    ) -> Result<Vec<String>>;

    /// Resolve configuration into its final values.
    async fn config_finalize(&self, ctx: &Context, data: ConfigData) -> Result<ConfigData>;
}
