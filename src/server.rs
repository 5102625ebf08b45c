//! Plugin-side adapter.
//!
//! [`ConfigServer`] exposes a native [`Config`] implementation as a
//! [`ConfigService`]. Each request runs its native call on a separate task
//! and races it against the request's context, so a cancelled request
//! returns right away however long the native call takes.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec;
use crate::config::Config;
use crate::context::Context;
use crate::machine::MachineCodec;
use crate::rpc::{
    AttributesResponse, ConfigService, FinalizeRequest, FinalizeResponse, JsonRpcError,
    LoadRequest, LoadResponse, NullRequest, ValidateRequest, ValidateResponse, METHOD_ATTRIBUTES,
    METHOD_FINALIZE, METHOD_LOAD, METHOD_VALIDATE,
};
use crate::settings::ServerSettings;

/// Serves a native config implementation over the wire contract.
pub struct ConfigServer<C, M> {
    imp: Arc<C>,
    machines: Arc<M>,
    settings: ServerSettings,
}

impl<C, M> ConfigServer<C, M>
where
    C: Config,
    M: MachineCodec<Machine = C::Machine>,
{
    /// Wrap an implementation with default settings.
    pub fn new(imp: Arc<C>, machines: M) -> Self {
        Self::with_settings(imp, machines, ServerSettings::default())
    }

    /// Wrap an implementation.
    ///
    /// Runs the implementation's `init` hook; this happens once per adapter,
    /// before the adapter can serve anything.
    pub fn with_settings(imp: Arc<C>, machines: M, settings: ServerSettings) -> Self {
        imp.init();
        tracing::debug!(abort_on_cancel = settings.abort_on_cancel, "config server ready");
        Self { imp, machines: Arc::new(machines), settings }
    }

    /// The wrapped implementation.
    pub fn implementation(&self) -> &Arc<C> {
        &self.imp
    }

    /// Run `delegate` on its own task, racing it against `ctx`.
    async fn race<T, F>(&self, ctx: &Context, method: &'static str, delegate: F) -> Result<T, JsonRpcError>
    where
        T: Send + 'static,
        F: Future<Output = crate::Result<T>> + Send + 'static,
    {
        if let Some(cause) = ctx.err() {
            tracing::debug!(method, %cause, "request already cancelled");
            return Err(JsonRpcError::cancelled(cause));
        }

        let mut task = tokio::spawn(delegate);
        tokio::select! {
            biased;
            cause = ctx.done() => {
                if self.settings.abort_on_cancel {
                    task.abort();
                }
                tracing::debug!(
                    method,
                    %cause,
                    aborted = self.settings.abort_on_cancel,
                    "request cancelled before delegate finished"
                );
                Err(JsonRpcError::cancelled(cause))
            }
            joined = &mut task => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => {
                    tracing::debug!(method, error = %err, "delegate returned error");
                    Err(JsonRpcError::business(err.to_string()))
                }
                Err(err) => {
                    tracing::warn!(method, error = %err, "delegate task failed");
                    Err(JsonRpcError::internal(format!("Delegate task failed: {err}")))
                }
            },
        }
    }
}

#[async_trait]
impl<C, M> ConfigService for ConfigServer<C, M>
where
    C: Config,
    M: MachineCodec<Machine = C::Machine>,
{
    async fn config_attributes(
        &self,
        ctx: &Context,
        _req: NullRequest,
    ) -> Result<AttributesResponse, JsonRpcError> {
        let imp = Arc::clone(&self.imp);
        let attributes =
            self.race(ctx, METHOD_ATTRIBUTES, async move { imp.config_attributes().await }).await?;
        Ok(AttributesResponse { attributes })
    }

    async fn config_load(
        &self,
        ctx: &Context,
        req: LoadRequest,
    ) -> Result<LoadResponse, JsonRpcError> {
        let data = codec::decode(&req.data).map_err(JsonRpcError::invalid_params)?;
        let imp = Arc::clone(&self.imp);
        let call_ctx = ctx.clone();
        let loaded = self
            .race(ctx, METHOD_LOAD, async move { imp.config_load(&call_ctx, data).await })
            .await?;
        let data = codec::encode(&loaded).map_err(JsonRpcError::internal)?;
        Ok(LoadResponse { data })
    }

    async fn config_validate(
        &self,
        ctx: &Context,
        req: ValidateRequest,
    ) -> Result<ValidateResponse, JsonRpcError> {
        let data = codec::decode(&req.data).map_err(JsonRpcError::invalid_params)?;
        let machine = self.machines.load_machine(&req.machine).map_err(JsonRpcError::invalid_params)?;
        let imp = Arc::clone(&self.imp);
        let call_ctx = ctx.clone();
        let errors = self
            .race(ctx, METHOD_VALIDATE, async move {
                imp.config_validate(&call_ctx, data, &machine).await
            })
            .await?;
        Ok(ValidateResponse { errors })
    }

    async fn config_finalize(
        &self,
        ctx: &Context,
        req: FinalizeRequest,
    ) -> Result<FinalizeResponse, JsonRpcError> {
        let data = codec::decode(&req.data).map_err(JsonRpcError::invalid_params)?;
        let imp = Arc::clone(&self.imp);
        let call_ctx = ctx.clone();
        let finalized = self
            .race(ctx, METHOD_FINALIZE, async move { imp.config_finalize(&call_ctx, data).await })
            .await?;
        let data = codec::encode(&finalized).map_err(JsonRpcError::internal)?;
        Ok(FinalizeResponse { data })
    }
}
