//! Host-side adapter.
//!
//! [`ConfigClient`] implements the native [`Config`] trait by calling a
//! [`ConfigService`] on the other side of the process boundary. Every call
//! runs under the caller's context joined with the session context, and
//! failures are attributed through [`CallOutcome`].

use async_trait::async_trait;

use crate::codec::{self, ConfigData};
use crate::config::Config;
use crate::context::{join, Context};
use crate::error::Result;
use crate::machine::MachineCodec;
use crate::rpc::{
    ConfigService, FinalizeRequest, JsonRpcError, LoadRequest, NullRequest, ValidateRequest,
    METHOD_ATTRIBUTES, METHOD_FINALIZE, METHOD_LOAD, METHOD_VALIDATE,
};
use crate::translate::CallOutcome;

/// Native config interface backed by a remote plugin.
pub struct ConfigClient<S, M> {
    service: S,
    session: Context,
    machines: M,
}

impl<S, M> ConfigClient<S, M>
where
    S: ConfigService,
    M: MachineCodec,
{
    /// Create a client over `service`.
    ///
    /// `session` is done once the plugin session is over; every call made
    /// after that fails with a session error.
    pub fn new(service: S, session: Context, machines: M) -> Self {
        Self { service, session, machines }
    }

    /// The session context.
    pub fn session(&self) -> &Context {
        &self.session
    }

    /// The underlying service channel.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Fail fast when the call context is already done.
    fn ensure_active(&self, method: &str, call_ctx: &Context, caller: Option<&Context>) -> Result<()> {
        match call_ctx.err() {
            Some(cause) => {
                tracing::debug!(method, %cause, "not issuing call, context already done");
                CallOutcome::from_error(JsonRpcError::cancelled(cause), &self.session, caller)
                    .into_result()
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S, M> Config for ConfigClient<S, M>
where
    S: ConfigService,
    M: MachineCodec,
{
    type Machine = M::Machine;

    async fn config_attributes(&self) -> Result<Vec<String>> {
        self.ensure_active(METHOD_ATTRIBUTES, &self.session, None)?;
        let result = self.service.config_attributes(&self.session, NullRequest {}).await;
        let resp = CallOutcome::from_remote(result, &self.session, None).into_result()?;
        Ok(resp.attributes)
    }

    async fn config_load(&self, ctx: &Context, data: ConfigData) -> Result<ConfigData> {
        let data = codec::encode(&data)?;
        let joined = join(ctx, &self.session);
        self.ensure_active(METHOD_LOAD, &joined, Some(ctx))?;

        let result = self.service.config_load(&joined, LoadRequest { data }).await;
        let resp = CallOutcome::from_remote(result, &self.session, Some(ctx)).into_result()?;
        codec::decode(&resp.data)
    }

    async fn config_validate(
        &self,
        ctx: &Context,
        data: ConfigData,
        machine: &Self::Machine,
    ) -> Result<Vec<String>> {
        let machine = self.machines.dump_machine(machine)?;
        let data = codec::encode(&data)?;
        let joined = join(ctx, &self.session);
        self.ensure_active(METHOD_VALIDATE, &joined, Some(ctx))?;

        let result = self.service.config_validate(&joined, ValidateRequest { data, machine }).await;
        let resp = CallOutcome::from_remote(result, &self.session, Some(ctx)).into_result()?;
        Ok(resp.errors)
    }

    async fn config_finalize(&self, ctx: &Context, data: ConfigData) -> Result<ConfigData> {
        let data = codec::encode(&data)?;
        let joined = join(ctx, &self.session);
        self.ensure_active(METHOD_FINALIZE, &joined, Some(ctx))?;

        let result = self.service.config_finalize(&joined, FinalizeRequest { data }).await;
        let resp = CallOutcome::from_remote(result, &self.session, Some(ctx)).into_result()?;
        codec::decode(&resp.data)
    }
}
