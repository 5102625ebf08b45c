//! The remote config service contract.

use std::sync::Arc;

use async_trait::async_trait;

use super::protocol::{
    AttributesResponse, FinalizeRequest, FinalizeResponse, JsonRpcError, LoadRequest,
    LoadResponse, NullRequest, ValidateRequest, ValidateResponse,
};
use crate::context::Context;

/// Wire-level config service.
///
/// Implemented on the plugin side by [`ConfigServer`](crate::ConfigServer) and
/// on the host side by [`RpcClient`](super::RpcClient). Every call honours
/// `ctx`: once it is done the call returns a
/// [`REQUEST_CANCELLED`](super::REQUEST_CANCELLED) error.
#[async_trait]
pub trait ConfigService: Send + Sync + 'static {
    /// List attribute names.
    async fn config_attributes(
        &self,
        ctx: &Context,
        req: NullRequest,
    ) -> Result<AttributesResponse, JsonRpcError>;

    /// Load raw config data.
    async fn config_load(&self, ctx: &Context, req: LoadRequest)
        -> Result<LoadResponse, JsonRpcError>;

    /// Validate config data against a machine.
    async fn config_validate(
        &self,
        ctx: &Context,
        req: ValidateRequest,
    ) -> Result<ValidateResponse, JsonRpcError>;

    /// Finalize config data.
    async fn config_finalize(
        &self,
        ctx: &Context,
        req: FinalizeRequest,
    ) -> Result<FinalizeResponse, JsonRpcError>;
}

#[async_trait]
impl<S: ConfigService + ?Sized> ConfigService for Arc<S> {
    async fn config_attributes(
        &self,
        ctx: &Context,
        req: NullRequest,
    ) -> Result<AttributesResponse, JsonRpcError> {
        (**self).config_attributes(ctx, req).await
    }

    async fn config_load(
        &self,
        ctx: &Context,
        req: LoadRequest,
    ) -> Result<LoadResponse, JsonRpcError> {
        (**self).config_load(ctx, req).await
    }

    async fn config_validate(
        &self,
        ctx: &Context,
        req: ValidateRequest,
    ) -> Result<ValidateResponse, JsonRpcError> {
        (**self).config_validate(ctx, req).await
    }

    async fn config_finalize(
        &self,
        ctx: &Context,
        req: FinalizeRequest,
    ) -> Result<FinalizeResponse, JsonRpcError> {
        (**self).config_finalize(ctx, req).await
    }
}
