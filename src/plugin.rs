//! Pairing of the two adapters for one config capability.
//!
//! The plugin process builds a [`ConfigPlugin`] around its implementation
//! and serves it; the host connects to the plugin's streams and gets back a
//! [`ConfigClient`] that implements the same [`Config`] trait.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::ConfigClient;
use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::machine::MachineCodec;
use crate::rpc::{self, ConfigService, RpcClient};
use crate::server::ConfigServer;
use crate::settings::{Settings, TransportSettings};

/// A native config implementation ready to be served out of process.
pub struct ConfigPlugin<C, M> {
    imp: Arc<C>,
    machines: M,
    settings: Settings,
}

impl<C, M> ConfigPlugin<C, M>
where
    C: Config,
    M: MachineCodec<Machine = C::Machine> + Clone,
{
    /// Wrap an implementation with default settings.
    pub fn new(imp: Arc<C>, machines: M) -> Self {
        Self { imp, machines, settings: Settings::default() }
    }

    /// Use the given settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Build a server adapter, initialising the implementation for it.
    pub fn server(&self) -> ConfigServer<C, M> {
        ConfigServer::with_settings(
            Arc::clone(&self.imp),
            self.machines.clone(),
            self.settings.server.clone(),
        )
    }

    /// Serve the implementation over the given streams until the host hangs up.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server = Arc::new(self.server());
        rpc::serve(server, reader, writer, &self.settings.transport).await
    }

    /// Serve over this process's stdin and stdout.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

/// Build the host-side client over an existing service channel.
pub fn client<S, M>(service: S, session: Context, machines: M) -> ConfigClient<S, M>
where
    S: ConfigService,
    M: MachineCodec,
{
    ConfigClient::new(service, session, machines)
}

/// Connect to a plugin serving on the other end of the given streams.
///
/// The returned client's session ends when the plugin closes its side.
pub fn connect<R, W, M>(
    reader: R,
    writer: W,
    machines: M,
    settings: &TransportSettings,
) -> ConfigClient<RpcClient, M>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    M: MachineCodec,
{
    let (rpc, session) = RpcClient::connect(reader, writer, settings);
    client(rpc, session, machines)
}
