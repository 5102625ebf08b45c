//! Machine (de)serialization collaborator.
//!
//! The bridge never looks inside a machine. It only needs a way to turn one
//! into bytes on the host side and back into a machine on the plugin side.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Serializes and deserializes the opaque target-machine object.
///
/// Codecs that need a handle to the plugin implementation to rebuild a
/// machine (for callbacks into the plugin, say) capture it when constructed.
pub trait MachineCodec: Send + Sync + 'static {
    /// The machine type this codec handles.
    type Machine: Send + Sync + 'static;

    /// Serialize a machine into its wire blob.
    fn dump_machine(&self, machine: &Self::Machine) -> Result<Vec<u8>>;

    /// Rebuild a machine from its wire blob.
    fn load_machine(&self, data: &[u8]) -> Result<Self::Machine>;
}

/// Machine codec for any serde type, using JSON bytes as the blob.
pub struct JsonMachineCodec<M> {
    _machine: PhantomData<fn() -> M>,
}

impl<M> JsonMachineCodec<M> {
    /// Create a new JSON machine codec.
    pub fn new() -> Self {
        Self { _machine: PhantomData }
    }
}

impl<M> Default for JsonMachineCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonMachineCodec<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for JsonMachineCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonMachineCodec").field("machine", &std::any::type_name::<M>()).finish()
    }
}

impl<M> MachineCodec for JsonMachineCodec<M>
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Machine = M;

    fn dump_machine(&self, machine: &M) -> Result<Vec<u8>> {
        serde_json::to_vec(machine).map_err(Error::machine)
    }

    fn load_machine(&self, data: &[u8]) -> Result<M> {
        serde_json::from_slice(data).map_err(Error::machine)
    }
}
