//! Remote side of the bridge.
//!
//! The config service contract ([`ConfigService`]), its wire messages, and a
//! line-delimited JSON-RPC transport for it.
//!
//! ## Wire format
//!
//! ```text
//! host -> plugin  {"jsonrpc":"2.0","id":1,"method":"ConfigLoad","params":{"data":"{\"memory\":1024}"}}
//! plugin -> host  {"jsonrpc":"2.0","id":1,"result":{"data":"{\"memory\":1024}"}}
//! host -> plugin  {"jsonrpc":"2.0","method":"$/cancelRequest","params":{"id":1}}
//! ```

mod framing;
mod protocol;
mod serve;
mod service;
mod transport;

pub use framing::{read_message, write_message};
pub use protocol::{
    AttributesResponse, CancelParams, FinalizeRequest, FinalizeResponse, IncomingMessage,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LoadRequest, LoadResponse,
    NullRequest, RequestId, ValidateRequest, ValidateResponse, BUSINESS_ERROR, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_ATTRIBUTES, METHOD_CANCEL, METHOD_FINALIZE, METHOD_LOAD,
    METHOD_NOT_FOUND, METHOD_VALIDATE, PARSE_ERROR, REQUEST_CANCELLED, TRANSPORT_ERROR,
};
pub use serve::serve;
pub use service::ConfigService;
pub use transport::RpcClient;
