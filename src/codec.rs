//! Dynamic payload codec.
//!
//! Config data is an arbitrary JSON object. It crosses the wire as the JSON
//! text of that object, carried in a string field of the request/response.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Loosely-typed configuration payload: string keys, JSON values.
pub type ConfigData = Map<String, Value>;

/// Encode config data into its wire envelope.
pub fn encode(data: &ConfigData) -> Result<String> {
    serde_json::to_string(data).map_err(Error::Encode)
}

/// Decode a wire envelope.
///
/// The envelope must hold a JSON object. `null` is accepted and decodes to an
/// empty mapping, which is how peers encode an absent map.
pub fn decode(envelope: &str) -> Result<ConfigData> {
    let value: Option<ConfigData> = serde_json::from_str(envelope).map_err(Error::Decode)?;
    Ok(value.unwrap_or_default())
}
