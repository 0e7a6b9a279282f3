//! JSON wire form of tokens.
//!
//! Hosts persist tokens in approval receipts and present them back for
//! evaluation, so the serialized shape is a contract: stable field names,
//! lexicographically ordered keys, no insignificant whitespace. Encoding
//! the same token twice — or decoding and re-encoding it — yields
//! byte-identical output.

use crate::error::{Error, Result};
use crate::token::Token;

/// Maximum serialized token size accepted by [`decode`].
///
/// Tokens are small (a scope, a few identifiers, one signature); anything
/// near this ceiling is malformed or hostile, and is rejected before
/// parsing begins.
pub const MAX_TOKEN_SIZE: usize = 64 * 1024;

/// Serialize a token to its canonical JSON wire form.
///
/// The signature field is included when present and omitted when the
/// token is unsigned; optional fields serialize as explicit nulls.
pub fn encode(token: &Token) -> Result<String> {
    // Routing through Value sorts object keys, which keeps the output
    // canonical regardless of struct field order.
    let value = serde_json::to_value(token).map_err(|e| Error::Serialization(e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse a token from its JSON wire form.
///
/// Oversized input is rejected before parsing. Structural problems — a
/// token id without the `pccap_` prefix, a float argument value, missing
/// required fields — are hard errors, not denials.
pub fn decode(json: &str) -> Result<Token> {
    if json.len() > MAX_TOKEN_SIZE {
        return Err(Error::TokenTooLarge {
            size: json.len(),
            max: MAX_TOKEN_SIZE,
        });
    }
    serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
}
