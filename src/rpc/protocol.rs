//! JSON-RPC 2.0 envelope codec.
//!
//! This module decodes and validates request envelopes and encodes success,
//! error and batch responses. Parameters and results are carried as
//! [`RawValue`]s and are never interpreted here.
//!
//! # Validation Order
//!
//! 1. Syntactically invalid JSON is a [`DecodeError::Parse`]
//! 2. A value that is not an object is [`DecodeError::Invalid`]
//! 3. An `id` that is not a string, number, or null is [`DecodeError::Invalid`]
//!    (the identifier cannot be echoed, so the response carries `null`)
//! 4. A missing or wrong `jsonrpc` tag is [`DecodeError::Invalid`]
//! 5. A missing or non-string `method`, or one starting with `rpc.`, is
//!    [`DecodeError::Invalid`]
//!
//! From step 4 onwards the recovered identifier travels with the error.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use thiserror::Error;

use crate::rpc::id::Id;

/// The protocol version tag every request and response carries.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names with this prefix are reserved for protocol extensions.
pub const RESERVED_METHOD_PREFIX: &str = "rpc.";

/// Pre-encoded parse error response. The identifier is always `null`.
pub const PARSE_ERROR_RESPONSE: &[u8] =
    br#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#;

/// Pre-encoded internal error response with a `null` identifier.
pub const INTERNAL_ERROR_RESPONSE: &[u8] =
    br#"{"jsonrpc":"2.0","error":{"code":1000,"message":"Internal error"},"id":null}"#;

/// Error codes used by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters. Never produced by the router itself;
    /// available to handlers.
    InvalidParams,
    /// A handler failed without a structured error, or panicked.
    ///
    /// This code sits outside the range reserved by JSON-RPC 2.0.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => 1000,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A structured JSON-RPC error object.
///
/// Handlers return this (through [`crate::rpc::HandlerError::Rpc`]) to have
/// it sent to the client verbatim.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message} (code {code})")]
pub struct ErrorObject {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error with an arbitrary code and message.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an error from a well-known code with its default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code.code(), code.default_message())
    }

    /// Creates an error from a well-known code with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A validated request envelope.
#[derive(Debug)]
pub struct Request {
    /// Correlation identifier; [`Id::Unset`] for notifications.
    pub id: Id,

    /// The method to invoke. Never starts with [`RESERVED_METHOD_PREFIX`].
    pub method: String,

    /// Parameters exactly as sent, if any.
    pub params: Option<Box<RawValue>>,
}

impl Request {
    /// Returns `true` if this request carries no `id` member.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        !self.id.is_set()
    }
}

/// Reasons a request envelope could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not syntactically valid JSON.
    #[error("parse error")]
    Parse(#[source] serde_json::Error),

    /// The payload is valid JSON but violates the envelope rules.
    #[error("invalid request: {reason}")]
    Invalid {
        /// Whatever identifier could be recovered before validation failed.
        id: Id,
        /// Description of the violation, for logging only.
        reason: &'static str,
    },
}

impl DecodeError {
    /// Encodes the error response the client should receive.
    #[must_use]
    pub fn to_response(&self) -> Vec<u8> {
        match self {
            Self::Parse(_) => PARSE_ERROR_RESPONSE.to_vec(),
            Self::Invalid { id, .. } => {
                encode_error(id, &ErrorObject::from_code(ErrorCode::InvalidRequest))
            }
        }
    }
}

/// Loosely typed view of a request object.
///
/// Every member is captured as raw JSON so that shape violations surface as
/// envelope errors rather than deserialisation errors.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default, deserialize_with = "present")]
    jsonrpc: Option<Box<RawValue>>,

    #[serde(default, deserialize_with = "present")]
    id: Option<Box<RawValue>>,

    #[serde(default, deserialize_with = "present")]
    method: Option<Box<RawValue>>,

    #[serde(default, deserialize_with = "present")]
    params: Option<Box<RawValue>>,
}

/// Keeps an explicit `null` distinguishable from an absent member.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error> {
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

/// Returns the first byte of `payload` that is not JSON whitespace.
#[must_use]
pub fn first_token(payload: &[u8]) -> Option<u8> {
    payload
        .iter()
        .copied()
        .find(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

fn raw_string(raw: &RawValue) -> Option<String> {
    serde_json::from_str(raw.get()).ok()
}

/// Decodes and validates a single request object.
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first rule the payload breaks.
pub fn decode_request(payload: &[u8]) -> Result<Request, DecodeError> {
    // Derived struct visitors also accept arrays, so check the shape first.
    if first_token(payload) != Some(b'{') {
        serde_json::from_slice::<IgnoredAny>(payload).map_err(DecodeError::Parse)?;
        return Err(DecodeError::Invalid {
            id: Id::Null,
            reason: "request must be a JSON object",
        });
    }

    let envelope: Envelope = serde_json::from_slice(payload).map_err(|err| {
        if err.is_data() {
            DecodeError::Invalid {
                id: Id::Null,
                reason: "request must be a JSON object",
            }
        } else {
            DecodeError::Parse(err)
        }
    })?;

    let id = match envelope.id {
        Some(raw) => Id::from_raw(raw).map_err(|_| DecodeError::Invalid {
            id: Id::Null,
            reason: "'id' MUST contain a String, Number, or NULL if included",
        })?,
        None => Id::Unset,
    };

    let version = envelope.jsonrpc.as_deref().and_then(raw_string);
    if version.as_deref() != Some(JSONRPC_VERSION) {
        return Err(DecodeError::Invalid {
            id,
            reason: "'jsonrpc' MUST be exactly '2.0'",
        });
    }

    let Some(method) = envelope.method.as_deref().and_then(raw_string) else {
        return Err(DecodeError::Invalid {
            id,
            reason: "'method' MUST be a String",
        });
    };

    if method.starts_with(RESERVED_METHOD_PREFIX) {
        return Err(DecodeError::Invalid {
            id,
            reason: "'method' MUST NOT begin with 'rpc.'",
        });
    }

    Ok(Request {
        id,
        method,
        params: envelope.params,
    })
}

#[derive(Serialize)]
struct SuccessResponse<'a> {
    jsonrpc: &'static str,
    result: &'a RawValue,
    id: &'a Id,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    jsonrpc: &'static str,
    error: &'a ErrorObject,
    id: &'a Id,
}

/// Encodes a success response around a handler result.
#[must_use]
pub fn encode_result(id: &Id, result: &RawValue) -> Vec<u8> {
    let response = SuccessResponse {
        jsonrpc: JSONRPC_VERSION,
        result,
        id,
    };

    serde_json::to_vec(&response).unwrap_or_else(|err| {
        tracing::error!(error = %err, id = %id, "Failed to encode success response");
        INTERNAL_ERROR_RESPONSE.to_vec()
    })
}

/// Encodes an error response.
#[must_use]
pub fn encode_error(id: &Id, error: &ErrorObject) -> Vec<u8> {
    let response = ErrorResponse {
        jsonrpc: JSONRPC_VERSION,
        error,
        id,
    };

    serde_json::to_vec(&response).unwrap_or_else(|err| {
        tracing::error!(error = %err, id = %id, "Failed to encode error response");
        INTERNAL_ERROR_RESPONSE.to_vec()
    })
}

/// Joins already-encoded responses into a JSON array, in the order given.
#[must_use]
pub fn encode_batch(responses: &[Vec<u8>]) -> Vec<u8> {
    let len = responses.iter().map(Vec::len).sum::<usize>() + responses.len() + 1;
    let mut out = Vec::with_capacity(len);

    out.push(b'[');
    for (i, response) in responses.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(response);
    }
    out.push(b']');

    out
}
