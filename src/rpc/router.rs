//! Request routing: single requests, batches, and failure containment.
//!
//! [`Router::serve`] peeks at the first significant byte of the payload:
//! `{` takes the single-request path, `[` takes the batch path, and anything
//! else is answered with a parse error.
//!
//! # Batches
//!
//! Each batch member runs on its own blocking task. Join handles are kept in
//! input order and awaited in that order, so response `i` always answers
//! request `i`. Members share nothing but the frozen dispatch table and the
//! caller's [`Context`].
//!
//! # Failure Containment
//!
//! Handler panics are caught at the dispatch boundary and turned into an
//! internal error response for that request only. Sibling batch members and
//! the serving process are unaffected.
//!
//! Batch dispatch uses [`tokio::task::spawn_blocking`], so [`Router::serve`]
//! must be polled from within a Tokio runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::value::RawValue;
use tracing::{debug, error, warn};

use crate::rpc::context::Context;
use crate::rpc::dispatch::{DispatchTable, HandlerError, HandlerResult};
use crate::rpc::id::Id;
use crate::rpc::protocol::{
    decode_request, encode_batch, encode_error, encode_result, first_token, DecodeError,
    ErrorCode, ErrorObject, Request, PARSE_ERROR_RESPONSE,
};

/// Behaviour switches fixed at build time.
#[derive(Debug, Clone, Copy, Default)]
struct RouterOptions {
    suppress_notifications: bool,
    max_batch_size: Option<usize>,
}

/// Collects handler registrations and options, then freezes them into a
/// [`Router`].
#[derive(Debug, Default)]
pub struct RouterBuilder {
    table: DispatchTable,
    options: RouterOptions,
}

impl RouterBuilder {
    /// Creates a builder with no handlers and default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`. The last registration for a name wins.
    #[must_use]
    pub fn register<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Context, &Id, &str, Option<&RawValue>) -> HandlerResult + Send + Sync + 'static,
    {
        self.table.register(method, handler);
        self
    }

    /// When enabled, well-formed requests without an `id` are still
    /// dispatched but produce no response.
    ///
    /// Disabled by default: every request gets a response.
    #[must_use]
    pub fn suppress_notifications(mut self, suppress: bool) -> Self {
        self.options.suppress_notifications = suppress;
        self
    }

    /// Rejects batches with more than `limit` members as a whole.
    #[must_use]
    pub fn max_batch_size(mut self, limit: Option<usize>) -> Self {
        self.options.max_batch_size = limit;
        self
    }

    /// Freezes the dispatch table and returns a router ready to serve.
    #[must_use]
    pub fn build(self) -> Router {
        debug!(methods = ?self.table.methods(), "Router built");
        Router {
            table: Arc::new(self.table),
            options: self.options,
        }
    }
}

/// A JSON-RPC 2.0 router over a frozen dispatch table.
///
/// Cloning is cheap; clones share the same table.
#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<DispatchTable>,
    options: RouterOptions,
}

impl Router {
    /// Starts building a router.
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Returns the frozen dispatch table.
    #[must_use]
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Handles a raw payload holding one request or a batch.
    ///
    /// Returns `None` only when notification suppression is enabled and
    /// nothing needs to be sent back.
    ///
    /// # Panics
    ///
    /// Panics if a batch is served outside a Tokio runtime, since batch
    /// members run on the blocking pool. Single requests never touch the
    /// runtime; use [`serve_single`](Self::serve_single) where none exists.
    pub async fn serve(&self, ctx: &Context, payload: &[u8]) -> Option<Vec<u8>> {
        match first_token(payload) {
            Some(b'{') => self.serve_single(ctx, payload),
            Some(b'[') => self.serve_batch(ctx, payload).await,
            _ => {
                debug!("Payload is neither an object nor an array");
                Some(PARSE_ERROR_RESPONSE.to_vec())
            }
        }
    }

    /// Handles a single request object synchronously.
    #[must_use]
    pub fn serve_single(&self, ctx: &Context, payload: &[u8]) -> Option<Vec<u8>> {
        dispatch(&self.table, self.options, ctx, payload)
    }

    async fn serve_batch(&self, ctx: &Context, payload: &[u8]) -> Option<Vec<u8>> {
        let members: Vec<Box<RawValue>> = match serde_json::from_slice(payload) {
            Ok(members) => members,
            Err(err) => {
                debug!(error = %err, "Rejecting malformed batch");
                return Some(PARSE_ERROR_RESPONSE.to_vec());
            }
        };

        if members.is_empty() {
            warn!("Rejecting empty batch");
            return Some(invalid_request());
        }

        if let Some(limit) = self.options.max_batch_size {
            if members.len() > limit {
                warn!(size = members.len(), limit, "Rejecting oversized batch");
                return Some(invalid_request());
            }
        }

        debug!(size = members.len(), "Dispatching batch");

        let tasks: Vec<_> = members
            .into_iter()
            .map(|member| {
                let table = Arc::clone(&self.table);
                let ctx = ctx.clone();
                let options = self.options;
                tokio::task::spawn_blocking(move || {
                    dispatch(&table, options, &ctx, member.get().as_bytes())
                })
            })
            .collect();

        let mut responses = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "Batch member task failed");
                    responses.push(encode_error(
                        &Id::Null,
                        &ErrorObject::from_code(ErrorCode::InternalError),
                    ));
                }
            }
        }

        if responses.is_empty() {
            return None;
        }

        Some(encode_batch(&responses))
    }
}

fn invalid_request() -> Vec<u8> {
    encode_error(&Id::Null, &ErrorObject::from_code(ErrorCode::InvalidRequest))
}

/// Decodes one request object, runs it, and encodes the outcome.
fn dispatch(
    table: &DispatchTable,
    options: RouterOptions,
    ctx: &Context,
    payload: &[u8],
) -> Option<Vec<u8>> {
    let request = match decode_request(payload) {
        Ok(request) => request,
        Err(err) => {
            match &err {
                DecodeError::Parse(source) => {
                    debug!(error = %source, "Rejecting unparseable request");
                }
                DecodeError::Invalid { id, reason } => {
                    warn!(id = %id, reason, "Rejecting invalid request");
                }
            }
            return Some(err.to_response());
        }
    };

    let response = invoke(table, ctx, &request);

    if options.suppress_notifications && request.is_notification() {
        debug!(method = %request.method, "Suppressing response to notification");
        return None;
    }

    Some(response)
}

/// Runs the handler for `request` with panics contained.
fn invoke(table: &DispatchTable, ctx: &Context, request: &Request) -> Vec<u8> {
    let Request { id, method, params } = request;

    let Some(handler) = table.lookup(method) else {
        debug!(method = %method, id = %id, "Method not found");
        return encode_error(id, &ErrorObject::from_code(ErrorCode::MethodNotFound));
    };

    debug!(method = %method, id = %id, "Dispatching request");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler(ctx, id, method.as_str(), params.as_deref())
    }));

    match outcome {
        Ok(Ok(result)) => encode_result(id, &result),
        Ok(Err(HandlerError::Rpc(err))) => encode_error(id, &err),
        Ok(Err(HandlerError::Other(err))) => {
            error!(method = %method, id = %id, error = %err, "Handler failed");
            encode_error(id, &ErrorObject::from_code(ErrorCode::InternalError))
        }
        Err(payload) => {
            error!(
                method = %method,
                id = %id,
                panic = panic_message(payload.as_ref()),
                "Handler panicked"
            );
            encode_error(id, &ErrorObject::from_code(ErrorCode::InternalError))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
