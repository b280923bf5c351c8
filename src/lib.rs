//! jsonrpc-router: a JSON-RPC 2.0 message router
//!
//! Given raw request bytes (one request or a batch), the router validates the
//! envelope, resolves the method against a table of registered handlers,
//! invokes the handler, and encodes a compliant response or error.
//!
//! ```no_run
//! use jsonrpc_router::rpc::{to_result, Context, Router};
//!
//! # async fn run() {
//! let router = Router::builder()
//!     .register("sum", |_ctx, _id, _method, params| {
//!         let numbers: Vec<i64> = serde_json::from_str(params.map_or("[]", |p| p.get()))?;
//!         to_result(&numbers.iter().sum::<i64>())
//!     })
//!     .build();
//!
//! let response = router
//!     .serve(&Context::new(), br#"{"jsonrpc":"2.0","method":"sum","params":[1,2],"id":1}"#)
//!     .await;
//! assert_eq!(response.as_deref(), Some(br#"{"jsonrpc":"2.0","result":3,"id":1}"#.as_slice()));
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`rpc`]: Identifiers, envelope codec, dispatch table, router, stdio host

pub mod config;
pub mod error;
pub mod rpc;
