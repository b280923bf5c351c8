//! JSON-RPC 2.0 routing.
//!
//! Raw request bytes go in, response bytes come out. The router validates
//! the envelope, resolves the method against a frozen dispatch table, runs
//! the handler, and encodes a compliant response or error.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Router                             │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Envelope   │───▶│  Dispatch   │───▶│  Handlers   │    │
//! │   │   Codec     │    │   Table     │    │ (contained) │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                                     │            │
//! │          ▼                                     ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │        Identifiers (echoed byte-for-byte)       │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Codes
//!
//! | Code     | Meaning                                   |
//! |----------|-------------------------------------------|
//! | `-32700` | Parse error (identifier always `null`)    |
//! | `-32600` | Invalid Request                           |
//! | `-32601` | Method not found                          |
//! | `1000`   | Internal error (unstructured or panic)    |
//!
//! Structured errors returned by handlers are passed through unchanged.

pub mod context;
pub mod dispatch;
pub mod id;
pub mod protocol;
pub mod router;
pub mod server;
pub mod transport;

pub use context::Context;
pub use dispatch::{to_result, DispatchTable, Handler, HandlerError, HandlerResult};
pub use id::{Id, IdError};
pub use protocol::{DecodeError, ErrorCode, ErrorObject, Request};
pub use router::{Router, RouterBuilder};
pub use server::{Server, StdioServer};
pub use transport::{Frame, LineTransport, StdioTransport, MAX_MESSAGE_SIZE_BYTES};
