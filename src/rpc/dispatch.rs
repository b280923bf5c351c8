//! Method dispatch table and the handler contract.
//!
//! A handler receives the request [`Context`], the request [`Id`], the method
//! name and the raw parameters, and returns either a raw result or a
//! [`HandlerError`].
//!
//! # Preconditions
//!
//! [`DispatchTable::register`] takes `&mut self` and must finish before the
//! table is shared for serving. [`crate::rpc::RouterBuilder::build`] freezes
//! the table behind an [`Arc`], after which only [`DispatchTable::lookup`] is
//! reachable, so registering during live traffic does not compile.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::rpc::context::Context;
use crate::rpc::id::Id;
use crate::rpc::protocol::ErrorObject;

/// What a handler returns.
pub type HandlerResult = Result<Box<RawValue>, HandlerError>;

/// A registered method handler.
pub type Handler =
    Arc<dyn Fn(&Context, &Id, &str, Option<&RawValue>) -> HandlerResult + Send + Sync>;

/// Ways a handler can fail.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A structured error, sent to the client as is.
    #[error(transparent)]
    Rpc(#[from] ErrorObject),

    /// Any other failure. The client only sees a generic internal error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps an arbitrary error as an unstructured failure.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

/// Serialises a value into a handler result payload.
///
/// # Errors
///
/// Returns [`HandlerError::Other`] if `value` cannot be serialised.
pub fn to_result<T: Serialize + ?Sized>(value: &T) -> HandlerResult {
    Ok(serde_json::value::to_raw_value(value)?)
}

/// Mapping from method name to handler.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Handler>,
}

impl DispatchTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`, replacing any earlier registration.
    pub fn register<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(&Context, &Id, &str, Option<&RawValue>) -> HandlerResult + Send + Sync + 'static,
    {
        let method = method.into();
        if self.handlers.insert(method.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(method = %method, "Replaced existing handler");
        }
    }

    /// Looks up the handler for `method`.
    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(method)
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(table: &DispatchTable, method: &str) -> HandlerResult {
        let handler = table.lookup(method).unwrap();
        handler(&Context::new(), &Id::Unset, method, None)
    }

    #[test]
    fn lookup_missing_method() {
        let table = DispatchTable::new();
        assert!(table.lookup("nothing").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let mut table = DispatchTable::new();
        table.register("answer", |_, _, _, _| to_result(&1));
        table.register("answer", |_, _, _, _| to_result(&2));

        assert_eq!(table.len(), 1);
        assert_eq!(call(&table, "answer").unwrap().get(), "2");
    }

    #[test]
    fn handler_sees_arguments() {
        let mut table = DispatchTable::new();
        table.register("inspect", |_, id, method, params| {
            to_result(&serde_json::json!({
                "id": id.as_i64(),
                "method": method,
                "params": params.map(RawValue::get),
            }))
        });

        let handler = table.lookup("inspect").unwrap();
        let id = Id::from_json("9").unwrap();
        let params = RawValue::from_string("[1,2]".to_string()).unwrap();
        let result = handler(&Context::new(), &id, "inspect", Some(&params)).unwrap();

        assert_eq!(
            result.get(),
            r#"{"id":9,"method":"inspect","params":"[1,2]"}"#
        );
    }

    #[test]
    fn structured_errors_convert() {
        let mut table = DispatchTable::new();
        table.register("fail", |_, _, _, _| Err(ErrorObject::new(7, "bad").into()));

        let err = call(&table, "fail").unwrap_err();
        assert!(matches!(err, HandlerError::Rpc(ref e) if e.code == 7));
    }

    #[test]
    fn other_errors_wrap() {
        let err = HandlerError::other("boom");
        assert!(matches!(err, HandlerError::Other(_)));
        assert_eq!(err.to_string(), "boom");

        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(matches!(HandlerError::from(json_err), HandlerError::Other(_)));
    }

    #[test]
    fn methods_are_sorted() {
        let mut table = DispatchTable::new();
        table.register("b", |_, _, _, _| to_result(&()));
        table.register("a", |_, _, _, _| to_result(&()));

        assert_eq!(table.methods(), vec!["a", "b"]);
        assert_eq!(format!("{table:?}"), r#"DispatchTable { methods: ["a", "b"] }"#);
    }
}
