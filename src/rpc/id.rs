//! JSON-RPC request identifiers.
//!
//! An [`Id`] keeps the exact JSON text the client sent so it can be echoed
//! back byte-for-byte. Numbers are never converted to an integer or a float
//! internally: `1.0`, `1e3` and `18446744073709551616` all survive a round
//! trip unchanged.
//!
//! # States
//!
//! - [`Id::Unset`]: the `id` member was absent (a notification)
//! - [`Id::Null`]: the `id` member was present and `null`
//! - [`Id::Number`] / [`Id::String`]: the raw JSON text of the value

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use thiserror::Error;

/// Errors raised while decoding an identifier.
#[derive(Error, Debug)]
pub enum IdError {
    /// The value is valid JSON but not a string, number, or null.
    #[error("'id' must be a string, number, or null, found {found}")]
    InvalidIdentifier {
        /// The JSON type that was found instead.
        found: &'static str,
    },

    /// The text is not a JSON value at all.
    #[error("'id' is not valid JSON")]
    Malformed(#[source] serde_json::Error),
}

/// A request identifier, preserved in its original textual form.
#[derive(Debug, Clone, Default)]
pub enum Id {
    /// No `id` member was present.
    #[default]
    Unset,
    /// The `id` member was explicitly `null`.
    Null,
    /// A JSON number, kept as written by the client.
    Number(Box<RawValue>),
    /// A JSON string, kept as written by the client (quotes and escapes included).
    String(Box<RawValue>),
}

impl Id {
    /// Classifies a raw JSON value as an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidIdentifier`] for objects, arrays and booleans.
    pub fn from_raw(raw: Box<RawValue>) -> Result<Self, IdError> {
        let first = raw.get().trim_start().as_bytes().first().copied();

        match first {
            Some(b'"') => Ok(Self::String(raw)),
            Some(b'-' | b'0'..=b'9') => Ok(Self::Number(raw)),
            Some(b'n') => Ok(Self::Null),
            Some(b'{') => Err(IdError::InvalidIdentifier { found: "object" }),
            Some(b'[') => Err(IdError::InvalidIdentifier { found: "array" }),
            Some(b't' | b'f') => Err(IdError::InvalidIdentifier { found: "boolean" }),
            _ => Err(IdError::InvalidIdentifier { found: "unknown" }),
        }
    }

    /// Parses an identifier from JSON text such as `42`, `"abc"` or `null`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Malformed`] if `json` is not valid JSON, or
    /// [`IdError::InvalidIdentifier`] if it has the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, IdError> {
        let raw = RawValue::from_string(json.to_owned()).map_err(IdError::Malformed)?;
        Self::from_raw(raw)
    }

    /// Returns `true` unless the `id` member was absent.
    ///
    /// A request whose identifier is not set is a notification.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Returns `true` if the `id` member was explicitly `null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the identifier as an integer, if it is a number with an
    /// integral textual form that fits in an `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(raw) => raw.get().parse().ok(),
            _ => None,
        }
    }

    /// Returns the identifier as a float, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(raw) => raw.get().parse().ok(),
            _ => None,
        }
    }

    /// Returns the identifier as a string.
    ///
    /// String identifiers are unescaped. Numeric identifiers fall back to
    /// their textual form, so `7` yields `"7"`.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::String(raw) => serde_json::from_str(raw.get()).ok(),
            Self::Number(raw) => Some(raw.get().to_owned()),
            Self::Unset | Self::Null => None,
        }
    }

    /// Returns the JSON text this identifier encodes to.
    ///
    /// Both [`Id::Unset`] and [`Id::Null`] encode as `null`, which is what a
    /// response must carry when the request identifier is unknown.
    #[must_use]
    pub fn as_json(&self) -> &str {
        match self {
            Self::Unset | Self::Null => "null",
            Self::Number(raw) | Self::String(raw) => raw.get(),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("<unset>"),
            _ => f.write_str(self.as_json()),
        }
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unset, Self::Unset) | (Self::Null, Self::Null) => true,
            (Self::Number(a), Self::Number(b)) | (Self::String(a), Self::String(b)) => {
                a.get() == b.get()
            }
            _ => false,
        }
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        if let Self::Number(raw) | Self::String(raw) = self {
            raw.get().hash(state);
        }
    }
}

impl TryFrom<Box<RawValue>> for Id {
    type Error = IdError;

    fn try_from(raw: Box<RawValue>) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset | Self::Null => serializer.serialize_unit(),
            Self::Number(raw) | Self::String(raw) => raw.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(id: &Id) -> String {
        serde_json::to_string(id).unwrap()
    }

    #[test]
    fn round_trip_preserves_text() {
        for text in [
            "1",
            "-7",
            "1.0",
            "1e3",
            "2.50E-3",
            "18446744073709551616",
            "0.1000000000000000055511151231257827",
            r#""abc""#,
            r#""A\n""#,
            r#""""#,
            "null",
        ] {
            let id = Id::from_json(text).unwrap();
            assert_eq!(encode(&id), text, "round trip of {text}");
        }
    }

    #[test]
    fn rejects_structured_values() {
        for (text, found) in [
            ("{}", "object"),
            (r#"{"a":1}"#, "object"),
            ("[1]", "array"),
            ("true", "boolean"),
            ("false", "boolean"),
        ] {
            let err = Id::from_json(text).unwrap_err();
            assert!(
                matches!(err, IdError::InvalidIdentifier { found: f } if f == found),
                "{text} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(Id::from_json("nope"), Err(IdError::Malformed(_))));
    }

    #[test]
    fn unset_and_null_are_distinct() {
        let unset = Id::Unset;
        let null = Id::from_json("null").unwrap();

        assert!(!unset.is_set());
        assert!(!unset.is_null());
        assert!(null.is_set());
        assert!(null.is_null());
        assert_ne!(unset, null);
        assert_eq!(encode(&unset), "null");
        assert_eq!(encode(&null), "null");
    }

    #[test]
    fn typed_extraction() {
        let int = Id::from_json("42").unwrap();
        assert_eq!(int.as_i64(), Some(42));
        assert_eq!(int.as_f64(), Some(42.0));
        assert_eq!(int.as_string().as_deref(), Some("42"));

        let float = Id::from_json("1.5").unwrap();
        assert_eq!(float.as_i64(), None);
        assert_eq!(float.as_f64(), Some(1.5));
        assert_eq!(float.as_string().as_deref(), Some("1.5"));

        let string = Id::from_json(r#""a\"b""#).unwrap();
        assert_eq!(string.as_i64(), None);
        assert_eq!(string.as_string().as_deref(), Some("a\"b"));

        assert_eq!(Id::Null.as_string(), None);
        assert_eq!(Id::Unset.as_i64(), None);
    }

    #[test]
    fn numbers_compare_by_text() {
        let one = Id::from_json("1").unwrap();
        let one_point_zero = Id::from_json("1.0").unwrap();
        let string_one = Id::from_json(r#""1""#).unwrap();

        assert_ne!(one, one_point_zero);
        assert_ne!(one, string_one);
        assert_eq!(one, Id::from_json("1").unwrap());
    }

    #[test]
    fn display_uses_json_text() {
        assert_eq!(Id::from_json(r#""x""#).unwrap().to_string(), r#""x""#);
        assert_eq!(Id::Null.to_string(), "null");
        assert_eq!(Id::Unset.to_string(), "<unset>");
    }
}
