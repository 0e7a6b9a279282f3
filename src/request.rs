//! Request-side types: who is asking, and with what arguments.
//!
//! The host gateway deserializes an incoming tool call into a [`Principal`]
//! and an [`Arguments`] map before the capability check runs. Argument
//! values are a small closed set — there is deliberately no dynamic or
//! float variant, so two values are equal only when their types are equal
//! (an integer never silently matches a boolean).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of the entity bound to a token or presenting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Agent,
    Human,
    Service,
}

/// The identity a request runs as.
///
/// Supplied by the host; the core never fabricates one. Tokens bind to the
/// `sub` field only — the actor classification travels for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier, e.g. `agent@example.com`.
    pub sub: String,
    /// What kind of entity this subject is.
    pub actor: ActorKind,
}

impl Principal {
    pub fn new(sub: impl Into<String>, actor: ActorKind) -> Self {
        Self {
            sub: sub.into(),
            actor,
        }
    }

    /// Shorthand for an agent-classified principal.
    pub fn agent(sub: impl Into<String>) -> Self {
        Self::new(sub, ActorKind::Agent)
    }

    /// Shorthand for a human-classified principal.
    pub fn human(sub: impl Into<String>) -> Self {
        Self::new(sub, ActorKind::Human)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sub)
    }
}

/// A single request argument value.
///
/// Maps onto plain JSON: string, integral number, bool, or a byte array
/// (serialized as an array of integers). A float or any nested structure
/// fails deserialization outright — that is a caller bug, not a denial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl ArgValue {
    /// Get as string if this is a String variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Size of this value in bytes, for `max_bytes` scope checks.
    ///
    /// Binary values count their raw length; strings their UTF-8 encoded
    /// length; integers and booleans the length of their text rendering.
    pub fn size_bytes(&self) -> u64 {
        match self {
            ArgValue::Bytes(b) => b.len() as u64,
            ArgValue::String(s) => s.len() as u64,
            ArgValue::Integer(i) => i.to_string().len() as u64,
            ArgValue::Boolean(b) => if *b { 4 } else { 5 },
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::String(s) => write!(f, "{:?}", s),
            ArgValue::Integer(i) => write!(f, "{}", i),
            ArgValue::Boolean(b) => write!(f, "{}", b),
            ArgValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Integer(n)
    }
}

impl From<i32> for ArgValue {
    fn from(n: i32) -> Self {
        ArgValue::Integer(n as i64)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Boolean(b)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(b: Vec<u8>) -> Self {
        ArgValue::Bytes(b)
    }
}

/// Argument map of a concrete tool call.
///
/// BTreeMap keeps iteration and serialization order deterministic.
pub type Arguments = BTreeMap<String, ArgValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_shapes_round_trip() {
        let cases = vec![
            (ArgValue::from("hello"), "\"hello\""),
            (ArgValue::from(42i64), "42"),
            (ArgValue::from(true), "true"),
            (ArgValue::from(vec![0u8, 255u8]), "[0,255]"),
        ];
        for (value, expected_json) in cases {
            let json = serde_json::to_string(&value).unwrap();
            assert_eq!(json, expected_json);
            let back: ArgValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn floats_are_rejected() {
        assert!(serde_json::from_str::<ArgValue>("1.5").is_err());
        assert!(serde_json::from_str::<ArgValue>("{\"a\": 1}").is_err());
    }

    #[test]
    fn no_cross_type_equality() {
        assert_ne!(ArgValue::from(true), ArgValue::from(1i64));
        assert_ne!(ArgValue::from("1"), ArgValue::from(1i64));
        assert_ne!(ArgValue::from(vec![49u8]), ArgValue::from("1"));
    }

    #[test]
    fn size_bytes_counts_encoded_length() {
        assert_eq!(ArgValue::from("abc").size_bytes(), 3);
        // Multi-byte UTF-8 counts encoded bytes, not chars.
        assert_eq!(ArgValue::from("héllo").size_bytes(), 6);
        assert_eq!(ArgValue::from(vec![1u8, 2, 3, 4]).size_bytes(), 4);
        assert_eq!(ArgValue::from(12345i64).size_bytes(), 5);
        assert_eq!(ArgValue::from(-12i64).size_bytes(), 3);
        assert_eq!(ArgValue::from(true).size_bytes(), 4);
        assert_eq!(ArgValue::from(false).size_bytes(), 5);
    }

    #[test]
    fn display_forms() {
        assert_eq!(ArgValue::from("x").to_string(), "\"x\"");
        assert_eq!(ArgValue::from(7i64).to_string(), "7");
        assert_eq!(ArgValue::from(false).to_string(), "false");
        assert_eq!(ArgValue::from(vec![9u8; 3]).to_string(), "<3 bytes>");
    }

    #[test]
    fn principal_shorthands() {
        let p = Principal::agent("agent@test.com");
        assert_eq!(p.sub, "agent@test.com");
        assert_eq!(p.actor, ActorKind::Agent);
        assert_eq!(p.to_string(), "agent@test.com");

        let json = serde_json::to_string(&Principal::human("ops@test.com")).unwrap();
        assert!(json.contains("\"actor\":\"human\""));
    }
}
