//! The decoded-action-data value tree.
//!
//! Action data decoded under an ABI is represented as an [`AbiValue`]: a
//! tagged union over the wire scalar types plus arrays and field-ordered
//! records. Keeping names, assets and the like as their own variants (not
//! strings) is what lets the resolver find and replace placeholder names
//! no matter how deeply they sit in the decoded tree.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::asset::{Asset, Symbol};
use crate::bytes::{Bytes, Checksum256};
use crate::crypto::{PublicKey, Signature};
use crate::name::Name;
use crate::time::TimePointSec;

/// A decoded wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum AbiValue {
    /// An absent optional.
    Null,
    Bool(bool),
    /// Any signed integer width.
    Int(i64),
    /// Any unsigned integer width, including varuints.
    UInt(u64),
    Name(Name),
    String(String),
    Bytes(Bytes),
    Checksum(Checksum256),
    TimePointSec(TimePointSec),
    Asset(Asset),
    Symbol(Symbol),
    PublicKey(PublicKey),
    Signature(Signature),
    /// An ordered sequence.
    Array(Vec<AbiValue>),
    /// A record in ABI field order.
    Object(Vec<(String, AbiValue)>),
}

impl AbiValue {
    /// Builds an [`AbiValue::Object`] from key/value pairs.
    pub fn object<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<AbiValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Looks up a field of an object by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AbiValue> {
        match self {
            Self::Object(fields) => {
                fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Returns the name value, if this is a name.
    #[must_use]
    pub fn as_name(&self) -> Option<Name> {
        match self {
            Self::Name(name) => Some(*name),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the tree into its JSON representation: scalars become
    /// their textual forms, records become maps.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::UInt(u) => json!(u),
            Self::Name(n) => json!(n.to_string()),
            Self::String(s) => json!(s),
            Self::Bytes(b) => json!(b.to_string()),
            Self::Checksum(c) => json!(c.to_string()),
            Self::TimePointSec(t) => json!(t.to_string()),
            Self::Asset(a) => json!(a.to_string()),
            Self::Symbol(s) => json!(s.to_string()),
            Self::PublicKey(k) => json!(k.to_string()),
            Self::Signature(s) => json!(s.to_string()),
            Self::Array(items) => {
                Value::Array(items.iter().map(AbiValue::to_json).collect())
            }
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for AbiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            other => other.to_json().serialize(serializer),
        }
    }
}

/// Lossy conversion from arbitrary JSON; the ABI encoder coerces these
/// generic forms into concrete wire types by declared field type.
impl From<serde_json::Value> for AbiValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::String(n.to_string())
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(fields) => Self::Object(
                fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<i64> for AbiValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Name> for AbiValue {
    fn from(value: Name) -> Self {
        Self::Name(value)
    }
}

impl From<Asset> for AbiValue {
    fn from(value: Asset) -> Self {
        Self::Asset(value)
    }
}

impl From<Bytes> for AbiValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<AbiValue>> From<Vec<T>> for AbiValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_lookup() {
        let value = AbiValue::object([("from", "foo"), ("to", "bar")]);
        assert_eq!(value.get("to").and_then(AbiValue::as_str), Some("bar"));
        assert_eq!(value.get("missing"), None);
    }

    #[test]
    fn json_view() {
        let value = AbiValue::object([
            ("actor", AbiValue::Name("foo".parse().unwrap())),
            ("amount", AbiValue::Asset("1.000 EOS".parse().unwrap())),
        ]);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"actor":"foo","amount":"1.000 EOS"}"#
        );
    }

    #[test]
    fn from_json() {
        let json: serde_json::Value =
            serde_json::json!({"n": 7, "s": "x", "a": [true]});
        let value = AbiValue::from(json);
        assert_eq!(value.get("n"), Some(&AbiValue::UInt(7)));
        assert_eq!(
            value.get("a"),
            Some(&AbiValue::Array(vec![AbiValue::Bool(true)]))
        );
    }
}
