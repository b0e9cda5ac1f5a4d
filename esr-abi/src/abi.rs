//! Contract ABIs and type-directed encode/decode of action data.
//!
//! An [`Abi`] is the schema a contract publishes for its action parameters.
//! This module implements the subset of the ABI type language the signing
//! request flow needs: built-in scalars, type aliases, structs with bases,
//! variants, and the `[]` (array), `?` (optional) and `$` (binary
//! extension) suffixes.
//!
//! Encoding is coercing: generic values produced from JSON (strings,
//! numbers) are converted to the concrete wire type the ABI declares, so
//! `"1.000 EOS"` encodes as an asset when the field says so. Decoding
//! always produces fully typed [`AbiValue`] trees.

use serde::{Deserialize, Serialize};

use crate::asset::{Asset, Symbol};
use crate::bytes::{Bytes, Checksum256};
use crate::crypto::{PublicKey, Signature};
use crate::name::Name;
use crate::ser::{BinaryReader, BinaryWriter, CodecError, Pack, Unpack};
use crate::time::TimePointSec;
use crate::value::AbiValue;

/// Nesting bound for type resolution and struct recursion.
const MAX_DEPTH: usize = 100;

/// Errors raised while encoding or decoding under an ABI.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum AbiError {
    /// The action name has no entry in the ABI's action table.
    #[error("action {0} not present in ABI")]
    UnknownAction(Name),
    /// A type name that is neither built-in nor declared by the ABI.
    #[error("unknown ABI type {0:?}")]
    UnknownType(String),
    /// The value cannot be coerced to the declared type.
    #[error("cannot encode {got} as {type_name:?}")]
    Mismatch {
        /// The declared wire type.
        type_name: String,
        /// A short description of the offending value.
        got: &'static str,
    },
    /// A struct value is missing a declared non-optional field.
    #[error("missing field {field:?} of {struct_name:?}")]
    MissingField {
        /// The struct being encoded.
        struct_name: String,
        /// The absent field.
        field: String,
    },
    /// Types nest deeper than the resolution bound.
    #[error("ABI type nesting exceeds {MAX_DEPTH}")]
    TooDeep,
    /// The underlying wire data is invalid.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A type alias declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// The alias being introduced.
    pub new_type_name: String,
    /// The aliased type.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A single struct field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Declared type, possibly suffixed with `[]`, `?` or `$`.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A struct declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    /// Struct name.
    pub name: String,
    /// Optional base struct whose fields come first.
    #[serde(default)]
    pub base: String,
    /// Own fields, in wire order.
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// An action-to-type binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    /// Action name.
    pub name: Name,
    /// The struct describing the action's parameters.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Ricardian contract text; ignored by the codec.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ricardian_contract: String,
}

/// A variant (sum type) declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDef {
    /// Variant name.
    pub name: String,
    /// Alternative types, in tag order.
    pub types: Vec<String>,
}

/// A contract ABI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Abi {
    /// Schema version string, e.g. `eosio::abi/1.1`.
    #[serde(default)]
    pub version: String,
    /// Type aliases.
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// Struct declarations.
    #[serde(default)]
    pub structs: Vec<StructDef>,
    /// Action bindings.
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    /// Variant declarations.
    #[serde(default)]
    pub variants: Vec<VariantDef>,
}

impl Abi {
    /// Parses an ABI from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error on malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns the parameter type bound to `action`, if any.
    #[must_use]
    pub fn action_type(&self, action: Name) -> Option<&str> {
        self.actions
            .iter()
            .find(|a| a.name == action)
            .map(|a| a.type_name.as_str())
    }

    fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    fn variant_def(&self, name: &str) -> Option<&VariantDef> {
        self.variants.iter().find(|v| v.name == name)
    }

    fn resolve_alias<'a>(&'a self, mut name: &'a str) -> &'a str {
        for _ in 0..MAX_DEPTH {
            match self.types.iter().find(|t| t.new_type_name == name) {
                Some(def) => name = &def.type_name,
                None => break,
            }
        }
        name
    }

    /// Encodes `value` as the parameter struct of `action`.
    ///
    /// # Errors
    ///
    /// Returns [`AbiError::UnknownAction`] when the action is not declared,
    /// or a coercion/codec error from the field walk.
    pub fn encode_action_data(
        &self,
        action: Name,
        value: &AbiValue,
    ) -> Result<Bytes, AbiError> {
        let type_name = self
            .action_type(action)
            .ok_or(AbiError::UnknownAction(action))?
            .to_owned();
        let mut w = BinaryWriter::new();
        self.encode_type(&type_name, value, &mut w, 0)?;
        Ok(Bytes(w.into_bytes()))
    }

    /// Decodes action data bytes into a typed value tree.
    ///
    /// # Errors
    ///
    /// Returns [`AbiError::UnknownAction`] when the action is not declared,
    /// or a codec error on truncated or invalid data.
    pub fn decode_action_data(
        &self,
        action: Name,
        data: &[u8],
    ) -> Result<AbiValue, AbiError> {
        let type_name = self
            .action_type(action)
            .ok_or(AbiError::UnknownAction(action))?
            .to_owned();
        let mut r = BinaryReader::new(data);
        self.decode_type(&type_name, &mut r, 0)
    }

    /// Encodes a value as an arbitrary declared or built-in type.
    ///
    /// # Errors
    ///
    /// Returns [`AbiError::UnknownType`] for undeclared types and
    /// [`AbiError::Mismatch`] when the value cannot be coerced.
    pub fn encode_type(
        &self,
        type_name: &str,
        value: &AbiValue,
        w: &mut BinaryWriter,
        depth: usize,
    ) -> Result<(), AbiError> {
        if depth > MAX_DEPTH {
            return Err(AbiError::TooDeep);
        }
        if let Some(inner) = type_name.strip_suffix('$') {
            return self.encode_type(inner, value, w, depth + 1);
        }
        if let Some(inner) = type_name.strip_suffix('?') {
            return match value {
                AbiValue::Null => {
                    w.write_u8(0);
                    Ok(())
                }
                present => {
                    w.write_u8(1);
                    self.encode_type(inner, present, w, depth + 1)
                }
            };
        }
        if let Some(inner) = type_name.strip_suffix("[]") {
            let AbiValue::Array(items) = value else {
                return Err(mismatch(type_name, value));
            };
            #[allow(clippy::cast_possible_truncation)]
            w.write_varuint32(items.len() as u32);
            for item in items {
                self.encode_type(inner, item, w, depth + 1)?;
            }
            return Ok(());
        }

        let resolved = self.resolve_alias(type_name);
        if let Some(def) = self.struct_def(resolved) {
            return self.encode_struct(def, value, w, depth + 1);
        }
        if let Some(def) = self.variant_def(resolved) {
            return self.encode_variant(def, value, w, depth + 1);
        }
        encode_builtin(resolved, value, w)
    }

    /// Decodes an arbitrary declared or built-in type.
    ///
    /// # Errors
    ///
    /// Returns [`AbiError::UnknownType`] for undeclared types, or a codec
    /// error from the reader.
    pub fn decode_type(
        &self,
        type_name: &str,
        r: &mut BinaryReader<'_>,
        depth: usize,
    ) -> Result<AbiValue, AbiError> {
        if depth > MAX_DEPTH {
            return Err(AbiError::TooDeep);
        }
        if let Some(inner) = type_name.strip_suffix('$') {
            if r.is_empty() {
                return Ok(AbiValue::Null);
            }
            return self.decode_type(inner, r, depth + 1);
        }
        if let Some(inner) = type_name.strip_suffix('?') {
            return match r.read_u8()? {
                0 => Ok(AbiValue::Null),
                _ => self.decode_type(inner, r, depth + 1),
            };
        }
        if let Some(inner) = type_name.strip_suffix("[]") {
            let len = r.read_varuint32()? as usize;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(self.decode_type(inner, r, depth + 1)?);
            }
            return Ok(AbiValue::Array(items));
        }

        let resolved = self.resolve_alias(type_name);
        if let Some(def) = self.struct_def(resolved) {
            let mut fields = Vec::new();
            self.decode_struct(def, r, &mut fields, depth + 1)?;
            return Ok(AbiValue::Object(fields));
        }
        if let Some(def) = self.variant_def(resolved) {
            let tag = r.read_varuint32()?;
            let alt = def.types.get(tag as usize).ok_or(
                CodecError::UnknownVariantTag {
                    type_name: "variant",
                    tag,
                },
            )?;
            let inner = self.decode_type(alt, r, depth + 1)?;
            return Ok(AbiValue::Array(vec![
                AbiValue::String(alt.clone()),
                inner,
            ]));
        }
        decode_builtin(resolved, r)
    }

    fn encode_struct(
        &self,
        def: &StructDef,
        value: &AbiValue,
        w: &mut BinaryWriter,
        depth: usize,
    ) -> Result<(), AbiError> {
        if !def.base.is_empty() {
            let base = self
                .struct_def(&def.base)
                .ok_or_else(|| AbiError::UnknownType(def.base.clone()))?;
            self.encode_struct(base, value, w, depth + 1)?;
        }
        for field in &def.fields {
            match value.get(&field.name) {
                Some(field_value) => {
                    self.encode_type(&field.type_name, field_value, w, depth + 1)?;
                }
                None if field.type_name.ends_with('$') => break,
                None if field.type_name.ends_with('?') => w.write_u8(0),
                None => {
                    return Err(AbiError::MissingField {
                        struct_name: def.name.clone(),
                        field: field.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    fn decode_struct(
        &self,
        def: &StructDef,
        r: &mut BinaryReader<'_>,
        fields: &mut Vec<(String, AbiValue)>,
        depth: usize,
    ) -> Result<(), AbiError> {
        if depth > MAX_DEPTH {
            return Err(AbiError::TooDeep);
        }
        if !def.base.is_empty() {
            let base = self
                .struct_def(&def.base)
                .ok_or_else(|| AbiError::UnknownType(def.base.clone()))?;
            self.decode_struct(base, r, fields, depth + 1)?;
        }
        for field in &def.fields {
            if field.type_name.ends_with('$') && r.is_empty() {
                break;
            }
            let value = self.decode_type(&field.type_name, r, depth + 1)?;
            fields.push((field.name.clone(), value));
        }
        Ok(())
    }

    fn encode_variant(
        &self,
        def: &VariantDef,
        value: &AbiValue,
        w: &mut BinaryWriter,
        depth: usize,
    ) -> Result<(), AbiError> {
        // variants are written as ["type_name", value] pairs
        let AbiValue::Array(parts) = value else {
            return Err(mismatch(&def.name, value));
        };
        let [tag_value, inner] = parts.as_slice() else {
            return Err(mismatch(&def.name, value));
        };
        let tag_name = tag_value
            .as_str()
            .ok_or_else(|| mismatch(&def.name, value))?;
        let tag = def
            .types
            .iter()
            .position(|t| t == tag_name)
            .ok_or_else(|| AbiError::UnknownType(tag_name.to_owned()))?;
        #[allow(clippy::cast_possible_truncation)]
        w.write_varuint32(tag as u32);
        self.encode_type(tag_name, inner, w, depth + 1)
    }
}

fn mismatch(type_name: &str, value: &AbiValue) -> AbiError {
    AbiError::Mismatch {
        type_name: type_name.to_owned(),
        got: match value {
            AbiValue::Null => "null",
            AbiValue::Bool(_) => "bool",
            AbiValue::Int(_) => "int",
            AbiValue::UInt(_) => "uint",
            AbiValue::Name(_) => "name",
            AbiValue::String(_) => "string",
            AbiValue::Bytes(_) => "bytes",
            AbiValue::Checksum(_) => "checksum",
            AbiValue::TimePointSec(_) => "time_point_sec",
            AbiValue::Asset(_) => "asset",
            AbiValue::Symbol(_) => "symbol",
            AbiValue::PublicKey(_) => "public_key",
            AbiValue::Signature(_) => "signature",
            AbiValue::Array(_) => "array",
            AbiValue::Object(_) => "object",
        },
    }
}

fn as_u64(type_name: &str, value: &AbiValue) -> Result<u64, AbiError> {
    match value {
        AbiValue::UInt(u) => Ok(*u),
        AbiValue::Int(i) if *i >= 0 => Ok(*i as u64),
        AbiValue::String(s) => {
            s.parse().map_err(|_| mismatch(type_name, value))
        }
        _ => Err(mismatch(type_name, value)),
    }
}

fn as_i64(type_name: &str, value: &AbiValue) -> Result<i64, AbiError> {
    match value {
        AbiValue::Int(i) => Ok(*i),
        AbiValue::UInt(u) => {
            i64::try_from(*u).map_err(|_| mismatch(type_name, value))
        }
        AbiValue::String(s) => {
            s.parse().map_err(|_| mismatch(type_name, value))
        }
        _ => Err(mismatch(type_name, value)),
    }
}

/// Coerces and parses a string-typed scalar.
fn parsed<T: std::str::FromStr>(
    type_name: &str,
    value: &AbiValue,
) -> Result<T, AbiError> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| mismatch(type_name, value))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_builtin(
    type_name: &str,
    value: &AbiValue,
    w: &mut BinaryWriter,
) -> Result<(), AbiError> {
    match type_name {
        "bool" => match value {
            AbiValue::Bool(b) => w.write_u8(u8::from(*b)),
            other => w.write_u8(u8::from(as_u64(type_name, other)? != 0)),
        },
        "uint8" => w.write_u8(as_u64(type_name, value)? as u8),
        "uint16" => w.write_u16(as_u64(type_name, value)? as u16),
        "uint32" => w.write_u32(as_u64(type_name, value)? as u32),
        "uint64" => w.write_u64(as_u64(type_name, value)?),
        "varuint32" => w.write_varuint32(as_u64(type_name, value)? as u32),
        "int8" => w.write_u8(as_i64(type_name, value)? as u8),
        "int16" => w.write_u16(as_i64(type_name, value)? as u16),
        "int32" => w.write_u32(as_i64(type_name, value)? as u32),
        "int64" => w.write_i64(as_i64(type_name, value)?),
        "name" => match value {
            AbiValue::Name(n) => n.pack(w),
            other => parsed::<Name>(type_name, other)?.pack(w),
        },
        "string" => match value {
            AbiValue::String(s) => s.pack(w),
            other => return Err(mismatch(type_name, other)),
        },
        "bytes" => match value {
            AbiValue::Bytes(b) => b.pack(w),
            other => parsed::<Bytes>(type_name, other)?.pack(w),
        },
        "checksum256" => match value {
            AbiValue::Checksum(c) => c.pack(w),
            other => parsed::<Checksum256>(type_name, other)?.pack(w),
        },
        "time_point_sec" => match value {
            AbiValue::TimePointSec(t) => t.pack(w),
            other => parsed::<TimePointSec>(type_name, other)?.pack(w),
        },
        "asset" => match value {
            AbiValue::Asset(a) => a.pack(w),
            other => parsed::<Asset>(type_name, other)?.pack(w),
        },
        "symbol" => match value {
            AbiValue::Symbol(s) => s.pack(w),
            other => parsed::<Symbol>(type_name, other)?.pack(w),
        },
        "public_key" => match value {
            AbiValue::PublicKey(k) => k.pack(w),
            other => parsed::<PublicKey>(type_name, other)?.pack(w),
        },
        "signature" => match value {
            AbiValue::Signature(s) => s.pack(w),
            other => parsed::<Signature>(type_name, other)?.pack(w),
        },
        _ => return Err(AbiError::UnknownType(type_name.to_owned())),
    }
    Ok(())
}

fn decode_builtin(
    type_name: &str,
    r: &mut BinaryReader<'_>,
) -> Result<AbiValue, AbiError> {
    Ok(match type_name {
        "bool" => AbiValue::Bool(bool::unpack(r)?),
        "uint8" => AbiValue::UInt(u64::from(r.read_u8()?)),
        "uint16" => AbiValue::UInt(u64::from(r.read_u16()?)),
        "uint32" => AbiValue::UInt(u64::from(r.read_u32()?)),
        "uint64" => AbiValue::UInt(r.read_u64()?),
        "varuint32" => AbiValue::UInt(u64::from(r.read_varuint32()?)),
        "int8" => AbiValue::Int(i64::from(r.read_u8()? as i8)),
        "int16" => AbiValue::Int(i64::from(r.read_u16()? as i16)),
        "int32" => AbiValue::Int(i64::from(r.read_u32()? as i32)),
        "int64" => AbiValue::Int(r.read_i64()?),
        "name" => AbiValue::Name(Name::unpack(r)?),
        "string" => AbiValue::String(r.read_string()?),
        "bytes" => AbiValue::Bytes(Bytes::unpack(r)?),
        "checksum256" => AbiValue::Checksum(Checksum256::unpack(r)?),
        "time_point_sec" => AbiValue::TimePointSec(TimePointSec::unpack(r)?),
        "asset" => AbiValue::Asset(Asset::unpack(r)?),
        "symbol" => AbiValue::Symbol(Symbol::unpack(r)?),
        "public_key" => AbiValue::PublicKey(PublicKey::unpack(r)?),
        "signature" => AbiValue::Signature(Signature::unpack(r)?),
        _ => return Err(AbiError::UnknownType(type_name.to_owned())),
    })
}
