//! Contract actions and permission levels.

use serde::{Deserialize, Serialize};

use crate::bytes::Bytes;
use crate::name::Name;
use crate::ser::{BinaryReader, BinaryWriter, CodecError, Pack, Unpack};

/// An (actor, permission) pair naming the authority an action runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    /// The acting account.
    pub actor: Name,
    /// The permission of that account.
    pub permission: Name,
}

impl PermissionLevel {
    /// Pairs an actor with a permission.
    #[must_use]
    pub const fn new(actor: Name, permission: Name) -> Self {
        Self { actor, permission }
    }
}

impl Pack for PermissionLevel {
    fn pack(&self, w: &mut BinaryWriter) {
        self.actor.pack(w);
        self.permission.pack(w);
    }
}

impl Unpack for PermissionLevel {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            actor: Name::unpack(r)?,
            permission: Name::unpack(r)?,
        })
    }
}

/// A contract invocation: target account, action name, the authorizations
/// it claims, and the ABI-encoded parameter bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The contract account.
    pub account: Name,
    /// The action being invoked.
    pub name: Name,
    /// Authorizations, in declaration order.
    pub authorization: Vec<PermissionLevel>,
    /// ABI-encoded parameters.
    pub data: Bytes,
}

impl Pack for Action {
    fn pack(&self, w: &mut BinaryWriter) {
        self.account.pack(w);
        self.name.pack(w);
        self.authorization.pack(w);
        self.data.pack(w);
    }
}

impl Unpack for Action {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            account: Name::unpack(r)?,
            name: Name::unpack(r)?,
            authorization: Vec::unpack(r)?,
            data: Bytes::unpack(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let action = Action {
            account: "eosio.token".parse().unwrap(),
            name: "transfer".parse().unwrap(),
            authorization: vec![PermissionLevel::new(
                "foo".parse().unwrap(),
                "active".parse().unwrap(),
            )],
            data: Bytes(vec![1, 2, 3]),
        };
        let packed = action.packed();
        assert_eq!(Action::unpack_bytes(&packed).unwrap(), action);
    }

    #[test]
    fn json_form() {
        let level = PermissionLevel::new(
            "foo".parse().unwrap(),
            "active".parse().unwrap(),
        );
        assert_eq!(
            serde_json::to_string(&level).unwrap(),
            r#"{"actor":"foo","permission":"active"}"#
        );
    }
}
