//! Base-32 packed account names.
//!
//! A [`Name`] is a 64-bit integer holding up to 13 characters from the
//! alphabet `.12345abcdefghijklmnopqrstuvwxyz`. The first twelve characters
//! occupy five bits each starting from the most significant bit; the
//! thirteenth occupies the low four bits.
//!
//! The raw values `1` and `2` are reserved by the signing request protocol
//! and render as `............1` and `............2` respectively.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// The base-32 symbol table: index 0 is `.`, 1–5 are the digits, 6–31 the
/// lowercase letters.
const CHARS: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Errors raised when parsing a name from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NameError {
    /// The string contains a character outside the name alphabet.
    #[error("invalid character {0:?} in name")]
    InvalidChar(char),
    /// The string is longer than 13 characters.
    #[error("name is longer than 13 characters")]
    TooLong,
    /// The thirteenth character does not fit in four bits (`.`–`j` only).
    #[error("thirteenth character {0:?} out of range")]
    ThirteenthCharOutOfRange(char),
    /// The string does not survive a round-trip through the packed form.
    #[error("name {0:?} does not round-trip")]
    NotExact(String),
}

/// A base-32 packed 64-bit account name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct Name(u64);

impl Name {
    /// The zero-valued name, rendering as the empty string.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw 64-bit name value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parses a name, additionally requiring that the packed value renders
    /// back to exactly the input string.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::NotExact`] for inputs like `"foo."` that parse
    /// but lose characters on the round-trip, in addition to the ordinary
    /// parse errors.
    pub fn from_exact(s: &str) -> Result<Self, NameError> {
        let name: Self = s.parse()?;
        if name.to_string() != s {
            return Err(NameError::NotExact(s.into()));
        }
        Ok(name)
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some(u64::from(c - b'1') + 1),
        b'a'..=b'z' => Some(u64::from(c - b'a') + 6),
        _ => None,
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut value = 0u64;
        for (i, c) in s.bytes().enumerate() {
            let sym = char_to_symbol(c).ok_or(NameError::InvalidChar(c as char))?;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i + 1));
            } else if i == 12 {
                if sym > 0x0f {
                    return Err(NameError::ThirteenthCharOutOfRange(c as char));
                }
                value |= sym;
            } else {
                return Err(NameError::TooLong);
            }
        }
        Ok(Self(value))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..13 {
            let mask = if i == 0 { 0x0f } else { 0x1f };
            chars[12 - i] = CHARS[(tmp & mask) as usize];
            tmp >>= if i == 0 { 4 } else { 5 };
        }
        let end = chars
            .iter()
            .rposition(|&c| c != b'.')
            .map_or(0, |p| p + 1);
        // the alphabet is pure ASCII
        f.write_str(std::str::from_utf8(&chars[..end]).unwrap())
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Name> for u64 {
    fn from(name: Name) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        for s in ["foo", "bar", "eosio.token", "transfer", "a", "5", "ab.cd.ef"] {
            let name: Name = s.parse().unwrap();
            assert_eq!(name.to_string(), s);
        }
    }

    #[test]
    fn known_values() {
        let foo: Name = "foo".parse().unwrap();
        assert_eq!(foo.value(), 0x5d28_0000_0000_0000);
        let token: Name = "eosio.token".parse().unwrap();
        assert_eq!(token.to_string(), "eosio.token");
        assert_eq!(Name::ZERO.to_string(), "");
    }

    #[test]
    fn reserved_renderings() {
        assert_eq!(Name::new(1).to_string(), "............1");
        assert_eq!(Name::new(2).to_string(), "............2");
        assert_eq!("............1".parse::<Name>().unwrap(), Name::new(1));
        assert_eq!("............2".parse::<Name>().unwrap(), Name::new(2));
    }

    #[test]
    fn thirteen_chars() {
        let name: Name = "aaaaaaaaaaaaj".parse().unwrap();
        assert_eq!(name.to_string(), "aaaaaaaaaaaaj");
        assert!(matches!(
            "aaaaaaaaaaaaz".parse::<Name>(),
            Err(NameError::ThirteenthCharOutOfRange('z'))
        ));
        assert!(matches!(
            "aaaaaaaaaaaaaa".parse::<Name>(),
            Err(NameError::TooLong)
        ));
    }

    #[test]
    fn invalid_chars() {
        assert!(matches!(
            "Foo".parse::<Name>(),
            Err(NameError::InvalidChar('F'))
        ));
        assert!("foo6".parse::<Name>().is_err());
    }

    #[test]
    fn exactness() {
        assert!(Name::from_exact("foo").is_ok());
        assert!(matches!(
            Name::from_exact("foo."),
            Err(NameError::NotExact(_))
        ));
    }

    #[test]
    fn json_form() {
        let name: Name = serde_json::from_str("\"eosio.token\"").unwrap();
        assert_eq!(name.to_string(), "eosio.token");
        assert_eq!(
            serde_json::to_string(&name).unwrap(),
            "\"eosio.token\""
        );
    }
}
