//! Token quantities and symbols.
//!
//! A [`Symbol`] packs a decimal precision and an up-to-seven character
//! uppercase code into a u64; an [`Asset`] pairs a signed amount in the
//! symbol's smallest unit with its symbol. The textual forms are `"3,EOS"`
//! and `"1.000 EOS"` respectively.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Errors raised when parsing symbols or assets from their textual forms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AssetError {
    /// Symbol codes are 1–7 uppercase letters.
    #[error("invalid symbol code {0:?}")]
    InvalidSymbolCode(String),
    /// The symbol string is not of the form `precision,CODE`.
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),
    /// The asset string is not of the form `amount CODE`.
    #[error("invalid asset {0:?}")]
    InvalidAsset(String),
    /// The amount does not fit in a signed 64-bit integer.
    #[error("asset amount out of range")]
    AmountOutOfRange,
}

/// A token symbol: decimal precision plus a short uppercase code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct Symbol(u64);

impl Symbol {
    /// Builds a symbol from a code and precision.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidSymbolCode`] unless the code is 1–7
    /// characters from `A`–`Z`.
    pub fn new(code: &str, precision: u8) -> Result<Self, AssetError> {
        if code.is_empty()
            || code.len() > 7
            || !code.bytes().all(|c| c.is_ascii_uppercase())
        {
            return Err(AssetError::InvalidSymbolCode(code.into()));
        }
        let mut value = u64::from(precision);
        for (i, c) in code.bytes().enumerate() {
            value |= u64::from(c) << (8 * (i + 1));
        }
        Ok(Self(value))
    }

    /// Wraps a raw symbol value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw packed value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// The decimal precision.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn precision(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// The symbol code, e.g. `"EOS"`.
    #[must_use]
    pub fn code(&self) -> String {
        let mut code = String::new();
        let mut tmp = self.0 >> 8;
        while tmp > 0 {
            #[allow(clippy::cast_possible_truncation)]
            code.push((tmp & 0xff) as u8 as char);
            tmp >>= 8;
        }
        code
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.precision(), self.code())
    }
}

impl FromStr for Symbol {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (precision, code) = s
            .split_once(',')
            .ok_or_else(|| AssetError::InvalidSymbol(s.into()))?;
        let precision: u8 = precision
            .parse()
            .map_err(|_| AssetError::InvalidSymbol(s.into()))?;
        Self::new(code, precision)
    }
}

/// A token quantity: a signed amount in the symbol's smallest unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct Asset {
    /// Amount in units of `10^-precision`.
    pub amount: i64,
    /// The token symbol.
    pub symbol: Symbol,
}

impl Asset {
    /// Pairs an amount with a symbol.
    #[must_use]
    pub const fn new(amount: i64, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.symbol.precision() as u32;
        let sign = if self.amount < 0 { "-" } else { "" };
        let magnitude = self.amount.unsigned_abs();
        if precision == 0 {
            return write!(f, "{}{} {}", sign, magnitude, self.symbol.code());
        }
        let scale = 10u64.pow(precision);
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            magnitude / scale,
            magnitude % scale,
            self.symbol.code(),
            width = precision as usize
        )
    }
}

impl FromStr for Asset {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount_str, code) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| AssetError::InvalidAsset(s.into()))?;
        let (negative, digits) = match amount_str.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, amount_str),
        };
        let precision = match digits.split_once('.') {
            Some((_, frac)) => frac.len(),
            None => 0,
        };
        let precision =
            u8::try_from(precision).map_err(|_| AssetError::InvalidAsset(s.into()))?;
        if digits.is_empty()
            || digits.matches('.').count() > 1
            || !digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        {
            return Err(AssetError::InvalidAsset(s.into()));
        }
        let mut magnitude: i64 = 0;
        for c in digits.bytes().filter(u8::is_ascii_digit) {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add(i64::from(c - b'0')))
                .ok_or(AssetError::AmountOutOfRange)?;
        }
        let amount = if negative { -magnitude } else { magnitude };
        Ok(Self::new(amount, Symbol::new(code, precision)?))
    }
}
