//! The ABI provider seam.
//!
//! Fetching a contract's ABI is the only possibly-suspending operation in
//! the whole protocol. The [`AbiProvider`] trait models it as a boxed
//! future so implementations can hit the network, a cache, or a fixed map;
//! provider failures are surfaced to the caller unchanged.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use esr_abi::{Abi, Name};

use crate::error::ProviderError;

/// ABIs keyed by contract account.
pub type AbiMap = HashMap<Name, Abi>;

/// Yields the ABI published by an account.
pub trait AbiProvider: Send + Sync {
    /// Fetches the ABI for `account`.
    fn get_abi(
        &self,
        account: Name,
    ) -> Pin<Box<dyn Future<Output = Result<Abi, ProviderError>> + Send + '_>>;
}

/// An [`AbiProvider`] over a fixed, pre-loaded map.
///
/// Doubles as the cache wallets keep between requests and as the provider
/// used in tests.
#[derive(Debug, Default, Clone)]
pub struct StaticAbiProvider {
    abis: AbiMap,
}

impl StaticAbiProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the ABI for `account`.
    pub fn insert(&mut self, account: Name, abi: Abi) -> &mut Self {
        self.abis.insert(account, abi);
        self
    }

    /// Borrows the underlying map.
    #[must_use]
    pub const fn abis(&self) -> &AbiMap {
        &self.abis
    }
}

impl From<AbiMap> for StaticAbiProvider {
    fn from(abis: AbiMap) -> Self {
        Self { abis }
    }
}

impl AbiProvider for StaticAbiProvider {
    fn get_abi(
        &self,
        account: Name,
    ) -> Pin<Box<dyn Future<Output = Result<Abi, ProviderError>> + Send + '_>> {
        Box::pin(async move {
            self.abis
                .get(&account)
                .cloned()
                .ok_or_else(|| format!("no ABI known for account {account}").into())
        })
    }
}
