//! The signing request itself: building, framing, querying and mutating.
//!
//! A [`SigningRequest`] is created either by the builder
//! ([`SigningRequest::create`] and friends) or by decoding a text carrier
//! or raw frame. Structurally it is immutable once created, with four
//! exceptions mutated in place through named setters: the info pairs, the
//! callback string, the flag byte and the originator signature.
//!
//! # Frame layout
//!
//! ```text
//! [header:1] [payload:N] [signature:0 or ~74]
//! ```
//!
//! The header's low seven bits carry the protocol version (2 or 3); the
//! top bit marks the remainder as raw-DEFLATE compressed. Compression is
//! only used when it actually shrinks the frame.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use esr_abi::{
    sha256, Abi, Action, BinaryReader, Bytes, Checksum256, Name, Pack,
    PermissionLevel, Signature, TimePointSec, Transaction, TransactionExtension,
    Unpack,
};

use crate::abi_provider::{AbiMap, AbiProvider};
use crate::chain::{ChainAlias, ChainId, ChainIdVariant};
use crate::compression::{Compressor, DEFLATE};
use crate::error::RequestError;
use crate::payload::{
    identity_abi, IdentityBody, IdentityV2, IdentityV3, InfoPair, ProtocolVersion,
    RequestFlags, RequestPayload, RequestSignature, RequestVariant,
};
use crate::signer::SignatureProvider;

/// The reserved name that resolves to the signing account.
pub const PLACEHOLDER_NAME: Name = Name::new(1);

/// The reserved name that resolves to the signing permission.
pub const PLACEHOLDER_PERMISSION: Name = Name::new(2);

/// The info key multi-chain requests declare their chain set under.
pub const CHAIN_IDS_KEY: &str = "chain_ids";

/// An authorization of placeholder actor and permission.
#[must_use]
pub const fn placeholder_auth() -> PermissionLevel {
    PermissionLevel::new(PLACEHOLDER_NAME, PLACEHOLDER_PERMISSION)
}

pub(crate) fn is_placeholder(name: Name) -> bool {
    name == PLACEHOLDER_NAME || name == PLACEHOLDER_PERMISSION
}

/// Action data handed to the builder: already encoded, or a value tree to
/// run through the contract ABI.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionData {
    /// Raw ABI-encoded bytes, taken as-is.
    Raw(Bytes),
    /// A value tree to encode with the contract's ABI.
    Unencoded(esr_abi::AbiValue),
}

impl From<Bytes> for ActionData {
    fn from(value: Bytes) -> Self {
        Self::Raw(value)
    }
}

impl From<esr_abi::AbiValue> for ActionData {
    fn from(value: esr_abi::AbiValue) -> Self {
        Self::Unencoded(value)
    }
}

impl From<serde_json::Value> for ActionData {
    fn from(value: serde_json::Value) -> Self {
        Self::Unencoded(value.into())
    }
}

/// An action as handed to the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    /// The contract account.
    pub account: Name,
    /// The action name.
    pub name: Name,
    /// Authorizations; may contain placeholders.
    pub authorization: Vec<PermissionLevel>,
    /// The action data.
    pub data: ActionData,
}

impl ProposedAction {
    fn into_action(self, abis: &AbiMap) -> Result<Action, RequestError> {
        let data = match self.data {
            ActionData::Raw(bytes) => bytes,
            ActionData::Unencoded(value) => {
                let abi = abis
                    .get(&self.account)
                    .ok_or(RequestError::MissingAbi(self.account))?;
                abi.encode_action_data(self.name, &value)?
            }
        };
        Ok(Action {
            account: self.account,
            name: self.name,
            authorization: self.authorization,
            data,
        })
    }

    fn needs_abi(&self) -> bool {
        matches!(self.data, ActionData::Unencoded(_))
    }
}

impl From<Action> for ProposedAction {
    fn from(action: Action) -> Self {
        Self {
            account: action.account,
            name: action.name,
            authorization: action.authorization,
            data: ActionData::Raw(action.data),
        }
    }
}

/// A transaction as handed to the builder: header fields default to the
/// null header, vectors default to empty, and actions may carry unencoded
/// data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposedTransaction {
    pub expiration: TimePointSec,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub max_net_usage_words: u32,
    pub max_cpu_usage_ms: u8,
    pub delay_sec: u32,
    pub context_free_actions: Vec<ProposedAction>,
    pub actions: Vec<ProposedAction>,
    pub transaction_extensions: Vec<TransactionExtension>,
}

impl ProposedTransaction {
    fn into_transaction(self, abis: &AbiMap) -> Result<Transaction, RequestError> {
        Ok(Transaction {
            expiration: self.expiration,
            ref_block_num: self.ref_block_num,
            ref_block_prefix: self.ref_block_prefix,
            max_net_usage_words: self.max_net_usage_words,
            max_cpu_usage_ms: self.max_cpu_usage_ms,
            delay_sec: self.delay_sec,
            context_free_actions: self
                .context_free_actions
                .into_iter()
                .map(|a| a.into_action(abis))
                .collect::<Result<_, _>>()?,
            actions: self
                .actions
                .into_iter()
                .map(|a| a.into_action(abis))
                .collect::<Result<_, _>>()?,
            transaction_extensions: self.transaction_extensions,
        })
    }
}

impl From<Transaction> for ProposedTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            expiration: tx.expiration,
            ref_block_num: tx.ref_block_num,
            ref_block_prefix: tx.ref_block_prefix,
            max_net_usage_words: tx.max_net_usage_words,
            max_cpu_usage_ms: tx.max_cpu_usage_ms,
            delay_sec: tx.delay_sec,
            context_free_actions: tx
                .context_free_actions
                .into_iter()
                .map(Into::into)
                .collect(),
            actions: tx.actions.into_iter().map(Into::into).collect(),
            transaction_extensions: tx.transaction_extensions,
        }
    }
}

/// The identity part of a request descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityArgs {
    /// Binds the attestation to a scope; forces protocol v3.
    pub scope: Option<Name>,
    /// The requested permission, or `None` to let the signer choose.
    pub permission: Option<PermissionLevel>,
}

/// The chain a request targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainArg {
    /// The well-known default chain.
    #[default]
    Default,
    /// Valid on any chain; forces protocol v3 and alias 0.
    MultiChain,
    /// A chain from the alias table.
    Alias(ChainAlias),
    /// An explicit 32-byte chain id.
    Id(ChainId),
}

impl From<ChainAlias> for ChainArg {
    fn from(alias: ChainAlias) -> Self {
        Self::Alias(alias)
    }
}

impl From<ChainId> for ChainArg {
    fn from(id: ChainId) -> Self {
        Self::Id(id)
    }
}

/// A callback destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackInit {
    /// The URL template, possibly containing `{{key}}` spans.
    pub url: String,
    /// Deliver the payload by POST instead of redirecting.
    pub background: bool,
}

impl From<&str> for CallbackInit {
    fn from(url: &str) -> Self {
        Self {
            url: url.into(),
            background: false,
        }
    }
}

impl From<String> for CallbackInit {
    fn from(url: String) -> Self {
        Self {
            url,
            background: false,
        }
    }
}

/// A typed metadata value for [`SigningRequest::set_info_key`].
///
/// Plain strings encode as raw UTF-8 bytes with no length prefix; this
/// asymmetry is part of the wire convention and read compatibility depends
/// on it. Every other variant encodes through the ABI serializer rules.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    String(String),
    Bytes(Bytes),
    Bool(bool),
    UInt64(u64),
    Name(Name),
    Checksum(Checksum256),
    Signature(Signature),
}

impl InfoValue {
    fn encode(&self) -> Bytes {
        match self {
            Self::String(s) => Bytes(s.as_bytes().to_vec()),
            Self::Bytes(b) => b.clone(),
            Self::Bool(b) => Bytes(vec![u8::from(*b)]),
            Self::UInt64(u) => Bytes(u.to_le_bytes().to_vec()),
            Self::Name(n) => Bytes(n.packed()),
            Self::Checksum(c) => Bytes(c.packed()),
            Self::Signature(s) => Bytes(s.packed()),
        }
    }
}

impl From<&str> for InfoValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<bool> for InfoValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for InfoValue {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<Name> for InfoValue {
    fn from(value: Name) -> Self {
        Self::Name(value)
    }
}

impl From<Bytes> for InfoValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Checksum256> for InfoValue {
    fn from(value: Checksum256) -> Self {
        Self::Checksum(value)
    }
}

impl From<Signature> for InfoValue {
    fn from(value: Signature) -> Self {
        Self::Signature(value)
    }
}

/// The request descriptor accepted by the builder.
///
/// Exactly one of `action`, `actions`, `transaction` or `identity` must be
/// set; everything else is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestArgs {
    /// A single action.
    pub action: Option<ProposedAction>,
    /// A sequence of actions.
    pub actions: Option<Vec<ProposedAction>>,
    /// A full transaction.
    pub transaction: Option<ProposedTransaction>,
    /// An identity attestation request.
    pub identity: Option<IdentityArgs>,
    /// The target chain.
    pub chain_id: ChainArg,
    /// Chains a multi-chain request is restricted to; only consulted when
    /// `chain_id` is [`ChainArg::MultiChain`].
    pub chain_ids: Option<Vec<ChainIdVariant>>,
    /// Broadcast after signing. Defaults to `true`, except for identity
    /// requests where `true` is an error.
    pub broadcast: Option<bool>,
    /// Callback destination.
    pub callback: Option<CallbackInit>,
    /// Initial metadata pairs.
    pub info: Vec<(String, InfoValue)>,
}

/// Hooks available to the builder and the codec.
#[derive(Clone, Copy)]
pub struct RequestOptions<'a> {
    /// Fetches contract ABIs for unencoded action data.
    pub abi_provider: Option<&'a dyn AbiProvider>,
    /// Signs the request in place right after it is built.
    pub signature_provider: Option<&'a dyn SignatureProvider>,
    /// Frame compression; defaults to the built-in DEFLATE.
    pub compressor: Option<&'a dyn Compressor>,
}

impl Default for RequestOptions<'_> {
    fn default() -> Self {
        Self {
            abi_provider: None,
            signature_provider: None,
            compressor: Some(&DEFLATE),
        }
    }
}

impl fmt::Debug for RequestOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("abi_provider", &self.abi_provider.map(|_| "<dyn>"))
            .field("signature_provider", &self.signature_provider.map(|_| "<dyn>"))
            .field("compressor", &self.compressor.map(|_| "<dyn>"))
            .finish()
    }
}

/// Encoding knobs for the text carrier.
#[derive(Clone, Copy)]
pub struct EncodeOptions<'a> {
    /// Try to compress; the smaller form wins.
    pub compress: bool,
    /// Emit `esr://` instead of `esr:`.
    pub slashes: bool,
    /// The URI scheme to emit.
    pub scheme: &'a str,
    /// The compressor to try; `None` disables compression outright.
    pub compressor: Option<&'a dyn Compressor>,
}

impl Default for EncodeOptions<'_> {
    fn default() -> Self {
        Self {
            compress: true,
            slashes: true,
            scheme: "esr",
            compressor: Some(&DEFLATE),
        }
    }
}

/// URI scheme prefixes accepted on decode, longest first so `web+` forms
/// match before their bare counterparts.
const ACCEPTED_SCHEMES: &[&str] = &["web+esr:", "web+eosio:", "esr:", "eosio:"];

/// A signing request.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningRequest {
    version: ProtocolVersion,
    payload: RequestPayload,
    signature: Option<RequestSignature>,
}

impl SigningRequest {
    // ------------------------------------------------------------------
    // constructors
    // ------------------------------------------------------------------

    /// Builds a request, fetching any ABIs needed to encode action data
    /// through the options' [`AbiProvider`].
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidDescriptor`] unless exactly one body field is
    /// set, [`RequestError::MissingAbiProvider`] when unencoded action data
    /// is present without a provider, [`RequestError::IdentityBroadcast`]
    /// for identity requests asking to broadcast, plus provider and ABI
    /// encoding failures.
    pub async fn create(
        args: RequestArgs,
        options: &RequestOptions<'_>,
    ) -> Result<Self, RequestError> {
        let mut abis = AbiMap::new();
        let required = args_required_abis(&args);
        if !required.is_empty() {
            let provider = options
                .abi_provider
                .ok_or(RequestError::MissingAbiProvider)?;
            for account in required {
                debug!(account = %account, "fetching ABI");
                let abi = provider
                    .get_abi(account)
                    .await
                    .map_err(RequestError::Provider)?;
                abis.insert(account, abi);
            }
        }
        Self::create_sync(args, options, &abis)
    }

    /// Builds a request from pre-fetched ABIs.
    ///
    /// # Errors
    ///
    /// As [`SigningRequest::create`], with [`RequestError::MissingAbi`]
    /// when an action's contract is absent from `abis`.
    pub fn create_sync(
        args: RequestArgs,
        options: &RequestOptions<'_>,
        abis: &AbiMap,
    ) -> Result<Self, RequestError> {
        let RequestArgs {
            action,
            actions,
            transaction,
            identity,
            chain_id,
            chain_ids,
            broadcast,
            callback,
            info,
        } = args;

        let bodies = usize::from(action.is_some())
            + usize::from(actions.is_some())
            + usize::from(transaction.is_some())
            + usize::from(identity.is_some());
        if bodies != 1 {
            return Err(RequestError::InvalidDescriptor);
        }

        let mut version = ProtocolVersion::V2;
        if matches!(chain_id, ChainArg::MultiChain) {
            version = ProtocolVersion::V3;
        }
        if identity.as_ref().is_some_and(|i| i.scope.is_some()) {
            version = ProtocolVersion::V3;
        }

        let chain_variant = match chain_id {
            ChainArg::Default => ChainIdVariant::Alias(ChainAlias::Eos),
            ChainArg::MultiChain => ChainIdVariant::Alias(ChainAlias::Unknown),
            ChainArg::Alias(alias) => ChainIdVariant::Alias(alias),
            ChainArg::Id(id) => id.chain_variant(),
        };

        let is_identity = identity.is_some();
        if is_identity && broadcast == Some(true) {
            return Err(RequestError::IdentityBroadcast);
        }
        let broadcast = broadcast.unwrap_or(!is_identity);

        let req = if let Some(action) = action {
            RequestVariant::Action(action.into_action(abis)?)
        } else if let Some(actions) = actions {
            RequestVariant::Actions(
                actions
                    .into_iter()
                    .map(|a| a.into_action(abis))
                    .collect::<Result<_, _>>()?,
            )
        } else if let Some(transaction) = transaction {
            RequestVariant::Transaction(transaction.into_transaction(abis)?)
        } else {
            let identity = identity.expect("exactly one body");
            RequestVariant::Identity(match version {
                ProtocolVersion::V2 => IdentityBody::V2(IdentityV2 {
                    permission: identity.permission,
                }),
                ProtocolVersion::V3 => IdentityBody::V3(IdentityV3 {
                    scope: identity.scope.unwrap_or(Name::ZERO),
                    permission: identity.permission,
                }),
            })
        };

        let callback = callback.unwrap_or_default();
        let mut flags = RequestFlags::default();
        flags.set_broadcast(broadcast);
        flags.set_background(callback.background);

        let info = info
            .into_iter()
            .map(|(key, value)| InfoPair {
                key,
                value: value.encode(),
            })
            .collect();

        let mut request = Self {
            version,
            payload: RequestPayload {
                chain_id: chain_variant,
                req,
                flags,
                callback: callback.url,
                info,
            },
            signature: None,
        };

        if chain_variant.is_multi_chain() {
            if let Some(ids) = chain_ids {
                request.set_chain_ids(ids);
            }
        }

        if let Some(provider) = options.signature_provider {
            request.sign(provider)?;
        }
        Ok(request)
    }

    /// Builds an identity request. The descriptor must have `identity`
    /// set; this is a thin wrapper that keeps call sites honest.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidDescriptor`] when `args.identity` is absent,
    /// otherwise as [`SigningRequest::create_sync`].
    pub fn identity(
        args: RequestArgs,
        options: &RequestOptions<'_>,
    ) -> Result<Self, RequestError> {
        if args.identity.is_none() {
            return Err(RequestError::InvalidDescriptor);
        }
        Self::create_sync(args, options, &AbiMap::new())
    }

    /// Wraps an already serialized transaction.
    ///
    /// # Errors
    ///
    /// [`RequestError::Decode`] when the bytes are not a valid transaction.
    pub fn from_transaction(
        chain_id: impl Into<ChainArg>,
        serialized_transaction: &[u8],
        options: &RequestOptions<'_>,
    ) -> Result<Self, RequestError> {
        let transaction = Transaction::unpack_bytes(serialized_transaction)?;
        Self::create_sync(
            RequestArgs {
                transaction: Some(transaction.into()),
                chain_id: chain_id.into(),
                ..RequestArgs::default()
            },
            options,
            &AbiMap::new(),
        )
    }

    /// Decodes a request from its URI form.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidScheme`] for unknown prefixes,
    /// [`RequestError::InvalidUri`] for bad base64, then everything
    /// [`SigningRequest::from_data`] raises.
    pub fn from_uri(uri: &str, options: &RequestOptions<'_>) -> Result<Self, RequestError> {
        let body = ACCEPTED_SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(scheme))
            .ok_or(RequestError::InvalidScheme)?;
        let body = body.strip_prefix("//").unwrap_or(body);
        let data = crate::base64u::decode(body)?;
        Self::from_data(&data, options)
    }

    /// Decodes a request from raw frame bytes.
    ///
    /// # Errors
    ///
    /// [`RequestError::UnsupportedVersion`] unless the header version is 2
    /// or 3, [`RequestError::MissingCompressor`] for a compressed frame
    /// with no compressor configured, [`RequestError::IdentityBroadcast`]
    /// for an identity payload with the broadcast flag set, and
    /// [`RequestError::Decode`] for structurally invalid payloads.
    pub fn from_data(data: &[u8], options: &RequestOptions<'_>) -> Result<Self, RequestError> {
        let (&header, body) = data
            .split_first()
            .ok_or(RequestError::Decode(esr_abi::CodecError::UnexpectedEnd))?;
        let version_value = header & 0x7f;
        let version = ProtocolVersion::from_value(version_value)
            .ok_or(RequestError::UnsupportedVersion(version_value))?;
        let compressed = header & 0x80 != 0;
        debug!(version = version_value, compressed, len = data.len(), "decoding request");

        let inflated;
        let body = if compressed {
            let compressor = options
                .compressor
                .ok_or(RequestError::MissingCompressor)?;
            inflated = compressor
                .inflate(body)
                .map_err(RequestError::Provider)?;
            &inflated[..]
        } else {
            body
        };

        let mut r = BinaryReader::new(body);
        let payload = RequestPayload::unpack(version, &mut r)?;
        let signature = if r.is_empty() {
            None
        } else {
            let signature = RequestSignature::unpack(&mut r)?;
            r.expect_end()?;
            Some(signature)
        };

        if payload.req.is_identity() && payload.flags.broadcast() {
            return Err(RequestError::IdentityBroadcast);
        }

        Ok(Self {
            version,
            payload,
            signature,
        })
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// The protocol version of this request.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The raw payload.
    #[must_use]
    pub const fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    /// Returns `true` for identity requests.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.payload.req.is_identity()
    }

    /// Returns `true` when the request is valid for more than one chain.
    #[must_use]
    pub const fn is_multi_chain(&self) -> bool {
        self.payload.chain_id.is_multi_chain()
    }

    /// Whether the wallet should broadcast the transaction after signing.
    #[must_use]
    pub const fn should_broadcast(&self) -> bool {
        !self.is_identity() && self.payload.flags.broadcast()
    }

    /// The flag byte.
    #[must_use]
    pub const fn flags(&self) -> RequestFlags {
        self.payload.flags
    }

    /// The chain reference carried on the wire.
    #[must_use]
    pub const fn chain_id_variant(&self) -> &ChainIdVariant {
        &self.payload.chain_id
    }

    /// The concrete chain id, or `None` for multi-chain requests.
    #[must_use]
    pub fn get_chain_id(&self) -> Option<ChainId> {
        if self.is_multi_chain() {
            None
        } else {
            self.payload.chain_id.chain_id()
        }
    }

    /// The chains this request may resolve on: the declared `chain_ids`
    /// set for multi-chain requests (`None` meaning "any chain"), or the
    /// single target chain.
    ///
    /// # Errors
    ///
    /// [`RequestError::Decode`] when a declared `chain_ids` entry is
    /// malformed.
    pub fn get_chain_ids(&self) -> Result<Option<Vec<ChainIdVariant>>, RequestError> {
        if self.is_multi_chain() {
            match self.get_raw_info_key(CHAIN_IDS_KEY) {
                Some(bytes) => {
                    let ids = Vec::<ChainIdVariant>::unpack_bytes(bytes.as_slice())?;
                    Ok(Some(ids))
                }
                None => Ok(None),
            }
        } else {
            Ok(Some(vec![self.payload.chain_id]))
        }
    }

    /// The requested identity actor, when concrete.
    #[must_use]
    pub fn get_identity(&self) -> Option<Name> {
        self.identity_body()
            .and_then(|body| body.permission())
            .map(|p| p.actor)
            .filter(|&actor| !is_placeholder(actor))
    }

    /// The requested identity permission, when concrete.
    #[must_use]
    pub fn get_identity_permission(&self) -> Option<Name> {
        self.identity_body()
            .and_then(|body| body.permission())
            .map(|p| p.permission)
            .filter(|&permission| !is_placeholder(permission))
    }

    /// The identity scope of a v3 identity request.
    #[must_use]
    pub fn get_identity_scope(&self) -> Option<Name> {
        self.identity_body().and_then(|body| body.scope())
    }

    fn identity_body(&self) -> Option<&IdentityBody> {
        match &self.payload.req {
            RequestVariant::Identity(body) => Some(body),
            _ => None,
        }
    }

    /// The raw actions carried by the request; empty for identity
    /// requests, whose action is synthesized at resolution time.
    #[must_use]
    pub fn get_raw_actions(&self) -> &[Action] {
        match &self.payload.req {
            RequestVariant::Action(action) => std::slice::from_ref(action),
            RequestVariant::Actions(actions) => actions,
            RequestVariant::Transaction(tx) => &tx.actions,
            RequestVariant::Identity(_) => &[],
        }
    }

    /// The unresolved transaction this request describes. For identity
    /// requests this contains the synthetic identity action with whatever
    /// authorization the request carries (possibly placeholders).
    #[must_use]
    pub fn get_raw_transaction(&self) -> Transaction {
        match &self.payload.req {
            RequestVariant::Action(action) => {
                Transaction::with_actions(vec![action.clone()])
            }
            RequestVariant::Actions(actions) => {
                Transaction::with_actions(actions.clone())
            }
            RequestVariant::Transaction(tx) => tx.clone(),
            RequestVariant::Identity(body) => {
                Transaction::with_actions(vec![self.identity_action(body)])
            }
        }
    }

    fn identity_action(&self, body: &IdentityBody) -> Action {
        // a null permission becomes the placeholder auth so the action
        // data always carries a permission for resolution to substitute
        let auth = body.permission().unwrap_or(placeholder_auth());
        let data = match body {
            IdentityBody::V2(_) => IdentityV2 {
                permission: Some(auth),
            }
            .packed(),
            IdentityBody::V3(v3) => IdentityV3 {
                scope: v3.scope,
                permission: Some(auth),
            }
            .packed(),
        };
        Action {
            account: Name::ZERO,
            name: identity_action_name(),
            authorization: vec![auth],
            data: Bytes(data),
        }
    }

    /// The contract accounts whose ABIs resolution will need.
    #[must_use]
    pub fn get_required_abis(&self) -> Vec<Name> {
        let mut accounts = Vec::new();
        for action in self.get_raw_actions() {
            if action.account != Name::ZERO && !accounts.contains(&action.account) {
                accounts.push(action.account);
            }
        }
        accounts
    }

    /// Whether resolution needs TAPoS values from the context.
    #[must_use]
    pub fn requires_tapos(&self) -> bool {
        !self.is_identity() && self.get_raw_transaction().has_null_header()
    }

    /// The raw info pairs.
    #[must_use]
    pub fn get_raw_info(&self) -> &[InfoPair] {
        &self.payload.info
    }

    /// All info pairs read as UTF-8 strings, last write winning per key.
    #[must_use]
    pub fn get_info(&self) -> std::collections::BTreeMap<String, String> {
        self.payload
            .info
            .iter()
            .map(|pair| {
                (
                    pair.key.clone(),
                    String::from_utf8_lossy(pair.value.as_slice()).into_owned(),
                )
            })
            .collect()
    }

    /// The raw bytes stored under `key`, if any.
    #[must_use]
    pub fn get_raw_info_key(&self, key: &str) -> Option<&Bytes> {
        self.payload
            .info
            .iter()
            .rev()
            .find(|pair| pair.key == key)
            .map(|pair| &pair.value)
    }

    /// The value under `key` read as a raw UTF-8 string.
    #[must_use]
    pub fn get_info_key(&self, key: &str) -> Option<String> {
        self.get_raw_info_key(key)
            .map(|bytes| String::from_utf8_lossy(bytes.as_slice()).into_owned())
    }

    /// The value under `key` decoded as an explicit wire type.
    ///
    /// # Errors
    ///
    /// [`RequestError::Decode`] when the stored bytes are not a valid `T`.
    pub fn get_info_key_as<T: Unpack>(&self, key: &str) -> Result<Option<T>, RequestError> {
        match self.get_raw_info_key(key) {
            Some(bytes) => Ok(Some(T::unpack_bytes(bytes.as_slice())?)),
            None => Ok(None),
        }
    }

    /// The originator signature, if the request is signed.
    #[must_use]
    pub const fn get_signature(&self) -> Option<&RequestSignature> {
        self.signature.as_ref()
    }

    // ------------------------------------------------------------------
    // mutation
    // ------------------------------------------------------------------

    /// Replaces the callback destination.
    pub fn set_callback(&mut self, url: impl Into<String>, background: bool) {
        self.payload.callback = url.into();
        self.payload.flags.set_background(background);
    }

    /// Sets or clears the broadcast flag.
    ///
    /// # Errors
    ///
    /// [`RequestError::IdentityBroadcast`] when enabling broadcast on an
    /// identity request.
    pub fn set_broadcast(&mut self, broadcast: bool) -> Result<(), RequestError> {
        if broadcast && self.is_identity() {
            return Err(RequestError::IdentityBroadcast);
        }
        self.payload.flags.set_broadcast(broadcast);
        Ok(())
    }

    /// Stores raw bytes under `key`, replacing any existing value.
    pub fn set_raw_info_key(&mut self, key: impl Into<String>, value: Bytes) {
        let key = key.into();
        match self.payload.info.iter_mut().find(|pair| pair.key == key) {
            Some(pair) => pair.value = value,
            None => self.payload.info.push(InfoPair { key, value }),
        }
    }

    /// Stores a typed value under `key`. See [`InfoValue`] for the string
    /// encoding asymmetry.
    pub fn set_info_key(&mut self, key: impl Into<String>, value: impl Into<InfoValue>) {
        self.set_raw_info_key(key, value.into().encode());
    }

    /// Attaches an originator signature.
    pub fn set_signature(&mut self, signer: Name, signature: Signature) {
        self.signature = Some(RequestSignature { signer, signature });
    }

    /// Declares the chains a multi-chain request is valid for.
    pub fn set_chain_ids(&mut self, ids: Vec<ChainIdVariant>) {
        self.set_raw_info_key(CHAIN_IDS_KEY, Bytes(ids.packed()));
    }

    // ------------------------------------------------------------------
    // signing and serialization
    // ------------------------------------------------------------------

    /// The payload bytes (no header, no signature trailer).
    #[must_use]
    pub fn get_data(&self) -> Vec<u8> {
        self.payload.packed(self.version)
    }

    /// The bytes the originator signature covers:
    /// `version || "request" || payload`.
    #[must_use]
    pub fn get_signature_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(self.version.value());
        data.extend_from_slice(b"request");
        data.extend_from_slice(&self.get_data());
        data
    }

    /// The digest the originator signs.
    #[must_use]
    pub fn get_signature_digest(&self) -> Checksum256 {
        sha256(&self.get_signature_data())
    }

    /// Signs the request in place.
    ///
    /// # Errors
    ///
    /// Propagates the provider's failure unchanged.
    pub fn sign(&mut self, provider: &dyn SignatureProvider) -> Result<(), RequestError> {
        let digest = self.get_signature_digest();
        self.signature = Some(provider.sign(&digest).map_err(RequestError::Provider)?);
        Ok(())
    }

    /// Encodes the request as a text carrier.
    ///
    /// Compression is attempted when requested and a compressor is
    /// available, but the compressed form is only used when it is strictly
    /// smaller than the raw frame.
    #[must_use]
    pub fn encode(&self, options: &EncodeOptions<'_>) -> String {
        let mut data = self.get_data();
        if let Some(signature) = &self.signature {
            data.extend_from_slice(&signature.packed());
        }

        let mut header = self.version.value();
        if options.compress {
            if let Some(compressor) = options.compressor {
                match compressor.deflate(&data) {
                    Ok(compressed) if compressed.len() < data.len() => {
                        debug!(
                            raw = data.len(),
                            compressed = compressed.len(),
                            "using compressed frame"
                        );
                        header |= 0x80;
                        data = compressed;
                    }
                    Ok(_) => {}
                    // a failing compressor just means no compression
                    Err(err) => debug!(error = %err, "compressor failed"),
                }
            }
        }

        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(header);
        frame.extend_from_slice(&data);

        let slashes = if options.slashes { "//" } else { "" };
        format!("{}:{}{}", options.scheme, slashes, crate::base64u::encode(&frame))
    }

    pub(crate) fn builtin_identity_abi(&self) -> Abi {
        identity_abi(self.version)
    }
}

pub(crate) fn identity_action_name() -> Name {
    "identity".parse().expect("valid name")
}

fn args_required_abis(args: &RequestArgs) -> Vec<Name> {
    let mut accounts = Vec::new();
    let mut visit = |action: &ProposedAction| {
        if action.needs_abi() && !accounts.contains(&action.account) {
            accounts.push(action.account);
        }
    };
    if let Some(action) = &args.action {
        visit(action);
    }
    if let Some(actions) = &args.actions {
        actions.iter().for_each(&mut visit);
    }
    if let Some(tx) = &args.transaction {
        tx.context_free_actions.iter().for_each(&mut visit);
        tx.actions.iter().for_each(&mut visit);
    }
    accounts
}

impl fmt::Display for SigningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode(&EncodeOptions::default()))
    }
}

impl Serialize for SigningRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SigningRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        Self::from_uri(&uri, &RequestOptions::default()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esr_abi::AbiValue;

    fn token_abi() -> Abi {
        Abi::from_json(
            r#"{
                "structs": [
                    {"name": "transfer", "base": "", "fields": [
                        {"name": "from", "type": "name"},
                        {"name": "to", "type": "name"},
                        {"name": "quantity", "type": "asset"},
                        {"name": "memo", "type": "string"}
                    ]}
                ],
                "actions": [{"name": "transfer", "type": "transfer"}]
            }"#,
        )
        .unwrap()
    }

    fn token_abis() -> AbiMap {
        let mut abis = AbiMap::new();
        abis.insert("eosio.token".parse().unwrap(), token_abi());
        abis
    }

    fn transfer_args() -> RequestArgs {
        RequestArgs {
            action: Some(ProposedAction {
                account: "eosio.token".parse().unwrap(),
                name: "transfer".parse().unwrap(),
                authorization: vec![PermissionLevel::new(
                    "foo".parse().unwrap(),
                    "active".parse().unwrap(),
                )],
                data: ActionData::Unencoded(AbiValue::object([
                    ("from", "foo"),
                    ("to", "bar"),
                    ("quantity", "1.000 EOS"),
                    ("memo", "hello there"),
                ])),
            }),
            ..RequestArgs::default()
        }
    }

    #[test]
    fn builds_transfer() {
        let request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();
        assert_eq!(request.version(), ProtocolVersion::V2);
        assert!(request.should_broadcast());
        assert!(!request.is_identity());
        assert!(request.requires_tapos());
        assert_eq!(
            request.chain_id_variant(),
            &ChainIdVariant::Alias(ChainAlias::Eos)
        );
        let actions = request.get_raw_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].data.to_string(),
            "000000000000285d000000000000ae39e80300000000000003454f53000000000b68656c6c6f207468657265"
        );
    }

    #[test]
    fn descriptor_must_be_unambiguous() {
        let empty = RequestArgs::default();
        assert!(matches!(
            SigningRequest::create_sync(empty, &RequestOptions::default(), &AbiMap::new()),
            Err(RequestError::InvalidDescriptor)
        ));

        let mut both = transfer_args();
        both.identity = Some(IdentityArgs::default());
        assert!(matches!(
            SigningRequest::create_sync(both, &RequestOptions::default(), &AbiMap::new()),
            Err(RequestError::InvalidDescriptor)
        ));
    }

    #[test]
    fn missing_abi() {
        assert!(matches!(
            SigningRequest::create_sync(
                transfer_args(),
                &RequestOptions::default(),
                &AbiMap::new()
            ),
            Err(RequestError::MissingAbi(account)) if account == "eosio.token".parse().unwrap()
        ));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();

        let uri = request.encode(&EncodeOptions::default());
        assert!(uri.starts_with("esr://"));
        let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
        assert_eq!(decoded, request);

        // uncompressed form decodes to the same request
        let plain = request.encode(&EncodeOptions {
            compress: false,
            slashes: false,
            ..EncodeOptions::default()
        });
        assert!(plain.starts_with("esr:") && !plain.starts_with("esr://"));
        let decoded = SigningRequest::from_uri(&plain, &RequestOptions::default()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn accepts_legacy_schemes() {
        let request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();
        let uri = request.encode(&EncodeOptions::default());
        let body = uri.strip_prefix("esr://").unwrap();
        for prefix in ["esr:", "web+esr://", "web+esr:"] {
            let alt = format!("{prefix}{body}");
            assert_eq!(
                SigningRequest::from_uri(&alt, &RequestOptions::default()).unwrap(),
                request
            );
        }
        assert!(matches!(
            SigningRequest::from_uri("http://example.com", &RequestOptions::default()),
            Err(RequestError::InvalidScheme)
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = SigningRequest::from_data(&[4, 0, 0], &RequestOptions::default());
        assert!(matches!(err, Err(RequestError::UnsupportedVersion(4))));
    }

    #[test]
    fn compressed_frame_needs_compressor() {
        let request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();
        let uri = request.encode(&EncodeOptions::default());
        let no_compressor = RequestOptions {
            compressor: None,
            ..RequestOptions::default()
        };
        assert!(matches!(
            SigningRequest::from_uri(&uri, &no_compressor),
            Err(RequestError::MissingCompressor)
        ));
    }

    #[test]
    fn identity_defaults() {
        let request = SigningRequest::identity(
            RequestArgs {
                identity: Some(IdentityArgs::default()),
                callback: Some("https://example.com/cb".into()),
                ..RequestArgs::default()
            },
            &RequestOptions::default(),
        )
        .unwrap();
        assert!(request.is_identity());
        assert!(!request.should_broadcast());
        assert_eq!(request.version(), ProtocolVersion::V2);
        assert_eq!(request.get_identity(), None);
        assert_eq!(request.get_identity_scope(), None);
        assert!(!request.requires_tapos());
    }

    #[test]
    fn identity_broadcast_rejected() {
        let err = SigningRequest::create_sync(
            RequestArgs {
                identity: Some(IdentityArgs::default()),
                broadcast: Some(true),
                ..RequestArgs::default()
            },
            &RequestOptions::default(),
            &AbiMap::new(),
        );
        assert!(matches!(err, Err(RequestError::IdentityBroadcast)));
    }

    #[test]
    fn scoped_identity_forces_v3() {
        let request = SigningRequest::identity(
            RequestArgs {
                identity: Some(IdentityArgs {
                    scope: Some("myapp".parse().unwrap()),
                    permission: None,
                }),
                ..RequestArgs::default()
            },
            &RequestOptions::default(),
        )
        .unwrap();
        assert_eq!(request.version(), ProtocolVersion::V3);
        assert_eq!(request.get_identity_scope(), Some("myapp".parse().unwrap()));
    }

    #[test]
    fn multi_chain_declares_ids() {
        let request = SigningRequest::create_sync(
            RequestArgs {
                identity: Some(IdentityArgs::default()),
                chain_id: ChainArg::MultiChain,
                chain_ids: Some(vec![
                    ChainAlias::Eos.into(),
                    ChainAlias::Wax.into(),
                ]),
                ..RequestArgs::default()
            },
            &RequestOptions::default(),
            &AbiMap::new(),
        )
        .unwrap();
        assert_eq!(request.version(), ProtocolVersion::V3);
        assert!(request.is_multi_chain());
        assert_eq!(request.get_chain_id(), None);
        let ids = request.get_chain_ids().unwrap().unwrap();
        assert_eq!(
            ids,
            vec![
                ChainIdVariant::Alias(ChainAlias::Eos),
                ChainIdVariant::Alias(ChainAlias::Wax)
            ]
        );
    }

    #[test]
    fn info_key_roundtrip() {
        let mut request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();

        // plain strings are raw UTF-8, no length prefix
        request.set_info_key("note", "hi");
        assert_eq!(
            request.get_raw_info_key("note").unwrap().as_slice(),
            b"hi"
        );
        assert_eq!(request.get_info_key("note").as_deref(), Some("hi"));

        request.set_info_key("flag", true);
        assert_eq!(request.get_raw_info_key("flag").unwrap().as_slice(), &[1]);
        assert_eq!(request.get_info_key_as::<u8>("flag").unwrap(), Some(1));

        request.set_info_key("count", 7u64);
        assert_eq!(request.get_info_key_as::<u64>("count").unwrap(), Some(7));

        // typed values go through the wire encoder
        let key: esr_abi::PrivateKey =
            "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3".parse().unwrap();
        let sig = key.sign(&sha256(b"info")).unwrap();
        request.set_info_key("sig", sig);
        assert_eq!(
            request.get_raw_info_key("sig").unwrap().as_slice(),
            sig.packed()
        );
        assert_eq!(
            request.get_info_key_as::<Signature>("sig").unwrap(),
            Some(sig)
        );

        let digest = sha256(b"ref");
        request.set_info_key("ref", digest);
        assert_eq!(
            request.get_raw_info_key("ref").unwrap().len(),
            32
        );
        assert_eq!(
            request.get_info_key_as::<Checksum256>("ref").unwrap(),
            Some(digest)
        );

        request.set_info_key("blob", Bytes(vec![0xbe, 0xef]));
        assert_eq!(
            request.get_raw_info_key("blob").unwrap().as_slice(),
            &[0xbe, 0xef]
        );
        assert_eq!(
            request.get_info_key_as::<u16>("blob").unwrap(),
            Some(u16::from_le_bytes([0xbe, 0xef]))
        );

        // last write wins
        request.set_info_key("note", "bye");
        assert_eq!(request.get_info_key("note").as_deref(), Some("bye"));
        assert_eq!(request.get_info().get("note").map(String::as_str), Some("bye"));
    }

    #[test]
    fn signing_digest_and_trailer() {
        let key: esr_abi::PrivateKey =
            "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3".parse().unwrap();
        let signer: Name = "foo".parse().unwrap();

        let mut request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();

        let data = request.get_signature_data();
        assert_eq!(data[0], 2);
        assert_eq!(&data[1..8], b"request");

        request.sign(&(signer, key)).unwrap();
        let signature = request.get_signature().unwrap();
        assert_eq!(signature.signer, signer);
        let recovered = signature
            .signature
            .recover(&request.get_signature_digest())
            .unwrap();
        assert_eq!(recovered, key.public_key().unwrap());

        // the trailer survives the wire
        let uri = request.encode(&EncodeOptions::default());
        let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
        assert_eq!(decoded.get_signature(), Some(signature));
    }

    #[test]
    fn clone_is_independent() {
        let request = SigningRequest::create_sync(
            transfer_args(),
            &RequestOptions::default(),
            &token_abis(),
        )
        .unwrap();
        let mut copy = request.clone();
        copy.set_info_key("foo", true);

        assert_ne!(request, copy);
        assert_ne!(request.to_string(), copy.to_string());
        assert!(request.get_raw_info_key("foo").is_none());
        assert_eq!(copy.get_raw_info_key("foo").unwrap().as_slice(), &[1]);
    }

    #[test]
    fn from_transaction_roundtrip() {
        let tx = Transaction::with_actions(vec![Action {
            account: "eosio.token".parse().unwrap(),
            name: "transfer".parse().unwrap(),
            authorization: vec![placeholder_auth()],
            data: Bytes(vec![0xde, 0xad]),
        }]);
        let request = SigningRequest::from_transaction(
            ChainArg::Default,
            &tx.packed(),
            &RequestOptions::default(),
        )
        .unwrap();
        assert_eq!(request.get_raw_transaction(), tx);
        assert_eq!(request.get_required_abis(), vec!["eosio.token".parse::<Name>().unwrap()]);
    }
}
