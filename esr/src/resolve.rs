//! Resolution: turning a partial request into a concrete, signable
//! transaction, and deriving the callback that reports the result.
//!
//! Resolution never mutates the source request. Given an ABI map, a signer
//! permission and a [`TransactionContext`] it
//!
//! 1. constructs the raw transaction (synthesizing the identity action for
//!    identity requests),
//! 2. fills a null TAPoS header from the context,
//! 3. decodes every action's data, substitutes placeholder names, and
//!    re-encodes,
//! 4. pins the chain id (checking the declared set for multi-chain
//!    requests),
//!
//! and hands back a [`ResolvedRequest`] that can produce the signing
//! digest, the callback payload and, for identity requests, an identity
//! proof.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use esr_abi::{
    sha256, AbiValue, Action, Bytes, Checksum256, Name, Pack, PermissionLevel,
    Signature, TimePointSec, Transaction, TransactionExtension,
};

use crate::abi_provider::{AbiMap, AbiProvider};
use crate::chain::ChainId;
use crate::error::RequestError;
use crate::identity::IdentityProof;
use crate::request::{
    identity_action_name, is_placeholder, EncodeOptions, RequestOptions,
    SigningRequest, PLACEHOLDER_NAME, PLACEHOLDER_PERMISSION,
};

/// Default request lifetime when the context gives none, in seconds.
const DEFAULT_EXPIRE_SECONDS: u32 = 60;

/// Recursion bound for the placeholder walk.
const MAX_SUBSTITUTION_DEPTH: usize = 100;

/// Chain state handed to the resolver.
///
/// Either supply `expiration`, `ref_block_num` and `ref_block_prefix`
/// directly, or supply `block_num`, `ref_block_prefix` and `timestamp` and
/// let the resolver derive the rest.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    /// Head block timestamp.
    pub timestamp: Option<TimePointSec>,
    /// Request lifetime added to `timestamp`; defaults to 60 seconds.
    pub expire_seconds: Option<u32>,
    /// Reference block number; truncated to its low 16 bits.
    pub block_num: Option<u32>,
    /// Explicit 16-bit reference block number.
    pub ref_block_num: Option<u16>,
    /// Reference block id prefix.
    pub ref_block_prefix: Option<u32>,
    /// Explicit expiration, overriding the derived one.
    pub expiration: Option<TimePointSec>,
    /// The chain to resolve on; required for multi-chain requests.
    pub chain_id: Option<ChainId>,
}

/// An action with its data decoded and placeholders substituted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAction {
    /// The contract account.
    pub account: Name,
    /// The action name.
    pub name: Name,
    /// Authorizations with placeholders resolved.
    pub authorization: Vec<PermissionLevel>,
    /// The decoded action data.
    pub data: AbiValue,
}

/// A transaction whose action data is decoded; the human-readable twin of
/// the signable transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTransaction {
    pub expiration: TimePointSec,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub max_net_usage_words: u32,
    pub max_cpu_usage_ms: u8,
    pub delay_sec: u32,
    pub context_free_actions: Vec<ResolvedAction>,
    pub actions: Vec<ResolvedAction>,
    pub transaction_extensions: Vec<TransactionExtension>,
}

impl SigningRequest {
    /// Fetches every ABI this request needs through `provider`.
    ///
    /// The resulting map is keyed by account and order-independent.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn fetch_abis(
        &self,
        provider: &dyn AbiProvider,
    ) -> Result<AbiMap, RequestError> {
        let mut abis = AbiMap::new();
        for account in self.get_required_abis() {
            debug!(account = %account, "fetching ABI");
            let abi = provider
                .get_abi(account)
                .await
                .map_err(RequestError::Provider)?;
            abis.insert(account, abi);
        }
        Ok(abis)
    }

    /// Decodes the request's actions and substitutes placeholders with
    /// `signer`, without touching the header.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingAbi`] for accounts absent from `abis`, and
    /// ABI decode failures (including `UnknownAction`).
    pub fn resolve_actions(
        &self,
        abis: &AbiMap,
        signer: &PermissionLevel,
    ) -> Result<Vec<ResolvedAction>, RequestError> {
        self.get_raw_transaction()
            .actions
            .iter()
            .map(|action| self.resolve_action(action, abis, signer).map(|r| r.0))
            .collect()
    }

    /// Resolves the full transaction: TAPoS fill-in, placeholder
    /// substitution and action re-encoding.
    ///
    /// # Errors
    ///
    /// As [`SigningRequest::resolve`].
    pub fn resolve_transaction(
        &self,
        abis: &AbiMap,
        signer: &PermissionLevel,
        ctx: &TransactionContext,
    ) -> Result<ResolvedTransaction, RequestError> {
        let (_, resolved) = self.resolve_transaction_parts(abis, signer, ctx)?;
        Ok(resolved)
    }

    /// Resolves the request against a signer and context.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingTapos`] when a null header cannot be filled,
    /// [`RequestError::BadChain`] for multi-chain requests without a valid
    /// chain choice, [`RequestError::MissingAbi`] and ABI failures from the
    /// action walk.
    pub fn resolve(
        &self,
        abis: &AbiMap,
        signer: &PermissionLevel,
        ctx: &TransactionContext,
    ) -> Result<ResolvedRequest, RequestError> {
        let (transaction, resolved_transaction) =
            self.resolve_transaction_parts(abis, signer, ctx)?;

        let chain_id = if self.is_multi_chain() {
            let chosen = ctx.chain_id.ok_or(RequestError::BadChain)?;
            if let Some(declared) = self.get_chain_ids()? {
                let accepted = declared
                    .iter()
                    .any(|variant| variant.chain_id() == Some(chosen));
                if !accepted {
                    return Err(RequestError::BadChain);
                }
            }
            chosen
        } else {
            self.payload()
                .chain_id
                .chain_id()
                .ok_or(RequestError::BadChain)?
        };
        debug!(chain = %chain_id, "resolved request");

        Ok(ResolvedRequest {
            request: self.clone(),
            signer: *signer,
            transaction,
            resolved_transaction,
            chain_id,
        })
    }

    fn resolve_transaction_parts(
        &self,
        abis: &AbiMap,
        signer: &PermissionLevel,
        ctx: &TransactionContext,
    ) -> Result<(Transaction, ResolvedTransaction), RequestError> {
        let mut tx = self.get_raw_transaction();

        if !self.is_identity() && tx.has_null_header() {
            fill_tapos(&mut tx, ctx)?;
        } else if self.is_identity()
            && self.version() >= crate::payload::ProtocolVersion::V3
        {
            tx.expiration = match ctx.expiration {
                Some(expiration) => expiration,
                None => {
                    let base = ctx.timestamp.unwrap_or_else(TimePointSec::now);
                    base + ctx.expire_seconds.unwrap_or(DEFAULT_EXPIRE_SECONDS)
                }
            };
        }

        let mut encoded_cfa = Vec::with_capacity(tx.context_free_actions.len());
        let mut resolved_cfa = Vec::with_capacity(tx.context_free_actions.len());
        for action in &tx.context_free_actions {
            let (resolved, encoded) = self.resolve_action(action, abis, signer)?;
            resolved_cfa.push(resolved);
            encoded_cfa.push(encoded);
        }
        let mut encoded_actions = Vec::with_capacity(tx.actions.len());
        let mut resolved_actions = Vec::with_capacity(tx.actions.len());
        for action in &tx.actions {
            let (resolved, encoded) = self.resolve_action(action, abis, signer)?;
            resolved_actions.push(resolved);
            encoded_actions.push(encoded);
        }

        let resolved_transaction = ResolvedTransaction {
            expiration: tx.expiration,
            ref_block_num: tx.ref_block_num,
            ref_block_prefix: tx.ref_block_prefix,
            max_net_usage_words: tx.max_net_usage_words,
            max_cpu_usage_ms: tx.max_cpu_usage_ms,
            delay_sec: tx.delay_sec,
            context_free_actions: resolved_cfa,
            actions: resolved_actions,
            transaction_extensions: tx.transaction_extensions.clone(),
        };
        tx.context_free_actions = encoded_cfa;
        tx.actions = encoded_actions;
        Ok((tx, resolved_transaction))
    }

    fn resolve_action(
        &self,
        action: &Action,
        abis: &AbiMap,
        signer: &PermissionLevel,
    ) -> Result<(ResolvedAction, Action), RequestError> {
        let identity_abi;
        let abi = if action.account == Name::ZERO && action.name == identity_action_name()
        {
            identity_abi = self.builtin_identity_abi();
            &identity_abi
        } else {
            abis.get(&action.account)
                .ok_or(RequestError::MissingAbi(action.account))?
        };

        let decoded = abi.decode_action_data(action.name, action.data.as_slice())?;
        let substituted = substitute(&decoded, signer, 0);
        let data = abi.encode_action_data(action.name, &substituted)?;

        let authorization: Vec<PermissionLevel> = action
            .authorization
            .iter()
            .map(|auth| resolve_auth(auth, signer))
            .collect();

        let resolved = ResolvedAction {
            account: action.account,
            name: action.name,
            authorization: authorization.clone(),
            data: substituted,
        };
        let encoded = Action {
            account: action.account,
            name: action.name,
            authorization,
            data,
        };
        Ok((resolved, encoded))
    }
}

fn fill_tapos(tx: &mut Transaction, ctx: &TransactionContext) -> Result<(), RequestError> {
    if let (Some(expiration), Some(ref_block_num), Some(ref_block_prefix)) =
        (ctx.expiration, ctx.ref_block_num, ctx.ref_block_prefix)
    {
        tx.expiration = expiration;
        tx.ref_block_num = ref_block_num;
        tx.ref_block_prefix = ref_block_prefix;
        return Ok(());
    }
    if let (Some(block_num), Some(ref_block_prefix), Some(timestamp)) =
        (ctx.block_num, ctx.ref_block_prefix, ctx.timestamp)
    {
        tx.expiration =
            timestamp + ctx.expire_seconds.unwrap_or(DEFAULT_EXPIRE_SECONDS);
        // protocol truncation, not an error
        #[allow(clippy::cast_possible_truncation)]
        {
            tx.ref_block_num = block_num as u16;
        }
        tx.ref_block_prefix = ref_block_prefix;
        return Ok(());
    }
    Err(RequestError::MissingTapos)
}

/// Replaces placeholder names with the signer, walking arrays and records.
fn substitute(value: &AbiValue, signer: &PermissionLevel, depth: usize) -> AbiValue {
    if depth >= MAX_SUBSTITUTION_DEPTH {
        return value.clone();
    }
    match value {
        AbiValue::Name(name) if *name == PLACEHOLDER_NAME => {
            AbiValue::Name(signer.actor)
        }
        AbiValue::Name(name) if *name == PLACEHOLDER_PERMISSION => {
            AbiValue::Name(signer.permission)
        }
        AbiValue::Array(items) => AbiValue::Array(
            items
                .iter()
                .map(|item| substitute(item, signer, depth + 1))
                .collect(),
        ),
        AbiValue::Object(fields) => AbiValue::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), substitute(item, signer, depth + 1)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Placeholder substitution for authorizations. In the permission slot the
/// actor placeholder also resolves to the signer permission; old requests
/// rely on this.
fn resolve_auth(auth: &PermissionLevel, signer: &PermissionLevel) -> PermissionLevel {
    let actor = if auth.actor == PLACEHOLDER_NAME {
        signer.actor
    } else if auth.actor == PLACEHOLDER_PERMISSION {
        signer.permission
    } else {
        auth.actor
    };
    let permission = if is_placeholder(auth.permission) {
        signer.permission
    } else {
        auth.permission
    };
    PermissionLevel::new(actor, permission)
}

/// The outcome of resolution.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    /// The request this was resolved from, untouched.
    pub request: SigningRequest,
    /// The signer used for placeholder substitution.
    pub signer: PermissionLevel,
    /// The signable transaction (encoded action data).
    pub transaction: Transaction,
    /// The same transaction with decoded action data.
    pub resolved_transaction: ResolvedTransaction,
    /// The chain the transaction is bound to.
    pub chain_id: ChainId,
}

impl ResolvedRequest {
    /// The serialized signable transaction.
    #[must_use]
    pub fn serialized_transaction(&self) -> Bytes {
        Bytes(self.transaction.packed())
    }

    /// The bytes the transaction signature covers:
    /// `chain_id || transaction || 32 zero bytes`.
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(self.chain_id.checksum().as_bytes());
        data.extend_from_slice(&self.transaction.packed());
        data.extend_from_slice(&[0u8; 32]);
        data
    }

    /// The digest to sign.
    #[must_use]
    pub fn signing_digest(&self) -> Checksum256 {
        sha256(&self.signing_data())
    }

    /// The transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> Checksum256 {
        self.transaction.id()
    }

    /// Builds the callback for this request, or `None` when the request
    /// declares no callback.
    ///
    /// # Errors
    ///
    /// [`RequestError::NeedSignature`] when `signatures` is empty.
    pub fn get_callback(
        &self,
        signatures: &[Signature],
        block_num: Option<u32>,
    ) -> Result<Option<ResolvedCallback>, RequestError> {
        let template = &self.request.payload().callback;
        if template.is_empty() {
            return Ok(None);
        }
        let (first, extra) = signatures.split_first().ok_or(RequestError::NeedSignature)?;

        let sigs: BTreeMap<String, String> = extra
            .iter()
            .enumerate()
            .map(|(index, sig)| (format!("sig{index}"), sig.to_string()))
            .collect();

        let payload = CallbackPayload {
            sig: first.to_string(),
            tx: self.transaction_id().to_string(),
            rbn: self.transaction.ref_block_num.to_string(),
            rid: self.transaction.ref_block_prefix.to_string(),
            ex: self.transaction.expiration.to_string(),
            req: self.request.encode(&EncodeOptions::default()),
            sa: self.signer.actor.to_string(),
            sp: self.signer.permission.to_string(),
            cid: self.chain_id.to_string(),
            bn: block_num.map(|n| n.to_string()),
            sigs,
        };

        Ok(Some(ResolvedCallback {
            url: apply_template(template, &payload),
            background: self.request.flags().background(),
            payload,
        }))
    }

    /// Builds an identity proof from this resolution and a signature over
    /// its signing digest.
    ///
    /// # Errors
    ///
    /// [`RequestError::NotIdentity`] unless this resolves an identity
    /// request.
    pub fn get_identity_proof(
        &self,
        signature: Signature,
    ) -> Result<IdentityProof, RequestError> {
        if !self.request.is_identity() {
            return Err(RequestError::NotIdentity);
        }
        Ok(IdentityProof {
            chain_id: self.chain_id,
            scope: self.request.get_identity_scope().unwrap_or(Name::ZERO),
            expiration: self.transaction.expiration,
            signer: self.signer,
            signature,
        })
    }

    /// Reconstructs a resolved request from a received callback payload,
    /// fetching ABIs through the options' provider when the request needs
    /// them.
    ///
    /// # Errors
    ///
    /// Decode failures from the embedded request URI, parse failures on
    /// the payload fields, and everything [`SigningRequest::resolve`]
    /// raises.
    pub async fn from_payload(
        payload: &CallbackPayload,
        options: &RequestOptions<'_>,
    ) -> Result<Self, RequestError> {
        let request = SigningRequest::from_uri(&payload.req, options)?;

        let abis = if request.get_required_abis().is_empty() {
            AbiMap::new()
        } else {
            let provider = options
                .abi_provider
                .ok_or(RequestError::MissingAbiProvider)?;
            request.fetch_abis(provider).await?
        };

        let signer = PermissionLevel::new(
            payload.sa.parse().map_err(RequestError::provider)?,
            payload.sp.parse().map_err(RequestError::provider)?,
        );
        let ctx = TransactionContext {
            ref_block_num: payload.rbn.parse().ok(),
            ref_block_prefix: payload.rid.parse().ok(),
            expiration: payload.ex.parse().ok(),
            chain_id: payload.cid.parse().ok(),
            ..TransactionContext::default()
        };
        request.resolve(&abis, &signer, &ctx)
    }
}

/// The dictionary delivered to the requester after signing.
///
/// Background callbacks receive it as JSON; foreground callbacks have its
/// values substituted into the URL template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// The first signature.
    pub sig: String,
    /// Transaction id, lowercase hex.
    pub tx: String,
    /// Reference block number, decimal.
    pub rbn: String,
    /// Reference block prefix, decimal.
    pub rid: String,
    /// Expiration in its textual seconds form.
    pub ex: String,
    /// The request in URI form.
    pub req: String,
    /// Signer actor.
    pub sa: String,
    /// Signer permission.
    pub sp: String,
    /// Chain id, lowercase hex.
    pub cid: String,
    /// Optional block number hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bn: Option<String>,
    /// Additional signatures as `sig0`, `sig1`, …
    #[serde(flatten)]
    pub sigs: BTreeMap<String, String>,
}

impl CallbackPayload {
    /// The value substituted for `{{key}}`, if any.
    #[must_use]
    pub fn value_for(&self, key: &str) -> Option<&str> {
        match key {
            "sig" => Some(&self.sig),
            "tx" => Some(&self.tx),
            "rbn" => Some(&self.rbn),
            "rid" => Some(&self.rid),
            "ex" => Some(&self.ex),
            "req" => Some(&self.req),
            "sa" => Some(&self.sa),
            "sp" => Some(&self.sp),
            "cid" => Some(&self.cid),
            "bn" => self.bn.as_deref(),
            other => self.sigs.get(other).map(String::as_str),
        }
    }
}

/// The templated callback ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCallback {
    /// The callback URL with every `{{key}}` span substituted.
    pub url: String,
    /// Whether to POST the payload instead of redirecting.
    pub background: bool,
    /// The full payload dictionary.
    pub payload: CallbackPayload,
}

/// Substitutes `{{key}}` spans from the payload; unknown keys become the
/// empty string.
fn apply_template(template: &str, payload: &CallbackPayload) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Some(value) = payload.value_for(&after[..end]) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // unterminated span, keep verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
