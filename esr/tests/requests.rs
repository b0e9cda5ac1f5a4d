//! End-to-end request scenarios: building, wire compatibility against
//! known request URIs, resolution, callbacks and identity proofs.

use esr::esr_abi::{Abi, AbiValue, KeyType, Name, PermissionLevel, PrivateKey};
use esr::{
    placeholder_auth, ActionData, CallbackInit, ChainAlias, ChainArg, ChainIdVariant,
    EncodeOptions, IdentityArgs, ProposedAction, ProtocolVersion, RequestArgs,
    RequestError, RequestOptions, ResolvedRequest, SigningRequest, StaticAbiProvider,
    TransactionContext, PLACEHOLDER_NAME,
};

const TRANSFER_URI: &str = "esr://gmNgZGBY1mTC_MoglIGBIVzX5uxZoAgIaMSCyBVvjYx0kAUYGNZZvmCGsJhd_YNBNHdGak5OvkJJRmpRKlQ3WLl8anjWFNWd23XWfvzTcy_qmtRx5mtMXlkSC23ZXle6K_NJFJ4SVTb4O026Wb1G5Wx0u1A3-_G4rAPsBp78z9lN7nddAQA";
const TRANSFER_DATA_HEX: &str = "000000000000285d000000000000ae39e80300000000000003454f53000000000b68656c6c6f207468657265";

const PLACEHOLDER_URI: &str = "esr://gmNgZGBY1mTC_MoglIGBIVzX5uxZRqAQGMBoExgDAjRi4fwAVz93ICUckpGYl12skJZfpFCSkaqQllmcwczAAAA";
const PLACEHOLDER_DATA_HEX: &str = "0100000000000000000000000000285d01000000000000000050454e47000000135468616e6b7320666f72207468652066697368";

fn token_abi() -> Abi {
    Abi::from_json(
        r#"{
            "version": "eosio::abi/1.1",
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

fn token_provider() -> StaticAbiProvider {
    let mut provider = StaticAbiProvider::new();
    provider.insert("eosio.token".parse().unwrap(), token_abi());
    provider
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

fn test_key() -> PrivateKey {
    "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3"
        .parse()
        .unwrap()
}

/// Recursively asserts no placeholder name survives in a decoded tree.
fn assert_no_placeholders(value: &AbiValue) {
    match value {
        AbiValue::Name(name) => {
            assert!(
                *name != esr::PLACEHOLDER_NAME && *name != esr::PLACEHOLDER_PERMISSION,
                "placeholder survived resolution"
            );
        }
        AbiValue::Array(items) => items.iter().for_each(assert_no_placeholders),
        AbiValue::Object(fields) => {
            fields.iter().for_each(|(_, v)| assert_no_placeholders(v));
        }
        _ => {}
    }
}

// A transfer action encodes to the reference wire form, and the known
// URI decodes back to the same request.
#[test]
fn transfer_request_wire_compat() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();

    assert_eq!(request.version(), ProtocolVersion::V2);
    assert_eq!(
        request.chain_id_variant(),
        &ChainIdVariant::Alias(ChainAlias::Eos)
    );
    assert!(request.should_broadcast());
    assert_eq!(
        request.get_raw_actions()[0].data.to_string(),
        TRANSFER_DATA_HEX
    );

    // the reference encoding decodes to the request we just built
    let reference =
        SigningRequest::from_uri(TRANSFER_URI, &RequestOptions::default()).unwrap();
    assert_eq!(reference, request);

    // and our own encoding round-trips
    let uri = request.encode(&EncodeOptions::default());
    let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
    assert_eq!(decoded, request);
}

// A request with placeholder authorization decodes from its URI form.
#[test]
fn placeholder_request_decodes() {
    let request =
        SigningRequest::from_uri(PLACEHOLDER_URI, &RequestOptions::default()).unwrap();

    let actions = request.get_raw_actions();
    assert_eq!(actions.len(), 1);
    let action = &actions[0];
    assert_eq!(action.account, "eosio.token".parse::<Name>().unwrap());
    assert_eq!(action.name, "transfer".parse::<Name>().unwrap());
    assert_eq!(
        action.authorization,
        vec![PermissionLevel::new(PLACEHOLDER_NAME, PLACEHOLDER_NAME)]
    );
    assert_eq!(action.data.to_string(), PLACEHOLDER_DATA_HEX);
}

// TAPoS fill-in from block values.
#[test]
fn resolve_with_tapos() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    assert!(request.requires_tapos());

    let signer = PermissionLevel::new("foo".parse().unwrap(), "bar".parse().unwrap());
    let ctx = TransactionContext {
        timestamp: Some("2018-02-15T00:00:00".parse().unwrap()),
        block_num: Some(1234),
        expire_seconds: Some(0),
        ref_block_prefix: Some(56789),
        ..TransactionContext::default()
    };
    let resolved = request
        .resolve(token_provider().abis(), &signer, &ctx)
        .unwrap();

    let tx = &resolved.resolved_transaction;
    assert_eq!(tx.ref_block_num, 1234);
    assert_eq!(tx.ref_block_prefix, 56789);
    assert_eq!(tx.expiration.to_string(), "2018-02-15T00:00:00");
    assert_eq!(tx.max_net_usage_words, 0);
    assert_eq!(tx.max_cpu_usage_ms, 0);
    assert_eq!(tx.delay_sec, 0);

    // actions unchanged: the encoded form matches the raw request data
    assert_eq!(
        resolved.transaction.actions[0].data.to_string(),
        TRANSFER_DATA_HEX
    );

    // resolution is idempotent
    let again = request
        .resolve(token_provider().abis(), &signer, &ctx)
        .unwrap();
    assert_eq!(again.serialized_transaction(), resolved.serialized_transaction());
    assert_eq!(again.signing_digest(), resolved.signing_digest());
}

#[test]
fn resolve_without_tapos_fails() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    let signer = PermissionLevel::new("foo".parse().unwrap(), "bar".parse().unwrap());
    let err = request.resolve(
        token_provider().abis(),
        &signer,
        &TransactionContext::default(),
    );
    assert!(matches!(err, Err(RequestError::MissingTapos)));
}

// Placeholders are gone after resolution, wherever they sat.
#[test]
fn placeholder_fixed_point() {
    let request =
        SigningRequest::from_uri(PLACEHOLDER_URI, &RequestOptions::default()).unwrap();
    let signer =
        PermissionLevel::new("alice".parse().unwrap(), "active".parse().unwrap());
    let ctx = TransactionContext {
        expiration: Some("2018-02-15T00:00:00".parse().unwrap()),
        ref_block_num: Some(1),
        ref_block_prefix: Some(2),
        ..TransactionContext::default()
    };
    let resolved = request
        .resolve(token_provider().abis(), &signer, &ctx)
        .unwrap();

    for action in &resolved.resolved_transaction.actions {
        assert_no_placeholders(&action.data);
        for auth in &action.authorization {
            assert_eq!(*auth, signer);
        }
    }
    assert_eq!(
        resolved.resolved_transaction.actions[0]
            .data
            .get("from")
            .and_then(AbiValue::as_name),
        Some(signer.actor)
    );
}

fn identity_args() -> RequestArgs {
    RequestArgs {
        identity: Some(IdentityArgs {
            scope: Some("foo".parse().unwrap()),
            permission: None,
        }),
        chain_id: ChainArg::MultiChain,
        chain_ids: Some(vec![ChainAlias::Eos.into(), ChainAlias::Wax.into()]),
        callback: Some(CallbackInit {
            url: "myapp://login={{cid}}".into(),
            background: false,
        }),
        ..RequestArgs::default()
    }
}

fn resolve_identity() -> ResolvedRequest {
    let request =
        SigningRequest::identity(identity_args(), &RequestOptions::default()).unwrap();
    let signer =
        PermissionLevel::new("foo".parse().unwrap(), "active".parse().unwrap());
    let ctx = TransactionContext {
        chain_id: Some(ChainAlias::Wax.chain_id().unwrap()),
        expiration: Some("2020-07-10T08:40:20".parse().unwrap()),
        ..TransactionContext::default()
    };
    request.resolve(&esr::AbiMap::new(), &signer, &ctx).unwrap()
}

// A scoped multi-chain identity request.
#[test]
fn scoped_identity_request() {
    let request =
        SigningRequest::identity(identity_args(), &RequestOptions::default()).unwrap();

    assert_eq!(request.version(), ProtocolVersion::V3);
    assert!(request.is_identity());
    assert!(request.is_multi_chain());
    assert!(!request.should_broadcast());
    assert_eq!(request.get_identity_scope(), Some("foo".parse().unwrap()));
    let declared = request.get_chain_ids().unwrap().unwrap();
    assert_eq!(
        declared,
        vec![
            ChainIdVariant::Alias(ChainAlias::Eos),
            ChainIdVariant::Alias(ChainAlias::Wax)
        ]
    );

    // round-trips through the text carrier
    let uri = request.encode(&EncodeOptions::default());
    let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
    assert_eq!(decoded, request);

    // resolving against WAX produces a callback pinned to its chain id
    let resolved = resolve_identity();
    let signature = test_key().sign(&resolved.signing_digest()).unwrap();
    let callback = resolved
        .get_callback(&[signature], None)
        .unwrap()
        .expect("request has a callback");
    assert!(!callback.background);
    assert!(callback.url.ends_with(
        "=1064487b3cd1a897ce03ae5b6a865651747e2e152090f99c1d19d44e01aea5a4"
    ));
}

// Multi-chain requests insist on a chain choice.
#[test]
fn multi_chain_guard() {
    let request =
        SigningRequest::identity(identity_args(), &RequestOptions::default()).unwrap();
    let signer =
        PermissionLevel::new("foo".parse().unwrap(), "active".parse().unwrap());

    let err = request.resolve(
        &esr::AbiMap::new(),
        &signer,
        &TransactionContext::default(),
    );
    assert!(matches!(err, Err(RequestError::BadChain)));

    // a chain outside the declared set is rejected too
    let ctx = TransactionContext {
        chain_id: Some(ChainAlias::Telos.chain_id().unwrap()),
        expiration: Some("2020-07-10T08:40:20".parse().unwrap()),
        ..TransactionContext::default()
    };
    let err = request.resolve(&esr::AbiMap::new(), &signer, &ctx);
    assert!(matches!(err, Err(RequestError::BadChain)));
}

// Identity proof verification inside and outside its validity window.
#[test]
fn identity_proof_verification() {
    let resolved = resolve_identity();
    let key = test_key();
    let signature = key.sign(&resolved.signing_digest()).unwrap();
    let proof = resolved.get_identity_proof(signature).unwrap();

    assert_eq!(proof.scope, "foo".parse::<Name>().unwrap());
    assert_eq!(proof.chain_id, ChainAlias::Wax.chain_id().unwrap());
    assert_eq!(proof.expiration.to_string(), "2020-07-10T08:40:20");

    // the proof transaction reproduces the resolved signing digest
    assert_eq!(proof.signing_digest(), resolved.signing_digest());

    let authority = esr::Authority::single(key.public_key().unwrap());
    assert!(proof.verify(&authority, "2020-07-10T08:00:00".parse().unwrap()));
    assert!(!proof.verify(&authority, "2020-07-10T09:00:00".parse().unwrap()));

    // proof strings round-trip
    let text = proof.to_string();
    assert_eq!(text.parse::<esr::IdentityProof>().unwrap(), proof);
}

// Clones mutate independently.
#[test]
fn clone_independence() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    let mut copy = request.clone();
    copy.set_info_key("foo", true);

    assert_ne!(request.to_string(), copy.to_string());
    assert!(request.get_raw_info_key("foo").is_none());
    assert_eq!(copy.get_raw_info_key("foo").unwrap().as_slice(), &[1]);

    // the difference is exactly that one key
    let mut infos = copy.get_raw_info().to_vec();
    infos.retain(|pair| pair.key != "foo");
    assert_eq!(infos, request.get_raw_info().to_vec());
}

#[tokio::test]
async fn async_create_fetches_abis() {
    let provider = token_provider();
    let options = RequestOptions {
        abi_provider: Some(&provider),
        ..RequestOptions::default()
    };
    let request = SigningRequest::create(transfer_args(), &options).await.unwrap();
    assert_eq!(
        request.get_raw_actions()[0].data.to_string(),
        TRANSFER_DATA_HEX
    );

    // without a provider the same descriptor is an error
    let err = SigningRequest::create(transfer_args(), &RequestOptions::default()).await;
    assert!(matches!(err, Err(RequestError::MissingAbiProvider)));
}

#[tokio::test]
async fn callback_payload_reconstructs_resolution() {
    let resolved = resolve_identity();
    let signature = test_key().sign(&resolved.signing_digest()).unwrap();
    let callback = resolved.get_callback(&[signature], Some(100)).unwrap().unwrap();

    assert_eq!(callback.payload.cid, resolved.chain_id.to_string());
    assert_eq!(callback.payload.sa, "foo");
    assert_eq!(callback.payload.sp, "active");
    assert_eq!(callback.payload.bn.as_deref(), Some("100"));

    let rebuilt =
        ResolvedRequest::from_payload(&callback.payload, &RequestOptions::default())
            .await
            .unwrap();
    assert_eq!(rebuilt.signing_digest(), resolved.signing_digest());
    assert_eq!(rebuilt.chain_id, resolved.chain_id);
    assert_eq!(rebuilt.signer, resolved.signer);
}

#[test]
fn callback_requires_signatures() {
    let resolved = resolve_identity();
    assert!(matches!(
        resolved.get_callback(&[], None),
        Err(RequestError::NeedSignature)
    ));
}

#[test]
fn no_callback_when_empty() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    let signer = PermissionLevel::new("foo".parse().unwrap(), "bar".parse().unwrap());
    let ctx = TransactionContext {
        expiration: Some("2018-02-15T00:00:00".parse().unwrap()),
        ref_block_num: Some(0),
        ref_block_prefix: Some(1),
        ..TransactionContext::default()
    };
    let resolved = request
        .resolve(token_provider().abis(), &signer, &ctx)
        .unwrap();
    let signature = test_key().sign(&resolved.signing_digest()).unwrap();
    assert_eq!(resolved.get_callback(&[signature], None).unwrap(), None);
}

// Extra signatures land in the payload as sig0, sig1, …
#[test]
fn additional_signatures_in_payload() {
    let resolved = resolve_identity();
    let key = test_key();
    let first = key.sign(&resolved.signing_digest()).unwrap();
    let second = key
        .sign(&esr::esr_abi::sha256(b"another digest"))
        .unwrap();

    let callback = resolved
        .get_callback(&[first, second], None)
        .unwrap()
        .unwrap();
    assert_eq!(callback.payload.sig, first.to_string());
    assert_eq!(
        callback.payload.sigs.get("sig0").map(String::as_str),
        Some(second.to_string().as_str())
    );
}

// Identity decoding enforces the no-broadcast rule.
#[test]
fn decoded_identity_never_broadcasts() {
    let request =
        SigningRequest::identity(identity_args(), &RequestOptions::default()).unwrap();
    assert!(!request.should_broadcast());

    let uri = request.encode(&EncodeOptions::default());
    let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
    assert!(!decoded.should_broadcast());
}

// v2 identity requests keep the null header through resolution.
#[test]
fn v2_identity_keeps_null_header() {
    let request = SigningRequest::identity(
        RequestArgs {
            identity: Some(IdentityArgs::default()),
            ..RequestArgs::default()
        },
        &RequestOptions::default(),
    )
    .unwrap();
    assert_eq!(request.version(), ProtocolVersion::V2);

    let signer =
        PermissionLevel::new("foo".parse().unwrap(), "active".parse().unwrap());
    let ctx = TransactionContext {
        expiration: Some("2020-07-10T08:40:20".parse().unwrap()),
        ..TransactionContext::default()
    };
    let resolved = request.resolve(&esr::AbiMap::new(), &signer, &ctx).unwrap();
    assert!(resolved.transaction.has_null_header());
    // the synthetic identity action carries the signer after resolution
    assert_eq!(resolved.transaction.actions[0].authorization, vec![signer]);
}

#[test]
fn actions_variant_roundtrip() {
    let action = ProposedAction {
        account: "eosio.token".parse().unwrap(),
        name: "transfer".parse().unwrap(),
        authorization: vec![placeholder_auth()],
        data: ActionData::Unencoded(AbiValue::object([
            ("from", "foo"),
            ("to", "bar"),
            ("quantity", "1.000 EOS"),
            ("memo", ""),
        ])),
    };
    let request = SigningRequest::create_sync(
        RequestArgs {
            actions: Some(vec![action.clone(), action]),
            chain_id: ChainArg::Alias(ChainAlias::Jungle),
            ..RequestArgs::default()
        },
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    assert_eq!(request.get_raw_actions().len(), 2);
    assert_eq!(
        request.get_required_abis(),
        vec!["eosio.token".parse::<Name>().unwrap()]
    );

    let uri = request.encode(&EncodeOptions::default());
    let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default()).unwrap();
    assert_eq!(decoded, request);
}

// Two compressed encodings decode to identical payloads.
#[test]
fn compression_is_semantically_invisible() {
    let request = SigningRequest::create_sync(
        transfer_args(),
        &RequestOptions::default(),
        token_provider().abis(),
    )
    .unwrap();
    let a = request.encode(&EncodeOptions::default());
    let b = request.encode(&EncodeOptions::default());
    let decoded_a = SigningRequest::from_uri(&a, &RequestOptions::default()).unwrap();
    let decoded_b = SigningRequest::from_uri(&b, &RequestOptions::default()).unwrap();
    assert_eq!(decoded_a.get_data(), decoded_b.get_data());
}

#[test]
fn key_signature_string_sanity() {
    // the key used across these tests is the standard development key
    let key = test_key();
    assert_eq!(
        key.public_key().unwrap().to_string(),
        "EOS6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5GDW5CV"
            .parse::<esr::esr_abi::PublicKey>()
            .unwrap()
            .to_string()
    );
    assert_eq!(key.key_type, KeyType::K1);
}
