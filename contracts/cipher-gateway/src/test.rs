#![cfg(test)]

//! Unit tests for the Cipher Gateway.
//!
//! Handles are exercised directly with account addresses as holders; the
//! game-contract integration (contract-invoker auth) is covered by the
//! totem-battle test suite.

use crate::{CipherGatewayContract, CipherGatewayContractClient, GatewayError, ENCODED_LEN};
use soroban_sdk::testutils::Address as _;
use soroban_sdk::{Address, Bytes, BytesN, Env, Vec};

// ════════════════════════════════════════════════════════════════════════════
//  Test Helpers
// ════════════════════════════════════════════════════════════════════════════

fn setup_test() -> (Env, CipherGatewayContractClient<'static>, Address, Address) {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register(CipherGatewayContract, ());
    let client = CipherGatewayContractClient::new(&env, &contract_id);

    let holder = Address::generate(&env);
    let submitter = Address::generate(&env);
    (env, client, holder, submitter)
}

/// Build a 40-byte encoded blob for `value` with a deterministic mask.
fn encode_value(env: &Env, value: u64, mask_byte: u8) -> Bytes {
    let mask = [mask_byte; 32];

    let mut keystream_pre = Bytes::from_array(env, &mask);
    keystream_pre.append(&Bytes::from_slice(env, b"TOTEM_CT_V1"));
    let keystream: BytesN<32> = env.crypto().keccak256(&keystream_pre).into();
    let ks = keystream.to_array();

    let value_be = value.to_be_bytes();
    let mut blob = [0u8; 40];
    for i in 0..8 {
        blob[i] = value_be[i] ^ ks[i];
    }
    blob[8..40].copy_from_slice(&mask);
    Bytes::from_array(env, &blob)
}

/// Compute the batch binding proof for `encoded` under `submitter`.
fn batch_proof(env: &Env, encoded: &Vec<Bytes>, submitter: &Address) -> BytesN<32> {
    let mut preimage = Bytes::new(env);
    for blob in encoded.iter() {
        preimage.append(&blob);
    }
    preimage.append(&submitter.to_string().to_bytes());
    preimage.append(&Bytes::from_slice(env, b"TOTEM_CT_PF"));
    env.crypto().keccak256(&preimage).into()
}

/// Ingest a single value and return its handle.
fn ingest_one(
    env: &Env,
    client: &CipherGatewayContractClient,
    holder: &Address,
    submitter: &Address,
    value: u64,
    mask_byte: u8,
) -> u64 {
    let encoded = encode_value(env, value, mask_byte);
    let mut batch = Vec::new(env);
    batch.push_back(encoded.clone());
    let proof = batch_proof(env, &batch, submitter);
    client.ingest(holder, submitter, &encoded, &proof)
}

fn assert_gateway_error<T, E>(
    result: &Result<Result<T, E>, Result<GatewayError, soroban_sdk::InvokeError>>,
    expected: GatewayError,
) {
    match result {
        Err(Ok(actual)) => assert_eq!(*actual, expected),
        Err(Err(invoke_err)) => panic!("Expected {:?}, got invoke error: {:?}", expected, invoke_err),
        Ok(_) => panic!("Expected error {:?}, but operation succeeded", expected),
    }
}

// ════════════════════════════════════════════════════════════════════════════
//  Tests: Ingestion & proof binding
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn ingest_and_decrypt_roundtrip() {
    let (env, client, holder, submitter) = setup_test();

    let handle = ingest_one(&env, &client, &holder, &submitter, 2, 0x11);
    assert_eq!(client.decrypt(&handle, &holder), 2);
}

#[test]
fn masking_hides_the_value_bytes() {
    let (env, _client, _holder, _submitter) = setup_test();

    // The first 8 bytes of the blob must not be the plain big-endian value.
    let encoded = encode_value(&env, 1, 0x42);
    let mut leading = [0u8; 8];
    for i in 0..8u32 {
        leading[i as usize] = encoded.get(i).unwrap();
    }
    assert_ne!(leading, 1u64.to_be_bytes());
}

#[test]
fn ingest_rejects_bad_proof() {
    let (env, client, holder, submitter) = setup_test();

    let encoded = encode_value(&env, 0, 0x11);
    let wrong = BytesN::<32>::from_array(&env, &[9u8; 32]);
    let result = client.try_ingest(&holder, &submitter, &encoded, &wrong);
    assert_gateway_error(&result, GatewayError::InvalidProof);
}

#[test]
fn ingest_rejects_proof_bound_to_other_submitter() {
    let (env, client, holder, submitter) = setup_test();
    let other = Address::generate(&env);

    let encoded = encode_value(&env, 0, 0x11);
    let mut batch = Vec::new(&env);
    batch.push_back(encoded.clone());
    let proof = batch_proof(&env, &batch, &other);

    let result = client.try_ingest(&holder, &submitter, &encoded, &proof);
    assert_gateway_error(&result, GatewayError::InvalidProof);
}

#[test]
fn ingest_rejects_malformed_blob() {
    let (env, client, holder, submitter) = setup_test();

    let encoded = Bytes::from_array(&env, &[0u8; 12]);
    let mut batch = Vec::new(&env);
    batch.push_back(encoded.clone());
    let proof = batch_proof(&env, &batch, &submitter);

    let result = client.try_ingest(&holder, &submitter, &encoded, &proof);
    assert_gateway_error(&result, GatewayError::InvalidEncoding);
}

#[test]
fn batch_ingest_mints_in_order() {
    let (env, client, holder, submitter) = setup_test();

    let mut batch = Vec::new(&env);
    batch.push_back(encode_value(&env, 0, 0x01));
    batch.push_back(encode_value(&env, 1, 0x02));
    batch.push_back(encode_value(&env, 2, 0x03));
    let proof = batch_proof(&env, &batch, &submitter);

    let handles = client.ingest_batch(&holder, &submitter, &batch, &proof);
    assert_eq!(handles.len(), 3);
    assert_eq!(client.decrypt(&handles.get(0).unwrap(), &holder), 0);
    assert_eq!(client.decrypt(&handles.get(1).unwrap(), &holder), 1);
    assert_eq!(client.decrypt(&handles.get(2).unwrap(), &holder), 2);
}

#[test]
fn batch_ingest_rejects_empty_batch() {
    let (env, client, holder, submitter) = setup_test();

    let batch: Vec<Bytes> = Vec::new(&env);
    let proof = batch_proof(&env, &batch, &submitter);
    let result = client.try_ingest_batch(&holder, &submitter, &batch, &proof);
    assert_gateway_error(&result, GatewayError::EmptyBatch);
}

#[test]
fn batch_ingest_is_all_or_nothing() {
    let (env, client, holder, submitter) = setup_test();

    // Second blob malformed: nothing from the batch may be minted.
    let mut batch = Vec::new(&env);
    batch.push_back(encode_value(&env, 0, 0x01));
    batch.push_back(Bytes::from_array(&env, &[0u8; 5]));
    let proof = batch_proof(&env, &batch, &submitter);

    let result = client.try_ingest_batch(&holder, &submitter, &batch, &proof);
    assert_gateway_error(&result, GatewayError::InvalidEncoding);

    // A fresh ingest still gets the first handle id.
    let handle = ingest_one(&env, &client, &holder, &submitter, 7, 0x09);
    assert_eq!(handle, 1);
}

#[test]
fn encoded_len_constant_matches_blob() {
    let (env, _client, _holder, _submitter) = setup_test();
    assert_eq!(encode_value(&env, 5, 0x33).len(), ENCODED_LEN);
}

// ════════════════════════════════════════════════════════════════════════════
//  Tests: Capabilities
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn decrypt_denied_without_access() {
    let (env, client, holder, submitter) = setup_test();
    let outsider = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 1, 0x11);
    let result = client.try_decrypt(&handle, &outsider);
    assert_gateway_error(&result, GatewayError::AccessDenied);
}

#[test]
fn grant_access_then_decrypt() {
    let (env, client, holder, submitter) = setup_test();
    let reader = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 2, 0x11);
    assert!(!client.has_access(&handle, &reader));

    client.grant_access(&holder, &handle, &reader);
    assert!(client.has_access(&handle, &reader));
    assert_eq!(client.decrypt(&handle, &reader), 2);
}

#[test]
fn grant_requires_existing_access() {
    let (env, client, holder, submitter) = setup_test();
    let outsider = Address::generate(&env);
    let reader = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 2, 0x11);
    let result = client.try_grant_access(&outsider, &handle, &reader);
    assert_gateway_error(&result, GatewayError::AccessDenied);
}

#[test]
fn grant_is_idempotent() {
    let (env, client, holder, submitter) = setup_test();
    let reader = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 2, 0x11);
    client.grant_access(&holder, &handle, &reader);
    client.grant_access(&holder, &handle, &reader);
    assert!(client.has_access(&handle, &reader));
}

#[test]
fn unknown_handle_rejected() {
    let (_env, client, holder, _submitter) = setup_test();
    let result = client.try_decrypt(&999, &holder);
    assert_gateway_error(&result, GatewayError::HandleNotFound);
}

#[test]
fn op_inputs_require_access() {
    let (env, client, holder, submitter) = setup_test();
    let other = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 1, 0x11);
    let result = client.try_ct_eq_const(&other, &handle, &1);
    assert_gateway_error(&result, GatewayError::AccessDenied);
}

#[test]
fn derived_handle_belongs_to_holder_only() {
    let (env, client, holder, submitter) = setup_test();
    let other = Address::generate(&env);

    let handle = ingest_one(&env, &client, &holder, &submitter, 1, 0x11);
    client.grant_access(&holder, &handle, &other);

    // `other` computes on the shared handle; the result is theirs alone.
    let derived = client.ct_eq_const(&other, &handle, &1);
    assert_eq!(client.decrypt(&derived, &other), 1);
    let result = client.try_decrypt(&derived, &holder);
    assert_gateway_error(&result, GatewayError::AccessDenied);
}

// ════════════════════════════════════════════════════════════════════════════
//  Tests: Oblivious operations
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn eq_and_eq_const() {
    let (env, client, holder, submitter) = setup_test();

    let a = ingest_one(&env, &client, &holder, &submitter, 2, 0x11);
    let b = ingest_one(&env, &client, &holder, &submitter, 2, 0x22);
    let c = ingest_one(&env, &client, &holder, &submitter, 5, 0x33);

    assert_eq!(client.decrypt(&client.ct_eq(&holder, &a, &b), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_eq(&holder, &a, &c), &holder), 0);
    assert_eq!(client.decrypt(&client.ct_eq_const(&holder, &a, &2), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_eq_const(&holder, &a, &7), &holder), 0);
}

#[test]
fn gt_comparison() {
    let (env, client, holder, submitter) = setup_test();

    let a = ingest_one(&env, &client, &holder, &submitter, 9, 0x11);
    let b = ingest_one(&env, &client, &holder, &submitter, 4, 0x22);

    assert_eq!(client.decrypt(&client.ct_gt(&holder, &a, &b), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_gt(&holder, &b, &a), &holder), 0);
    assert_eq!(client.decrypt(&client.ct_gt(&holder, &a, &a), &holder), 0);
}

#[test]
fn boolean_combinators() {
    let (_env, client, holder, _submitter) = setup_test();

    let t = client.ct_constant(&holder, &1);
    let f = client.ct_constant(&holder, &0);

    assert_eq!(client.decrypt(&client.ct_and(&holder, &t, &t), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_and(&holder, &t, &f), &holder), 0);
    assert_eq!(client.decrypt(&client.ct_or(&holder, &f, &t), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_or(&holder, &f, &f), &holder), 0);
    assert_eq!(client.decrypt(&client.ct_not(&holder, &t), &holder), 0);
    assert_eq!(client.decrypt(&client.ct_not(&holder, &f), &holder), 1);
}

#[test]
fn boolean_ops_normalize_nonzero() {
    let (_env, client, holder, _submitter) = setup_test();

    let big = client.ct_constant(&holder, &7);
    let t = client.ct_constant(&holder, &1);
    assert_eq!(client.decrypt(&client.ct_and(&holder, &big, &t), &holder), 1);
    assert_eq!(client.decrypt(&client.ct_not(&holder, &big), &holder), 0);
}

#[test]
fn select_blends_by_condition() {
    let (_env, client, holder, _submitter) = setup_test();

    let t = client.ct_constant(&holder, &1);
    let f = client.ct_constant(&holder, &0);
    let a = client.ct_constant(&holder, &42);
    let b = client.ct_constant(&holder, &17);

    assert_eq!(client.decrypt(&client.ct_select(&holder, &t, &a, &b), &holder), 42);
    assert_eq!(client.decrypt(&client.ct_select(&holder, &f, &a, &b), &holder), 17);
}

#[test]
fn select_chain_builds_result_codes() {
    let (_env, client, holder, _submitter) = setup_test();

    // result = select(a_wins, 1, select(b_wins, 2, 0)) — the shape the game
    // contract uses for its three-way round result.
    let a_wins = client.ct_constant(&holder, &0);
    let b_wins = client.ct_constant(&holder, &1);
    let c0 = client.ct_constant(&holder, &0);
    let c1 = client.ct_constant(&holder, &1);
    let c2 = client.ct_constant(&holder, &2);

    let inner = client.ct_select(&holder, &b_wins, &c2, &c0);
    let result = client.ct_select(&holder, &a_wins, &c1, &inner);
    assert_eq!(client.decrypt(&result, &holder), 2);
}
