#![no_std]

//! # Cipher Gateway
//!
//! Confidential value store for the Totem Battle contract. Values enter as
//! externally-masked blobs with a keccak256 binding proof, live on-chain only
//! as opaque `u64` handles, and leave only through `decrypt` — which requires
//! both authentication and membership in the handle's capability list.
//!
//! ## Encoding
//!
//! An encoded value is a 40-byte blob:
//! ```text
//! [0..8)   masked_value : value_be8 XOR keystream
//! [8..40)  mask         : 32 random bytes chosen by the submitter
//! ```
//! where `keystream = keccak256(mask || "TOTEM_CT_V1")[0..8]`.
//!
//! ## Ingestion proof
//!
//! ```text
//! proof = keccak256(encoded_0 || .. || encoded_n || submitter_address_string
//!                   || "TOTEM_CT_PF")
//! ```
//! Binding the submitter's address into the proof stops one player replaying
//! another player's encoded deck. A batch with any mismatch fails whole —
//! no partial ingestion.
//!
//! ## Oblivious operations
//!
//! Every computing operation (`ct_eq`, `ct_and`, `ct_select`, ...) is
//! straight-line arithmetic over the stored values: no operation branches on
//! a stored value, so the sequence of storage reads and writes is identical
//! regardless of what the handles contain. `ct_select` is an arithmetic mux,
//! evaluating both arms and blending by the 0/1 condition.
//!
//! ## Capabilities
//!
//! Each handle carries an access list. Operating on a handle requires the
//! caller (`holder`) to be on the list of every input; the result handle is
//! readable by the holder alone until `grant_access` widens it.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype,
    Address, Bytes, BytesN, Env, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum GatewayError {
    HandleNotFound = 1,
    InvalidProof = 2,
    AccessDenied = 3,
    EmptyBatch = 4,
    InvalidEncoding = 5,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

/// Emitted for every handle minted by ingestion (not for derived handles —
/// derived handles are internal to a confidential computation).
#[contractevent]
pub struct EvValueIngested {
    pub handle: u64,
    pub holder: Address,
}

#[contractevent]
pub struct EvAccessGranted {
    pub handle: u64,
    pub grantee: Address,
}

/// Emitted on every successful decrypt so off-path reads leave a trace.
#[contractevent]
pub struct EvValueDecrypted {
    pub handle: u64,
    pub holder: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Types & storage keys
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored confidential value: the plaintext plus its capability list.
/// Only ever observable through `decrypt` by an ACL member.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CtEntry {
    pub value: u64,
    pub acl: Vec<Address>,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Entry(u64),
    NextHandle,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Encoded blob layout: 8-byte masked value + 32-byte mask.
pub const ENCODED_LEN: u32 = 40;

/// Domain separator for keystream derivation.
const KEYSTREAM_DST: &[u8] = b"TOTEM_CT_V1";
/// Domain separator for ingestion proof binding.
const PROOF_DST: &[u8] = b"TOTEM_CT_PF";

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// TTL expressed in human-readable time units (30 days)
const TTL_SECONDS: u32 = 30 * 24 * 60 * 60; // 2,592,000 seconds

/// TTL for handle storage in ledgers: 30 * 24 * 60 * 60 / 5 = 518,400 ledgers
const ENTRY_TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct CipherGatewayContract;

#[contractimpl]
impl CipherGatewayContract {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Ingestion
    // ───────────────────────────────────────────────────────────────────────────

    /// Ingest one encoded value. `holder` is the contract (or account) that
    /// will compute on the handle; `submitter` is the party the proof is
    /// bound to. The resulting handle is readable by `holder` only.
    pub fn ingest(
        env: Env,
        holder: Address,
        submitter: Address,
        encoded: Bytes,
        proof: BytesN<32>,
    ) -> Result<u64, GatewayError> {
        holder.require_auth();

        let mut batch = Vec::new(&env);
        batch.push_back(encoded);
        Self::check_batch_proof(&env, &batch, &submitter, &proof)?;

        let value = Self::unmask(&env, &batch.get(0).unwrap())?;
        let handle = Self::mint(&env, value, &holder);

        EvValueIngested {
            handle,
            holder: holder.clone(),
        }.publish(&env);

        Ok(handle)
    }

    /// Ingest a batch of encoded values under a single binding proof.
    /// All-or-nothing: a proof mismatch or malformed blob rejects the whole
    /// batch before any handle is minted.
    pub fn ingest_batch(
        env: Env,
        holder: Address,
        submitter: Address,
        encoded: Vec<Bytes>,
        proof: BytesN<32>,
    ) -> Result<Vec<u64>, GatewayError> {
        holder.require_auth();

        if encoded.is_empty() {
            return Err(GatewayError::EmptyBatch);
        }
        Self::check_batch_proof(&env, &encoded, &submitter, &proof)?;

        // Unmask everything before minting anything.
        let mut values: Vec<u64> = Vec::new(&env);
        let mut i: u32 = 0;
        while i < encoded.len() {
            values.push_back(Self::unmask(&env, &encoded.get(i).unwrap())?);
            i += 1;
        }

        let mut handles: Vec<u64> = Vec::new(&env);
        let mut j: u32 = 0;
        while j < values.len() {
            let handle = Self::mint(&env, values.get(j).unwrap(), &holder);
            EvValueIngested {
                handle,
                holder: holder.clone(),
            }.publish(&env);
            handles.push_back(handle);
            j += 1;
        }
        Ok(handles)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Oblivious operations
    // ───────────────────────────────────────────────────────────────────────────

    /// Wrap a public value in a fresh handle so it can feed oblivious ops.
    pub fn ct_constant(env: Env, holder: Address, value: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        Ok(Self::mint(&env, value, &holder))
    }

    /// Confidential equality of two handles. Result: 0/1 handle.
    pub fn ct_eq(env: Env, holder: Address, a: u64, b: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::read_for(&env, a, &holder)?;
        let vb = Self::read_for(&env, b, &holder)?;
        Ok(Self::mint(&env, (va == vb) as u64, &holder))
    }

    /// Confidential equality against a public constant. Result: 0/1 handle.
    pub fn ct_eq_const(env: Env, holder: Address, a: u64, k: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::read_for(&env, a, &holder)?;
        Ok(Self::mint(&env, (va == k) as u64, &holder))
    }

    /// Confidential strictly-greater comparison. Result: 0/1 handle.
    pub fn ct_gt(env: Env, holder: Address, a: u64, b: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::read_for(&env, a, &holder)?;
        let vb = Self::read_for(&env, b, &holder)?;
        Ok(Self::mint(&env, (va > vb) as u64, &holder))
    }

    /// Confidential AND over 0/1 handles (non-zero inputs normalize to 1).
    pub fn ct_and(env: Env, holder: Address, a: u64, b: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::as_bit(Self::read_for(&env, a, &holder)?);
        let vb = Self::as_bit(Self::read_for(&env, b, &holder)?);
        Ok(Self::mint(&env, va * vb, &holder))
    }

    /// Confidential OR over 0/1 handles (non-zero inputs normalize to 1).
    pub fn ct_or(env: Env, holder: Address, a: u64, b: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::as_bit(Self::read_for(&env, a, &holder)?);
        let vb = Self::as_bit(Self::read_for(&env, b, &holder)?);
        // a + b - a*b, all in {0,1}
        Ok(Self::mint(&env, va + vb - va * vb, &holder))
    }

    /// Confidential NOT over a 0/1 handle.
    pub fn ct_not(env: Env, holder: Address, a: u64) -> Result<u64, GatewayError> {
        holder.require_auth();
        let va = Self::as_bit(Self::read_for(&env, a, &holder)?);
        Ok(Self::mint(&env, 1 - va, &holder))
    }

    /// Oblivious select: evaluates both arms, blends by the 0/1 condition.
    /// `cond*when_true + (1-cond)*when_false` — no branch on the secret.
    pub fn ct_select(
        env: Env,
        holder: Address,
        cond: u64,
        when_true: u64,
        when_false: u64,
    ) -> Result<u64, GatewayError> {
        holder.require_auth();
        let c = Self::as_bit(Self::read_for(&env, cond, &holder)?);
        let vt = Self::read_for(&env, when_true, &holder)?;
        let vf = Self::read_for(&env, when_false, &holder)?;
        Ok(Self::mint(&env, c * vt + (1 - c) * vf, &holder))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Capabilities
    // ───────────────────────────────────────────────────────────────────────────

    /// Widen a handle's capability list. The holder must already have access.
    pub fn grant_access(
        env: Env,
        holder: Address,
        handle: u64,
        grantee: Address,
    ) -> Result<(), GatewayError> {
        holder.require_auth();

        let mut entry = Self::read_entry(&env, handle)?;
        if !entry.acl.contains(&holder) {
            return Err(GatewayError::AccessDenied);
        }
        if !entry.acl.contains(&grantee) {
            entry.acl.push_back(grantee.clone());
            Self::write_entry(&env, handle, &entry);
        }

        EvAccessGranted { handle, grantee }.publish(&env);
        Ok(())
    }

    /// Off-path owner read. Requires the holder's authorization and ACL
    /// membership; never invoked by the game contract during play.
    pub fn decrypt(env: Env, handle: u64, holder: Address) -> Result<u64, GatewayError> {
        holder.require_auth();

        let entry = Self::read_entry(&env, handle)?;
        if !entry.acl.contains(&holder) {
            return Err(GatewayError::AccessDenied);
        }

        EvValueDecrypted {
            handle,
            holder: holder.clone(),
        }.publish(&env);

        Ok(entry.value)
    }

    /// Capability check without revealing the value.
    pub fn has_access(env: Env, handle: u64, who: Address) -> Result<bool, GatewayError> {
        let entry = Self::read_entry(&env, handle)?;
        Ok(entry.acl.contains(&who))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Encoding & proof
    // ═══════════════════════════════════════════════════════════════════════════

    /// Recompute and check the batch binding proof:
    /// keccak256(encoded_0 || .. || encoded_n || submitter || "TOTEM_CT_PF").
    fn check_batch_proof(
        env: &Env,
        encoded: &Vec<Bytes>,
        submitter: &Address,
        proof: &BytesN<32>,
    ) -> Result<(), GatewayError> {
        let mut preimage = Bytes::new(env);
        let mut i: u32 = 0;
        while i < encoded.len() {
            preimage.append(&encoded.get(i).unwrap());
            i += 1;
        }
        preimage.append(&submitter.to_string().to_bytes());
        preimage.append(&Bytes::from_slice(env, PROOF_DST));

        let expected: BytesN<32> = env.crypto().keccak256(&preimage).into();
        if expected != *proof {
            return Err(GatewayError::InvalidProof);
        }
        Ok(())
    }

    /// Recover the plaintext from an encoded blob:
    /// value = masked_be8 XOR keccak256(mask || "TOTEM_CT_V1")[0..8].
    fn unmask(env: &Env, encoded: &Bytes) -> Result<u64, GatewayError> {
        if encoded.len() != ENCODED_LEN {
            return Err(GatewayError::InvalidEncoding);
        }

        let mut mask = Bytes::new(env);
        let mut i: u32 = 8;
        while i < ENCODED_LEN {
            mask.push_back(encoded.get(i).unwrap());
            i += 1;
        }
        mask.append(&Bytes::from_slice(env, KEYSTREAM_DST));
        let keystream: BytesN<32> = env.crypto().keccak256(&mask).into();
        let ks = keystream.to_array();

        let mut value: u64 = 0;
        let mut j: u32 = 0;
        while j < 8 {
            let byte = encoded.get(j).unwrap() ^ ks[j as usize];
            value = (value << 8) | byte as u64;
            j += 1;
        }
        Ok(value)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Handle storage
    // ═══════════════════════════════════════════════════════════════════════════

    /// Normalize a stored boolean: any non-zero value counts as true.
    fn as_bit(value: u64) -> u64 {
        (value != 0) as u64
    }

    /// Read a handle's value, requiring the holder on its ACL.
    fn read_for(env: &Env, handle: u64, holder: &Address) -> Result<u64, GatewayError> {
        let entry = Self::read_entry(env, handle)?;
        if !entry.acl.contains(holder) {
            return Err(GatewayError::AccessDenied);
        }
        Ok(entry.value)
    }

    /// Mint a fresh handle readable by `holder` alone.
    fn mint(env: &Env, value: u64, holder: &Address) -> u64 {
        let handle: u64 = env
            .storage()
            .instance()
            .get(&StorageKey::NextHandle)
            .unwrap_or(1);
        env.storage()
            .instance()
            .set(&StorageKey::NextHandle, &(handle + 1));

        let mut acl = Vec::new(env);
        acl.push_back(holder.clone());
        Self::write_entry(env, handle, &CtEntry { value, acl });
        handle
    }

    fn read_entry(env: &Env, handle: u64) -> Result<CtEntry, GatewayError> {
        env.storage()
            .temporary()
            .get(&StorageKey::Entry(handle))
            .ok_or(GatewayError::HandleNotFound)
    }

    fn write_entry(env: &Env, handle: u64, entry: &CtEntry) {
        let key = StorageKey::Entry(handle);
        env.storage().temporary().set(&key, entry);
        env.storage()
            .temporary()
            .extend_ttl(&key, ENTRY_TTL_LEDGERS, ENTRY_TTL_LEDGERS);
        // Keep the handle counter alive alongside the entries
        env.storage()
            .instance()
            .extend_ttl(ENTRY_TTL_LEDGERS, ENTRY_TTL_LEDGERS);
    }
}

#[cfg(test)]
mod test;
