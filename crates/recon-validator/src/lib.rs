// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Verifies that a received tree root carries enough cryptographic
//! signatures by stake-weight from a known address book.

use fastcrypto::ed25519::{Ed25519PublicKey, Ed25519Signature};
use fastcrypto::traits::{ToFromBytes, VerifyingKey};
use recon_types::{AddressBook, ReconnectError, SignedState};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ValidationOutcome {
    pub valid_stake: u64,
    pub total_stake: u64,
}

impl ValidationOutcome {
    /// `3v > total_stake` — a strong minority sufficient to guarantee at
    /// least one honest signer under the BFT assumption.
    pub fn quorum_met(&self) -> bool {
        self.valid_stake
            .checked_mul(3)
            .map(|v| v > self.total_stake)
            .unwrap_or(true)
    }
}

/// Per-signature verification result, kept for diagnostics. Failures here
/// are never fatal on their own (§7 propagation policy): only the final
/// quorum check can fail the whole validation.
#[derive(Debug, Clone)]
pub struct SignatureDiagnostic {
    pub node_id: recon_types::NodeId,
    pub verified: bool,
}

/// Verifies `signed_state` against `address_book`. The address book is
/// first checked for its own structural invariants (non-zero stake,
/// non-empty, monotonic ids, no re-insertion) since those are named as
/// `AddressBookViolation` causes in the error taxonomy but the algorithm
/// text in isolation does not say where they're enforced — enforced here,
/// before any signature work, per the Open Question resolution in
/// DESIGN.md.
pub async fn validate(
    signed_state: &SignedState,
    address_book: &AddressBook,
) -> Result<ValidationOutcome, ReconnectError> {
    address_book.validate()?;

    let mut tasks = Vec::with_capacity(signed_state.signatures.len());
    for (&node_id, sig_bytes) in &signed_state.signatures {
        let Some(entry) = address_book.get(node_id) else {
            // missing from the address book: ignore this signature.
            continue;
        };
        let public_key_bytes = entry.public_key.clone();
        let stake = entry.stake;
        let sig_bytes = sig_bytes.clone();
        let root_hash = signed_state.root_hash;

        // Verification is CPU-bound, not I/O-bound, so it is dispatched to
        // the blocking pool rather than performed inline on the async
        // executor.
        let task = tokio::task::spawn_blocking(move || {
            let verified = verify_one(&public_key_bytes, &root_hash.to_vec(), &sig_bytes);
            (node_id, stake, verified)
        });
        tasks.push(task);
    }

    let results = futures::future::join_all(tasks).await;

    let mut valid_stake: u64 = 0;
    let mut diagnostics = Vec::with_capacity(results.len());
    for result in results {
        let (node_id, stake, verified) = result.map_err(|e| ReconnectError::Other(e.into()))?;
        diagnostics.push(SignatureDiagnostic { node_id, verified });
        if verified && stake > 0 {
            valid_stake = valid_stake.saturating_add(stake);
        } else if !verified {
            tracing::warn!(node_id, "signature verification failed");
        }
    }

    let outcome = ValidationOutcome {
        valid_stake,
        total_stake: address_book.total_stake(),
    };
    if !outcome.quorum_met() {
        return Err(ReconnectError::InsufficientStake {
            valid_stake: outcome.valid_stake,
            total_stake: outcome.total_stake,
        });
    }
    Ok(outcome)
}

fn verify_one(public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> bool {
    let (Ok(public_key), Ok(signature)) = (
        Ed25519PublicKey::from_bytes(public_key_bytes),
        Ed25519Signature::from_bytes(signature_bytes),
    ) else {
        return false;
    };
    public_key.verify(message, &signature).is_ok()
}

/// Signs `message` with an Ed25519 private key — used by tests and by the
/// trust envelope's cryptography collaborator seam, not by the validator
/// itself (the validator only ever verifies).
pub fn sign(private_key: &fastcrypto::ed25519::Ed25519KeyPair, message: &[u8]) -> Vec<u8> {
    use fastcrypto::traits::Signer;
    private_key.sign(message).as_ref().to_vec()
}

pub type SharedAddressBook = Arc<AddressBook>;
