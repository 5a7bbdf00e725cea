//! Destruction proofs
//!
//! A worker is not Destroyed until its proof exists. The proof binds the
//! worker, the run, the fragment, the method and a digest of the wiped
//! storage into a SHA-256 checksum, optionally signed with ed25519.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sieve_model::{ContentHash, FragmentId, RunId, WorkerId};

/// How a worker's state was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestructionMethod {
    /// Model payload zeroed by the isolation backend
    WeightZeroed,
    /// Worker forcibly stopped (timeout, cancellation, abandoned scope)
    ProcessTerminated,
    /// Worker finished and its content slot was overwritten
    StorageWiped,
}

impl DestructionMethod {
    #[inline]
    fn as_u8(self) -> u8 {
        match self {
            DestructionMethod::WeightZeroed => 0,
            DestructionMethod::ProcessTerminated => 1,
            DestructionMethod::StorageWiped => 2,
        }
    }
}

/// Attestation that a worker and its content are gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructionProof {
    /// Destroyed worker
    pub worker_id: WorkerId,
    /// Run the worker belonged to
    pub run_id: RunId,
    /// Fragment the worker held
    pub fragment_id: FragmentId,
    /// Destruction time
    pub destroyed_at: DateTime<Utc>,
    /// Destruction method
    pub method: DestructionMethod,
    /// Bytes of fragment content overwritten
    pub bytes_wiped: u64,
    /// Blake3 digest of the content slot after wiping
    pub residue_digest: ContentHash,
    /// SHA-256 over all fields above
    pub checksum: ContentHash,
    /// Optional ed25519 signature over `checksum`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl DestructionProof {
    /// Build a proof, signing it when a signer is given
    #[must_use]
    pub fn issue(
        worker_id: WorkerId,
        run_id: RunId,
        fragment_id: FragmentId,
        method: DestructionMethod,
        bytes_wiped: u64,
        residue_digest: ContentHash,
        signer: Option<&ProofSigner>,
    ) -> Self {
        let mut proof = Self {
            worker_id,
            run_id,
            fragment_id,
            destroyed_at: Utc::now(),
            method,
            bytes_wiped,
            residue_digest,
            checksum: ContentHash::default(),
            signature: None,
        };
        proof.checksum = proof.compute_checksum();
        proof.signature = signer.map(|s| s.sign(&proof.checksum));
        proof
    }

    /// Recompute the checksum and compare
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Check the signature against a key; unsigned proofs fail
    #[must_use]
    pub fn verify_signature(&self, key: &VerifyingKey) -> bool {
        self.verify_checksum()
            && self
                .signature
                .as_ref()
                .is_some_and(|sig| key.verify(self.checksum.as_bytes(), sig).is_ok())
    }

    /// True when the residue digest is that of `bytes_wiped` zero bytes
    #[must_use]
    pub fn residue_is_zeroed(&self) -> bool {
        let len = usize::try_from(self.bytes_wiped).unwrap_or(usize::MAX);
        let zeros = vec![0u8; len];
        self.residue_digest == ContentHash::compute(&zeros)
    }

    fn compute_checksum(&self) -> ContentHash {
        let fragment = self.fragment_id.to_string();
        let mut hasher = Sha256::new();
        hasher.update(self.worker_id.to_bytes());
        hasher.update(self.run_id.to_bytes());
        hasher.update((fragment.len() as u64).to_le_bytes());
        hasher.update(fragment.as_bytes());
        hasher.update(self.destroyed_at.timestamp_micros().to_le_bytes());
        hasher.update([self.method.as_u8()]);
        hasher.update(self.bytes_wiped.to_le_bytes());
        hasher.update(self.residue_digest.as_bytes());
        ContentHash::new(hasher.finalize().into())
    }
}

/// Signs destruction proofs with an ed25519 key
#[derive(Clone)]
pub struct ProofSigner {
    key: SigningKey,
}

impl ProofSigner {
    /// Wrap a signing key
    #[inline]
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Derive a key from 32 secret bytes
    #[inline]
    #[must_use]
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(secret))
    }

    /// Key auditors verify with
    #[inline]
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, checksum: &ContentHash) -> Signature {
        self.key.sign(checksum.as_bytes())
    }
}

impl std::fmt::Debug for ProofSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofSigner")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_model::CriterionId;

    fn proof(signer: Option<&ProofSigner>) -> DestructionProof {
        DestructionProof::issue(
            WorkerId::new(),
            RunId::new(),
            FragmentId::new(CriterionId::new("intro"), 0),
            DestructionMethod::StorageWiped,
            64,
            ContentHash::compute(&[0u8; 64]),
            signer,
        )
    }

    #[test]
    fn checksum_detects_tampering() {
        let mut p = proof(None);
        assert!(p.verify_checksum());
        p.method = DestructionMethod::ProcessTerminated;
        assert!(!p.verify_checksum());
    }

    #[test]
    fn residue_of_zeroed_slot_verifies() {
        let mut p = proof(None);
        assert!(p.residue_is_zeroed());
        p.residue_digest = ContentHash::compute(b"left behind");
        assert!(!p.residue_is_zeroed());
    }

    #[test]
    fn signed_proof_verifies_with_matching_key() {
        let signer = ProofSigner::from_bytes(&[7u8; 32]);
        let other = ProofSigner::from_bytes(&[8u8; 32]);
        let p = proof(Some(&signer));

        assert!(p.verify_signature(&signer.verifying_key()));
        assert!(!p.verify_signature(&other.verifying_key()));
        assert!(!proof(None).verify_signature(&signer.verifying_key()));
    }

    #[test]
    fn proof_roundtrips_through_json() {
        let signer = ProofSigner::from_bytes(&[1u8; 32]);
        let p = proof(Some(&signer));
        let json = serde_json::to_string(&p).unwrap();
        let back: DestructionProof = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        assert!(back.verify_signature(&signer.verifying_key()));
    }
}
