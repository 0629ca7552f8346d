//! Schnorr proof of possession for a commitment's constant term
//!
//! Binds the proof to the session and the submitter's roster index so a
//! commitment cannot be replayed by another participant or in another session.

use super::{FieldElement, GroupElement};
use crate::{ParticipantIndex, SessionId};
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce, Field},
    ProjectivePoint, Scalar,
};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Proof of knowledge of `a_0` for `A_0 = a_0 * G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossessionProof {
    /// `R = k * G`
    pub nonce_commitment: GroupElement,
    /// `s = k + c * a_0`
    pub response: FieldElement,
}

impl PossessionProof {
    pub fn prove<R: RngCore + CryptoRng>(
        secret: &Scalar,
        public: &GroupElement,
        session: SessionId,
        index: ParticipantIndex,
        rng: &mut R,
    ) -> Self {
        let nonce = Scalar::random(&mut *rng);
        let nonce_commitment = GroupElement::mul_base(&nonce);
        let challenge = challenge(session, index, public, &nonce_commitment);

        Self {
            nonce_commitment,
            response: FieldElement(nonce + challenge * secret),
        }
    }

    pub fn verify(&self, public: &GroupElement, session: SessionId, index: ParticipantIndex) -> bool {
        let challenge = challenge(session, index, public, &self.nonce_commitment);
        let lhs = ProjectivePoint::GENERATOR * self.response.0;
        let rhs = self.nonce_commitment.0 + public.0 * challenge;
        lhs.ct_eq(&rhs).into()
    }
}

fn challenge(
    session: SessionId,
    index: ParticipantIndex,
    public: &GroupElement,
    nonce_commitment: &GroupElement,
) -> Scalar {
    let mut transcript = Transcript::new(b"dkg-oracle.possession-proof.v1");
    transcript.append_u64(b"session", session.0);
    transcript.append_u64(b"index", index as u64);
    transcript.append_message(b"public", &public.to_bytes());
    transcript.append_message(b"nonce", &nonce_commitment.to_bytes());

    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(b"challenge", &mut bytes);
    <Scalar as Reduce<U256>>::reduce_bytes(&bytes.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_proof_verifies_in_context() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let secret = Scalar::random(&mut rng);
        let public = GroupElement::mul_base(&secret);

        let proof = PossessionProof::prove(&secret, &public, SessionId(4), 1, &mut rng);
        assert!(proof.verify(&public, SessionId(4), 1));
    }

    #[test]
    fn test_proof_rejects_replay() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let secret = Scalar::random(&mut rng);
        let public = GroupElement::mul_base(&secret);
        let proof = PossessionProof::prove(&secret, &public, SessionId(4), 1, &mut rng);

        assert!(!proof.verify(&public, SessionId(5), 1));
        assert!(!proof.verify(&public, SessionId(4), 2));

        let other = GroupElement::mul_base(&Scalar::random(&mut rng));
        assert!(!proof.verify(&other, SessionId(4), 1));
    }
}
