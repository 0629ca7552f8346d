//! Session submission types

use crate::crypto::{Commitment, EncryptedShare, PossessionProof};
use serde::{Deserialize, Serialize};

/// Commitment round submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentMessage {
    /// Feldman commitments to the polynomial coefficients
    pub commitment: Commitment,
    /// Proof of knowledge of the constant term
    pub proof: PossessionProof,
}

/// Sharing round submission: one encrypted share per other participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareListMessage {
    pub shares: Vec<EncryptedShare>,
}
