//! Core identifiers and key material types

use crate::crypto::{self, GroupElement};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Position of a participant in a session roster (arrival order, 0-based).
///
/// The polynomial evaluation point of a participant is `index + 1`.
pub type ParticipantIndex = usize;

/// Identifier assigned by the factory. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A participant's identity: its X25519 public key.
///
/// Shares addressed to the participant are encrypted to this key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub [u8; 32]);

impl ParticipantId {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated hex form for log fields
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.short())
    }
}

impl Serialize for ParticipantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid participant id length"))?;
        Ok(ParticipantId(array))
    }
}

/// Ledger-style address of a session, derived from the factory label and id
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionAddress(pub [u8; 20]);

impl SessionAddress {
    /// Derive the address for `id` under a factory `label`
    pub fn derive(label: &str, id: SessionId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"dkg-oracle.session-address.v1");
        hasher.update(label.as_bytes());
        hasher.update(&id.0.to_be_bytes());
        let digest = hasher.finalize();

        let mut address = [0u8; 20];
        address.copy_from_slice(&digest.as_bytes()[..20]);
        SessionAddress(address)
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionAddress({})", self)
    }
}

impl Serialize for SessionAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid session address length"))?;
        Ok(SessionAddress(array))
    }
}

/// Key share held by a participant after a finalized session
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// Session that produced this share
    #[zeroize(skip)]
    pub session_id: SessionId,

    /// This participant's roster index
    pub index: ParticipantIndex,

    /// Threshold
    pub threshold: usize,

    /// Number of participants that contributed to the key
    pub n_participants: usize,

    /// This participant's secret share (x_i)
    #[serde(with = "scalar_serde")]
    pub secret_share: Scalar,

    /// Group public key
    #[zeroize(skip)]
    pub public_key: GroupElement,

    /// Verification shares of all surviving participants, by roster index
    #[zeroize(skip)]
    pub verification_shares: Vec<(ParticipantIndex, GroupElement)>,
}

mod scalar_serde {
    use crate::crypto::FieldElement;
    use k256::Scalar;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        FieldElement(*scalar).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(FieldElement::deserialize(deserializer)?.0)
    }
}

impl KeyShare {
    /// Verification share published for this participant
    pub fn own_verification_share(&self) -> Option<&GroupElement> {
        self.verification_shares
            .iter()
            .find(|(index, _)| *index == self.index)
            .map(|(_, point)| point)
    }

    /// Check the secret share against the published verification share
    pub fn verify(&self) -> bool {
        let expected = ProjectivePoint::GENERATOR * self.secret_share;
        match self.own_verification_share() {
            Some(point) => bool::from(expected.ct_eq(&point.0)),
            None => false,
        }
    }

    /// Evaluation point of this share
    pub fn evaluation_point(&self) -> Scalar {
        crypto::evaluation_point(self.index)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("session_id", &self.session_id)
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("n_participants", &self.n_participants)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_address_is_deterministic() {
        let a = SessionAddress::derive("factory", SessionId(1));
        let b = SessionAddress::derive("factory", SessionId(1));
        let c = SessionAddress::derive("factory", SessionId(2));
        let d = SessionAddress::derive("other", SessionId(1));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.to_string().starts_with("0x"));
        assert_eq!(a.to_string().len(), 42);
    }

    #[test]
    fn test_participant_id_serde() {
        let id = ParticipantId([7u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));

        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ParticipantId>("\"0707\"").is_err());
    }

    #[test]
    fn test_key_share_zeroize_clears_secret() {
        let secret = Scalar::from(42u64);
        let public_key = GroupElement::mul_base(&secret);
        let mut share = KeyShare {
            session_id: SessionId(1),
            index: 0,
            threshold: 1,
            n_participants: 1,
            secret_share: secret,
            public_key,
            verification_shares: vec![(0, public_key)],
        };
        assert!(share.verify());

        share.zeroize();
        assert_eq!(share.secret_share, Scalar::ZERO);
        assert!(!share.verify());
    }

    #[test]
    fn test_session_address_serde() {
        let address = SessionAddress::derive("factory", SessionId(9));
        let json = serde_json::to_string(&address).unwrap();
        let back: SessionAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
