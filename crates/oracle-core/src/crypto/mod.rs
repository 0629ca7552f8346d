//! Cryptographic primitives for the DKG ceremony
//!
//! This module provides:
//! - Field and group element wrappers over secp256k1 with constant-time equality
//! - Secret polynomials and Feldman commitments (verifiable secret sharing)
//! - Schnorr proofs of possession for commitment constant terms
//! - Share encryption to a recipient's X25519 identity key
//!
//! All functions are pure. Randomness is always supplied by the caller.

pub mod encryption;
pub mod polynomial;
pub mod proof;
pub mod vss;

pub use encryption::EncryptedShare;
pub use polynomial::{SecretPolynomial, Share};
pub use proof::PossessionProof;
pub use vss::{
    combine_public_keys, commit, reconstruct_secret, verification_share, verify_share,
    verify_share_image, Commitment,
};

use crate::{Error, ParticipantIndex, Result};
use k256::{
    elliptic_curve::{
        sec1::{FromEncodedPoint, ToEncodedPoint},
        PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Evaluation point `x = index + 1` of a roster position
pub fn evaluation_point(index: ParticipantIndex) -> Scalar {
    Scalar::from(index as u64 + 1)
}

/// A secp256k1 point, serialized in compressed SEC1 form
#[derive(Clone, Copy)]
pub struct GroupElement(pub ProjectivePoint);

impl GroupElement {
    /// Decode a SEC1 point, rejecting encodings that are not on the curve
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes)
            .map_err(|e| Error::InvalidCryptoInput(format!("malformed point encoding: {}", e)))?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| Error::InvalidCryptoInput("point is not on secp256k1".into()))?;
        Ok(GroupElement(ProjectivePoint::from(affine)))
    }

    /// Compressed SEC1 encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    /// `scalar * G`
    pub fn mul_base(scalar: &Scalar) -> Self {
        GroupElement(ProjectivePoint::GENERATOR * scalar)
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.0.ct_eq(&ProjectivePoint::IDENTITY))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl PartialEq for GroupElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for GroupElement {}

impl fmt::Debug for GroupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupElement({})", self.to_hex())
    }
}

impl Serialize for GroupElement {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for GroupElement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        GroupElement::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A secp256k1 scalar, serialized as 32 big-endian bytes
#[derive(Clone, Copy)]
pub struct FieldElement(pub Scalar);

impl FieldElement {
    /// Decode a canonical scalar. Values at or above the group order are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidCryptoInput(format!("scalar must be 32 bytes, got {}", bytes.len())))?;
        Option::<Scalar>::from(Scalar::from_repr(array.into()))
            .map(FieldElement)
            .ok_or_else(|| Error::InvalidCryptoInput("scalar exceeds the group order".into()))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.0.to_bytes());
        bytes
    }
}

impl PartialEq for FieldElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for FieldElement {}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldElement(..)")
    }
}

impl Serialize for FieldElement {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        FieldElement::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_group_element_rejects_off_curve() {
        // (1, 1) does not satisfy y^2 = x^3 + 7
        let mut bytes = [0u8; 65];
        bytes[0] = 0x04;
        bytes[32] = 1;
        bytes[64] = 1;
        assert!(matches!(
            GroupElement::from_bytes(&bytes),
            Err(Error::InvalidCryptoInput(_))
        ));
        assert!(GroupElement::from_bytes(&[0x05, 1, 2]).is_err());
    }

    #[test]
    fn test_group_element_json() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let point = GroupElement::mul_base(&Scalar::random(&mut rng));

        let json = serde_json::to_string(&point).unwrap();
        let back: GroupElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_field_element_rejects_non_canonical() {
        assert!(FieldElement::from_bytes(&[0xff; 32]).is_err());
        assert!(FieldElement::from_bytes(&[1u8; 31]).is_err());

        let one = FieldElement::from_bytes(&{
            let mut b = [0u8; 32];
            b[31] = 1;
            b
        })
        .unwrap();
        assert_eq!(one.0, Scalar::ONE);
    }

    #[test]
    fn test_evaluation_point_is_one_based() {
        assert_eq!(evaluation_point(0), Scalar::ONE);
        assert_eq!(evaluation_point(2), Scalar::from(3u64));
    }
}
