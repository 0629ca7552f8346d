//! Feldman verifiable secret sharing over secp256k1

use super::{evaluation_point, GroupElement, SecretPolynomial, Share};
use crate::{Error, ParticipantIndex, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Public commitment `C_k = a_k * G` to each coefficient of a secret polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    coefficients: Vec<GroupElement>,
}

impl Commitment {
    pub fn from_coefficients(coefficients: Vec<GroupElement>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::InvalidCryptoInput("Empty commitment".into()));
        }
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> &[GroupElement] {
        &self.coefficients
    }

    /// Number of committed coefficients
    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    /// Commitment to the constant term (the participant's public contribution)
    pub fn constant_term(&self) -> &GroupElement {
        &self.coefficients[0]
    }

    /// `Σ C_k * x^k` for the evaluation point of `index`
    pub fn evaluate(&self, index: ParticipantIndex) -> ProjectivePoint {
        let x = evaluation_point(index);
        self.coefficients
            .iter()
            .rev()
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc * x + c.0)
    }
}

/// Commit to every coefficient of `polynomial`
pub fn commit(polynomial: &SecretPolynomial) -> Commitment {
    Commitment {
        coefficients: polynomial
            .coefficients()
            .iter()
            .map(GroupElement::mul_base)
            .collect(),
    }
}

/// Check a plaintext share against its dealer's commitment
pub fn verify_share(share: &Share, commitment: &Commitment, index: ParticipantIndex) -> bool {
    if share.index != index {
        return false;
    }
    verify_share_image(&GroupElement::mul_base(&share.value), commitment, index)
}

/// Check a share image `s * G` against its dealer's commitment.
///
/// Lets a verifier that never sees the plaintext share check consistency.
pub fn verify_share_image(
    image: &GroupElement,
    commitment: &Commitment,
    index: ParticipantIndex,
) -> bool {
    commitment.evaluate(index).ct_eq(&image.0).into()
}

/// Group public key: the sum of every commitment's constant term
pub fn combine_public_keys<'a, I>(commitments: I) -> Result<GroupElement>
where
    I: IntoIterator<Item = &'a Commitment>,
{
    let mut count = 0usize;
    let sum = commitments
        .into_iter()
        .inspect(|_| count += 1)
        .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.constant_term().0);

    if count == 0 {
        return Err(Error::InvalidCryptoInput(
            "Cannot combine an empty set of commitments".into(),
        ));
    }

    Ok(GroupElement(sum))
}

/// Public image of the combined secret share held by `index`
pub fn verification_share<'a, I>(commitments: I, index: ParticipantIndex) -> GroupElement
where
    I: IntoIterator<Item = &'a Commitment>,
{
    GroupElement(
        commitments
            .into_iter()
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.evaluate(index)),
    )
}

/// Lagrange interpolation at zero over `(index, share)` pairs
pub fn reconstruct_secret(shares: &[(ParticipantIndex, Scalar)]) -> Result<Scalar> {
    if shares.is_empty() {
        return Err(Error::InvalidCryptoInput("No shares to interpolate".into()));
    }

    let mut secret = Scalar::ZERO;
    for (i, (index_i, share)) in shares.iter().enumerate() {
        let x_i = evaluation_point(*index_i);
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;

        for (j, (index_j, _)) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            if index_i == index_j {
                return Err(Error::InvalidCryptoInput(format!(
                    "Duplicate share index {}",
                    index_i
                )));
            }
            let x_j = evaluation_point(*index_j);
            numerator *= x_j;
            denominator *= x_j - x_i;
        }

        let inverse = Option::<Scalar>::from(denominator.invert())
            .ok_or_else(|| Error::InvalidCryptoInput("Degenerate interpolation set".into()))?;
        secret += *share * numerator * inverse;
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn polynomial(seed: u64, threshold: usize) -> SecretPolynomial {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        SecretPolynomial::random(threshold, &mut rng).unwrap()
    }

    #[test]
    fn test_shares_verify_against_commitment() {
        let poly = polynomial(1, 3);
        let commitment = commit(&poly);
        assert_eq!(commitment.threshold(), 3);

        for index in 0..5 {
            let share = poly.evaluate(index);
            assert!(verify_share(&share, &commitment, index));
        }
    }

    #[test]
    fn test_tampered_share_fails() {
        let poly = polynomial(2, 2);
        let commitment = commit(&poly);

        let mut share = poly.evaluate(1);
        share.value += Scalar::ONE;
        assert!(!verify_share(&share, &commitment, 1));

        // A valid share presented for another index
        let share = poly.evaluate(1);
        assert!(!verify_share(&share, &commitment, 2));
    }

    #[test]
    fn test_combined_key_matches_reconstructed_secret() {
        let polys: Vec<_> = (0..3).map(|seed| polynomial(10 + seed, 2)).collect();
        let commitments: Vec<_> = polys.iter().map(commit).collect();
        let public_key = combine_public_keys(&commitments).unwrap();

        // Combined share of each participant
        let combined: Vec<(ParticipantIndex, Scalar)> = (0..3)
            .map(|index| {
                let sum = polys
                    .iter()
                    .fold(Scalar::ZERO, |acc, p| acc + p.evaluate(index).value);
                (index, sum)
            })
            .collect();

        for (index, share) in &combined {
            assert_eq!(
                verification_share(&commitments, *index),
                GroupElement::mul_base(share)
            );
        }

        // Any two shares recover the same group secret
        let a = reconstruct_secret(&combined[..2]).unwrap();
        let b = reconstruct_secret(&combined[1..]).unwrap();
        assert_eq!(a, b);
        assert_eq!(GroupElement::mul_base(&a), public_key);
    }

    #[test]
    fn test_combine_rejects_empty() {
        let empty: Vec<Commitment> = Vec::new();
        assert!(matches!(
            combine_public_keys(&empty),
            Err(Error::InvalidCryptoInput(_))
        ));
    }

    #[test]
    fn test_reconstruct_rejects_duplicates() {
        let shares: [(ParticipantIndex, Scalar); 2] = [(1, Scalar::ONE), (1, Scalar::ONE)];
        assert!(reconstruct_secret(&shares).is_err());
    }
}
