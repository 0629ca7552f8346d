//! Secret polynomials for Shamir sharing

use super::evaluation_point;
use crate::{Error, ParticipantIndex, Result};
use k256::{elliptic_curve::Field, Scalar};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A random polynomial of degree `threshold - 1`.
///
/// The constant term is the participant's contribution to the group secret.
/// Coefficients are cleared on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretPolynomial {
    coefficients: Vec<Scalar>,
}

impl SecretPolynomial {
    /// Sample a polynomial with `threshold` coefficients
    pub fn random<R: RngCore + CryptoRng>(threshold: usize, rng: &mut R) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::InvalidParameters(
                "Threshold must be at least 1".into(),
            ));
        }

        let coefficients = (0..threshold).map(|_| Scalar::random(&mut *rng)).collect();
        Ok(Self { coefficients })
    }

    /// Build from explicit coefficients, constant term first
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::InvalidCryptoInput(
                "Polynomial needs at least one coefficient".into(),
            ));
        }
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// Number of coefficients (degree + 1)
    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    pub fn constant_term(&self) -> &Scalar {
        &self.coefficients[0]
    }

    /// Share for the participant at `index`
    pub fn evaluate(&self, index: ParticipantIndex) -> Share {
        Share {
            index,
            value: self.evaluate_at(&evaluation_point(index)),
        }
    }

    /// Horner evaluation at an arbitrary point
    pub(crate) fn evaluate_at(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
    }
}

impl fmt::Debug for SecretPolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPolynomial")
            .field("threshold", &self.threshold())
            .finish_non_exhaustive()
    }
}

/// One evaluation of a secret polynomial, addressed to a roster index
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    #[zeroize(skip)]
    pub index: ParticipantIndex,
    pub value: Scalar,
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_evaluate_matches_naive() {
        let poly = SecretPolynomial::from_coefficients(vec![
            Scalar::from(3u64),
            Scalar::from(2u64),
            Scalar::from(1u64),
        ])
        .unwrap();

        // p(x) = 3 + 2x + x^2, index 1 evaluates at x = 2
        let share = poly.evaluate(1);
        assert_eq!(share.index, 1);
        assert_eq!(share.value, Scalar::from(11u64));
        assert_eq!(poly.evaluate_at(&Scalar::ZERO), Scalar::from(3u64));
    }

    #[test]
    fn test_random_polynomial_threshold() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let poly = SecretPolynomial::random(3, &mut rng).unwrap();
        assert_eq!(poly.threshold(), 3);
        assert!(SecretPolynomial::random(0, &mut rng).is_err());
        assert!(SecretPolynomial::from_coefficients(Vec::new()).is_err());
    }

    #[test]
    fn test_zeroize_clears_secrets() {
        let mut poly = SecretPolynomial::from_coefficients(vec![Scalar::ONE, Scalar::from(5u64)]).unwrap();
        let mut share = poly.evaluate(0);

        poly.zeroize();
        share.zeroize();

        assert!(poly.coefficients().is_empty());
        assert_eq!(share.value, Scalar::ZERO);
        assert_eq!(share.index, 0);
    }
}
