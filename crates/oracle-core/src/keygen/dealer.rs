//! Local participant state for one DKG session

use crate::crypto::{self, EncryptedShare, FieldElement, PossessionProof, SecretPolynomial, Share};
use crate::session::{CommitmentMessage, SessionState, SessionView, ShareListMessage};
use crate::{Error, KeyShare, ParticipantId, ParticipantIndex, Result};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use tracing::{debug, info, instrument, warn};
use x25519_dalek::{PublicKey, ReusableSecret};

/// A participant's identity secret and secret polynomial
pub struct Dealer {
    identity: ReusableSecret,
    id: ParticipantId,
    polynomial: Option<SecretPolynomial>,
}

impl Dealer {
    /// Generate a fresh identity key
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_identity(ReusableSecret::random_from_rng(&mut *rng))
    }

    pub fn from_identity(identity: ReusableSecret) -> Self {
        let id = ParticipantId(PublicKey::from(&identity).to_bytes());
        Self {
            identity,
            id,
            polynomial: None,
        }
    }

    /// Identity to register with
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Produce the commitment submission.
    ///
    /// The secret polynomial is sampled on the first call and reused after,
    /// so a resubmission always matches the stored commitment.
    #[instrument(skip(self, view, rng), fields(session = %view.id, participant = %self.id.short()))]
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        view: &SessionView,
        rng: &mut R,
    ) -> Result<CommitmentMessage> {
        let index = self.index_in(view)?;
        if self.polynomial.is_none() {
            self.polynomial = Some(SecretPolynomial::random(view.threshold(), rng)?);
        }
        let polynomial = self.polynomial(view, "commit")?;
        if polynomial.threshold() != view.threshold() {
            return Err(Error::InvalidParameters(format!(
                "Dealer polynomial has {} coefficients, session threshold is {}",
                polynomial.threshold(),
                view.threshold()
            )));
        }

        let commitment = crypto::commit(polynomial);
        let proof = PossessionProof::prove(
            polynomial.constant_term(),
            commitment.constant_term(),
            view.id,
            index,
            rng,
        );

        debug!(index, threshold = view.threshold(), "Polynomial committed");
        Ok(CommitmentMessage { commitment, proof })
    }

    /// Encrypt one share for every other active participant
    #[instrument(skip(self, view, rng), fields(session = %view.id, participant = %self.id.short()))]
    pub fn deal<R: RngCore + CryptoRng>(
        &self,
        view: &SessionView,
        rng: &mut R,
    ) -> Result<ShareListMessage> {
        let index = self.index_in(view)?;
        let polynomial = self.polynomial(view, "deal shares")?;

        let shares = view
            .active()
            .filter(|p| p.index != index)
            .map(|p| EncryptedShare::seal(&polynomial.evaluate(p.index), view.id, index, &p.id, &mut *rng))
            .collect::<Result<Vec<_>>>()?;

        debug!(index, shares = shares.len(), "Shares dealt");
        Ok(ShareListMessage { shares })
    }

    /// Senders whose share to this participant does not open or does not
    /// match their commitment. Each one deserves a complaint.
    #[instrument(skip(self, view, received), fields(session = %view.id, participant = %self.id.short()))]
    pub fn check_shares(
        &self,
        view: &SessionView,
        received: &[(ParticipantIndex, EncryptedShare)],
    ) -> Result<Vec<ParticipantIndex>> {
        let index = self.index_in(view)?;
        let faulty: Vec<_> = view
            .active()
            .filter(|p| p.index != index && p.has_dealt())
            .filter(|p| self.receive_share(view, index, p.index, received).is_err())
            .map(|p| p.index)
            .collect();

        if !faulty.is_empty() {
            warn!(index, ?faulty, "Received shares do not verify");
        }
        Ok(faulty)
    }

    /// Plaintext share owed to `accuser`, published to answer its complaint
    pub fn answer_complaint(&self, view: &SessionView, accuser: ParticipantIndex) -> Result<FieldElement> {
        self.index_in(view)?;
        let polynomial = self.polynomial(view, "answer complaint")?;
        Ok(FieldElement(polynomial.evaluate(accuser).value))
    }

    /// Combine the shares received from every surviving participant.
    ///
    /// `received` maps sender index to the encrypted share addressed to this
    /// participant, as returned by `Session::shares_for`. A share published
    /// in answer to a complaint takes the place of its ciphertext.
    #[instrument(skip(self, view, received), fields(session = %view.id, participant = %self.id.short()))]
    pub fn assemble_key_share(
        &self,
        view: &SessionView,
        received: &[(ParticipantIndex, EncryptedShare)],
    ) -> Result<KeyShare> {
        if view.state != SessionState::Finalized {
            return Err(Error::InvalidStateTransition {
                session: view.id,
                state: view.state,
                operation: "assemble key share",
            });
        }
        let index = self.index_in(view)?;
        let polynomial = self.polynomial(view, "assemble key share")?;
        let public_key = view
            .public_key
            .ok_or_else(|| Error::Internal("Finalized session has no public key".into()))?;

        let mut secret_share = polynomial.evaluate(index).value;
        let mut contributors = 1usize;

        for sender in view.active().filter(|p| p.index != index) {
            let invalid = || Error::InvalidShare {
                session: view.id,
                participant: sender.id,
                recipient: index,
            };

            let share = self
                .receive_share(view, index, sender.index, received)
                .map_err(|_| invalid())?;

            secret_share += share.value;
            contributors += 1;
        }

        let key_share = KeyShare {
            session_id: view.id,
            index,
            threshold: view.threshold(),
            n_participants: contributors,
            secret_share,
            public_key,
            verification_shares: view.verification_shares.clone(),
        };

        if !key_share.verify() {
            return Err(Error::Internal(format!(
                "Key share for index {} does not match its verification share",
                index
            )));
        }

        info!(
            index,
            contributors,
            public_key = public_key.to_hex(),
            "Key share assembled"
        );

        Ok(key_share)
    }

    /// Share from `sender`: the published complaint answer if there is one,
    /// otherwise the decrypted envelope. Checked against the commitment.
    fn receive_share(
        &self,
        view: &SessionView,
        index: ParticipantIndex,
        sender: ParticipantIndex,
        received: &[(ParticipantIndex, EncryptedShare)],
    ) -> Result<Share> {
        let commitment = view.commitments.get(&sender).ok_or_else(|| {
            Error::InvalidCryptoInput(format!("No commitment from index {}", sender))
        })?;

        let share = match view.answer(sender, index) {
            Some(answer) => Share {
                index,
                value: answer.0,
            },
            None => received
                .iter()
                .find(|(from, _)| *from == sender)
                .ok_or_else(|| {
                    Error::InvalidCryptoInput(format!("No share received from index {}", sender))
                })?
                .1
                .open(view.id, sender, &self.identity)?,
        };

        if !crypto::verify_share(&share, commitment, index) {
            return Err(Error::InvalidCryptoInput(format!(
                "Share from index {} does not match its commitment",
                sender
            )));
        }
        Ok(share)
    }

    fn index_in(&self, view: &SessionView) -> Result<ParticipantIndex> {
        match view.participant(&self.id) {
            Some(p) if !p.is_excluded() => Ok(p.index),
            _ => Err(Error::UnauthorizedParticipant {
                session: view.id,
                participant: self.id,
            }),
        }
    }

    fn polynomial(&self, view: &SessionView, operation: &'static str) -> Result<&SecretPolynomial> {
        self.polynomial
            .as_ref()
            .ok_or(Error::InvalidStateTransition {
                session: view.id,
                state: view.state,
                operation,
            })
    }
}

impl fmt::Debug for Dealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dealer")
            .field("id", &self.id)
            .field("committed", &self.polynomial.is_some())
            .finish_non_exhaustive()
    }
}
