//! Share encryption using x25519 + chacha20poly1305
//!
//! Each share is sealed to the recipient's identity key with a fresh
//! ephemeral key. The ciphertext is bound to the session and to the
//! sender/recipient roster positions through the AEAD associated data.
//! The share image `s * G` travels in the clear so the session can check it
//! against the sender's commitment without learning the share.

use super::{FieldElement, GroupElement, Share};
use crate::{Error, ParticipantId, ParticipantIndex, Result, SessionId};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, ReusableSecret};
use zeroize::Zeroizing;

/// An encrypted share addressed to one roster index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// Recipient roster index
    pub recipient: ParticipantIndex,
    /// x25519 ephemeral public key
    pub ephemeral_key: [u8; 32],
    /// chacha20-poly1305 nonce
    pub nonce: [u8; 12],
    /// Ciphertext of the 32-byte share plus 16-byte tag
    pub ciphertext: Vec<u8>,
    /// `share * G`
    pub image: GroupElement,
}

impl EncryptedShare {
    /// Encrypt `share` to `recipient_key`
    pub fn seal<R: RngCore + CryptoRng>(
        share: &Share,
        session: SessionId,
        sender: ParticipantIndex,
        recipient_key: &ParticipantId,
        rng: &mut R,
    ) -> Result<Self> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);

        let shared_secret = ephemeral_secret.diffie_hellman(&PublicKey::from(recipient_key.0));
        if !shared_secret.was_contributory() {
            return Err(Error::InvalidCryptoInput(format!(
                "Recipient key {} is a low-order point",
                recipient_key.short()
            )));
        }

        let key = derive_encryption_key(
            shared_secret.as_bytes(),
            ephemeral_public.as_bytes(),
            recipient_key.as_bytes(),
        );

        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut nonce);

        let plaintext = Zeroizing::new(FieldElement(share.value).to_bytes());
        let aad = associated_data(session, sender, share.index);

        let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
            .map_err(|_| Error::Internal("Invalid encryption key length".into()))?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_slice(),
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Internal("Share encryption failed".into()))?;

        Ok(Self {
            recipient: share.index,
            ephemeral_key: *ephemeral_public.as_bytes(),
            nonce,
            ciphertext,
            image: GroupElement::mul_base(&share.value),
        })
    }

    /// Decrypt with the recipient's identity secret.
    ///
    /// Fails if the ciphertext does not authenticate or the plaintext does
    /// not match the published image.
    pub fn open(
        &self,
        session: SessionId,
        sender: ParticipantIndex,
        identity: &ReusableSecret,
    ) -> Result<Share> {
        let shared_secret = identity.diffie_hellman(&PublicKey::from(self.ephemeral_key));
        if !shared_secret.was_contributory() {
            return Err(Error::InvalidCryptoInput(
                "Ephemeral key is a low-order point".into(),
            ));
        }

        let own_public = PublicKey::from(identity);
        let key = derive_encryption_key(
            shared_secret.as_bytes(),
            &self.ephemeral_key,
            own_public.as_bytes(),
        );
        let aad = associated_data(session, sender, self.recipient);

        let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
            .map_err(|_| Error::Internal("Invalid encryption key length".into()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&self.nonce),
                    Payload {
                        msg: self.ciphertext.as_slice(),
                        aad: &aad,
                    },
                )
                .map_err(|_| {
                    Error::InvalidCryptoInput(format!(
                        "Share from index {} does not decrypt",
                        sender
                    ))
                })?,
        );

        let value = FieldElement::from_bytes(&plaintext)?.0;
        if GroupElement::mul_base(&value) != self.image {
            return Err(Error::InvalidCryptoInput(format!(
                "Share from index {} does not match its image",
                sender
            )));
        }

        Ok(Share {
            index: self.recipient,
            value,
        })
    }
}

fn derive_encryption_key(
    shared_secret: &[u8; 32],
    ephemeral_key: &[u8; 32],
    recipient_key: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    let mut hasher = blake3::Hasher::new_derive_key("dkg-oracle 2024 share encryption v1");
    hasher.update(shared_secret);
    hasher.update(ephemeral_key);
    hasher.update(recipient_key);
    Zeroizing::new(*hasher.finalize().as_bytes())
}

fn associated_data(
    session: SessionId,
    sender: ParticipantIndex,
    recipient: ParticipantIndex,
) -> [u8; 24] {
    let mut aad = [0u8; 24];
    aad[..8].copy_from_slice(&session.0.to_be_bytes());
    aad[8..16].copy_from_slice(&(sender as u64).to_be_bytes());
    aad[16..].copy_from_slice(&(recipient as u64).to_be_bytes());
    aad
}
