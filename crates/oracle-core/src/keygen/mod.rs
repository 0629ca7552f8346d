//! Participant-side key generation
//!
//! A [`Dealer`] is what a participant runs locally against a session: it
//! samples the secret polynomial, produces the commitment and share list
//! submissions, and assembles the final [`KeyShare`](crate::KeyShare) from the
//! shares addressed to it once the session is finalized.

mod dealer;

pub use dealer::Dealer;
