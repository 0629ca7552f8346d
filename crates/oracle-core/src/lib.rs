//! # Oracle Core
//!
//! Coordination of distributed key generation (DKG) ceremonies over secp256k1.
//!
//! This crate provides:
//! - Cryptographic primitives (Feldman VSS, proofs of possession, share encryption)
//! - The DKG session ("oracle") state machine
//! - A session factory that creates sessions and keeps them queryable
//! - A participant-side dealer that produces submissions and assembles key shares
//!
//! ## Protocol Overview
//!
//! Participants register with their X25519 identity key. Each one commits to
//! a random polynomial of degree `T - 1`, then sends every other participant
//! an encrypted evaluation of it. The session checks each share's image
//! against the sender's commitment and excludes senders whose shares do not
//! verify. Once every surviving participant has dealt, the group public key
//! is the sum of the surviving constant-term commitments.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oracle_core::{keygen::Dealer, SessionFactory};
//!
//! let factory = SessionFactory::default();
//! let session = factory.create(2, 3)?;
//!
//! let mut dealer = Dealer::new(&mut rng);
//! factory.register(session, dealer.id())?;
//! // ... once the roster is full
//! let message = dealer.commit(&factory.get_state(session)?, &mut rng)?;
//! factory.submit_commitment(session, dealer.id(), message)?;
//! ```

pub mod crypto;
pub mod error;
pub mod factory;
pub mod keygen;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use factory::{FactoryConfig, SessionFactory, SessionHandle};
pub use session::{AbortReason, Session, SessionParams, SessionState, SessionView};
pub use types::{KeyShare, ParticipantId, ParticipantIndex, SessionAddress, SessionId};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default threshold for a 3-party setup
pub const DEFAULT_THRESHOLD: usize = 2;

/// Default number of parties
pub const DEFAULT_PARTIES: usize = 3;
