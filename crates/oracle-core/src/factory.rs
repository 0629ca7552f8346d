//! Session factory: creates sessions, assigns ids, and provides lookup
//!
//! The registry is append-only. Sessions are never removed, so aborted
//! sessions stay queryable and ids are never handed out twice.

use crate::crypto::{EncryptedShare, FieldElement, GroupElement};
use crate::session::{
    AbortReason, CommitmentMessage, Session, SessionParams, SessionState, SessionView,
    ShareListMessage,
};
use crate::{Error, ParticipantId, ParticipantIndex, Result, SessionAddress, SessionId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};

/// Factory configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Domain separator for session addresses
    pub label: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            label: "dkg-oracle".into(),
        }
    }
}

/// Shared handle to one session.
///
/// Only read access is public; mutation goes through the factory.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    inner: Arc<RwLock<Session>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Consistent snapshot of the session
    pub fn view(&self) -> Result<SessionView> {
        self.read(|session| session.view())
    }

    pub fn state(&self) -> Result<SessionState> {
        self.read(|session| session.state())
    }

    pub fn public_key(&self) -> Result<Option<GroupElement>> {
        self.read(|session| session.public_key().copied())
    }

    /// Encrypted shares addressed to `recipient`
    pub fn shares_for(&self, recipient: ParticipantIndex) -> Result<Vec<(ParticipantIndex, EncryptedShare)>> {
        self.read(|session| session.shares_for(recipient))
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> Result<T> {
        let session = self
            .inner
            .read()
            .map_err(|_| Error::Internal(format!("Session {} lock poisoned", self.id)))?;
        Ok(f(&session))
    }

    /// Run one mutating operation with exclusive access
    fn update<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut session = self
            .inner
            .write()
            .map_err(|_| Error::Internal(format!("Session {} lock poisoned", self.id)))?;
        f(&mut session)
    }
}

/// Creates and tracks DKG sessions
pub struct SessionFactory {
    config: FactoryConfig,
    sessions: DashMap<SessionId, SessionHandle>,
    next_id: AtomicU64,
}

impl SessionFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Create a `threshold`-of-`size` session
    pub fn create(&self, threshold: usize, size: usize) -> Result<SessionId> {
        self.create_with(SessionParams::new(threshold, size))
    }

    /// Create a session with owner and deadlines
    #[instrument(skip(self))]
    pub fn create_with(&self, params: SessionParams) -> Result<SessionId> {
        params.validate()?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let address = SessionAddress::derive(&self.config.label, id);
        let session = Session::new(id, address, params.clone())?;

        self.sessions.insert(
            id,
            SessionHandle {
                id,
                inner: Arc::new(RwLock::new(session)),
            },
        );

        info!(
            session = %id,
            %address,
            threshold = params.threshold,
            size = params.size,
            "Session created"
        );

        Ok(id)
    }

    /// Read-only handle to a session
    pub fn get(&self, id: SessionId) -> Result<SessionHandle> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::SessionNotFound(id))
    }

    pub fn address_of(&self, id: SessionId) -> Result<SessionAddress> {
        self.get(id)?;
        Ok(SessionAddress::derive(&self.config.label, id))
    }

    /// Number of sessions ever created
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All session ids, ascending
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn register(&self, id: SessionId, participant: ParticipantId) -> Result<ParticipantIndex> {
        self.get(id)?.update(|session| session.register(participant))
    }

    pub fn close_registration(&self, id: SessionId) -> Result<SessionState> {
        self.get(id)?.update(|session| session.close_registration())
    }

    pub fn submit_commitment(
        &self,
        id: SessionId,
        participant: ParticipantId,
        message: CommitmentMessage,
    ) -> Result<()> {
        self.get(id)?
            .update(|session| session.submit_commitment(participant, message))
    }

    pub fn submit_shares(
        &self,
        id: SessionId,
        participant: ParticipantId,
        message: ShareListMessage,
    ) -> Result<()> {
        self.get(id)?
            .update(|session| session.submit_shares(participant, message))
    }

    pub fn file_complaint(
        &self,
        id: SessionId,
        participant: ParticipantId,
        accused: ParticipantIndex,
    ) -> Result<()> {
        self.get(id)?
            .update(|session| session.file_complaint(participant, accused))
    }

    pub fn answer_complaint(
        &self,
        id: SessionId,
        participant: ParticipantId,
        accuser: ParticipantIndex,
        share: FieldElement,
    ) -> Result<()> {
        self.get(id)?
            .update(|session| session.answer_complaint(participant, accuser, share))
    }

    pub fn confirm_shares(&self, id: SessionId, participant: ParticipantId) -> Result<()> {
        self.get(id)?
            .update(|session| session.confirm_shares(participant))
    }

    pub fn close_round(&self, id: SessionId, now: DateTime<Utc>) -> Result<SessionState> {
        self.get(id)?.update(|session| session.close_round(now))
    }

    pub fn abort(&self, id: SessionId, caller: ParticipantId, reason: AbortReason) -> Result<()> {
        self.get(id)?.update(|session| session.abort(caller, reason))
    }

    /// State, roster, abort reason and public key of a session
    pub fn get_state(&self, id: SessionId) -> Result<SessionView> {
        self.get(id)?.view()
    }

    pub fn shares_for(
        &self,
        id: SessionId,
        recipient: ParticipantIndex,
    ) -> Result<Vec<(ParticipantIndex, EncryptedShare)>> {
        self.get(id)?.shares_for(recipient)
    }
}

impl Default for SessionFactory {
    fn default() -> Self {
        Self::new(FactoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::Dealer;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_create_validates_parameters() {
        let factory = SessionFactory::default();

        assert!(matches!(factory.create(3, 2), Err(Error::InvalidParameters(_))));
        assert!(matches!(factory.create(0, 2), Err(Error::InvalidParameters(_))));
        assert!(matches!(factory.create(1, 0), Err(Error::InvalidParameters(_))));
        assert!(factory.is_empty());

        // Rejected parameters do not consume an id
        assert_eq!(factory.create(2, 3).unwrap(), SessionId(1));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let factory = SessionFactory::default();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let owner = Dealer::new(&mut rng).id();

        let first = factory
            .create_with(SessionParams::new(1, 2).with_owner(owner))
            .unwrap();
        factory
            .abort(first, owner, AbortReason::ExplicitCancel)
            .unwrap();

        let second = factory.create(1, 2).unwrap();
        let third = factory.create(1, 2).unwrap();

        assert!(second > first);
        assert!(third > second);
        assert_eq!(factory.session_ids(), vec![first, second, third]);

        // Aborted sessions stay queryable
        let view = factory.get_state(first).unwrap();
        assert_eq!(view.state, SessionState::Aborted(AbortReason::ExplicitCancel));
        assert_eq!(view.abort_reason, Some(AbortReason::ExplicitCancel));
    }

    #[test]
    fn test_unknown_session() {
        let factory = SessionFactory::default();
        let id = SessionId(42);

        assert!(matches!(factory.get(id), Err(Error::SessionNotFound(missing)) if missing == id));
        assert!(matches!(factory.address_of(id), Err(Error::SessionNotFound(_))));
        assert!(matches!(
            factory.register(id, ParticipantId([9u8; 32])),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_addresses_are_distinct() {
        let factory = SessionFactory::default();
        let a = factory.create(1, 1).unwrap();
        let b = factory.create(1, 1).unwrap();

        let address_a = factory.address_of(a).unwrap();
        assert_ne!(address_a, factory.address_of(b).unwrap());
        assert_eq!(factory.get_state(a).unwrap().address, address_a);
    }

    #[test]
    fn test_complaint_round_through_factory() {
        let factory = SessionFactory::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let session = factory.create(2, 2).unwrap();

        let mut dealers: Vec<Dealer> = (0..2).map(|_| Dealer::new(&mut rng)).collect();
        for dealer in &dealers {
            factory.register(session, dealer.id()).unwrap();
        }
        for dealer in dealers.iter_mut() {
            let view = factory.get_state(session).unwrap();
            let message = dealer.commit(&view, &mut rng).unwrap();
            factory.submit_commitment(session, dealer.id(), message).unwrap();
        }

        let view = factory.get_state(session).unwrap();
        factory
            .submit_shares(session, dealers[0].id(), dealers[0].deal(&view, &mut rng).unwrap())
            .unwrap();
        let mut garbled = dealers[1].deal(&view, &mut rng).unwrap();
        garbled.shares[0].ciphertext[0] ^= 1;
        factory.submit_shares(session, dealers[1].id(), garbled).unwrap();

        let view = factory.get_state(session).unwrap();
        let received = factory.shares_for(session, 0).unwrap();
        assert_eq!(dealers[0].check_shares(&view, &received).unwrap(), vec![1]);
        factory.file_complaint(session, dealers[0].id(), 1).unwrap();

        for dealer in &dealers {
            factory.confirm_shares(session, dealer.id()).unwrap();
        }
        assert_eq!(factory.get_state(session).unwrap().state, SessionState::Sharing);

        let view = factory.get_state(session).unwrap();
        let answer = dealers[1].answer_complaint(&view, 0).unwrap();
        factory
            .answer_complaint(session, dealers[1].id(), 0, answer)
            .unwrap();

        let view = factory.get_state(session).unwrap();
        assert_eq!(view.state, SessionState::Finalized);
        assert!(view.complaints[0].is_answered());

        let key_share = dealers[0]
            .assemble_key_share(&view, &factory.shares_for(session, 0).unwrap())
            .unwrap();
        assert_eq!(Some(key_share.public_key), view.public_key);
        assert!(key_share.verify());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let factory = Arc::new(SessionFactory::default());
        let sessions: Vec<SessionId> = (0..4).map(|_| factory.create(3, 8).unwrap()).collect();

        let mut tasks = Vec::new();
        for (n, session) in sessions.iter().copied().enumerate() {
            for k in 0..8u8 {
                let factory = Arc::clone(&factory);
                tasks.push(tokio::spawn(async move {
                    let mut id = [0u8; 32];
                    id[0] = n as u8;
                    id[1] = k;
                    factory.register(session, ParticipantId(id))
                }));
            }
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for session in sessions {
            let view = factory.get_state(session).unwrap();
            assert_eq!(view.state, SessionState::Committing);
            assert_eq!(view.roster.len(), 8);

            let mut indices: Vec<_> = view.roster.iter().map(|p| p.index).collect();
            indices.sort();
            assert_eq!(indices, (0..8).collect::<Vec<_>>());
        }
    }
}
