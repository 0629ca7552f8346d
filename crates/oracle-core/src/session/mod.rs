//! DKG session ("oracle") state machine
//!
//! ```text
//! Created ──► Registering ──► Committing ──► Sharing ──► Finalized
//!    │             │               │             │
//!    └─────────────┴───────────────┴─────────────┴──────► Aborted(reason)
//! ```
//!
//! A session only moves forward. Every mutating operation validates fully
//! before it applies anything, so a rejected call leaves no trace. The
//! exceptions are a share list or complaint answer that fails verification:
//! the dealer is excluded and the error is still reported.
//!
//! The session sees share images but never plaintext shares, so an image can
//! be honest while the ciphertext behind it is garbage. Recipients therefore
//! check what they received and either confirm or file a complaint; the
//! accused dealer answers by publishing the plaintext share. Sharing only
//! finalizes once every survivor has confirmed and no complaint is open.
//!
//! Round closing is driven either by full completion or by an explicit
//! [`Session::close_round`] call carrying the caller's notion of "now".

mod messages;
mod participant;
mod view;

pub use messages::{CommitmentMessage, ShareListMessage};
pub use participant::{Participant, ParticipantStatus};
pub use view::SessionView;

use crate::crypto::{self, Commitment, EncryptedShare, FieldElement, GroupElement, Share};
use crate::{Error, ParticipantId, ParticipantIndex, Result, SessionAddress, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Upper bound on the roster size of a single session
pub const MAX_SESSION_SIZE: usize = 256;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Registering,
    Committing,
    Sharing,
    Finalized,
    Aborted(AbortReason),
}

impl SessionState {
    /// `Finalized` and `Aborted` accept no further mutation
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finalized | SessionState::Aborted(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => f.write_str("created"),
            SessionState::Registering => f.write_str("registering"),
            SessionState::Committing => f.write_str("committing"),
            SessionState::Sharing => f.write_str("sharing"),
            SessionState::Finalized => f.write_str("finalized"),
            SessionState::Aborted(reason) => write!(f, "aborted ({})", reason),
        }
    }
}

/// Why a session was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Timeout,
    InsufficientParticipants,
    ExplicitCancel,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Timeout => f.write_str("timeout"),
            AbortReason::InsufficientParticipants => f.write_str("insufficient participants"),
            AbortReason::ExplicitCancel => f.write_str("explicit cancel"),
        }
    }
}

/// Protocol round, used to label disputes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Round {
    Commitment,
    Sharing,
}

/// Audit record of an exclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub accused: ParticipantId,
    pub accused_index: ParticipantIndex,
    /// Recipient of the offending share, if a share was at fault
    pub recipient: Option<ParticipantIndex>,
    pub round: Round,
    pub reason: String,
}

/// A recipient's claim that the share dealt to it does not open or verify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub accuser: ParticipantIndex,
    pub accused: ParticipantIndex,
    /// Plaintext share published by the accused in reply
    pub answer: Option<FieldElement>,
}

impl Complaint {
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }
}

/// Parameters fixed when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Threshold T
    pub threshold: usize,
    /// Roster size N
    pub size: usize,
    /// Authorized canceller. Any active participant may cancel when unset.
    #[serde(default)]
    pub owner: Option<ParticipantId>,
    #[serde(default)]
    pub registration_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commitment_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sharing_deadline: Option<DateTime<Utc>>,
}

impl SessionParams {
    pub fn new(threshold: usize, size: usize) -> Self {
        Self {
            threshold,
            size,
            owner: None,
            registration_deadline: None,
            commitment_deadline: None,
            sharing_deadline: None,
        }
    }

    pub fn with_owner(mut self, owner: ParticipantId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_registration_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.registration_deadline = Some(deadline);
        self
    }

    pub fn with_commitment_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.commitment_deadline = Some(deadline);
        self
    }

    pub fn with_sharing_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.sharing_deadline = Some(deadline);
        self
    }

    /// Check `1 <= T <= N <= MAX_SESSION_SIZE` and deadline ordering
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidParameters(
                "Session size must be at least 1".into(),
            ));
        }
        if self.size > MAX_SESSION_SIZE {
            return Err(Error::InvalidParameters(format!(
                "Session size {} exceeds the maximum of {}",
                self.size, MAX_SESSION_SIZE
            )));
        }
        if self.threshold == 0 {
            return Err(Error::InvalidParameters(
                "Threshold must be at least 1".into(),
            ));
        }
        if self.threshold > self.size {
            return Err(Error::InvalidParameters(format!(
                "Threshold {} cannot exceed session size {}",
                self.threshold, self.size
            )));
        }

        let deadlines: Vec<_> = [
            self.registration_deadline,
            self.commitment_deadline,
            self.sharing_deadline,
        ]
        .into_iter()
        .flatten()
        .collect();
        if deadlines.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidParameters(
                "Round deadlines must not decrease".into(),
            ));
        }

        Ok(())
    }
}

/// Result cached when a session finalizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgOutput {
    pub public_key: GroupElement,
    /// `x_i * G` for every surviving participant, by roster index
    pub verification_shares: Vec<(ParticipantIndex, GroupElement)>,
}

/// One DKG ceremony instance
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    address: SessionAddress,
    params: SessionParams,
    state: SessionState,
    roster: Vec<Participant>,
    commitments: BTreeMap<ParticipantIndex, Commitment>,
    /// Accepted share lists, by sender
    shares: BTreeMap<ParticipantIndex, Vec<EncryptedShare>>,
    complaints: Vec<Complaint>,
    disputes: Vec<Dispute>,
    output: Option<DkgOutput>,
}

impl Session {
    /// Create a session in `Created`
    pub fn new(id: SessionId, address: SessionAddress, params: SessionParams) -> Result<Self> {
        params.validate()?;

        Ok(Self {
            id,
            address,
            params,
            state: SessionState::Created,
            roster: Vec::new(),
            commitments: BTreeMap::new(),
            shares: BTreeMap::new(),
            complaints: Vec::new(),
            disputes: Vec::new(),
            output: None,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> SessionAddress {
        self.address
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn threshold(&self) -> usize {
        self.params.threshold
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self.state {
            SessionState::Aborted(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == *id)
    }

    /// Effective N: the creation size until the roster freezes, then the
    /// number of participants not excluded.
    pub fn effective_size(&self) -> usize {
        match self.state {
            SessionState::Created | SessionState::Registering => self.params.size,
            _ => self.active().count(),
        }
    }

    pub fn commitment(&self, index: ParticipantIndex) -> Option<&Commitment> {
        self.commitments.get(&index)
    }

    /// Encrypted shares addressed to `recipient` from senders still in the roster
    pub fn shares_for(&self, recipient: ParticipantIndex) -> Vec<(ParticipantIndex, EncryptedShare)> {
        self.shares
            .iter()
            .filter(|(sender, _)| !self.roster[**sender].is_excluded())
            .filter_map(|(sender, list)| {
                list.iter()
                    .find(|share| share.recipient == recipient)
                    .map(|share| (*sender, share.clone()))
            })
            .collect()
    }

    pub fn complaints(&self) -> &[Complaint] {
        &self.complaints
    }

    pub fn disputes(&self) -> &[Dispute] {
        &self.disputes
    }

    pub fn output(&self) -> Option<&DkgOutput> {
        self.output.as_ref()
    }

    /// Aggregated public key, available once finalized
    pub fn public_key(&self) -> Option<&GroupElement> {
        self.output.as_ref().map(|output| &output.public_key)
    }

    /// Consistent read-only snapshot
    pub fn view(&self) -> SessionView {
        SessionView::from(self)
    }

    /// Add a participant to the roster. The roster freezes and the session
    /// moves to `Committing` when it reaches N.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn register(&mut self, participant: ParticipantId) -> Result<ParticipantIndex> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition("register"));
        }
        if self.participant(&participant).is_some() {
            return Err(Error::DuplicateSubmission {
                session: self.id,
                participant,
            });
        }
        if !matches!(self.state, SessionState::Created | SessionState::Registering) {
            if self.roster.len() >= self.params.size {
                return Err(Error::RosterFull {
                    session: self.id,
                    size: self.params.size,
                });
            }
            return Err(self.invalid_transition("register"));
        }

        let index = self.roster.len();
        self.roster.push(Participant::new(participant, index));
        if self.state == SessionState::Created {
            self.state = SessionState::Registering;
        }

        debug!(
            participant = %participant.short(),
            index,
            registered = self.roster.len(),
            size = self.params.size,
            "Participant registered"
        );

        if self.roster.len() == self.params.size {
            self.freeze_roster();
        }

        Ok(index)
    }

    /// Close registration early. Requires at least T registered participants.
    ///
    /// Acknowledged without effect when a full roster already closed it.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn close_registration(&mut self) -> Result<SessionState> {
        if self.state == SessionState::Committing && self.commitments.is_empty() {
            return Ok(self.state);
        }
        if self.state != SessionState::Registering {
            return Err(self.invalid_transition("close registration"));
        }
        if self.roster.len() < self.params.threshold {
            return Err(self.invalid_transition("close registration below threshold"));
        }

        self.freeze_roster();
        Ok(self.state)
    }

    /// Accept a participant's polynomial commitment
    #[instrument(skip(self, message), fields(session = %self.id))]
    pub fn submit_commitment(
        &mut self,
        participant: ParticipantId,
        message: CommitmentMessage,
    ) -> Result<()> {
        if self.state != SessionState::Committing {
            return Err(self.invalid_transition("submit commitment"));
        }
        let index = self.authorize(&participant)?;
        if self.roster[index].status != ParticipantStatus::Pending {
            return Err(Error::DuplicateSubmission {
                session: self.id,
                participant,
            });
        }

        let CommitmentMessage { commitment, proof } = message;
        if commitment.threshold() != self.params.threshold {
            return Err(Error::InvalidCryptoInput(format!(
                "Commitment has {} coefficients, expected {}",
                commitment.threshold(),
                self.params.threshold
            )));
        }
        if commitment.constant_term().is_identity() {
            return Err(Error::InvalidCryptoInput(
                "Commitment constant term is the identity".into(),
            ));
        }
        if !proof.verify(commitment.constant_term(), self.id, index) {
            return Err(Error::InvalidCryptoInput(format!(
                "Proof of possession from index {} does not verify",
                index
            )));
        }

        self.commitments.insert(index, commitment);
        self.roster[index].status = ParticipantStatus::Committed;

        debug!(
            participant = %participant.short(),
            index,
            committed = self.commitments.len(),
            "Commitment accepted"
        );

        if self.active().all(|p| p.status == ParticipantStatus::Committed) {
            self.begin_sharing();
        }

        Ok(())
    }

    /// Accept a participant's encrypted shares for every other active participant.
    ///
    /// Shares addressed to excluded participants are ignored. A share whose
    /// image does not match the submitter's commitment excludes the
    /// submitter and is reported as [`Error::InvalidShare`].
    #[instrument(skip(self, message), fields(session = %self.id))]
    pub fn submit_shares(
        &mut self,
        participant: ParticipantId,
        message: ShareListMessage,
    ) -> Result<()> {
        if self.state != SessionState::Sharing {
            return Err(self.invalid_transition("submit shares"));
        }
        let index = self.authorize(&participant)?;
        if self.roster[index].status != ParticipantStatus::Committed {
            return Err(Error::DuplicateSubmission {
                session: self.id,
                participant,
            });
        }

        let expected: BTreeSet<ParticipantIndex> = self
            .active()
            .map(|p| p.index)
            .filter(|i| *i != index)
            .collect();

        let mut accepted: BTreeMap<ParticipantIndex, EncryptedShare> = BTreeMap::new();
        for share in message.shares {
            if share.recipient == index {
                return Err(Error::InvalidParameters(
                    "Share list must not include a share for the submitter".into(),
                ));
            }
            if share.recipient >= self.roster.len() {
                return Err(Error::InvalidParameters(format!(
                    "Share addressed to unknown index {}",
                    share.recipient
                )));
            }
            if !expected.contains(&share.recipient) {
                continue;
            }
            let recipient = share.recipient;
            if accepted.insert(recipient, share).is_some() {
                return Err(Error::InvalidParameters(format!(
                    "Duplicate share for index {}",
                    recipient
                )));
            }
        }

        let missing: Vec<_> = expected
            .iter()
            .filter(|i| !accepted.contains_key(i))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidParameters(format!(
                "Share list is missing recipients {:?}",
                missing
            )));
        }

        let commitment = self
            .commitments
            .get(&index)
            .ok_or_else(|| Error::Internal(format!("No commitment stored for index {}", index)))?;
        let shares: Vec<EncryptedShare> = accepted.into_values().collect();

        if let Some(recipient) = first_invalid_share(commitment, &shares) {
            self.exclude(
                index,
                Round::Sharing,
                Some(recipient),
                "share does not match commitment".into(),
            );
            self.settle_sharing()?;
            return Err(Error::InvalidShare {
                session: self.id,
                participant,
                recipient,
            });
        }

        self.shares.insert(index, shares);
        self.roster[index].status = ParticipantStatus::Shared;

        debug!(
            participant = %participant.short(),
            index,
            shared = self.shares.len(),
            "Share list accepted"
        );

        self.settle_sharing()
    }

    /// Report that the share `accused` dealt to `participant` does not open
    /// or does not match the accused's commitment.
    ///
    /// The session holds `Sharing` until the accused answers or the sharing
    /// deadline excludes it.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn file_complaint(
        &mut self,
        participant: ParticipantId,
        accused: ParticipantIndex,
    ) -> Result<()> {
        if self.state != SessionState::Sharing {
            return Err(self.invalid_transition("file complaint"));
        }
        let accuser = self.authorize(&participant)?;
        if self.roster[accuser].status == ParticipantStatus::Confirmed
            || self
                .complaints
                .iter()
                .any(|c| c.accuser == accuser && c.accused == accused)
        {
            return Err(Error::DuplicateSubmission {
                session: self.id,
                participant,
            });
        }
        match self.roster.get(accused) {
            Some(p) if p.index != accuser && p.has_dealt() => {}
            _ => {
                return Err(Error::InvalidParameters(format!(
                    "Index {} has no share list addressed to index {}",
                    accused, accuser
                )))
            }
        }

        self.complaints.push(Complaint {
            accuser,
            accused,
            answer: None,
        });

        warn!(
            session = %self.id,
            accuser,
            accused,
            "Complaint filed"
        );

        Ok(())
    }

    /// Answer a complaint against `participant` by publishing the plaintext
    /// share for `accuser`. A share that does not match the commitment
    /// excludes the dealer and is reported as [`Error::InvalidShare`].
    #[instrument(skip(self, share), fields(session = %self.id))]
    pub fn answer_complaint(
        &mut self,
        participant: ParticipantId,
        accuser: ParticipantIndex,
        share: FieldElement,
    ) -> Result<()> {
        if self.state != SessionState::Sharing {
            return Err(self.invalid_transition("answer complaint"));
        }
        let index = self.authorize(&participant)?;
        let position = self
            .complaints
            .iter()
            .position(|c| c.accused == index && c.accuser == accuser && !c.is_answered())
            .ok_or_else(|| {
                Error::InvalidParameters(format!(
                    "No open complaint from index {} against index {}",
                    accuser, index
                ))
            })?;

        let commitment = self
            .commitments
            .get(&index)
            .ok_or_else(|| Error::Internal(format!("No commitment stored for index {}", index)))?;
        let revealed = Share {
            index: accuser,
            value: share.0,
        };
        if !crypto::verify_share(&revealed, commitment, accuser) {
            self.exclude(
                index,
                Round::Sharing,
                Some(accuser),
                "complaint answer does not match commitment".into(),
            );
            self.settle_sharing()?;
            return Err(Error::InvalidShare {
                session: self.id,
                participant,
                recipient: accuser,
            });
        }

        self.complaints[position].answer = Some(share);
        info!(
            session = %self.id,
            accuser,
            accused = index,
            "Complaint answered"
        );

        self.settle_sharing()
    }

    /// Confirm that every share addressed to `participant` verified, or has
    /// been complained about. Allowed once every active participant has dealt.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn confirm_shares(&mut self, participant: ParticipantId) -> Result<()> {
        if self.state != SessionState::Sharing {
            return Err(self.invalid_transition("confirm shares"));
        }
        let index = self.authorize(&participant)?;
        match self.roster[index].status {
            ParticipantStatus::Shared => {}
            ParticipantStatus::Confirmed => {
                return Err(Error::DuplicateSubmission {
                    session: self.id,
                    participant,
                })
            }
            _ => return Err(self.invalid_transition("confirm shares before dealing")),
        }
        if self.active().any(|p| !p.has_dealt()) {
            return Err(self.invalid_transition("confirm shares before every share list arrived"));
        }

        self.roster[index].status = ParticipantStatus::Confirmed;
        debug!(
            participant = %participant.short(),
            index,
            "Shares confirmed"
        );

        self.settle_sharing()
    }

    /// Close the current round once its deadline has passed.
    ///
    /// Participants that did not act in time are excluded. Fails with
    /// [`Error::InvalidStateTransition`] before the deadline or when the
    /// round has no deadline configured.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn close_round(&mut self, now: DateTime<Utc>) -> Result<SessionState> {
        let deadline = match self.state {
            SessionState::Created | SessionState::Registering => self.params.registration_deadline,
            SessionState::Committing => self.params.commitment_deadline,
            SessionState::Sharing => self.params.sharing_deadline,
            SessionState::Finalized | SessionState::Aborted(_) => None,
        };
        match deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Err(self.invalid_transition("close round")),
        }

        match self.state {
            SessionState::Created | SessionState::Registering => {
                if self.roster.len() >= self.params.threshold {
                    self.freeze_roster();
                } else {
                    self.abort_with(AbortReason::Timeout);
                }
            }
            SessionState::Committing => {
                self.exclude_where(
                    ParticipantStatus::Pending,
                    Round::Commitment,
                    "missed commitment deadline",
                );
                self.begin_sharing();
            }
            SessionState::Sharing => {
                self.exclude_where(
                    ParticipantStatus::Committed,
                    Round::Sharing,
                    "missed sharing deadline",
                );

                let unanswered: BTreeMap<ParticipantIndex, ParticipantIndex> = self
                    .open_complaints()
                    .map(|c| (c.accused, c.accuser))
                    .rev()
                    .collect();
                for (accused, accuser) in unanswered {
                    self.exclude(
                        accused,
                        Round::Sharing,
                        Some(accuser),
                        "complaint not answered".into(),
                    );
                }

                // Silence past the deadline counts as confirmation
                if self.effective_size() < self.params.threshold {
                    self.abort_with(AbortReason::InsufficientParticipants);
                } else {
                    self.finalize()?;
                }
            }
            SessionState::Finalized | SessionState::Aborted(_) => {}
        }

        Ok(self.state)
    }

    /// Cancel a non-terminal session.
    ///
    /// Allowed for the configured owner, or for any active participant when
    /// no owner is set.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn abort(&mut self, caller: ParticipantId, reason: AbortReason) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition("abort"));
        }

        let authorized = match self.params.owner {
            Some(owner) => owner == caller,
            None => self.participant(&caller).is_some_and(|p| !p.is_excluded()),
        };
        if !authorized {
            return Err(Error::UnauthorizedParticipant {
                session: self.id,
                participant: caller,
            });
        }

        self.abort_with(reason);
        Ok(())
    }

    fn active(&self) -> impl Iterator<Item = &Participant> {
        self.roster.iter().filter(|p| !p.is_excluded())
    }

    fn authorize(&self, participant: &ParticipantId) -> Result<ParticipantIndex> {
        match self.participant(participant) {
            Some(p) if !p.is_excluded() => Ok(p.index),
            _ => Err(Error::UnauthorizedParticipant {
                session: self.id,
                participant: *participant,
            }),
        }
    }

    fn invalid_transition(&self, operation: &'static str) -> Error {
        Error::InvalidStateTransition {
            session: self.id,
            state: self.state,
            operation,
        }
    }

    fn freeze_roster(&mut self) {
        self.state = SessionState::Committing;
        info!(
            session = %self.id,
            participants = self.roster.len(),
            threshold = self.params.threshold,
            "Registration closed"
        );
    }

    fn begin_sharing(&mut self) {
        let committed = self.effective_size();
        if committed < self.params.threshold {
            self.abort_with(AbortReason::InsufficientParticipants);
            return;
        }

        self.state = SessionState::Sharing;
        info!(
            session = %self.id,
            participants = committed,
            "Commitment round closed"
        );
    }

    /// Complaints still waiting on an answer between active participants
    fn open_complaints(&self) -> impl DoubleEndedIterator<Item = &Complaint> {
        self.complaints.iter().filter(|c| {
            !c.is_answered()
                && !self.roster[c.accused].is_excluded()
                && !self.roster[c.accuser].is_excluded()
        })
    }

    /// Abort, finalize, or keep waiting after the sharing roster changed
    fn settle_sharing(&mut self) -> Result<()> {
        if self.effective_size() < self.params.threshold {
            self.abort_with(AbortReason::InsufficientParticipants);
            return Ok(());
        }
        if self.active().all(|p| p.status == ParticipantStatus::Confirmed)
            && self.open_complaints().next().is_none()
        {
            self.finalize()?;
        }
        Ok(())
    }

    /// Compute and cache the group key. Runs once, on the transition to `Finalized`.
    fn finalize(&mut self) -> Result<()> {
        let survivors: Vec<ParticipantIndex> = self.active().map(|p| p.index).collect();
        let commitments: Vec<&Commitment> = survivors
            .iter()
            .filter_map(|index| self.commitments.get(index))
            .collect();

        let public_key = crypto::combine_public_keys(commitments.iter().copied())?;
        let verification_shares = survivors
            .iter()
            .map(|index| {
                (
                    *index,
                    crypto::verification_share(commitments.iter().copied(), *index),
                )
            })
            .collect();

        info!(
            session = %self.id,
            participants = survivors.len(),
            public_key = public_key.to_hex(),
            "DKG session finalized"
        );

        self.output = Some(DkgOutput {
            public_key,
            verification_shares,
        });
        self.state = SessionState::Finalized;
        Ok(())
    }

    fn exclude(
        &mut self,
        index: ParticipantIndex,
        round: Round,
        recipient: Option<ParticipantIndex>,
        reason: String,
    ) {
        let accused = self.roster[index].id;
        self.roster[index].status = ParticipantStatus::Excluded;

        warn!(
            session = %self.id,
            participant = %accused.short(),
            index,
            ?round,
            reason = reason.as_str(),
            "Participant excluded"
        );

        self.disputes.push(Dispute {
            accused,
            accused_index: index,
            recipient,
            round,
            reason,
        });
    }

    fn exclude_where(&mut self, status: ParticipantStatus, round: Round, reason: &str) {
        let laggards: Vec<ParticipantIndex> = self
            .roster
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.index)
            .collect();
        for index in laggards {
            self.exclude(index, round, None, reason.to_string());
        }
    }

    fn abort_with(&mut self, reason: AbortReason) {
        warn!(
            session = %self.id,
            state = %self.state,
            %reason,
            "DKG session aborted"
        );
        self.state = SessionState::Aborted(reason);
    }
}

/// Lowest recipient index whose share image fails verification
#[cfg(feature = "multi-thread")]
fn first_invalid_share(commitment: &Commitment, shares: &[EncryptedShare]) -> Option<ParticipantIndex> {
    use rayon::prelude::*;

    shares
        .par_iter()
        .filter(|share| !crypto::verify_share_image(&share.image, commitment, share.recipient))
        .map(|share| share.recipient)
        .min()
}

#[cfg(not(feature = "multi-thread"))]
fn first_invalid_share(commitment: &Commitment, shares: &[EncryptedShare]) -> Option<ParticipantIndex> {
    shares
        .iter()
        .filter(|share| !crypto::verify_share_image(&share.image, commitment, share.recipient))
        .map(|share| share.recipient)
        .min()
}
