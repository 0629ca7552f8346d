//! Read-only session snapshots

use super::{AbortReason, Complaint, Dispute, Participant, Session, SessionParams, SessionState};
use crate::crypto::{Commitment, FieldElement, GroupElement};
use crate::{ParticipantId, ParticipantIndex, SessionAddress, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a session's public state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub address: SessionAddress,
    pub state: SessionState,
    pub abort_reason: Option<AbortReason>,
    pub params: SessionParams,
    pub effective_size: usize,
    pub roster: Vec<Participant>,
    pub commitments: BTreeMap<ParticipantIndex, Commitment>,
    pub public_key: Option<GroupElement>,
    pub verification_shares: Vec<(ParticipantIndex, GroupElement)>,
    pub complaints: Vec<Complaint>,
    pub disputes: Vec<Dispute>,
}

impl SessionView {
    pub fn threshold(&self) -> usize {
        self.params.threshold
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == *id)
    }

    /// Answered complaint from `accuser` against `accused`, if any
    pub fn answer(&self, accused: ParticipantIndex, accuser: ParticipantIndex) -> Option<FieldElement> {
        self.complaints
            .iter()
            .find(|c| c.accused == accused && c.accuser == accuser)
            .and_then(|c| c.answer)
    }

    /// Participants not excluded, in roster order
    pub fn active(&self) -> impl Iterator<Item = &Participant> {
        self.roster.iter().filter(|p| !p.is_excluded())
    }
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let output = session.output();

        Self {
            id: session.id(),
            address: session.address(),
            state: session.state(),
            abort_reason: session.abort_reason(),
            params: session.params().clone(),
            effective_size: session.effective_size(),
            roster: session.roster().to_vec(),
            commitments: session.commitments.clone(),
            public_key: output.map(|o| o.public_key),
            verification_shares: output
                .map(|o| o.verification_shares.clone())
                .unwrap_or_default(),
            complaints: session.complaints().to_vec(),
            disputes: session.disputes().to_vec(),
        }
    }
}
