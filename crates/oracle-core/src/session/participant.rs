//! Roster entries

use crate::{ParticipantId, ParticipantIndex};
use serde::{Deserialize, Serialize};

/// Contribution status of a participant within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Registered, no commitment yet
    Pending,
    /// Commitment accepted
    Committed,
    /// Share list accepted
    Shared,
    /// Received shares checked
    Confirmed,
    /// Removed from the effective roster. Permanent.
    Excluded,
}

/// A registered participant. Owned by the session it registered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Arrival order; fixes the polynomial evaluation point
    pub index: ParticipantIndex,
    pub status: ParticipantStatus,
}

impl Participant {
    pub(crate) fn new(id: ParticipantId, index: ParticipantIndex) -> Self {
        Self {
            id,
            index,
            status: ParticipantStatus::Pending,
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.status == ParticipantStatus::Excluded
    }

    /// Share list accepted, whether or not received shares are confirmed
    pub fn has_dealt(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Shared | ParticipantStatus::Confirmed
        )
    }
}
