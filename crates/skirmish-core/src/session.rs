//! Identity of the local client, passed explicitly to every collaborator.

use serde::{Deserialize, Serialize};

use crate::enums::Team;
use crate::participant::Participant;
use crate::types::ParticipantId;

/// Who this client is and which match it plays in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub team: Team,
    pub match_code: String,
    /// Configured as the match director. The director's client also
    /// answers state requests from late joiners.
    #[serde(default)]
    pub is_director: bool,
}

impl SessionContext {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        display_name: impl Into<String>,
        team: Team,
        match_code: impl Into<String>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            team,
            match_code: match_code.into(),
            is_director: false,
        }
    }

    pub fn director(mut self) -> Self {
        self.is_director = true;
        self
    }

    /// The roster entry this session announces on join.
    pub fn as_participant(&self) -> Participant {
        let participant = Participant::new(
            self.participant_id.clone(),
            self.display_name.clone(),
            self.team,
        );
        if self.is_director {
            participant.director()
        } else {
            participant
        }
    }

    pub fn is(&self, participant_id: &str) -> bool {
        self.participant_id == participant_id
    }
}
