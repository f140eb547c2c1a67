use crate::types::*;
use serde::{Deserialize, Serialize};

// ========== Requests ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub organizer_name: String,
    pub organizer_password: String,
    /// Display names, one per roster slot. Blank lines are ignored.
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectSlotRequest {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub participant_id: ParticipantId,
    /// The human's answer to "is this you?"
    pub is_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWishRequest {
    pub participant_id: ParticipantId,
    pub wish: String,
}

// ========== Views ==========

/// Public event header. Never carries the organizer credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventView {
    pub id: EventId,
    pub name: String,
    pub organizer_name: String,
    pub created_at: String,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            name: event.name.clone(),
            organizer_name: event.organizer_name.clone(),
            created_at: event.created_at.clone(),
        }
    }
}

/// A roster slot as any visitor sees it. Never carries the recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub name: String,
    pub state: ClaimState,
    pub wish: Option<String>,
    /// Whether the asking device is bound to this slot
    pub is_me: bool,
}

impl RosterEntry {
    pub fn from_participant(participant: &Participant, me: Option<&str>) -> Self {
        Self {
            id: participant.id.clone(),
            name: participant.name.clone(),
            state: participant.claim_state(),
            wish: participant.visible_wish().map(str::to_string),
            is_me: me == Some(participant.id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPage {
    pub event: EventView,
    pub roster: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedEvent {
    pub event: EventView,
    pub roster: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipientView {
    pub id: ParticipantId,
    pub name: String,
    pub wish: Option<String>,
}

/// Disclosure of a bound participant's secret friend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reveal {
    pub participant: RosterEntry,
    pub recipient: RecipientView,
    /// Always starts hidden; only the client ever flips it
    pub visibility: Visibility,
    /// True only for the request that performed the first claim
    pub first_claim: bool,
}

impl Reveal {
    pub fn new(participant: &Participant, recipient: &Participant, first_claim: bool) -> Self {
        Self {
            participant: RosterEntry::from_participant(participant, Some(participant.id.as_str())),
            recipient: RecipientView {
                id: recipient.id.clone(),
                name: recipient.name.clone(),
                wish: recipient.visible_wish().map(str::to_string),
            },
            visibility: Visibility::Hidden,
            first_claim,
        }
    }

    pub fn toggle(&mut self) {
        self.visibility = self.visibility.toggled();
    }
}

/// What selecting a roster slot leads to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum SlotSelection {
    /// The device already owns this slot
    Reveal { reveal: Reveal },
    /// Ask the human "is this you?" before anything is written
    PendingConfirmation { participant: RosterEntry },
    /// Someone else already claimed this slot
    ClaimedElsewhere { participant: RosterEntry },
}

/// What answering the confirmation prompt leads to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// The human said "not me"; nothing changed
    Declined,
    Confirmed { reveal: Reveal },
    /// The slot was claimed by another device first
    ClaimedElsewhere { participant: RosterEntry },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleasedBinding {
    /// The participant the device was bound to, if any
    pub released: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WishEntry {
    pub participant_id: ParticipantId,
    pub name: String,
    pub wish: String,
}

/// Roster line on the organizer page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizerEntry {
    pub id: ParticipantId,
    pub name: String,
    pub state: ClaimState,
    /// Only shown once the participant has confirmed
    pub recipient_name: Option<String>,
    pub wish: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExchangeStats {
    pub confirmed: usize,
    pub pending: usize,
    pub with_wish: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizerOverview {
    pub event: EventView,
    pub participants: Vec<OrganizerEntry>,
    pub stats: ExchangeStats,
}

/// Error body for API responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}
