use serde::{Deserialize, Serialize};

use crate::auth::OrganizerCredential;

/// Opaque ID types for type safety
pub type EventId = String;
pub type ParticipantId = String;
pub type DeviceId = String;

/// One gift-exchange instance. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub organizer_name: String,
    pub organizer_credential: OrganizerCredential,
    pub created_at: String, // ISO timestamp
}

/// One roster slot within an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub event_id: EventId,
    pub name: String,
    /// The assigned secret friend. Set once at creation, never rewritten.
    pub recipient: Option<ParticipantId>,
    /// Flips false -> true at most once, on the first successful claim
    pub confirmed: bool,
    /// Free-text gift preference; `Some("")` means the owner cleared it
    pub wish: Option<String>,
    pub created_at: String,
}

impl Participant {
    pub fn claim_state(&self) -> ClaimState {
        if self.confirmed {
            ClaimState::Claimed
        } else {
            ClaimState::Unclaimed
        }
    }

    /// The wish, if the owner has written a non-empty one
    pub fn visible_wish(&self) -> Option<&str> {
        self.wish.as_deref().filter(|w| !w.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimState {
    Unclaimed,
    Claimed,
}

/// Key of a device binding: one device within one event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceScope {
    pub event_id: EventId,
    pub device_id: DeviceId,
}

impl DeviceScope {
    pub fn new(event_id: impl Into<EventId>, device_id: impl Into<DeviceId>) -> Self {
        Self {
            event_id: event_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Partial update for a participant record.
///
/// `recipient` is deliberately absent: the assignment is immutable once stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantPatch {
    pub confirmed: Option<bool>,
    pub wish: Option<String>,
    /// Device to bind to this participant in the same write
    pub bind_device: Option<DeviceScope>,
}

impl ParticipantPatch {
    /// Confirm the slot and bind the claiming device to it
    pub fn claim(scope: DeviceScope) -> Self {
        Self {
            confirmed: Some(true),
            bind_device: Some(scope),
            ..Self::default()
        }
    }

    pub fn wish(text: String) -> Self {
        Self {
            wish: Some(text),
            ..Self::default()
        }
    }

    /// Apply the record fields. The device binding is handled by the store.
    pub(crate) fn apply(self, participant: &mut Participant) {
        if let Some(confirmed) = self.confirmed {
            // One-way transition
            participant.confirmed |= confirmed;
        }
        if let Some(wish) = self.wish {
            participant.wish = Some(wish);
        }
    }
}

/// Whether a revealed recipient is currently shown on screen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Hidden,
    Shown,
}

impl Visibility {
    pub fn toggled(self) -> Self {
        match self {
            Visibility::Hidden => Visibility::Shown,
            Visibility::Shown => Visibility::Hidden,
        }
    }
}
