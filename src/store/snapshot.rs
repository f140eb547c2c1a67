//! Serializable snapshots of the record store.
//!
//! Used to persist events, participants and device bindings to disk and
//! restore them on startup.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version for snapshot format compatibility
/// Version 2 added device bindings; version 1 files load with none.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// One device bound to one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub event_id: EventId,
    pub device_id: DeviceId,
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Snapshot timestamp (ISO8601)
    pub saved_at: String,
    pub events: HashMap<EventId, Event>,
    pub participants: HashMap<ParticipantId, Participant>,
    #[serde(default)]
    pub bindings: Vec<DeviceBinding>,
}

impl StoreSnapshot {
    pub fn new(
        events: HashMap<EventId, Event>,
        participants: HashMap<ParticipantId, Participant>,
        bindings: Vec<DeviceBinding>,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            events,
            participants,
            bindings,
        }
    }

    /// Validate the snapshot before loading it
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }

        for (event_id, event) in &self.events {
            if *event_id != event.id {
                return Err(format!(
                    "Event keyed as '{}' carries id '{}'",
                    event_id, event.id
                ));
            }
        }

        let mut targeted: HashSet<&str> = HashSet::new();
        for (participant_id, participant) in &self.participants {
            if *participant_id != participant.id {
                return Err(format!(
                    "Participant keyed as '{}' carries id '{}'",
                    participant_id, participant.id
                ));
            }

            if !self.events.contains_key(&participant.event_id) {
                return Err(format!(
                    "Participant '{}' references event '{}' which doesn't exist",
                    participant_id, participant.event_id
                ));
            }

            let Some(recipient_id) = &participant.recipient else {
                continue;
            };
            if recipient_id == participant_id {
                return Err(format!(
                    "Participant '{}' is assigned to themselves",
                    participant_id
                ));
            }
            match self.participants.get(recipient_id) {
                Some(recipient) if recipient.event_id == participant.event_id => {}
                Some(_) => {
                    return Err(format!(
                        "Participant '{}' is assigned to '{}' from another event",
                        participant_id, recipient_id
                    ));
                }
                None => {
                    return Err(format!(
                        "Participant '{}' is assigned to '{}' which doesn't exist",
                        participant_id, recipient_id
                    ));
                }
            }
            if !targeted.insert(recipient_id.as_str()) {
                return Err(format!(
                    "Participant '{}' is the recipient of more than one participant",
                    recipient_id
                ));
            }
        }

        let mut bound_devices: HashSet<(&str, &str)> = HashSet::new();
        for binding in &self.bindings {
            match self.participants.get(&binding.participant_id) {
                Some(p) if p.event_id == binding.event_id && p.confirmed => {}
                Some(_) => {
                    return Err(format!(
                        "Device '{}' is bound to '{}' which is not a claimed slot of event '{}'",
                        binding.device_id, binding.participant_id, binding.event_id
                    ));
                }
                None => {
                    return Err(format!(
                        "Device '{}' is bound to '{}' which doesn't exist",
                        binding.device_id, binding.participant_id
                    ));
                }
            }
            if !bound_devices.insert((binding.event_id.as_str(), binding.device_id.as_str())) {
                return Err(format!(
                    "Device '{}' is bound more than once in event '{}'",
                    binding.device_id, binding.event_id
                ));
            }
        }

        Ok(())
    }
}
