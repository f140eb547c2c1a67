//! The gift exchange service.
//!
//! Creates events with their assignment and walks each roster slot through
//! the claim lifecycle: a device selects a slot, the human confirms it, the
//! slot becomes permanently claimed and the device is bound to it.

mod claim;
mod event;
mod organizer;
mod wish;

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::protocol::Reveal;
use crate::store::{DeviceStore, MemoryStore, RecordStore, Store};
use crate::types::*;
use std::sync::Arc;

/// Shared service state
#[derive(Clone)]
pub struct Exchange {
    pub store: Arc<dyn Store>,
    pub config: ExchangeConfig,
}

impl Exchange {
    pub fn new(store: Arc<dyn Store>, config: ExchangeConfig) -> Self {
        Self { store, config }
    }

    /// Exchange backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), ExchangeConfig::default())
    }

    /// The participant this device has claimed in the event, if any
    pub async fn bound_participant(&self, event_id: &str, device_id: &str) -> Option<ParticipantId> {
        self.store.get(&DeviceScope::new(event_id, device_id)).await
    }

    /// Look up the participant's recipient and build the reveal
    async fn reveal_for(
        &self,
        participant: &Participant,
        first_claim: bool,
    ) -> ExchangeResult<Reveal> {
        let recipient_id = participant
            .recipient
            .as_deref()
            .ok_or_else(|| ExchangeError::NoAssignment(participant.id.clone()))?;

        let recipient = match self
            .store
            .get_participant(&participant.event_id, recipient_id)
            .await
        {
            Ok(r) => r,
            Err(ExchangeError::NotFound(_)) => {
                tracing::error!(
                    event_id = participant.event_id.as_str(),
                    participant_id = participant.id.as_str(),
                    "Assigned recipient is missing from the roster"
                );
                return Err(ExchangeError::AssignmentInvariantViolation(format!(
                    "recipient of {} does not exist",
                    participant.id
                )));
            }
            Err(e) => return Err(e),
        };

        if recipient.id == participant.id {
            return Err(ExchangeError::AssignmentInvariantViolation(format!(
                "{} is assigned to themselves",
                participant.id
            )));
        }

        Ok(Reveal::new(participant, &recipient, first_claim))
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::in_memory()
    }
}
