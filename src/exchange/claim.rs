//! Slot claiming: select, confirm, release.
//!
//! A slot is `Unclaimed` until the first affirmative confirmation lands,
//! then `Claimed` forever. The store's conditional update is the only place
//! two devices racing for the same slot are ordered. It confirms the slot and
//! binds the winning device in one write; the loser is routed to
//! `ClaimedElsewhere` instead of failing.

use super::Exchange;
use crate::error::{ExchangeError, ExchangeResult};
use crate::protocol::{ConfirmOutcome, Reveal, ReleasedBinding, RosterEntry, SlotSelection};
use crate::store::{DeviceStore, RecordStore, UpdateOutcome};
use crate::types::*;

impl Exchange {
    /// A device picks a roster slot as itself. Nothing is written here.
    pub async fn select_slot(
        &self,
        event_id: &str,
        device_id: &str,
        participant_id: &str,
    ) -> ExchangeResult<SlotSelection> {
        self.store.get_event(event_id).await?;
        let participant = self.store.get_participant(event_id, participant_id).await?;
        let scope = DeviceScope::new(event_id, device_id);

        match self.store.get(&scope).await {
            Some(bound) if bound != participant.id => {
                Err(ExchangeError::AlreadyBound { bound_to: bound })
            }
            Some(_) if participant.confirmed => {
                tracing::debug!(event_id, participant_id, "Returning visitor");
                let reveal = self.reveal_for(&participant, false).await?;
                Ok(SlotSelection::Reveal { reveal })
            }
            None if participant.confirmed => {
                tracing::info!(event_id, participant_id, "Slot already claimed by another device");
                Ok(SlotSelection::ClaimedElsewhere {
                    participant: RosterEntry::from_participant(&participant, None),
                })
            }
            _ => {
                if participant.recipient.is_none() {
                    return Err(ExchangeError::NoAssignment(participant.id));
                }
                tracing::debug!(event_id, participant_id, "Awaiting confirmation");
                Ok(SlotSelection::PendingConfirmation {
                    participant: RosterEntry::from_participant(&participant, None),
                })
            }
        }
    }

    /// The human answered "is this you?".
    ///
    /// On yes, claims the slot (first time only) and binds the device to it.
    pub async fn confirm(
        &self,
        event_id: &str,
        device_id: &str,
        participant_id: &str,
        is_confirmed_by_human: bool,
    ) -> ExchangeResult<ConfirmOutcome> {
        if !is_confirmed_by_human {
            tracing::debug!(event_id, participant_id, "Confirmation declined");
            return Ok(ConfirmOutcome::Declined);
        }

        self.store.get_event(event_id).await?;
        let participant = self.store.get_participant(event_id, participant_id).await?;
        let scope = DeviceScope::new(event_id, device_id);
        let bound = self.store.get(&scope).await;

        if let Some(bound) = &bound {
            if *bound != participant.id {
                return Err(ExchangeError::AlreadyBound {
                    bound_to: bound.clone(),
                });
            }
        }

        // Fails with NoAssignment / AssignmentInvariantViolation before any write
        let reveal = self.reveal_for(&participant, false).await?;

        if participant.confirmed {
            return Ok(self.claimed_outcome(&scope, &participant, reveal).await);
        }

        match self
            .store
            .update_participant(&participant.id, ParticipantPatch::claim(scope.clone()), Some(false))
            .await?
        {
            UpdateOutcome::Applied(claimed) => {
                tracing::info!(event_id, participant_id, "Slot claimed");
                Ok(ConfirmOutcome::Confirmed {
                    reveal: Reveal {
                        participant: RosterEntry::from_participant(&claimed, Some(claimed.id.as_str())),
                        first_claim: true,
                        ..reveal
                    },
                })
            }
            UpdateOutcome::PreconditionFailed(current) => {
                tracing::warn!(event_id, participant_id, "Lost claim race");
                Ok(self.claimed_outcome(&scope, &current, reveal).await)
            }
        }
    }

    /// Outcome for a slot that is already claimed: a replay when this device
    /// holds it, blocked otherwise.
    async fn claimed_outcome(
        &self,
        scope: &DeviceScope,
        participant: &Participant,
        reveal: Reveal,
    ) -> ConfirmOutcome {
        if self.store.get(scope).await.as_deref() == Some(participant.id.as_str()) {
            // Replay from the owning device: no mutation
            return ConfirmOutcome::Confirmed { reveal };
        }
        ConfirmOutcome::ClaimedElsewhere {
            participant: RosterEntry::from_participant(participant, None),
        }
    }

    /// Forget this device's identity in the event. The claimed slot stays claimed.
    pub async fn release_binding(
        &self,
        event_id: &str,
        device_id: &str,
    ) -> ExchangeResult<ReleasedBinding> {
        self.store.get_event(event_id).await?;
        let released = self
            .store
            .remove(&DeviceScope::new(event_id, device_id))
            .await?;

        if let Some(participant_id) = &released {
            tracing::info!(event_id, participant_id = participant_id.as_str(), "Binding released");
        }
        Ok(ReleasedBinding { released })
    }

    /// Returning-visitor check on page load.
    ///
    /// A binding that no longer points at a claimed slot is dropped.
    pub async fn current_identity(
        &self,
        event_id: &str,
        device_id: &str,
    ) -> ExchangeResult<Option<Reveal>> {
        self.store.get_event(event_id).await?;
        let scope = DeviceScope::new(event_id, device_id);
        let Some(bound) = self.store.get(&scope).await else {
            return Ok(None);
        };

        let participant = match self.store.get_participant(event_id, &bound).await {
            Ok(p) if p.confirmed => p,
            Ok(_) | Err(ExchangeError::NotFound(_)) => {
                tracing::warn!(event_id, participant_id = bound.as_str(), "Dropping stale binding");
                self.store.remove(&scope).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.reveal_for(&participant, false).await.map(Some)
    }
}
