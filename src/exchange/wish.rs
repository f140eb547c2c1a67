use super::Exchange;
use crate::error::{ExchangeError, ExchangeResult};
use crate::protocol::RosterEntry;
use crate::store::{RecordStore, UpdateOutcome};
use crate::types::*;

impl Exchange {
    /// Overwrite the wish of the participant this device has claimed.
    ///
    /// The text is trimmed; an empty wish clears it. Last write wins.
    pub async fn set_wish(
        &self,
        event_id: &str,
        device_id: &str,
        participant_id: &str,
        text: &str,
    ) -> ExchangeResult<RosterEntry> {
        let participant = self.store.get_participant(event_id, participant_id).await?;

        if self.bound_participant(event_id, device_id).await.as_deref() != Some(participant.id.as_str()) {
            tracing::warn!(event_id, participant_id, "Wish update from non-owner rejected");
            return Err(ExchangeError::NotOwner(participant.id));
        }

        let updated = match self
            .store
            .update_participant(&participant.id, ParticipantPatch::wish(text.trim().to_string()), None)
            .await?
        {
            UpdateOutcome::Applied(p) => p,
            // No precondition was given
            UpdateOutcome::PreconditionFailed(p) => p,
        };

        tracing::info!(event_id, participant_id, "Wish updated");
        Ok(RosterEntry::from_participant(&updated, Some(updated.id.as_str())))
    }
}
