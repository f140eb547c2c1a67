use super::Exchange;
use crate::error::{ExchangeError, ExchangeResult};
use crate::protocol::{EventView, ExchangeStats, OrganizerEntry, OrganizerOverview};
use crate::store::RecordStore;
use std::collections::HashMap;

impl Exchange {
    /// Check a presented organizer password against the event's credential
    pub async fn verify_organizer(&self, event_id: &str, password: &str) -> ExchangeResult<bool> {
        let event = self.store.get_event(event_id).await?;
        Ok(event.organizer_credential.verify(password))
    }

    /// Everything the organizer page shows: status of every slot, wishes, and
    /// the recipient of each participant that has already confirmed.
    pub async fn organizer_overview(
        &self,
        event_id: &str,
        password: &str,
    ) -> ExchangeResult<OrganizerOverview> {
        let event = self.store.get_event(event_id).await?;
        if !event.organizer_credential.verify(password) {
            tracing::warn!(event_id, "Organizer credential rejected");
            return Err(ExchangeError::InvalidCredential);
        }

        let participants = self.store.list_participants(event_id).await?;
        let names: HashMap<&str, &str> = participants
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()))
            .collect();

        let mut stats = ExchangeStats::default();
        let entries = participants
            .iter()
            .map(|p| {
                if p.confirmed {
                    stats.confirmed += 1;
                } else {
                    stats.pending += 1;
                }
                if p.visible_wish().is_some() {
                    stats.with_wish += 1;
                }

                let recipient_name = p
                    .recipient
                    .as_deref()
                    .filter(|_| p.confirmed)
                    .and_then(|id| names.get(id))
                    .map(|name| name.to_string());

                OrganizerEntry {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    state: p.claim_state(),
                    recipient_name,
                    wish: p.visible_wish().map(str::to_string),
                }
            })
            .collect();

        Ok(OrganizerOverview {
            event: EventView::from(&event),
            participants: entries,
            stats,
        })
    }
}
