use super::Exchange;
use crate::assignment;
use crate::auth::OrganizerCredential;
use crate::error::{ExchangeError, ExchangeResult};
use crate::protocol::{CreateEventRequest, CreatedEvent, EventPage, EventView, RosterEntry, WishEntry};
use crate::store::RecordStore;
use crate::types::*;
use std::collections::HashSet;

impl Exchange {
    /// Create an event and its roster with recipients already assigned.
    ///
    /// The roster is fixed from here on: nothing adds, removes or reassigns
    /// participants afterwards.
    pub async fn create_event(&self, request: CreateEventRequest) -> ExchangeResult<CreatedEvent> {
        let name = required_field(&request.name, "Event name")?;
        let organizer_name = required_field(&request.organizer_name, "Organizer name")?;
        let password = required_field(&request.organizer_password, "Organizer password")?;

        let names: Vec<String> = request
            .participants
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|n| !seen.insert(n.to_lowercase())) {
            return Err(ExchangeError::InvalidInput(format!(
                "Participant name '{}' appears more than once",
                duplicate
            )));
        }

        if names.len() < self.config.min_participants {
            return Err(ExchangeError::InsufficientParticipants {
                required: self.config.min_participants,
                actual: names.len(),
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let event = Event {
            id: ulid::Ulid::new().to_string(),
            name,
            organizer_name,
            organizer_credential: OrganizerCredential::from_password(&password),
            created_at: now.clone(),
        };

        let ids: Vec<ParticipantId> = names.iter().map(|_| ulid::Ulid::new().to_string()).collect();
        let mut assignment = assignment::assign(&ids)?;

        let participants: Vec<Participant> = ids
            .into_iter()
            .zip(names)
            .map(|(id, name)| Participant {
                recipient: assignment.remove(&id),
                id,
                event_id: event.id.clone(),
                name,
                confirmed: false,
                wish: None,
                created_at: now.clone(),
            })
            .collect();

        self.store
            .create_event(event.clone(), participants.clone())
            .await?;

        tracing::info!(
            event_id = event.id.as_str(),
            roster_size = participants.len(),
            "Event created"
        );

        let mut roster: Vec<RosterEntry> = participants
            .iter()
            .map(|p| RosterEntry::from_participant(p, None))
            .collect();
        roster.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(CreatedEvent {
            event: EventView::from(&event),
            roster,
        })
    }

    /// Event header plus roster, ordered by name, from the perspective of `device_id`
    pub async fn event_page(
        &self,
        event_id: &str,
        device_id: Option<&str>,
    ) -> ExchangeResult<EventPage> {
        let event = self.store.get_event(event_id).await?;
        let participants = self.store.list_participants(event_id).await?;

        let me = match device_id {
            Some(device_id) => self.bound_participant(event_id, device_id).await,
            None => None,
        };

        Ok(EventPage {
            event: EventView::from(&event),
            roster: participants
                .iter()
                .map(|p| RosterEntry::from_participant(p, me.as_deref()))
                .collect(),
        })
    }

    /// Everyone who has written a non-empty wish, ordered by name
    pub async fn wish_list(&self, event_id: &str) -> ExchangeResult<Vec<WishEntry>> {
        self.store.get_event(event_id).await?;
        let participants = self.store.list_participants(event_id).await?;

        Ok(participants
            .iter()
            .filter_map(|p| {
                p.visible_wish().map(|wish| WishEntry {
                    participant_id: p.id.clone(),
                    name: p.name.clone(),
                    wish: wish.to_string(),
                })
            })
            .collect())
    }
}

fn required_field(value: &str, label: &str) -> ExchangeResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ExchangeError::InvalidInput(format!("{} is required", label)));
    }
    Ok(trimmed.to_string())
}
