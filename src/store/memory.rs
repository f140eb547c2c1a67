use super::snapshot::{DeviceBinding, StoreSnapshot};
use super::{DeviceStore, RecordStore, UpdateOutcome};
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct Records {
    events: HashMap<EventId, Event>,
    participants: HashMap<ParticipantId, Participant>,
    bindings: HashMap<DeviceScope, ParticipantId>,
}

impl Records {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let bindings = snapshot
            .bindings
            .into_iter()
            .map(|b| (DeviceScope::new(b.event_id, b.device_id), b.participant_id))
            .collect();
        Self {
            events: snapshot.events,
            participants: snapshot.participants,
            bindings,
        }
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        let bindings = self
            .bindings
            .iter()
            .map(|(scope, participant_id)| DeviceBinding {
                event_id: scope.event_id.clone(),
                device_id: scope.device_id.clone(),
                participant_id: participant_id.clone(),
            })
            .collect();
        StoreSnapshot::new(self.events.clone(), self.participants.clone(), bindings)
    }
}

/// Outcome of a staged mutation
enum Staged<T> {
    /// The records changed and must be written out
    Changed(T),
    Unchanged(T),
}

/// Record and binding store held in process memory, optionally mirrored to a
/// JSON file.
///
/// With a file attached every write is staged on a copy, persisted, and only
/// then made visible. A failed write leaves memory exactly as it was.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Records>>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store mirrored to `path`, loading the existing snapshot if there is one
    pub async fn with_persistence(path: impl Into<PathBuf>) -> ExchangeResult<Self> {
        let path = path.into();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    ExchangeError::Storage(format!("{}: {}", path.display(), e))
                })?;
                snapshot.validate().map_err(ExchangeError::Storage)?;
                tracing::info!(
                    path = %path.display(),
                    events = snapshot.events.len(),
                    bindings = snapshot.bindings.len(),
                    "Loaded snapshot"
                );
                Records::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No snapshot yet, starting empty");
                Records::default()
            }
            Err(e) => {
                return Err(ExchangeError::Storage(format!("{}: {}", path.display(), e)));
            }
        };

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            persist_path: Some(path),
        })
    }

    /// Run `mutate` against the records under the write lock.
    ///
    /// Errors from `mutate` must leave the records untouched when no file is
    /// attached; with a file the mutation runs on a copy anyway.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut Records) -> ExchangeResult<Staged<T>>,
    ) -> ExchangeResult<T> {
        let mut records = self.records.write().await;

        let Some(path) = &self.persist_path else {
            return match mutate(&mut *records)? {
                Staged::Changed(value) | Staged::Unchanged(value) => Ok(value),
            };
        };

        let mut staged = records.clone();
        match mutate(&mut staged)? {
            Staged::Unchanged(value) => Ok(value),
            Staged::Changed(value) => {
                write_snapshot(path, &staged.to_snapshot()).await?;
                *records = staged;
                Ok(value)
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn event_count(&self) -> usize {
        self.records.read().await.events.len()
    }
}

async fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> ExchangeResult<()> {
    let json =
        serde_json::to_vec_pretty(snapshot).map_err(|e| ExchangeError::Storage(e.to_string()))?;
    tokio::fs::write(path, json).await.map_err(|e| {
        tracing::error!(path = %path.display(), "Failed to persist snapshot: {}", e);
        ExchangeError::Storage(format!("{}: {}", path.display(), e))
    })
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_event(
        &self,
        event: Event,
        participants: Vec<Participant>,
    ) -> ExchangeResult<()> {
        self.commit(|records| {
            if records.events.contains_key(&event.id) {
                return Err(ExchangeError::InvalidInput(format!(
                    "Event {} already exists",
                    event.id
                )));
            }
            // Check the whole roster before inserting anything
            for p in &participants {
                if p.event_id != event.id {
                    return Err(ExchangeError::InvalidInput(format!(
                        "Participant {} belongs to event {}",
                        p.id, p.event_id
                    )));
                }
                if records.participants.contains_key(&p.id) {
                    return Err(ExchangeError::InvalidInput(format!(
                        "Participant {} already exists",
                        p.id
                    )));
                }
            }

            records.events.insert(event.id.clone(), event);
            for p in participants {
                records.participants.insert(p.id.clone(), p);
            }
            Ok(Staged::Changed(()))
        })
        .await
    }

    async fn get_event(&self, id: &str) -> ExchangeResult<Event> {
        self.records
            .read()
            .await
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| ExchangeError::event_not_found(id))
    }

    async fn list_participants(&self, event_id: &str) -> ExchangeResult<Vec<Participant>> {
        let records = self.records.read().await;
        if !records.events.contains_key(event_id) {
            return Err(ExchangeError::event_not_found(event_id));
        }

        let mut list: Vec<Participant> = records
            .participants
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn get_participant(&self, event_id: &str, id: &str) -> ExchangeResult<Participant> {
        self.records
            .read()
            .await
            .participants
            .get(id)
            .filter(|p| p.event_id == event_id)
            .cloned()
            .ok_or_else(|| ExchangeError::participant_not_found(id))
    }

    async fn update_participant(
        &self,
        id: &str,
        mut patch: ParticipantPatch,
        expect_confirmed: Option<bool>,
    ) -> ExchangeResult<UpdateOutcome> {
        // Check and write under one lock: this is where concurrent claims serialize
        self.commit(|records| {
            let participant = records
                .participants
                .get(id)
                .ok_or_else(|| ExchangeError::participant_not_found(id))?;

            if let Some(expected) = expect_confirmed {
                if participant.confirmed != expected {
                    return Ok(Staged::Unchanged(UpdateOutcome::PreconditionFailed(
                        participant.clone(),
                    )));
                }
            }

            let bind = patch.bind_device.take();
            if let Some(scope) = &bind {
                if scope.event_id != participant.event_id {
                    return Err(ExchangeError::InvalidInput(format!(
                        "Participant {} is not part of event {}",
                        id, scope.event_id
                    )));
                }
                if let Some(bound) = records.bindings.get(scope) {
                    if bound != id {
                        return Err(ExchangeError::AlreadyBound {
                            bound_to: bound.clone(),
                        });
                    }
                }
            }

            let participant = records
                .participants
                .get_mut(id)
                .ok_or_else(|| ExchangeError::participant_not_found(id))?;
            patch.apply(participant);
            let updated = participant.clone();

            if let Some(scope) = bind {
                records.bindings.insert(scope, updated.id.clone());
            }
            Ok(Staged::Changed(UpdateOutcome::Applied(updated)))
        })
        .await
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get(&self, scope: &DeviceScope) -> Option<ParticipantId> {
        self.records.read().await.bindings.get(scope).cloned()
    }

    async fn remove(&self, scope: &DeviceScope) -> ExchangeResult<Option<ParticipantId>> {
        self.commit(|records| {
            Ok(match records.bindings.remove(scope) {
                Some(participant_id) => Staged::Changed(Some(participant_id)),
                None => Staged::Unchanged(None),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OrganizerCredential;

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            name: "Natal".to_string(),
            organizer_name: "Org".to_string(),
            organizer_credential: OrganizerCredential::from_password("pw"),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn participant(id: &str, name: &str, recipient: &str) -> Participant {
        Participant {
            id: id.to_string(),
            event_id: "e1".to_string(),
            name: name.to_string(),
            recipient: Some(recipient.to_string()),
            confirmed: false,
            wish: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn roster() -> Vec<Participant> {
        vec![
            participant("p3", "Caio", "p1"),
            participant("p1", "Ana", "p2"),
            participant("p2", "Bruno", "p3"),
        ]
    }

    fn confirmed() -> ParticipantPatch {
        ParticipantPatch {
            confirmed: Some(true),
            ..ParticipantPatch::default()
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_event(event("e1"), roster()).await.unwrap();
        store
    }

    /// Store mirrored to a file that can no longer be written
    async fn store_with_broken_disk(dir: &tempfile::TempDir) -> MemoryStore {
        let path = dir.path().join("snapshot.json");
        let store = MemoryStore::with_persistence(path.clone()).await.unwrap();
        store.create_event(event("e1"), roster()).await.unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_get_missing_event() {
        let store = MemoryStore::new();
        let err = store.get_event("nope").await.unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_participants_ordered_by_name() {
        let store = seeded_store().await;
        let names: Vec<String> = store
            .list_participants("e1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Bruno", "Caio"]);
    }

    #[tokio::test]
    async fn test_roster_must_belong_to_event() {
        let store = MemoryStore::new();
        let mut stray = participant("p1", "Ana", "p2");
        stray.event_id = "other".to_string();

        let err = store
            .create_event(event("e1"), vec![stray])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidInput(_)));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_event_is_rejected() {
        let store = seeded_store().await;
        let err = store.create_event(event("e1"), vec![]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_get_participant_is_scoped_to_event() {
        let store = seeded_store().await;
        assert!(store.get_participant("e1", "p1").await.is_ok());
        assert!(store.get_participant("other", "p1").await.is_err());
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        let store = seeded_store().await;

        let first = store
            .update_participant("p1", confirmed(), Some(false))
            .await
            .unwrap();
        assert!(matches!(first, UpdateOutcome::Applied(ref p) if p.confirmed));

        let second = store
            .update_participant("p1", confirmed(), Some(false))
            .await
            .unwrap();
        assert!(matches!(second, UpdateOutcome::PreconditionFailed(ref p) if p.confirmed));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = seeded_store().await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let patch = ParticipantPatch::claim(DeviceScope::new("e1", format!("d{}", i)));
                    store.update_participant("p2", patch, Some(false)).await.unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), UpdateOutcome::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let mut bound = 0;
        for i in 0..16 {
            if store.get(&DeviceScope::new("e1", format!("d{}", i))).await.is_some() {
                bound += 1;
            }
        }
        assert_eq!(bound, 1);
    }

    #[tokio::test]
    async fn test_claim_binds_device() {
        let store = seeded_store().await;
        let phone = DeviceScope::new("e1", "phone");

        store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap();
        assert_eq!(store.get(&phone).await.as_deref(), Some("p1"));
        assert!(store.get(&DeviceScope::new("e1", "laptop")).await.is_none());
        assert!(store.get(&DeviceScope::new("e2", "phone")).await.is_none());
    }

    #[tokio::test]
    async fn test_claim_refuses_second_binding() {
        let store = seeded_store().await;
        let phone = DeviceScope::new("e1", "phone");
        store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap();

        let err = store
            .update_participant("p2", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExchangeError::AlreadyBound {
                bound_to: "p1".to_string()
            }
        );
        assert!(!store.get_participant("e1", "p2").await.unwrap().confirmed);
        assert_eq!(store.get(&phone).await.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_claim_scope_must_match_event() {
        let store = seeded_store().await;
        let err = store
            .update_participant(
                "p1",
                ParticipantPatch::claim(DeviceScope::new("e2", "phone")),
                Some(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidInput(_)));
        assert!(!store.get_participant("e1", "p1").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_remove_binding() {
        let store = seeded_store().await;
        let phone = DeviceScope::new("e1", "phone");
        store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap();

        assert_eq!(store.remove(&phone).await.unwrap().as_deref(), Some("p1"));
        assert!(store.get(&phone).await.is_none());
        assert!(store.remove(&phone).await.unwrap().is_none());
        // The slot stays claimed
        assert!(store.get_participant("e1", "p1").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_confirm_patch_never_resets() {
        let store = seeded_store().await;
        store.update_participant("p1", confirmed(), None).await.unwrap();

        let patch = ParticipantPatch {
            confirmed: Some(false),
            ..ParticipantPatch::default()
        };
        let outcome = store.update_participant("p1", patch, None).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied(ref p) if p.confirmed));
    }

    #[tokio::test]
    async fn test_blind_wish_update_keeps_recipient() {
        let store = seeded_store().await;
        store
            .update_participant("p3", ParticipantPatch::wish("livros".to_string()), None)
            .await
            .unwrap();

        let p = store.get_participant("e1", "p3").await.unwrap();
        assert_eq!(p.wish.as_deref(), Some("livros"));
        assert_eq!(p.recipient.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_update_missing_participant() {
        let store = seeded_store().await;
        let err = store
            .update_participant("ghost", confirmed(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let store = MemoryStore::with_persistence(path.clone()).await.unwrap();
        store
            .create_event(
                event("e1"),
                vec![
                    participant("p1", "Ana", "p2"),
                    participant("p2", "Bruno", "p1"),
                ],
            )
            .await
            .unwrap();
        let phone = DeviceScope::new("e1", "phone");
        store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap();

        let reloaded = MemoryStore::with_persistence(path.clone()).await.unwrap();
        let p1 = reloaded.get_participant("e1", "p1").await.unwrap();
        assert!(p1.confirmed);
        assert_eq!(p1.recipient.as_deref(), Some("p2"));
        assert_eq!(reloaded.list_participants("e1").await.unwrap().len(), 2);
        assert_eq!(reloaded.get(&phone).await.as_deref(), Some("p1"));

        // Released bindings stay released after a reload
        reloaded.remove(&phone).await.unwrap();
        let again = MemoryStore::with_persistence(path).await.unwrap();
        assert!(again.get(&phone).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = MemoryStore::with_persistence(path.clone()).await;
        assert!(matches!(result, Err(ExchangeError::Storage(_))));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_claim_unapplied() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_broken_disk(&dir).await;
        let phone = DeviceScope::new("e1", "phone");

        let err = store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Storage(_)));

        assert!(!store.get_participant("e1", "p1").await.unwrap().confirmed);
        assert!(store.get(&phone).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_broken_disk(&dir).await;
        let mut other = participant("q1", "Duda", "q2");
        other.event_id = "e2".to_string();

        let err = store.create_event(event("e2"), vec![other]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Storage(_)));

        assert!(matches!(
            store.get_event("e2").await,
            Err(ExchangeError::NotFound(_))
        ));
        assert!(store.get_participant("e2", "q1").await.is_err());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = MemoryStore::with_persistence(path.clone()).await.unwrap();
        store.create_event(event("e1"), roster()).await.unwrap();
        let phone = DeviceScope::new("e1", "phone");
        store
            .update_participant("p1", ParticipantPatch::claim(phone.clone()), Some(false))
            .await
            .unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        assert!(store.remove(&phone).await.is_err());
        assert_eq!(store.get(&phone).await.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_precondition_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = MemoryStore::with_persistence(path.clone()).await.unwrap();
        store.create_event(event("e1"), roster()).await.unwrap();
        store.update_participant("p1", confirmed(), Some(false)).await.unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        // No change, so no write is attempted
        let outcome = store
            .update_participant("p1", confirmed(), Some(false))
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::PreconditionFailed(_)));
    }
}
