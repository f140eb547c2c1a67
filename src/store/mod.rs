//! Storage seams for the exchange.
//!
//! `RecordStore` is the durable arbiter of events and participants.
//! `DeviceStore` remembers which participant a device has claimed in an event.
//! Both live behind one `Store` so that a claim and its binding land in the
//! same write.

mod memory;
pub mod snapshot;

use async_trait::async_trait;

use crate::error::ExchangeResult;
use crate::types::*;

pub use memory::MemoryStore;

/// Result of a conditional participant update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Patch applied; carries the updated record
    Applied(Participant),
    /// The `confirmed` precondition did not hold; carries the record as found
    PreconditionFailed(Participant),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create an event together with its whole roster. Either everything is
    /// stored or nothing is.
    async fn create_event(&self, event: Event, participants: Vec<Participant>)
        -> ExchangeResult<()>;

    async fn get_event(&self, id: &str) -> ExchangeResult<Event>;

    /// Participants of an event ordered by display name
    async fn list_participants(&self, event_id: &str) -> ExchangeResult<Vec<Participant>>;

    async fn get_participant(&self, event_id: &str, id: &str) -> ExchangeResult<Participant>;

    /// Apply `patch` to a participant.
    ///
    /// When `expect_confirmed` is set, the patch is applied only if the
    /// participant's current `confirmed` value equals it; the check and the
    /// write happen atomically with respect to other updates. A patch that
    /// binds a device fails with `AlreadyBound` if that device already holds
    /// another participant. On error nothing is changed.
    async fn update_participant(
        &self,
        id: &str,
        patch: ParticipantPatch,
        expect_confirmed: Option<bool>,
    ) -> ExchangeResult<UpdateOutcome>;
}

/// Device bindings. They are created by claim patches on the record store.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, scope: &DeviceScope) -> Option<ParticipantId>;

    /// Forget the binding, returning what it pointed at
    async fn remove(&self, scope: &DeviceScope) -> ExchangeResult<Option<ParticipantId>>;
}

/// Everything the exchange needs from storage
pub trait Store: RecordStore + DeviceStore {}

impl<T: RecordStore + DeviceStore> Store for T {}
