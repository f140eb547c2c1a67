//! Secret friend assignment
//!
//! Turns a roster of participant IDs into a derangement: every participant
//! gifts exactly one other participant and receives from exactly one.
//! The roster is shuffled and each participant gifts the next one in the
//! shuffled order, wrapping around, which yields a single cycle and can never
//! map anyone to themselves.

use crate::error::{ExchangeError, ExchangeResult};
use crate::types::ParticipantId;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Smallest roster the algorithm can handle. Callers usually enforce more.
pub const MIN_ASSIGNABLE: usize = 2;

/// Upper bound on generate-and-validate rounds before giving up
pub const MAX_ASSIGNMENT_ATTEMPTS: usize = 5;

/// Giver -> recipient
pub type Assignment = HashMap<ParticipantId, ParticipantId>;

/// Assign recipients using the thread-local RNG
pub fn assign(participant_ids: &[ParticipantId]) -> ExchangeResult<Assignment> {
    assign_with_rng(participant_ids, &mut rand::rng())
}

/// Assign recipients using the given random source
pub fn assign_with_rng<R: Rng + ?Sized>(
    participant_ids: &[ParticipantId],
    rng: &mut R,
) -> ExchangeResult<Assignment> {
    ensure_assignable(participant_ids)?;
    generate_validated(participant_ids, MAX_ASSIGNMENT_ATTEMPTS, || {
        shuffled_cycle(participant_ids, rng)
    })
}

fn ensure_assignable(participant_ids: &[ParticipantId]) -> ExchangeResult<()> {
    let unique: HashSet<&str> = participant_ids.iter().map(String::as_str).collect();
    if unique.len() < MIN_ASSIGNABLE {
        return Err(ExchangeError::InsufficientParticipants {
            required: MIN_ASSIGNABLE,
            actual: unique.len(),
        });
    }
    if unique.len() != participant_ids.len() {
        return Err(ExchangeError::AssignmentInvariantViolation(
            "roster contains duplicate participant IDs".to_string(),
        ));
    }
    Ok(())
}

/// Shuffle the roster and link each entry to its successor
fn shuffled_cycle<R: Rng + ?Sized>(participant_ids: &[ParticipantId], rng: &mut R) -> Assignment {
    let mut order = participant_ids.to_vec();
    order.shuffle(rng);

    let n = order.len();
    (0..n)
        .map(|i| (order[i].clone(), order[(i + 1) % n].clone()))
        .collect()
}

/// Run `generate` until it produces a valid assignment, at most `max_attempts` times
fn generate_validated<F>(
    participant_ids: &[ParticipantId],
    max_attempts: usize,
    mut generate: F,
) -> ExchangeResult<Assignment>
where
    F: FnMut() -> Assignment,
{
    for attempt in 1..=max_attempts {
        let assignment = generate();
        match validate_assignment(participant_ids, &assignment) {
            Ok(()) => return Ok(assignment),
            Err(e) => {
                tracing::warn!(attempt, max_attempts, "Discarding invalid assignment: {}", e);
            }
        }
    }

    Err(ExchangeError::AssignmentInvariantViolation(format!(
        "no valid assignment after {} attempts",
        max_attempts
    )))
}

/// Check that `assignment` is a total bijection over `participant_ids` without fixed points
pub fn validate_assignment(
    participant_ids: &[ParticipantId],
    assignment: &Assignment,
) -> ExchangeResult<()> {
    if assignment.len() != participant_ids.len() {
        return Err(ExchangeError::AssignmentInvariantViolation(format!(
            "expected {} givers, found {}",
            participant_ids.len(),
            assignment.len()
        )));
    }

    let mut recipients = HashSet::with_capacity(participant_ids.len());
    for id in participant_ids {
        let recipient = assignment.get(id).ok_or_else(|| {
            ExchangeError::AssignmentInvariantViolation(format!("{} has no recipient", id))
        })?;
        if recipient == id {
            return Err(ExchangeError::AssignmentInvariantViolation(format!(
                "{} is assigned to themselves",
                id
            )));
        }
        if !recipients.insert(recipient.as_str()) {
            return Err(ExchangeError::AssignmentInvariantViolation(format!(
                "{} is the recipient of more than one participant",
                recipient
            )));
        }
    }

    let roster: HashSet<&str> = participant_ids.iter().map(String::as_str).collect();
    if let Some(stranger) = recipients.iter().find(|r| !roster.contains(*r)) {
        return Err(ExchangeError::AssignmentInvariantViolation(format!(
            "{} is not on the roster",
            stranger
        )));
    }

    Ok(())
}
