//! Utilities for working with the set of parties in an evaluation.
//!
//! Protocols constantly need to answer questions like "who is the designated
//! party" or "what is everybody but me". This module provides a small data
//! structure for that.
use std::collections::HashMap;

use crate::protocol::Participant;

/// A sorted, duplicate-free list of participants.
///
/// Sorting gives every party the same view of the ordering, which is what
/// makes "the first participant" a meaningful designation.
#[derive(Debug, Clone)]
pub struct ParticipantList {
    participants: Vec<Participant>,
    /// This maps each participant to their index in the vector above.
    indices: HashMap<Participant, usize>,
}

impl ParticipantList {
    /// Create a participant list from a slice of participants.
    ///
    /// This will return None if the participants have duplicates.
    pub fn new(participants: &[Participant]) -> Option<Self> {
        let mut out = participants.to_owned();
        out.sort();

        let indices: HashMap<_, _> = out.iter().enumerate().map(|(i, x)| (*x, i)).collect();

        if indices.len() < out.len() {
            return None;
        }

        Some(Self {
            participants: out,
            indices,
        })
    }

    /// The number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Check if this list contains a given participant.
    pub fn contains(&self, participant: Participant) -> bool {
        self.indices.contains_key(&participant)
    }

    /// The designated participant: the lowest one in the sorted order.
    ///
    /// This is the party that carries public constants in an additive
    /// sharing, and the one that applies the cross term in a Beaver
    /// multiplication.
    pub fn designated(&self) -> Participant {
        self.participants[0]
    }

    /// Iterate over all participants, in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = Participant> + '_ {
        self.participants.iter().copied()
    }

    /// Iterate over all participants except one, in sorted order.
    pub fn others(&self, me: Participant) -> impl Iterator<Item = Participant> + '_ {
        self.participants.iter().copied().filter(move |&p| p != me)
    }
}
