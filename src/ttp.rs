//! The trusted parameter generator for Beaver triples.
//!
//! Multiplying two secret-shared values consumes a triple (a, b, c) with
//! c = a * b, itself secret-shared so that no party learns the underlying
//! values. This module supports the trusted-dealer way of producing them: a
//! third party samples the triple, splits each component into additive
//! shares, and hands every participant its slice. The dealer is trusted to
//! forget the values it generated.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rand_core::OsRng;

use crate::expr::TripleId;
use crate::field::{share_secret, Share, MODULUS};
use crate::participants::ParticipantList;
use crate::protocol::{InitializationError, Participant, ProtocolError};

/// Represents one party's slice of a Beaver triple.
///
/// i.e. we have a share of a, b, and c such that a * b = c.
#[derive(Debug, Clone, Copy)]
pub struct TripleShare {
    pub a: Share,
    pub b: Share,
    pub c: Share,
}

/// A source of Beaver triple shares, keyed by multiplication node.
///
/// The evaluator pulls its shares through this trait, so it does not care
/// whether the dealer lives in the same process or behind a transport.
pub trait TripleSource: Send + Sync {
    /// Take this party's share of the triple for one multiplication.
    ///
    /// Every key is served exactly once: a triple is a one-time value, and
    /// asking twice means the circuit tried to reuse one, which is a fatal
    /// programmer error.
    fn take_triple_shares(
        &self,
        requester: Participant,
        id: TripleId,
    ) -> Result<TripleShare, ProtocolError>;
}

#[derive(Debug, Default)]
struct DealerState {
    shares: HashMap<(Participant, TripleId), TripleShare>,
    generated: HashSet<TripleId>,
}

/// A trusted third party dealing Beaver triples on demand.
///
/// The first request for a multiplication id generates shares for every
/// participant; later requests only ever hand out the slice belonging to the
/// requester. The dealer keeps no record of a, b, or c themselves.
#[derive(Debug)]
pub struct TrustedDealer {
    participants: ParticipantList,
    state: Mutex<DealerState>,
}

impl TrustedDealer {
    /// Create a dealer for a fixed set of participants.
    pub fn new(participants: &[Participant]) -> Result<Self, InitializationError> {
        let participants = ParticipantList::new(participants).ok_or_else(|| {
            InitializationError::BadParameters(
                "participant list cannot contain duplicates".to_string(),
            )
        })?;
        Ok(Self {
            participants,
            state: Mutex::new(DealerState::default()),
        })
    }

    fn generate(&self, state: &mut DealerState, id: TripleId) {
        let a = Share::random(&mut OsRng).residue();
        let b = Share::random(&mut OsRng).residue();
        let c = (a * b) % MODULUS;

        let n = self.participants.len();
        let a_shares = share_secret(&mut OsRng, a, n);
        let b_shares = share_secret(&mut OsRng, b, n);
        let c_shares = share_secret(&mut OsRng, c, n);

        for (i, p) in self.participants.iter().enumerate() {
            state.shares.insert(
                (p, id),
                TripleShare {
                    a: a_shares[i],
                    b: b_shares[i],
                    c: c_shares[i],
                },
            );
        }
        state.generated.insert(id);
    }
}

impl TripleSource for TrustedDealer {
    fn take_triple_shares(
        &self,
        requester: Participant,
        id: TripleId,
    ) -> Result<TripleShare, ProtocolError> {
        if !self.participants.contains(requester) {
            return Err(ProtocolError::TripleUnavailable(format!(
                "unknown participant {:?} requested a triple",
                requester
            )));
        }
        let mut state = self.state.lock().expect("dealer state poisoned");
        if !state.generated.contains(&id) {
            self.generate(&mut state, id);
        }
        state.shares.remove(&(requester, id)).ok_or_else(|| {
            ProtocolError::TripleUnavailable(format!(
                "triple {:?} already consumed by {:?}",
                id, requester
            ))
        })
    }
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::expr::{Circuit, Expression, Secret};
    use crate::field::reconstruct_secret;

    fn some_triple_id() -> TripleId {
        let expr = Expression::from(Secret::new()) * Expression::from(Secret::new());
        let op = expr.mul_ops()[0];
        Circuit::new(&mut OsRng, expr).triple_id(op)
    }

    #[test]
    fn test_dealt_triples_multiply() {
        let participants: Vec<Participant> = (0..3).map(Participant::from).collect();
        let dealer = TrustedDealer::new(&participants).unwrap();
        let id = some_triple_id();

        let shares: Vec<TripleShare> = participants
            .iter()
            .map(|&p| dealer.take_triple_shares(p, id).unwrap())
            .collect();

        let a = reconstruct_secret(&shares.iter().map(|t| t.a).collect::<Vec<_>>());
        let b = reconstruct_secret(&shares.iter().map(|t| t.b).collect::<Vec<_>>());
        let c = reconstruct_secret(&shares.iter().map(|t| t.c).collect::<Vec<_>>());
        assert_eq!((a * b) % MODULUS, c);
    }

    #[test]
    fn test_triples_are_served_once() {
        let participants: Vec<Participant> = (0..2).map(Participant::from).collect();
        let dealer = TrustedDealer::new(&participants).unwrap();
        let id = some_triple_id();

        assert!(dealer.take_triple_shares(participants[0], id).is_ok());
        assert!(dealer.take_triple_shares(participants[0], id).is_err());
        // The other participant still gets its slice of the same triple.
        assert!(dealer.take_triple_shares(participants[1], id).is_ok());
    }

    #[test]
    fn test_unknown_participant_is_rejected() {
        let participants: Vec<Participant> = (0..2).map(Participant::from).collect();
        let dealer = TrustedDealer::new(&participants).unwrap();
        assert!(dealer
            .take_triple_shares(Participant::from(9u32), some_triple_id())
            .is_err());
    }
}
