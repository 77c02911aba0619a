//! The interface between an evaluating party and whatever drives it.
//!
//! A party in a joint evaluation is a state machine: it hands out shares of
//! its inputs, waits on shares and Beaver openings from its peers, and
//! eventually produces the reconstructed result. None of that requires the
//! party to own a socket. This module defines the party's entire contract
//! with the outside world: deliver bytes in, poke it, and carry out the
//! actions it asks for. How many rounds the evaluation has, which message
//! belongs to which multiplication, and how shares are encoded are all
//! internal matters.
use core::fmt;
use std::{collections::HashMap, error};

use ::serde::Serialize;

/// An error which can happen while evaluating a circuit.
#[derive(Debug)]
pub enum ProtocolError {
    /// A peer's message did not decode as the share data its label promised.
    ///
    /// Under the honest-but-curious model this means a broken transport or a
    /// mismatched circuit, not an attack.
    MalformedMessage(Box<dyn error::Error + Send + Sync>),
    /// The dealer could not serve a Beaver triple: the requester is unknown,
    /// or this (run, multiplication) key was already consumed.
    ///
    /// Triples are one-shot values, so a repeat request means the same
    /// circuit run tried to multiply through the same node twice.
    TripleUnavailable(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MalformedMessage(e) => write!(f, "malformed message: {}", e),
            ProtocolError::TripleUnavailable(e) => write!(f, "beaver triple unavailable: {}", e),
        }
    }
}

impl error::Error for ProtocolError {}

impl From<Box<dyn error::Error + Send + Sync>> for ProtocolError {
    fn from(e: Box<dyn error::Error + Send + Sync>) -> Self {
        Self::MalformedMessage(e)
    }
}

/// An error raised before an evaluation even starts.
///
/// These come from inconsistent setup — too few parties, duplicated ids, an
/// evaluator that isn't in its own participant list — and are recoverable by
/// fixing the arguments, unlike a [`ProtocolError`] mid-run.
#[derive(Debug)]
pub enum InitializationError {
    BadParameters(String),
}

impl fmt::Display for InitializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitializationError::BadParameters(s) => write!(f, "bad parameters: {}", s),
        }
    }
}

impl error::Error for InitializationError {}

/// One party of an evaluation, identified by a small integer.
///
/// The ids themselves carry no meaning beyond identity and order: the party
/// with the lowest id in a run is the designated one that carries public
/// constants and the Beaver cross term, so every participant must agree on
/// the full id set before evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Hash)]
pub struct Participant(u32);

impl Participant {
    /// Return this participant as little endian bytes, for message tags.
    pub fn bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<Participant> for u32 {
    fn from(p: Participant) -> Self {
        p.0
    }
}

impl From<u32> for Participant {
    fn from(x: u32) -> Self {
        Participant(x)
    }
}

/// The data making up a message.
///
/// Shares and openings cross the boundary as opaque bytes; the routing tag
/// and the encoding are both handled inside the party.
pub type MessageData = Vec<u8>;

/// What a party wants the driver to do next.
///
/// Private sends carry input shares to their recipients; broadcasts carry
/// Beaver openings and final result shares, which every peer needs. A party
/// that has nothing to say is waiting on a message, and a party that has
/// reconstructed the result returns it.
#[derive(Debug, Clone)]
pub enum Action<T> {
    /// Nothing can happen until a new message arrives.
    Wait,
    /// Deliver this message to every other participant.
    ///
    /// A party never sends messages to itself; it already accounted for its
    /// own share locally.
    SendMany(MessageData),
    /// Deliver this message to one participant only.
    ///
    /// Input shares travel this way, and anyone else learning them breaks
    /// the hiding of the sharing, so a real transport must keep these
    /// confidential.
    SendPrivate(Participant, MessageData),
    /// The evaluation finished with this result.
    Return(T),
}

/// The behavior of a single evaluating party.
///
/// Progress is driven entirely from outside: feed in messages as they
/// arrive, and poke the party to collect its next action. Poking is cheap
/// and idempotent once the party is waiting, so a driver can poke after
/// every delivery without bookkeeping about rounds.
pub trait Protocol {
    type Output;

    /// Advance the party as far as it can go, returning its next action.
    ///
    /// Keep poking until this returns [`Action::Wait`], an error, or the
    /// final [`Action::Return`]; a waiting party will not move again until
    /// [`Protocol::message`] hands it something new.
    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;

    /// Deliver a message from another party.
    fn message(&mut self, from: Participant, data: MessageData);
}

/// Drive a set of parties to completion in a single process.
///
/// Parties are poked round-robin, with each one's sends delivered before
/// moving on; since retrievals only block on messages a peer sends
/// unconditionally, this schedule always makes progress. Tests and local
/// deployments use this directly; a networked deployment replaces it with a
/// transport doing the same deliveries.
pub fn run_protocol<T>(
    mut parties: Vec<(Participant, Box<dyn Protocol<Output = T>>)>,
) -> Result<Vec<(Participant, T)>, ProtocolError> {
    let indices: HashMap<Participant, usize> = parties
        .iter()
        .enumerate()
        .map(|(i, (p, _))| (*p, i))
        .collect();

    let mut results = Vec::with_capacity(parties.len());
    while results.len() < parties.len() {
        for i in 0..parties.len() {
            let from = parties[i].0;
            loop {
                match parties[i].1.poke()? {
                    Action::Wait => break,
                    Action::Return(value) => {
                        results.push((from, value));
                        break;
                    }
                    Action::SendMany(m) => {
                        for j in 0..parties.len() {
                            if j != i {
                                parties[j].1.message(from, m.clone());
                            }
                        }
                    }
                    Action::SendPrivate(to, m) => {
                        parties[indices[&to]].1.message(from, m);
                    }
                }
            }
        }
    }

    Ok(results)
}

pub(crate) mod internal;
