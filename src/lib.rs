//! Saunter implements the two cryptographic cores of a privacy-preserving
//! location service: a small-field MPC engine over additive secret shares,
//! and Pointcheval-Sanders anonymous credentials with blind issuance and
//! unlinkable selective disclosure.
//!
//! # Warning
//!
//! This is experimental cryptographic software. The protocols have not
//! undergone any form of audit.
//!
//! # The MPC engine
//!
//! Mutually distrustful parties jointly evaluate an arithmetic expression
//! over their private inputs, learning the result and nothing else. Each
//! secret is split into n additive shares mod a small power-of-two modulus;
//! addition and subtraction are local, and multiplications consume Beaver
//! triples handed out by a trusted dealer. The adversary model is
//! honest-but-curious: parties follow the protocol but may pool what they
//! see, and any n - 1 of them together still learn nothing about the
//! remaining party's inputs.
//!
//! A party is driven through a deliberately small interface:
//!
//! ```ignore
//! pub trait Protocol {
//!    type Output;
//!
//!    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;
//!    fn message(&mut self, from: Participant, data: MessageData);
//! }
//! ```
//!
//! You feed it messages from the other parties, and poke it to learn what it
//! wants to do next: send a broadcast, send a private message, wait, or
//! finish with the result. Rounds, routing, and serialization are all
//! handled internally; [`protocol::run_protocol`] drives a whole set of
//! parties in one process.
//!
//! # The credential scheme
//!
//! A server signs attribute vectors; slot 0 holds a secret only the user
//! knows, the remaining slots hold subscription flags. Issuance is blind:
//! the user commits to their secret and proves knowledge of the opening, so
//! the server signs a value it never sees. A showing re-randomizes the
//! signature and discloses a chosen subset of attributes, binding the
//! request message into the proof. Showings of the same credential are
//! unlinkable, to the server and to each other.
//!
//! The [`service`] module assembles both halves of that exchange into a
//! registration and location-query flow.
//!
//! Randomness matters everywhere here: triples, blinding factors, and
//! showing randomizers are one-shot values, and every operation draws fresh
//! ones from the caller's RNG.
mod bilinear;
mod error;
mod evaluate;
mod expr;
mod field;
mod issuance;
mod participants;
pub mod protocol;
mod ps;
mod serde;
pub mod service;
mod showing;
mod ttp;

pub use bilinear::hash_to_scalar;
pub use error::Error;
pub use evaluate::evaluate;
pub use expr::{Circuit, Expression, OpId, RunId, Secret, SecretId, TripleId};
pub use field::{reconstruct_secret, share_secret, Share, MODULUS, MODULUS_BITS};
pub use issuance::{
    create_issue_request, obtain_credential, sign_issue_request, BlindSignature, Credential,
    IssueRequest, OpeningProof, RequestState,
};
pub use ps::{keygen, sign, verify, Attribute, AttributeMap, PublicKey, SecretKey, Signature};
pub use showing::{create_disclosure_proof, verify_disclosure_proof, DisclosureProof};
pub use ttp::{TripleShare, TripleSource, TrustedDealer};
