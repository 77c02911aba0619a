//! Errors surfaced by the credential endpoints.
use thiserror::Error;

/// An error related to issuing or showing credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A caller-supplied argument was malformed: colliding attribute
    /// indices, an unknown subscription, or an attribute index outside the
    /// key's range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A zero-knowledge proof failed to verify.
    #[error("proof rejected")]
    ProofRejected,
    /// A signature failed to verify, including the degenerate bases with an
    /// identity first component.
    #[error("invalid signature")]
    SignatureInvalid,
    /// A group or field invariant was violated. Reaching this indicates a
    /// bug rather than bad input.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}
