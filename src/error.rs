//! The error taxonomy shared by every part of the engine.
//!
//! Every variant aborts the current computation, none of them are retried internally. Callers
//! can match on the variant to tell a cheating peer apart from missing preprocessing material or
//! a dead network.

use std::fmt;

use crate::{channel, ot::OtError};

/// Preprocessed material that a [`crate::preprocessing::DataSupplier`] hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A multiplication triple.
    Triple,
    /// An input mask for the given input party.
    InputMask(usize),
    /// A random shared bit.
    Bit,
    /// A random shared field element.
    RandomElement,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Triple => f.write_str("multiplication triple"),
            Resource::InputMask(p) => write!(f, "input mask for party {p}"),
            Resource::Bit => f.write_str("random bit"),
            Resource::RandomElement => f.write_str("random element"),
        }
    }
}

/// A custom error type for MPC computation and communication.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A peer deviated from the protocol (MAC check, broadcast validation or commitment failure).
    #[error("malicious behavior detected: {0}")]
    MaliciousBehavior(String),
    /// The preprocessing supplier ran out of material.
    #[error("preprocessing exhausted: no {0} left")]
    ResourceExhausted(Resource),
    /// A message could not be sent, received or decoded.
    #[error("network error: {0}")]
    Network(#[from] channel::Error),
    /// The oblivious transfer extension failed.
    #[error("oblivious transfer failed: {0}")]
    Ot(#[from] OtError),
    /// An internal consistency check failed, this indicates a bug in the caller or the engine.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Returns `true` if the error is evidence of a cheating (or corrupted) peer.
    pub fn is_malicious(&self) -> bool {
        match self {
            Error::MaliciousBehavior(_) => true,
            Error::Ot(e) => e.is_malicious(),
            _ => false,
        }
    }

    pub(crate) fn malicious(msg: impl Into<String>) -> Self {
        Error::MaliciousBehavior(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }
}
