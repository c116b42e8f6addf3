//! Oblivious transfer: Chou-Orlandi base OTs extended with IKNP and the KOS consistency check.
//!
//! The extension turns `security_parameter` base OTs into any number of correlated OTs
//! ([`CoteSender`], [`CoteReceiver`]), which are hashed into random or chosen-message OTs
//! ([`RotSender`], [`RotReceiver`]). All types talk to exactly one peer over a [`Channel`].
//!
//! [`Channel`]: crate::channel::Channel

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    channel::{self, Channel, recv_from, send_to},
    mac_check::{commit, open_commitment},
};

pub mod base;
pub mod bits;
pub mod config;
mod extension;

pub use config::OtConfig;
pub use extension::{CoteReceiver, CoteSender, RotReceiver, RotSender};

/// Errors raised while running oblivious transfers.
#[derive(Debug, thiserror::Error)]
pub enum OtError {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// The peer sent a group element that is not a valid point.
    #[error("party {0} sent an invalid curve point")]
    InvalidPoint(usize),
    /// The peer sent a message of the wrong shape.
    #[error("party {party} sent a malformed message during {phase}")]
    MalformedMessage {
        /// The peer.
        party: usize,
        /// The protocol step.
        phase: &'static str,
    },
    /// The KOS correlation check failed.
    #[error("consistency check with party {0} failed")]
    ConsistencyCheckFailed(usize),
    /// The peer's coin toss commitment did not match its opening.
    #[error("commitment of party {0} could not be opened")]
    CommitmentCouldNotBeOpened(usize),
    /// The local parameters are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

impl OtError {
    /// Returns `true` if the error proves that the peer deviated from the protocol.
    pub fn is_malicious(&self) -> bool {
        matches!(
            self,
            OtError::InvalidPoint(_)
                | OtError::MalformedMessage { .. }
                | OtError::ConsistencyCheckFailed(_)
                | OtError::CommitmentCouldNotBeOpened(_)
        )
    }
}

/// Two-party coin tossing with hash commitments, returning an RNG both parties share.
pub(crate) async fn shared_rng(
    channel: &impl Channel,
    p_own: usize,
    p_to: usize,
    rng: &mut impl RngCore,
) -> Result<ChaCha20Rng, OtError> {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    send_to(channel, p_to, "OT coin commitment", &commit(&seed, p_own)).await?;
    let commitment: [u8; 32] = recv_from(channel, p_to, "OT coin commitment").await?;
    send_to(channel, p_to, "OT coin seed", &seed).await?;
    let theirs: [u8; 32] = recv_from(channel, p_to, "OT coin seed").await?;
    if !open_commitment(&commitment, &theirs, p_to) {
        return Err(OtError::CommitmentCouldNotBeOpened(p_to));
    }
    seed.iter_mut().zip(theirs).for_each(|(s, t)| *s ^= t);
    Ok(ChaCha20Rng::from_seed(seed))
}
