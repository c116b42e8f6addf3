//! Native protocols: the atomic operations that the evaluator runs round by round.
//!
//! A native protocol is evaluated with increasing round numbers, starting at 0, until it reports
//! [`EvaluationStatus::IsDone`]. Messages it sends in round `k` are delivered to the peers'
//! instance of the same protocol in round `k + 1`. A protocol must use the same number of rounds
//! at every party, otherwise the batches of the parties drift apart.
//!
//! Results are published through the [`DRes`](crate::DRes) handed out when the protocol is
//! created and can only be read once the protocol is done.

use std::{cell::OnceCell, rc::Rc};

use crate::{error::Error, network::Network, resource_pool::ResourcePool};

mod broadcast;
mod numeric;

pub(crate) use broadcast::{Broadcast, BroadcastValidation};
pub(crate) use numeric::{
    Input, Known, LinearCombination, Mult, Open, OpenTo, RandomBit, RandomElement,
};

/// Whether a native protocol needs to be evaluated again in the next round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// The protocol sent messages that it needs to read in the next round.
    HasMoreRounds,
    /// The protocol is done and its output is available.
    IsDone,
}

/// An operation that completes after a small, fixed number of rounds.
pub trait NativeProtocol {
    /// Evaluates the protocol for the given round.
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error>;
}

/// The slot a native protocol writes its output to.
pub(crate) type Output<T> = Rc<OnceCell<T>>;

pub(crate) fn publish<T>(output: &Output<T>, value: T) -> Result<(), Error> {
    output
        .set(value)
        .map_err(|_| Error::invariant("a native protocol published its output twice"))
}

/// Runs a local closure with access to the resource pool, without any network round.
pub(crate) struct Compute<T> {
    f: Option<Box<dyn FnOnce(&mut ResourcePool) -> Result<T, Error>>>,
    output: Output<T>,
}

impl<T> Compute<T> {
    pub(crate) fn new(
        f: impl FnOnce(&mut ResourcePool) -> Result<T, Error> + 'static,
        output: Output<T>,
    ) -> Self {
        Self {
            f: Some(Box::new(f)),
            output,
        }
    }
}

impl<T> NativeProtocol for Compute<T> {
    fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        let f = self
            .f
            .take()
            .ok_or_else(|| Error::invariant("local computation evaluated twice"))?;
        publish(&self.output, f(pool)?)?;
        Ok(EvaluationStatus::IsDone)
    }
}
