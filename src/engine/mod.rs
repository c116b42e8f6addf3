//! The evaluation engine: deferred results, producer trees and the round-driving evaluator.
//!
//! Applications describe a computation with a [`ProtocolBuilder`], which turns it into a tree of
//! [`ProtocolProducer`]s. The [`Evaluator`] pulls batches of native protocols out of that tree
//! and runs each batch to completion over a [`Channel`], exchanging one message per peer per
//! round.

use std::{cell::OnceCell, rc::Rc};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, SimpleChannel},
    error::Error,
    field::FieldDefinition,
    native::Output,
    preprocessing::DummyDataSupplier,
    resource_pool::ResourcePool,
};

mod builder;
mod evaluator;
mod producer;

pub use builder::{BuilderContext, ProtocolBuilder};
pub use evaluator::Evaluator;
pub use producer::{
    LazyProducer, ParallelProducer, ProtocolCollection, ProtocolProducer, SequentialProducer,
    SingleProtocolProducer, WhileLoopProducer,
};

/// A deferred result: a value that becomes available once the protocol computing it is done.
///
/// # Panics
///
/// Reading a deferred result with [`DRes::out`] before its producing protocol completed panics,
/// this can only happen if a computation reads a value outside of the dependency order expressed
/// by its producer tree.
pub struct DRes<T>(Rc<dyn Fn() -> T>);

impl<T> Clone for DRes<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> std::fmt::Debug for DRes<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DRes(..)")
    }
}

impl<T: Clone + 'static> DRes<T> {
    /// A result that is available immediately.
    pub fn ready(value: T) -> Self {
        Self(Rc::new(move || value.clone()))
    }

    pub(crate) fn from_cell(cell: Output<T>) -> Self {
        Self(Rc::new(move || match cell.get() {
            Some(value) => value.clone(),
            None => panic!("deferred result read before its protocol completed"),
        }))
    }

    /// A result that follows another deferred result once that one has been produced.
    pub(crate) fn flatten(cell: Rc<OnceCell<DRes<T>>>) -> Self {
        Self(Rc::new(move || match cell.get() {
            Some(inner) => inner.out(),
            None => panic!("deferred result read before its sub-computation was built"),
        }))
    }

    /// Reads the value.
    pub fn out(&self) -> T {
        (self.0)()
    }

    /// Transforms the value once it is available.
    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> DRes<U> {
        let this = self.clone();
        DRes(Rc::new(move || f(this.out())))
    }

    /// Combines a list of deferred results into one.
    pub fn all(results: Vec<DRes<T>>) -> DRes<Vec<T>> {
        DRes(Rc::new(move || results.iter().map(DRes::out).collect()))
    }
}

/// When opened values are MAC checked during a computation.
///
/// Regardless of the policy, all values opened by a computation are checked before
/// [`run_application`] returns its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MacCheckPolicy {
    /// Check once, after the computation finished.
    #[default]
    AtEnd,
    /// Check after every batch that leaves at least this many unchecked opened values.
    EveryNOpenings(usize),
}

/// Engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The maximum number of native protocols evaluated in one batch. Only affects throughput.
    pub max_batch_size: usize,
    /// When opened values are checked.
    pub mac_check: MacCheckPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 4096,
            mac_check: MacCheckPolicy::AtEnd,
        }
    }
}

/// A computation that every party builds with the same structure.
///
/// Parties may differ in their private inputs, but must produce producer trees that schedule the
/// same native protocols in the same order, otherwise their rounds drift apart.
pub trait Application {
    /// The result of the computation.
    type Output: Clone + 'static;

    /// Describes the computation.
    fn build(&self, builder: &mut ProtocolBuilder) -> Result<DRes<Self::Output>, Error>;
}

/// Runs an application to completion for one party and returns its output.
///
/// The computation is followed by a MAC check of every value opened since the last check, so the
/// returned output is only handed out once no cheating was detected.
#[instrument(level = Level::DEBUG, skip_all, fields(party = pool.my_id()), err)]
pub async fn run_application<A: Application>(
    app: &A,
    pool: ResourcePool,
    channel: &impl Channel,
    config: &EngineConfig,
) -> Result<A::Output, Error> {
    let mut evaluator = Evaluator::new(pool, channel, *config);
    evaluator.run(app).await
}

/// Runs one application per party over in-memory channels, with trusted-dealer preprocessing
/// derived from `seed`.
///
/// `apps[i]` is the application of party `i`. Meant for tests and development, since the
/// preprocessing of every party is derivable from the shared seed.
pub fn simulate_application<A: Application>(
    apps: &[A],
    field: FieldDefinition,
    config: &EngineConfig,
    seed: [u8; 32],
) -> Result<Vec<A::Output>, Error> {
    let n_parties = apps.len();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| Error::invariant(format!("could not start tokio runtime: {e}")))?;
    let channels = SimpleChannel::channels(n_parties);
    runtime.block_on(async {
        let parties = apps.iter().zip(&channels).enumerate().map(|(i, (app, channel))| {
            async move {
                let supplier = DummyDataSupplier::new(i, n_parties, field, seed)?;
                let pool = ResourcePool::new(i, n_parties, field, supplier)?;
                run_application(app, pool, channel, config).await
            }
        });
        let outputs = try_join_all(parties).await?;
        debug!(parties = n_parties, "simulation finished");
        Ok(outputs)
    })
}
