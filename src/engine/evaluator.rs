//! Drives producer trees batch by batch and round by round.

use tracing::{debug, trace};

use super::{
    Application, EngineConfig, MacCheckPolicy,
    builder::{BuilderContext, ProtocolBuilder},
    producer::{ProtocolCollection, ProtocolProducer},
};
use crate::{
    channel::Channel,
    error::Error,
    mac_check,
    native::{EvaluationStatus, NativeProtocol},
    network::{BatchedNetwork, Network},
    resource_pool::ResourcePool,
};

/// Makes repeated evaluation of the same round a no-op.
///
/// The evaluator advances rounds strictly, but a protocol that is asked for the same round twice
/// must not send its messages twice.
struct RoundGuard {
    protocol: Box<dyn NativeProtocol>,
    last: Option<(usize, EvaluationStatus)>,
}

impl NativeProtocol for RoundGuard {
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        if let Some((last, status)) = self.last {
            if last == round {
                return Ok(status);
            }
            if round < last || status == EvaluationStatus::IsDone {
                return Err(Error::invariant(format!(
                    "protocol evaluated in round {round} after round {last}"
                )));
            }
        }
        let status = self.protocol.evaluate(round, pool, network)?;
        self.last = Some((round, status));
        Ok(status)
    }
}

/// Evaluates producer trees of one party.
///
/// Owns the party's [`ResourcePool`] and round-batched network for the lifetime of a
/// computation. Several producers can be evaluated one after another, the opened value store
/// carries over until [`Evaluator::mac_check`] drains it.
pub struct Evaluator<'c, C: Channel> {
    pool: ResourcePool,
    network: BatchedNetwork,
    channel: &'c C,
    config: EngineConfig,
    exchanges: usize,
    batches: usize,
}

impl<'c, C: Channel> Evaluator<'c, C> {
    /// Creates an evaluator communicating over `channel`.
    pub fn new(pool: ResourcePool, channel: &'c C, config: EngineConfig) -> Self {
        let network = BatchedNetwork::new(pool.my_id(), pool.no_of_parties());
        Self {
            pool,
            network,
            channel,
            config,
            exchanges: 0,
            batches: 0,
        }
    }

    /// The context builders for this party need.
    pub fn context(&self) -> BuilderContext {
        BuilderContext::of(&self.pool)
    }

    /// The resource pool of this party.
    pub fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    /// Gives the resource pool back, e.g. to run another computation with the same supplier.
    pub fn into_pool(self) -> ResourcePool {
        self.pool
    }

    /// Builds and evaluates an application, followed by a final MAC check.
    pub async fn run<A: Application>(&mut self, app: &A) -> Result<A::Output, Error> {
        let mut builder = ProtocolBuilder::sequential(self.context());
        let output = app.build(&mut builder)?;
        let mut producer = builder.build();
        self.evaluate(producer.as_mut()).await?;
        self.mac_check().await?;
        Ok(output.out())
    }

    /// Evaluates a producer tree until it is exhausted, running MAC checks as the configured
    /// policy demands.
    pub async fn evaluate(&mut self, producer: &mut dyn ProtocolProducer) -> Result<(), Error> {
        while producer.has_next_protocols()? {
            let mut batch = ProtocolCollection::new(self.config.max_batch_size);
            producer.next_protocols(&mut batch)?;
            self.evaluate_batch(batch).await?;
            if let MacCheckPolicy::EveryNOpenings(n) = self.config.mac_check {
                if self.pool.opened_values().len() >= n.max(1) {
                    self.mac_check().await?;
                }
            }
        }
        Ok(())
    }

    /// Checks the MACs of every value opened since the last check.
    ///
    /// Fails with [`Error::MaliciousBehavior`] if any opened value was inconsistent with its MAC.
    pub async fn mac_check(&mut self) -> Result<(), Error> {
        let opened = self.pool.opened_values().drain();
        if opened.is_empty() {
            return Ok(());
        }
        debug!(party = self.pool.my_id(), values = opened.len(), "mac check");
        let mut builder = ProtocolBuilder::sequential(self.context());
        let key = self.pool.mac_key_share();
        let checked = mac_check::build_mac_check(&mut builder, opened, key);
        let mut producer = builder.build();
        while producer.has_next_protocols()? {
            let mut batch = ProtocolCollection::new(self.config.max_batch_size);
            producer.next_protocols(&mut batch)?;
            self.evaluate_batch(batch).await?;
        }
        checked.out();
        Ok(())
    }

    async fn evaluate_batch(&mut self, batch: ProtocolCollection) -> Result<(), Error> {
        let size = batch.len();
        let mut pending: Vec<RoundGuard> = batch
            .into_protocols()
            .into_iter()
            .map(|protocol| RoundGuard {
                protocol,
                last: None,
            })
            .collect();
        let mut round = 0;
        loop {
            let mut next = Vec::with_capacity(pending.len());
            for mut protocol in pending {
                match protocol.evaluate(round, &mut self.pool, &mut self.network)? {
                    EvaluationStatus::HasMoreRounds => next.push(protocol),
                    EvaluationStatus::IsDone => {}
                }
            }
            pending = next;
            if pending.is_empty() {
                break;
            }
            self.network.exchange(self.channel, self.exchanges).await?;
            self.exchanges += 1;
            round += 1;
        }
        self.network.ensure_drained()?;
        trace!(
            party = self.pool.my_id(),
            batch = self.batches,
            protocols = size,
            rounds = round + 1,
            "batch done"
        );
        self.batches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        field::{FieldDefinition, MODULUS_61},
        preprocessing::DummyDataSupplier,
    };

    struct CountingSend(Rc<Cell<usize>>);

    impl NativeProtocol for CountingSend {
        fn evaluate(
            &mut self,
            round: usize,
            _pool: &mut ResourcePool,
            network: &mut dyn Network,
        ) -> Result<EvaluationStatus, Error> {
            self.0.set(self.0.get() + 1);
            network.send(0, vec![round as u8]);
            Ok(EvaluationStatus::HasMoreRounds)
        }
    }

    #[test]
    fn repeated_rounds_do_not_resend() -> Result<(), Error> {
        let field = FieldDefinition::new(MODULUS_61)?;
        let supplier = DummyDataSupplier::new(0, 2, field, [1; 32])?;
        let mut pool = ResourcePool::new(0, 2, field, supplier)?;
        let mut network = BatchedNetwork::new(0, 2);
        let sends = Rc::new(Cell::new(0));
        let mut guard = RoundGuard {
            protocol: Box::new(CountingSend(sends.clone())),
            last: None,
        };
        guard.evaluate(0, &mut pool, &mut network)?;
        guard.evaluate(0, &mut pool, &mut network)?;
        assert_eq!(sends.get(), 1);
        guard.evaluate(1, &mut pool, &mut network)?;
        assert_eq!(sends.get(), 2);
        assert!(matches!(
            guard.evaluate(0, &mut pool, &mut network),
            Err(Error::Invariant(_))
        ));
        Ok(())
    }
}
