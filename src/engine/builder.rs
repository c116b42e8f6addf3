//! Building producer trees out of closures.

use std::{
    cell::{OnceCell, RefCell},
    rc::Rc,
};

use super::{
    DRes,
    producer::{
        LazyProducer, ParallelProducer, ProtocolProducer, SequentialProducer,
        SingleProtocolProducer, WhileLoopProducer,
    },
};
use crate::{
    data_types::{SBool, SInt},
    error::Error,
    field::{FieldDefinition, FieldElement},
    native::{
        Broadcast, BroadcastValidation, Compute, Input, Known, LinearCombination, Mult,
        NativeProtocol, Open, OpenTo, RandomBit, RandomElement,
    },
    resource_pool::ResourcePool,
};

/// What every builder knows about the party running the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderContext {
    /// The id of this party.
    pub my_id: usize,
    /// The number of parties.
    pub n_parties: usize,
    /// The field of all secret values.
    pub field: FieldDefinition,
}

impl BuilderContext {
    /// The context matching a resource pool.
    pub fn of(pool: &ResourcePool) -> Self {
        Self {
            my_id: pool.my_id(),
            n_parties: pool.no_of_parties(),
            field: pool.field(),
        }
    }
}

/// Describes a computation by appending steps to a sequential or parallel scope.
///
/// In a sequential scope each appended step only starts once the previous one is done. In a
/// parallel scope all steps are evaluated side by side and must not depend on each other.
/// Nested scopes are built lazily. When a nested scope is appended to a sequential scope, the
/// closure passed to [`ProtocolBuilder::seq`] or [`ProtocolBuilder::par`] runs once every earlier
/// step of that scope is done, so it may read their values with [`DRes::out`]. A nested scope
/// appended to a parallel scope is built in the same batch as its siblings and must not read
/// their results.
pub struct ProtocolBuilder {
    ctx: BuilderContext,
    parallel: bool,
    children: Vec<Box<dyn ProtocolProducer>>,
}

impl std::fmt::Debug for ProtocolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolBuilder")
            .field("ctx", &self.ctx)
            .field("parallel", &self.parallel)
            .field("steps", &self.children.len())
            .finish()
    }
}

impl ProtocolBuilder {
    /// Creates an empty sequential scope.
    pub fn sequential(ctx: BuilderContext) -> Self {
        Self {
            ctx,
            parallel: false,
            children: vec![],
        }
    }

    /// Creates an empty parallel scope.
    pub fn parallel(ctx: BuilderContext) -> Self {
        Self {
            ctx,
            parallel: true,
            children: vec![],
        }
    }

    /// The id of this party.
    pub fn my_id(&self) -> usize {
        self.ctx.my_id
    }

    /// The number of parties.
    pub fn no_of_parties(&self) -> usize {
        self.ctx.n_parties
    }

    /// The field of all secret values.
    pub fn field(&self) -> FieldDefinition {
        self.ctx.field
    }

    /// Turns the scope into a producer.
    pub fn build(self) -> Box<dyn ProtocolProducer> {
        if self.parallel {
            Box::new(ParallelProducer::new(self.children))
        } else {
            Box::new(SequentialProducer::new(self.children))
        }
    }

    fn append<T: Clone + 'static>(
        &mut self,
        protocol: impl FnOnce(Rc<OnceCell<T>>) -> Box<dyn NativeProtocol>,
    ) -> DRes<T> {
        let output = Rc::new(OnceCell::new());
        let protocol = protocol(output.clone());
        self.children
            .push(Box::new(SingleProtocolProducer::new(protocol)));
        DRes::from_cell(output)
    }

    fn scope<T: Clone + 'static>(
        &mut self,
        parallel: bool,
        f: impl FnOnce(&mut ProtocolBuilder) -> Result<DRes<T>, Error> + 'static,
    ) -> DRes<T> {
        let ctx = self.ctx;
        let result = Rc::new(OnceCell::new());
        let slot = result.clone();
        self.children.push(Box::new(LazyProducer::new(move || {
            let mut builder = if parallel {
                ProtocolBuilder::parallel(ctx)
            } else {
                ProtocolBuilder::sequential(ctx)
            };
            let res = f(&mut builder)?;
            slot.set(res)
                .map_err(|_| Error::invariant("sub-computation built twice"))?;
            Ok(builder.build())
        })));
        DRes::flatten(result)
    }

    /// Appends a sequential sub-computation.
    ///
    /// In a sequential scope it is built once all previous steps are done. In a parallel scope it
    /// is built together with its siblings.
    pub fn seq<T: Clone + 'static>(
        &mut self,
        f: impl FnOnce(&mut ProtocolBuilder) -> Result<DRes<T>, Error> + 'static,
    ) -> DRes<T> {
        self.scope(false, f)
    }

    /// Appends a parallel sub-computation, built as lazily as [`ProtocolBuilder::seq`].
    pub fn par<T: Clone + 'static>(
        &mut self,
        f: impl FnOnce(&mut ProtocolBuilder) -> Result<DRes<T>, Error> + 'static,
    ) -> DRes<T> {
        self.scope(true, f)
    }

    /// Repeats `body` as long as `test` holds for the current state.
    ///
    /// Each iteration is built (in a sequential scope) only after the previous one finished, with
    /// the state that the previous iteration produced. The returned result is the final state.
    pub fn while_loop<S: Clone + 'static>(
        &mut self,
        init: DRes<S>,
        test: impl Fn(&S) -> bool + 'static,
        body: impl Fn(&mut ProtocolBuilder, S) -> Result<DRes<S>, Error> + 'static,
    ) -> DRes<S> {
        let ctx = self.ctx;
        let latest = Rc::new(RefCell::new(init.clone()));
        let publish = latest.clone();
        self.children.push(Box::new(WhileLoopProducer::new(
            init,
            test,
            move |state| {
                let mut builder = ProtocolBuilder::sequential(ctx);
                let next = body(&mut builder, state)?;
                Ok((builder.build(), next))
            },
            move |next| *publish.borrow_mut() = next,
        )));
        DRes(Rc::new(move || latest.borrow().out()))
    }

    /// Runs a local computation with access to the resource pool, without communication.
    pub fn compute<T: Clone + 'static>(
        &mut self,
        f: impl FnOnce(&mut ResourcePool) -> Result<T, Error> + 'static,
    ) -> DRes<T> {
        self.append(|out| Box::new(Compute::new(f, out)))
    }

    /// Secret-shares the input of `owner`; only the owner passes `Some(value)`.
    pub fn input(&mut self, value: Option<FieldElement>, owner: usize) -> DRes<SInt> {
        self.append(|out| Box::new(Input::new(owner, value, out)))
    }

    /// Shares a public constant.
    pub fn known(&mut self, value: FieldElement) -> DRes<SInt> {
        self.append(|out| Box::new(Known::new(value, out)))
    }

    /// Computes `constant + sum(coefficient * term)`.
    pub fn linear_combination(
        &mut self,
        constant: FieldElement,
        terms: Vec<(FieldElement, DRes<SInt>)>,
    ) -> DRes<SInt> {
        self.append(|out| Box::new(LinearCombination::new(constant, terms, out)))
    }

    /// `x + y`
    pub fn add(&mut self, x: &DRes<SInt>, y: &DRes<SInt>) -> DRes<SInt> {
        let (zero, one) = (self.field().zero(), self.field().one());
        self.linear_combination(zero, vec![(one, x.clone()), (one, y.clone())])
    }

    /// `x - y`
    pub fn sub(&mut self, x: &DRes<SInt>, y: &DRes<SInt>) -> DRes<SInt> {
        let (zero, one) = (self.field().zero(), self.field().one());
        self.linear_combination(zero, vec![(one, x.clone()), (-one, y.clone())])
    }

    /// `c + x`
    pub fn add_constant(&mut self, c: FieldElement, x: &DRes<SInt>) -> DRes<SInt> {
        let one = self.field().one();
        self.linear_combination(c, vec![(one, x.clone())])
    }

    /// `c * x`
    pub fn mult_const(&mut self, c: FieldElement, x: &DRes<SInt>) -> DRes<SInt> {
        let zero = self.field().zero();
        self.linear_combination(zero, vec![(c, x.clone())])
    }

    /// `x * y`, consuming one multiplication triple.
    pub fn mult(&mut self, x: &DRes<SInt>, y: &DRes<SInt>) -> DRes<SInt> {
        let (x, y) = (x.clone(), y.clone());
        self.append(|out| Box::new(Mult::new(x, y, out)))
    }

    /// Opens a value to every party. The opening is MAC checked later.
    pub fn open(&mut self, x: &DRes<SInt>) -> DRes<FieldElement> {
        let x = x.clone();
        self.append(|out| Box::new(Open::new(x, out)))
    }

    /// Opens a value to `party` only; every other party gets `None`.
    pub fn open_to(&mut self, x: &DRes<SInt>, party: usize) -> DRes<Option<FieldElement>> {
        let x = x.clone();
        self.append(|out| Box::new(OpenTo::new(x, party, out)))
    }

    /// A uniformly random secret bit.
    pub fn random_bit(&mut self) -> DRes<SBool> {
        self.append(|out| Box::new(RandomBit::new(out)))
    }

    /// A uniformly random secret field element.
    pub fn random_element(&mut self) -> DRes<SInt> {
        self.append(|out| Box::new(RandomElement::new(out)))
    }

    /// Sends `payload` to all parties without any consistency guarantee.
    ///
    /// Payloads longer than `u16::MAX` bytes are rejected.
    pub fn insecure_broadcast(&mut self, payload: DRes<Vec<u8>>) -> DRes<Vec<Vec<u8>>> {
        self.append(|out| Box::new(Broadcast::new(payload, out)))
    }

    /// Aborts with malicious behavior if the parties received different `messages`.
    pub fn validate_broadcast(&mut self, messages: DRes<Vec<Vec<u8>>>) -> DRes<()> {
        self.append(|out| Box::new(BroadcastValidation::new(messages, out)))
    }

    /// Broadcasts `payload` with abort: the result is the same at every honest party, or the
    /// computation fails.
    ///
    /// With two parties there is nobody to equivocate to, so no validation round is needed.
    pub fn broadcast(&mut self, payload: DRes<Vec<u8>>) -> DRes<Vec<Vec<u8>>> {
        self.seq(move |b| {
            let received = b.insecure_broadcast(payload);
            if b.no_of_parties() > 2 {
                b.validate_broadcast(received.clone());
            }
            Ok(received)
        })
    }
}
