//! Producer trees: the lazily expanded description of a computation.
//!
//! The evaluator repeatedly asks the root producer for a batch of native protocols and evaluates
//! that batch to completion before asking again. Data dependencies are expressed purely through
//! nesting:
//!
//! - a [`SequentialProducer`] takes protocols from its first non-exhausted child only, so a later
//!   child never shares a batch with an earlier one,
//! - a [`ParallelProducer`] lets every child contribute to the same batch,
//! - a [`LazyProducer`] builds its subtree on first use, after everything before it has been
//!   evaluated, so the builder closure can read earlier results,
//! - a [`WhileLoopProducer`] re-evaluates its predicate only once the previous iteration is
//!   exhausted.
//!
//! Every producer is a small state machine: once [`ProtocolProducer::has_next_protocols`] returned
//! `false`, it returns `false` forever.

use std::{collections::VecDeque, fmt};

use crate::{DRes, error::Error, native::NativeProtocol};

/// A capacity-bounded batch of native protocols that run in the same rounds.
pub struct ProtocolCollection {
    protocols: Vec<Box<dyn NativeProtocol>>,
    capacity: usize,
}

impl fmt::Debug for ProtocolCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolCollection")
            .field("len", &self.protocols.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ProtocolCollection {
    /// Creates an empty batch that accepts at least one and at most `capacity` protocols.
    pub fn new(capacity: usize) -> Self {
        Self {
            protocols: vec![],
            capacity: capacity.max(1),
        }
    }

    /// Adds a protocol to the batch.
    pub fn add(&mut self, protocol: Box<dyn NativeProtocol>) {
        self.protocols.push(protocol);
    }

    /// Returns `true` if more protocols can be added.
    pub fn has_free_capacity(&self) -> bool {
        self.protocols.len() < self.capacity
    }

    /// Number of protocols in the batch.
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Returns `true` if the batch contains no protocols.
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub(crate) fn into_protocols(self) -> Vec<Box<dyn NativeProtocol>> {
        self.protocols
    }
}

/// A node of a producer tree.
pub trait ProtocolProducer {
    /// Adds the protocols that are ready to run to the batch.
    ///
    /// Must only be called after [`ProtocolProducer::has_next_protocols`] returned `true`, in which
    /// case at least one protocol is added.
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error>;

    /// Returns `true` if the producer will produce more protocols.
    ///
    /// May build lazily constructed subtrees, which is why it needs `&mut self` and can fail.
    fn has_next_protocols(&mut self) -> Result<bool, Error>;
}

/// Produces a single native protocol.
pub struct SingleProtocolProducer {
    protocol: Option<Box<dyn NativeProtocol>>,
}

impl SingleProtocolProducer {
    /// Wraps a native protocol.
    pub fn new(protocol: Box<dyn NativeProtocol>) -> Self {
        Self {
            protocol: Some(protocol),
        }
    }
}

impl ProtocolProducer for SingleProtocolProducer {
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error> {
        if let Some(protocol) = self.protocol.take() {
            batch.add(protocol);
        }
        Ok(())
    }

    fn has_next_protocols(&mut self) -> Result<bool, Error> {
        Ok(self.protocol.is_some())
    }
}

/// Runs its children strictly one after another.
pub struct SequentialProducer {
    children: VecDeque<Box<dyn ProtocolProducer>>,
}

impl SequentialProducer {
    /// Creates a producer running `children` in order.
    pub fn new(children: Vec<Box<dyn ProtocolProducer>>) -> Self {
        Self {
            children: children.into(),
        }
    }

    fn first_active(&mut self) -> Result<Option<&mut Box<dyn ProtocolProducer>>, Error> {
        while let Some(first) = self.children.front_mut() {
            if first.has_next_protocols()? {
                break;
            }
            self.children.pop_front();
        }
        Ok(self.children.front_mut())
    }
}

impl ProtocolProducer for SequentialProducer {
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error> {
        if let Some(child) = self.first_active()? {
            child.next_protocols(batch)?;
        }
        Ok(())
    }

    fn has_next_protocols(&mut self) -> Result<bool, Error> {
        Ok(self.first_active()?.is_some())
    }
}

/// Lets all of its children contribute protocols to the same batch.
pub struct ParallelProducer {
    children: Vec<Box<dyn ProtocolProducer>>,
}

impl ParallelProducer {
    /// Creates a producer running `children` side by side.
    pub fn new(children: Vec<Box<dyn ProtocolProducer>>) -> Self {
        Self { children }
    }
}

impl ProtocolProducer for ParallelProducer {
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error> {
        let mut i = 0;
        while i < self.children.len() && batch.has_free_capacity() {
            if self.children[i].has_next_protocols()? {
                self.children[i].next_protocols(batch)?;
                i += 1;
            } else {
                self.children.remove(i);
            }
        }
        Ok(())
    }

    fn has_next_protocols(&mut self) -> Result<bool, Error> {
        while let Some(first) = self.children.first_mut() {
            if first.has_next_protocols()? {
                return Ok(true);
            }
            self.children.remove(0);
        }
        Ok(false)
    }
}

type Build = Box<dyn FnOnce() -> Result<Box<dyn ProtocolProducer>, Error>>;

enum LazyState {
    Unbuilt(Build),
    Built(Box<dyn ProtocolProducer>),
    Exhausted,
}

/// Builds its subtree the first time it is queried.
pub struct LazyProducer {
    state: LazyState,
}

impl LazyProducer {
    /// Defers `build` until the producer is first queried.
    pub fn new(build: impl FnOnce() -> Result<Box<dyn ProtocolProducer>, Error> + 'static) -> Self {
        Self {
            state: LazyState::Unbuilt(Box::new(build)),
        }
    }
}

impl ProtocolProducer for LazyProducer {
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error> {
        if self.has_next_protocols()? {
            if let LazyState::Built(child) = &mut self.state {
                child.next_protocols(batch)?;
            }
        }
        Ok(())
    }

    fn has_next_protocols(&mut self) -> Result<bool, Error> {
        let state = std::mem::replace(&mut self.state, LazyState::Exhausted);
        let mut child = match state {
            LazyState::Unbuilt(build) => build()?,
            LazyState::Built(child) => child,
            LazyState::Exhausted => return Ok(false),
        };
        if child.has_next_protocols()? {
            self.state = LazyState::Built(child);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

type Iteration<S> = Box<dyn FnMut(S) -> Result<(Box<dyn ProtocolProducer>, DRes<S>), Error>>;

/// Repeats a body while a predicate over the loop state holds.
///
/// The predicate is evaluated on the initial state and afterwards only once the previous
/// iteration is fully exhausted, against the state that iteration produced.
pub struct WhileLoopProducer<S> {
    state: DRes<S>,
    test: Box<dyn Fn(&S) -> bool>,
    iteration: Iteration<S>,
    current: Option<Box<dyn ProtocolProducer>>,
    done: bool,
    publish: Box<dyn Fn(DRes<S>)>,
}

impl<S: Clone + 'static> WhileLoopProducer<S> {
    /// Creates the loop. `publish` is called with the state of every new iteration, so that the
    /// loop result can follow the latest state.
    pub fn new(
        init: DRes<S>,
        test: impl Fn(&S) -> bool + 'static,
        iteration: impl FnMut(S) -> Result<(Box<dyn ProtocolProducer>, DRes<S>), Error> + 'static,
        publish: impl Fn(DRes<S>) + 'static,
    ) -> Self {
        Self {
            state: init,
            test: Box::new(test),
            iteration: Box::new(iteration),
            current: None,
            done: false,
            publish: Box::new(publish),
        }
    }
}

impl<S: Clone + 'static> ProtocolProducer for WhileLoopProducer<S> {
    fn next_protocols(&mut self, batch: &mut ProtocolCollection) -> Result<(), Error> {
        if self.has_next_protocols()? {
            if let Some(current) = &mut self.current {
                current.next_protocols(batch)?;
            }
        }
        Ok(())
    }

    fn has_next_protocols(&mut self) -> Result<bool, Error> {
        loop {
            if self.done {
                return Ok(false);
            }
            if let Some(current) = &mut self.current {
                if current.has_next_protocols()? {
                    return Ok(true);
                }
                self.current = None;
            }
            let state = self.state.out();
            if !(self.test)(&state) {
                self.done = true;
                return Ok(false);
            }
            let (producer, next) = (self.iteration)(state)?;
            (self.publish)(next.clone());
            self.state = next;
            self.current = Some(producer);
        }
    }
}
