//! A Rust engine for secure multi-party computation (MPC) over authenticated secret shares, in the
//! style of [SPDZ](https://eprint.iacr.org/2011/535).
//!
//! Every secret value is additively shared among the parties together with a share of its MAC
//! `alpha * x`, where the MAC key `alpha` is itself secret-shared. Parties can compute on shares
//! without revealing them, open values, and check in batches that no opened value was tampered
//! with.
//!
//! ## Main Components
//!
//! * [`engine`]: deferred results ([`DRes`]), the [`ProtocolBuilder`] used to describe a
//!   computation as a tree of sequential and parallel scopes, and the [`Evaluator`] that runs the
//!   resulting native protocols in lock-step rounds.
//! * [`native`]: the atomic protocols (input, open, multiplication, broadcast, ...).
//! * [`mac_check`]: coin tossing, commitments and the batched MAC check.
//! * [`numeric`]: comparison and bit decomposition built from the native protocols.
//! * [`ot`] and [`preprocessing`]: oblivious transfer extension and the generation of
//!   multiplication triples, input masks and random bits from it.
//! * [`channel`]: the transport abstraction and an in-memory implementation.
//!
//! ## Basic Usage
//!
//! 1. Implement [`Application`], describing the computation with a [`ProtocolBuilder`].
//! 2. Set up a [`channel::Channel`] to all other parties and a [`resource_pool::ResourcePool`]
//!    with a supplier of preprocessed material.
//! 3. Call [`run_application`] at every party.
//!
//! For tests, [`simulate_application`] runs all parties in one process with dummy preprocessing.
//!
//! ## Example
//!
//! ```
//! use tessera::{
//!     Application, DRes, EngineConfig, Error, ProtocolBuilder,
//!     field::{FieldDefinition, MODULUS_61},
//!     simulate_application,
//! };
//!
//! struct Product(u64);
//!
//! impl Application for Product {
//!     type Output = u64;
//!
//!     fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<u64>, Error> {
//!         let value = (b.my_id() == 0).then(|| b.field().element(self.0));
//!         let x = b.input(value, 0);
//!         let y = b.known(b.field().element(6));
//!         let product = b.mult(&x, &y);
//!         Ok(b.open(&product).map(|v| v.value()))
//!     }
//! }
//!
//! # fn main() -> Result<(), Error> {
//! let field = FieldDefinition::new(MODULUS_61)?;
//! let outputs = simulate_application(
//!     &[Product(7), Product(0)],
//!     field,
//!     &EngineConfig::default(),
//!     [0; 32],
//! )?;
//! assert_eq!(outputs, vec![42, 42]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! Online computations are secure against a dishonest majority of malicious parties with abort:
//! cheating is detected by the MAC check before any output is returned. The OT-based
//! preprocessing only guarantees triple correctness against passive adversaries.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod data_types;
pub mod engine;
pub mod error;
pub mod field;
pub mod mac_check;
pub mod native;
pub mod network;
pub mod numeric;
pub mod ot;
pub mod preprocessing;
pub mod resource_pool;

mod utils;

pub use engine::{
    Application, DRes, EngineConfig, Evaluator, MacCheckPolicy, ProtocolBuilder,
    run_application, simulate_application,
};
pub use error::Error;
