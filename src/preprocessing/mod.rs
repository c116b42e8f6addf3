//! Correlated randomness consumed by the native protocols.
//!
//! [`DummyDataSupplier`] simulates a trusted dealer for tests, [`generate_preprocessing`] runs an
//! actual OT-based preprocessing phase and returns its output as a [`QueueDataSupplier`].

mod generator;
mod gilboa;
mod supplier;

pub use generator::{PreprocessingAmounts, ProductSessions, generate_preprocessing};
pub use supplier::{DataSupplier, DummyDataSupplier, QueueDataSupplier};
