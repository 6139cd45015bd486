//! Storage engine contract for the backup coordinator.
//!
//! The coordinator never touches WAL files or checkpoints itself; it drives an
//! engine through the primitives of [`StorageEngine`]. [`SimulatedEngine`] is an
//! in-memory implementation used by the test suites and the command shim.

pub mod engine;
pub mod simulated;

pub use engine::{EngineError, StorageEngine};
pub use simulated::{EngineCalls, SimulatedEngine, SimulatedEngineConfig};
