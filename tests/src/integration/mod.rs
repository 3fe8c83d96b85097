//! Multi-node test environment: real `ChordNode`s talking through an
//! in-process network simulator, plus ring invariant checks.

pub mod network_simulator;
pub mod test_harness;

pub use invariants::{InvariantViolation, NetworkInvariants};
pub use network_simulator::{NetworkSimulator, SimulatedNetworkClient, SimulatorMessage};
pub use test_harness::{SimNode, TestHarness};
