//! Deterministic simulation harness for SealTalk protocol testing.
//!
//! A seeded [`SimEnv`] replaces the system clock and RNG, so token
//! generation, RSA keys and entry expiry are reproducible. [`FaultStore`]
//! wraps any store to inject backend failures, and [`scenario`] drives whole
//! conversations and checks them with a mandatory oracle.

pub mod fault_store;
pub mod scenario;
pub mod sim_env;

pub use fault_store::FaultStore;
pub use scenario::{Delivery, Scenario, World};
pub use sim_env::SimEnv;
