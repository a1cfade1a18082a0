//! Environment abstraction for time and randomness.
//!
//! Core logic never reads the system clock or the OS RNG directly. Production
//! uses [`SystemEnv`]; the simulation harness substitutes a virtual clock and
//! a seeded RNG so that expiry and token generation are reproducible.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use rand::{RngCore, rngs::OsRng};
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng};

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fixed-size random array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// A CSPRNG seeded from this environment.
    ///
    /// Handed to CPU-bound work (RSA) that runs on the blocking pool and
    /// needs an owned RNG.
    fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.random_array())
    }
}

/// Production environment: system clock, OS randomness, tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}
