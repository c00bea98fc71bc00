// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Exponentially spaced retry delays with random jitter.

use std::{num::Saturating, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Exponentially spaced delays.
///
/// Each call to [`next_delay()`][Self::next_delay] yields `base_delay * 2^attempt` plus a uniform
/// random jitter in `[0, backoff / 2)`, capped at `max_delay`. The jitter spreads out retries from
/// workers that failed at the same instant.
#[derive(Debug)]
pub struct ExponentialBackoff<R = StdRng> {
    base_delay: Duration,
    max_delay: Duration,
    sequence_index: u32,
    rng: R,
}

impl ExponentialBackoff<StdRng> {
    /// Creates a new backoff sequence seeded from OS entropy.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self::new_with_rng(base_delay, max_delay, StdRng::from_entropy())
    }

    /// Creates a new backoff sequence with a fixed seed, for deterministic tests.
    pub fn new_with_seed(base_delay: Duration, max_delay: Duration, seed: u64) -> Self {
        Self::new_with_rng(base_delay, max_delay, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ExponentialBackoff<R> {
    /// Creates a new backoff sequence with the provided random number generator.
    pub fn new_with_rng(base_delay: Duration, max_delay: Duration, rng: R) -> Self {
        Self {
            base_delay,
            max_delay,
            sequence_index: 0,
            rng,
        }
    }

    /// Returns the next delay and advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(Saturating(2u32).pow(self.sequence_index).0);
        self.sequence_index = self.sequence_index.saturating_add(1);

        backoff
            .saturating_add(self.random_jitter(backoff))
            .min(self.max_delay)
    }

    fn random_jitter(&mut self, backoff: Duration) -> Duration {
        let half_ms = (backoff / 2).as_millis() as u64;
        if half_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..half_ms))
    }
}

impl<R: Rng> Iterator for ExponentialBackoff<R> {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}
