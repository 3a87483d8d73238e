//! Jittered exponential backoff for subprocess restarts.
//!
//! Each client draws jitter from its own deterministic stream seeded from
//! `(client_id, config_seed)`, so two clients restarting off the same origin
//! failure never pile back on at the same instant, and a given fleet layout
//! reproduces exactly across runs.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Total jitter band: the computed delay is scaled by
    /// `1 ± jitter / 2`, uniformly.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
            multiplier: 1.7,
            jitter: 0.4,
        }
    }
}

/// Per-client backoff state.
pub struct Backoff {
    policy: BackoffPolicy,
    rng: StdRng,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy, client_id: u64, seed: u64) -> Self {
        let rng = StdRng::seed_from_u64(seed ^ client_id.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        Self {
            policy,
            rng,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next restart:
    /// `min(max, initial * multiplier^attempts) * (1 ± jitter/2)`.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempts.min(64) as i32;
        let base = self.policy.initial.as_secs_f64() * self.policy.multiplier.powi(exponent);
        let capped = base.min(self.policy.max.as_secs_f64());
        let roll: f64 = self.rng.random();
        let factor = 1.0 + self.policy.jitter * (roll - 0.5);
        self.attempts = self.attempts.saturating_add(1);
        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    /// Clear the attempt count after a stable run.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::default()
    }

    #[test]
    fn same_client_and_seed_reproduce_the_same_delays() {
        let mut a = Backoff::new(policy(), 7, 42);
        let mut b = Backoff::new(policy(), 7, 42);
        for _ in 0..8 {
            assert_eq!(a.next_delay(), b.next_delay());
        }
    }

    #[test]
    fn different_clients_diverge() {
        let mut a = Backoff::new(policy(), 1, 42);
        let mut b = Backoff::new(policy(), 2, 42);
        let delays_a: Vec<_> = (0..4).map(|_| a.next_delay()).collect();
        let delays_b: Vec<_> = (0..4).map(|_| b.next_delay()).collect();
        assert_ne!(delays_a, delays_b);
    }

    #[test]
    fn delays_grow_and_respect_the_jittered_cap() {
        let mut backoff = Backoff::new(policy(), 3, 0);
        let p = policy();
        let ceiling = p.max.as_secs_f64() * (1.0 + p.jitter / 2.0);
        let mut previous_base = 0.0;
        for attempt in 0..16 {
            let delay = backoff.next_delay().as_secs_f64();
            let base = (p.initial.as_secs_f64() * p.multiplier.powi(attempt))
                .min(p.max.as_secs_f64());
            let low = base * (1.0 - p.jitter / 2.0);
            let high = base * (1.0 + p.jitter / 2.0);
            assert!(
                delay >= low - 1e-9 && delay <= high + 1e-9,
                "attempt {attempt}: {delay}s outside [{low}, {high}]"
            );
            assert!(delay <= ceiling + 1e-9);
            assert!(base >= previous_base);
            previous_base = base;
        }
    }

    #[test]
    fn reset_returns_to_the_initial_band() {
        let p = policy();
        let mut backoff = Backoff::new(p.clone(), 0, 0);
        for _ in 0..10 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        let delay = backoff.next_delay().as_secs_f64();
        let high = p.initial.as_secs_f64() * (1.0 + p.jitter / 2.0);
        assert!(delay <= high + 1e-9);
    }
}
