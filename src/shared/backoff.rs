//! Reconnect Backoff
//!
//! Exponential backoff with symmetric jitter for the push-channel supervisor.

use std::time::Duration;

use crate::config::ReconnectSettings;

/// Exponential backoff policy.
///
/// Delay for attempt `n` is `min(max, base * 2^n)` scaled by a random
/// factor in `[1 - jitter, 1 + jitter]`, never less than `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_ms: base_delay_ms.max(1),
            max_delay_ms: max_delay_ms.max(base_delay_ms.max(1)),
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            settings.base_delay_ms,
            settings.max_delay_ms,
            settings.jitter_factor,
        )
    }

    /// Number of delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget previous failures after a successful handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Next delay using the thread-local RNG.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with_random(rand::random::<f64>())
    }

    /// Next delay with an explicit random value in `[0.0, 1.0)`.
    pub fn next_delay_with_random(&mut self, random: f64) -> Duration {
        let delay = delay_for_attempt(
            self.attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        );
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(delay)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn delay_for_attempt(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64 * jitter).round() as u64;

    with_jitter.max(base_delay_ms)
}
