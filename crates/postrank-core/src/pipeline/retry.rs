//! ============================================================================
//! Reconnect Backoff - Exponential delay with jitter
//! ============================================================================
//! Delay for attempt `n` is `initial * 2^n`, capped at `max`, then scaled by a
//! random factor in `[1 - jitter, 1 + jitter]`. Retries are unlimited; the
//! caller resets the attempt counter after a healthy connection.
//! ============================================================================

use rand::Rng;
use std::time::Duration;

/// Configuration for reconnect behaviour
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound before jitter
    pub max_delay_ms: u64,
    /// Relative jitter, 0.5 = +/-50%
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            jitter: 0.5,
        }
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    calculate_delay_with(attempt, config, &mut rand::thread_rng())
}

pub fn calculate_delay_with<R: Rng + ?Sized>(attempt: u32, config: &BackoffConfig, rng: &mut R) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt.min(63));
    let base_delay = config.initial_delay_ms.saturating_mul(multiplier);
    let capped_delay = base_delay.min(config.max_delay_ms);

    let jitter = config.jitter.clamp(0.0, 1.0);
    let final_delay = if jitter > 0.0 {
        let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        (capped_delay as f64 * factor) as u64
    } else {
        capped_delay
    };

    Duration::from_millis(final_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_without_jitter() {
        let config = BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        };
        let delays: Vec<u64> = (0..7)
            .map(|a| calculate_delay(a, &config).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60, 60]);
    }

    #[test]
    fn test_jitter_bounds() {
        let config = BackoffConfig::default();
        for _ in 0..200 {
            let first = calculate_delay(0, &config).as_millis();
            assert!((2_500..=7_500).contains(&first), "first retry {}", first);

            let capped = calculate_delay(40, &config).as_millis();
            assert!((30_000..=90_000).contains(&capped), "capped retry {}", capped);
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let config = BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(calculate_delay(u32::MAX, &config), Duration::from_secs(60));
    }
}
