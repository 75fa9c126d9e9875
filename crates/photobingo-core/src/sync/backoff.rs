use std::time::Duration;

use crate::config::EngineConfig;

/// Exponential backoff: `min(base * 2^(attempt - 1), ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.backoff_base(), config.backoff_ceiling())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_ceiling() {
        let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(10_000));
        let delays: Vec<u128> = (1..=6).map(|n| backoff.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_large_attempts_saturate() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.delay(200), Duration::from_secs(30));
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            backoff_base_ms: 250,
            backoff_ceiling_ms: 600,
            ..Default::default()
        };
        let backoff = Backoff::from_config(&config);
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_millis(600));
    }
}
