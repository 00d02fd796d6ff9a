//! Provides the backoff strategies used between redial attempts.
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Type used for defining the exponential backoff strategy.
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use self_healing_stream::{ReconnectOptions, strategies::ExpBackoffStrategy};
///
/// // With the below strategy, the stream will try to redial forever, waiting an
/// // exponentially increasing (by 2) value with 5% random jitter. Once the wait
/// // would otherwise exceed the maximum of 30 seconds, it will instead wait 30
/// // seconds.
///
/// let options = ReconnectOptions::new().with_retries_generator(|| {
///     ExpBackoffStrategy::new(Duration::from_secs(1), 2.0, 0.05)
///         .with_max(Duration::from_secs(30))
/// });
/// ```
pub struct ExpBackoffStrategy {
    min: Duration,
    max: Option<Duration>,
    factor: f64,
    jitter: f64,
    rng: Option<StdRng>,
}

impl ExpBackoffStrategy {
    pub fn new(min: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            min,
            max: None,
            factor,
            jitter,
            rng: None,
        }
    }

    /// Set the exponential backoff strategy's maximum wait value to the given duration.
    /// Otherwise, this value will be the maximum possible duration.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// Set the seed used to generate jitter. Otherwise, will set RNG via entropy.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Set the RNG used to generate jitter. Otherwise, will set RNG via entropy.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// The un-jittered wait before redial number `attempt` (0-indexed):
    /// `min(initial * factor^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.min.as_secs_f64() * self.factor.powf(attempt as f64);
        self.cap(base)
    }

    fn cap(&self, secs: f64) -> Duration {
        let max = self.max.unwrap_or(Duration::MAX);
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            return max;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(max)
    }
}

impl Default for ExpBackoffStrategy {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Some(Duration::from_secs(60)),
            factor: 2.0,
            jitter: 0.0,
            rng: None,
        }
    }
}

impl fmt::Debug for ExpBackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpBackoffStrategy")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("factor", &self.factor)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl IntoIterator for ExpBackoffStrategy {
    type Item = Duration;
    type IntoIter = ExpBackoffIter;

    fn into_iter(mut self) -> Self::IntoIter {
        let rng = self.rng.take().unwrap_or_else(StdRng::from_entropy);
        ExpBackoffIter {
            strategy: self,
            pow: 0,
            rng,
        }
    }
}

/// Iterator class for [ExpBackoffStrategy]
pub struct ExpBackoffIter {
    strategy: ExpBackoffStrategy,
    pow: u32,
    rng: StdRng,
}

impl Iterator for ExpBackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.strategy.delay_for(self.pow).as_secs_f64();
        self.pow = self.pow.saturating_add(1);
        if self.strategy.jitter == 0.0 {
            return Some(self.strategy.cap(base));
        }
        let jitter = base * self.strategy.jitter * (self.rng.gen::<f64>() * 2. - 1.);
        Some(self.strategy.cap(base + jitter))
    }
}

#[cfg(test)]
mod test {
    use super::ExpBackoffStrategy;
    use std::time::Duration;

    #[test]
    fn test_default_backoff_sequence() {
        let values: Vec<u64> = ExpBackoffStrategy::default()
            .into_iter()
            .take(9)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(values, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_delay_for_is_pure() {
        let strategy = ExpBackoffStrategy::default();
        assert_eq!(strategy.delay_for(0), Duration::from_secs(1));
        assert_eq!(strategy.delay_for(5), Duration::from_secs(32));
        assert_eq!(strategy.delay_for(5), Duration::from_secs(32));
        assert_eq!(strategy.delay_for(6), Duration::from_secs(60));
        assert_eq!(strategy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_backoff_jitter_bounds() {
        let backoff_iter = ExpBackoffStrategy::new(Duration::from_secs(1), 2., 0.1)
            .with_seed(0)
            .into_iter();
        for (pow, value) in backoff_iter.take(9).enumerate() {
            let base = 2f64.powi(pow as i32);
            let value = value.as_secs_f64();
            assert!(
                value >= base * 0.9 - 1e-9 && value <= base * 1.1 + 1e-9,
                "{} outside jitter window of {}",
                value,
                base
            );
        }
    }

    #[test]
    fn test_seeded_jitter_is_deterministic() {
        let a: Vec<Duration> = ExpBackoffStrategy::new(Duration::from_secs(1), 2., 0.1)
            .with_seed(7)
            .into_iter()
            .take(5)
            .collect();
        let b: Vec<Duration> = ExpBackoffStrategy::new(Duration::from_secs(1), 2., 0.1)
            .with_seed(7)
            .into_iter()
            .take(5)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_exponential_backoff_max_value() {
        let mut backoff_iter = ExpBackoffStrategy::new(Duration::from_secs(1), 2., 0.0)
            .with_seed(0)
            .with_max(Duration::from_secs(8))
            .into_iter();
        let expected_values = [1.0, 2.0, 4.0, 8.0, 8.0];
        for expected in expected_values {
            let value = backoff_iter.next().unwrap().as_secs_f64();
            assert!(
                (value - expected).abs() < 0.0001,
                "{} != {}",
                value,
                expected
            );
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max() {
        let backoff_iter = ExpBackoffStrategy::new(Duration::from_secs(1), 2., 0.5)
            .with_seed(3)
            .with_max(Duration::from_secs(4));
        for value in backoff_iter.into_iter().take(20) {
            assert!(value <= Duration::from_secs(4));
        }
    }
}
