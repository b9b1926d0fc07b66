use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Inclusive range of seconds a pause is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn bounds(&self) -> (f64, f64) {
        let clean = |secs: f64| if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        let min = clean(self.min);
        let max = clean(self.max);
        if min <= max { (min, max) } else { (max, min) }
    }
}

/// Randomised pauses that make interaction timing look less mechanical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingOptions {
    /// Between typed characters
    pub key_delay: DelayRange,

    /// After every executed action
    pub action_delay: DelayRange,

    /// After a page reports it finished loading
    pub settle_delay: DelayRange,

    /// Fixed RNG seed for reproducible timing
    pub seed: Option<u64>,
}

impl Default for PacingOptions {
    fn default() -> Self {
        Self {
            key_delay: DelayRange::new(0.1, 1.0),
            action_delay: DelayRange::new(0.3, 2.0),
            settle_delay: DelayRange::new(0.0, 0.5),
            seed: None,
        }
    }
}

impl PacingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// No pauses at all
    pub fn none() -> Self {
        Self {
            key_delay: DelayRange::ZERO,
            action_delay: DelayRange::ZERO,
            settle_delay: DelayRange::ZERO,
            seed: None,
        }
    }

    pub fn key_delay(mut self, min: f64, max: f64) -> Self {
        self.key_delay = DelayRange::new(min, max);
        self
    }

    pub fn action_delay(mut self, min: f64, max: f64) -> Self {
        self.action_delay = DelayRange::new(min, max);
        self
    }

    pub fn settle_delay(mut self, min: f64, max: f64) -> Self {
        self.settle_delay = DelayRange::new(min, max);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Draws and sleeps the pauses configured by [`PacingOptions`]
#[derive(Debug, Clone)]
pub struct Pacer {
    options: PacingOptions,
    rng: StdRng,
}

impl Pacer {
    pub fn new(options: PacingOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { options, rng }
    }

    pub fn options(&self) -> &PacingOptions {
        &self.options
    }

    /// A random duration within `range`
    pub fn sample(&mut self, range: DelayRange) -> Duration {
        let (min, max) = range.bounds();
        let secs = if max > min { self.rng.gen_range(min..=max) } else { min };
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a random duration within `range`, returning how long
    pub fn pause(&mut self, range: DelayRange) -> Duration {
        let delay = self.sample(range);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        delay
    }

    /// Pause after a typed character. `min`/`max` override the configured key delay bounds.
    pub fn pause_between_keys(&mut self, min: Option<f64>, max: Option<f64>) -> Duration {
        let key_delay = self.options.key_delay;
        self.pause(DelayRange::new(min.unwrap_or(key_delay.min), max.unwrap_or(key_delay.max)))
    }

    pub fn pause_between_actions(&mut self) -> Duration {
        self.pause(self.options.action_delay)
    }

    pub fn pause_after_load(&mut self) -> Duration {
        self.pause(self.options.settle_delay)
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(PacingOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_range() {
        let mut pacer = Pacer::new(PacingOptions::default().seed(7));
        for _ in 0..200 {
            let delay = pacer.sample(DelayRange::new(0.1, 1.0)).as_secs_f64();
            assert!((0.1..=1.0).contains(&delay), "{}", delay);
        }
    }

    #[test]
    fn test_seed_makes_delays_reproducible() {
        let mut a = Pacer::new(PacingOptions::default().seed(42));
        let mut b = Pacer::new(PacingOptions::default().seed(42));
        let range = DelayRange::new(0.0, 5.0);
        for _ in 0..10 {
            assert_eq!(a.sample(range), b.sample(range));
        }
    }

    #[test]
    fn test_degenerate_ranges() {
        let mut pacer = Pacer::new(PacingOptions::none());
        assert_eq!(pacer.pause_between_actions(), Duration::ZERO);
        assert_eq!(pacer.sample(DelayRange::new(0.5, 0.5)), Duration::from_millis(500));
        // Reversed and negative bounds are normalised
        let delay = pacer.sample(DelayRange::new(0.2, -1.0)).as_secs_f64();
        assert!((0.0..=0.2).contains(&delay));
    }

    #[test]
    fn test_key_pause_overrides() {
        let mut pacer = Pacer::new(PacingOptions::none().key_delay(0.0, 0.02).seed(1));
        assert_eq!(pacer.pause_between_keys(Some(0.125), Some(0.125)), Duration::from_millis(125));
        assert!(pacer.pause_between_keys(None, None) <= Duration::from_millis(20));
        // Only the upper bound is overridden
        assert_eq!(pacer.pause_between_keys(None, Some(0.0)), Duration::ZERO);
    }

    #[test]
    fn test_non_finite_bounds_do_not_panic() {
        let mut pacer = Pacer::new(PacingOptions::none());
        assert_eq!(pacer.sample(DelayRange::new(f64::NAN, f64::INFINITY)), Duration::ZERO);
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: PacingOptions = serde_json::from_value(serde_json::json!({
            "key_delay": {"min": 0.0, "max": 0.05}
        }))
        .unwrap();
        assert_eq!(options.key_delay, DelayRange::new(0.0, 0.05));
        assert_eq!(options.action_delay, DelayRange::new(0.3, 2.0));
    }
}
