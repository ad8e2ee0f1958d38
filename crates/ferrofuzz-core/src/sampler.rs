//! Adaptive samplers: discrete distributions whose weights drift toward
//! values that previously led to new coverage.

use rand::Rng;

use crate::error::{Error, Result};

/// A sampler over `[lo, hi]` that remembers which concrete values led to
/// `update(true)` and draws them more often over time.
///
/// Internally this keeps parallel `population`/`weights` lists. Slot 0 is a
/// sentinel ("fall through to uniform"); later slots hold concrete values
/// promoted by [`AdaptiveRange::update`]. Slots are found and updated by
/// *value* rather than by index, sidestepping having to reason about slot
/// indices shifting under insertion and removal.
#[derive(Debug, Clone)]
pub struct AdaptiveRange {
    lo: i64,
    hi: i64,
    /// `None` is the sentinel; `Some(v)` are promoted concrete values.
    population: Vec<Option<i64>>,
    weights: Vec<u32>,
    last: Option<i64>,
    adaptive: bool,
}

impl AdaptiveRange {
    /// Creates a sampler over `[lo, hi]`. `adaptive = false` makes it behave
    /// as a plain uniform RNG regardless of `update` calls.
    pub fn new(lo: i64, hi: i64, adaptive: bool) -> Result<Self> {
        if lo > hi {
            return Err(Error::OutOfBounds(format!(
                "lower bound must not exceed upper bound ({lo} > {hi})"
            )));
        }
        Ok(Self {
            lo,
            hi,
            population: vec![None],
            weights: vec![1],
            last: None,
            adaptive,
        })
    }

    /// Draws a value in `[lo, hi]`. `lo`/`hi` here may narrow the sampler's
    /// construction-time bounds (as `sample_max` does in the source), but
    /// must stay within them.
    pub fn sample(&mut self, lo: i64, hi: i64, rng: &mut impl Rng) -> Result<i64> {
        if lo > hi {
            return Err(Error::OutOfBounds(format!(
                "lower bound must not exceed upper bound ({lo} > {hi})"
            )));
        }
        if lo < self.lo || hi > self.hi {
            return Err(Error::OutOfBounds(format!(
                "[{lo}, {hi}] escapes sampler bounds [{}, {}]",
                self.lo, self.hi
            )));
        }

        if !self.adaptive {
            let v = rng.random_range(lo..=hi);
            self.last = Some(v);
            return Ok(v);
        }

        let total: u32 = self.weights.iter().sum();
        let mut pick = rng.random_range(0..total);
        let mut chosen = 0usize;
        for (i, w) in self.weights.iter().enumerate() {
            if pick < *w {
                chosen = i;
                break;
            }
            pick -= w;
        }

        let value = match self.population[chosen] {
            Some(v) if v >= lo && v <= hi => v,
            _ => rng.random_range(lo..=hi),
        };
        self.last = Some(value);
        Ok(value)
    }

    /// Reinforces (`success = true`) or demotes (`success = false`) the
    /// last-sampled value.
    pub fn update(&mut self, success: bool) {
        if !self.adaptive {
            return;
        }
        let Some(value) = self.last else { return };

        if success {
            match self.population.iter().position(|p| *p == Some(value)) {
                Some(idx) => self.weights[idx] += 1,
                None => {
                    self.population.push(Some(value));
                    self.weights.push(1);
                }
            }
            self.weights[0] += 1;
        } else if let Some(idx) = self.population.iter().position(|p| *p == Some(value)) {
            if idx == 0 {
                return;
            }
            if self.weights[idx] <= 1 {
                self.population.remove(idx);
                self.weights.remove(idx);
            } else {
                self.weights[idx] -= 1;
            }
            if self.weights[0] > 1 {
                self.weights[0] -= 1;
            }
        }
    }
}

/// A categorical sampler over a fixed, non-empty population with weights
/// that reinforce toward whichever choice last led to success.
#[derive(Debug, Clone)]
pub struct AdaptiveChoice<T> {
    population: Vec<T>,
    weights: Vec<u32>,
    last: Option<usize>,
    adaptive: bool,
}

impl<T: Clone> AdaptiveChoice<T> {
    pub fn new(population: Vec<T>, adaptive: bool) -> Result<Self> {
        if population.is_empty() {
            return Err(Error::OutOfBounds("population must be non-empty".into()));
        }
        let weights = vec![1u32; population.len()];
        Ok(Self {
            population,
            weights,
            last: None,
            adaptive,
        })
    }

    pub fn sample(&mut self, rng: &mut impl Rng) -> T {
        let total: u32 = self.weights.iter().sum();
        let mut pick = rng.random_range(0..total);
        let mut chosen = 0usize;
        for (i, w) in self.weights.iter().enumerate() {
            if pick < *w {
                chosen = i;
                break;
            }
            pick -= w;
        }
        self.last = Some(chosen);
        self.population[chosen].clone()
    }

    pub fn update(&mut self, success: bool) {
        if !self.adaptive {
            return;
        }
        let Some(idx) = self.last else { return };
        if success {
            self.weights[idx] += 1;
        } else if self.weights[idx] > 1 {
            self.weights[idx] -= 1;
        }
    }

    pub fn population(&self) -> &[T] {
        &self.population
    }

    pub fn push(&mut self, item: T) {
        self.population.push(item);
        self.weights.push(1);
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(AdaptiveRange::new(5, 1, true).is_err());
    }

    #[test]
    fn sample_always_within_bounds() {
        let mut r = AdaptiveRange::new(0, 10, true).unwrap();
        let mut rng = rng();
        for _ in 0..2000 {
            let v = r.sample(2, 6, &mut rng).unwrap();
            assert!((2..=6).contains(&v));
            r.update(rng.random_bool(0.5));
        }
    }

    #[test]
    fn sample_rejects_escaping_range() {
        let mut r = AdaptiveRange::new(0, 10, true).unwrap();
        let mut rng = rng();
        assert!(r.sample(-1, 5, &mut rng).is_err());
        assert!(r.sample(0, 11, &mut rng).is_err());
    }

    #[test]
    fn repeated_success_increases_frequency_of_last_value() {
        let mut r = AdaptiveRange::new(0, 100, true).unwrap();
        let mut rng = rng();

        // Drive the sampler toward value 7 by only reinforcing when it comes up.
        for _ in 0..4000 {
            let v = r.sample(0, 100, &mut rng).unwrap();
            r.update(v == 7);
        }

        let mut hits = 0;
        for _ in 0..2000 {
            if r.sample(0, 100, &mut rng).unwrap() == 7 {
                hits += 1;
            }
            r.update(false);
        }
        // Uniform over 101 values would give ~1% each; reinforcement should
        // push this well above that baseline.
        assert!(hits as f64 / 2000.0 > 0.05, "hits = {hits}");
    }

    #[test]
    fn repeated_failure_restores_near_uniformity() {
        let mut r = AdaptiveRange::new(0, 9, true).unwrap();
        let mut rng = rng();
        for _ in 0..200 {
            let v = r.sample(0, 9, &mut rng).unwrap();
            r.update(v == 3);
        }
        for _ in 0..500 {
            r.sample(0, 9, &mut rng).unwrap();
            r.update(false);
        }
        // After sustained demotion, every promoted slot on top of the
        // sentinel should have been pruned back out.
        assert_eq!(r.population.len(), 1);
    }

    #[test]
    fn non_adaptive_ignores_updates() {
        let mut r = AdaptiveRange::new(0, 5, false).unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            r.sample(0, 5, &mut rng).unwrap();
            r.update(true);
        }
        assert_eq!(r.population.len(), 1);
        assert_eq!(r.weights, vec![1]);
    }

    #[test]
    fn choice_reinforces_and_demotes() {
        let mut c = AdaptiveChoice::new(vec!["a", "b", "c"], true).unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            let v = c.sample(&mut rng);
            c.update(v == "a");
        }
        let idx_a = c.population().iter().position(|x| *x == "a").unwrap();
        assert!(c.weights[idx_a] > 1);
    }

    #[test]
    fn choice_weight_floors_at_one() {
        let mut c = AdaptiveChoice::new(vec![1, 2], true).unwrap();
        c.last = Some(0);
        for _ in 0..10 {
            c.update(false);
        }
        assert_eq!(c.weights[0], 1);
    }
}
