use rand::seq::SliceRandom;
use rand::Rng;

/// Which id a targeted request (read-one, update) goes after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdChoice {
    /// One of the records known to exist.
    Seed(String),
    /// An id that almost certainly does not exist.
    Synthesized(String),
}

impl IdChoice {
    pub fn as_str(&self) -> &str {
        match self {
            IdChoice::Seed(id) | IdChoice::Synthesized(id) => id,
        }
    }
}

/// Picks a seed id with probability `hit_probability`, uniformly among `seeds`; otherwise
/// synthesizes one.
#[derive(Clone, Debug)]
pub struct IdSelectionPolicy {
    hit_probability: f64,
    seeds: Vec<String>,
}

impl IdSelectionPolicy {
    pub fn new<S: Into<String>>(hit_probability: f64, seeds: impl IntoIterator<Item = S>) -> Self {
        Self {
            hit_probability: hit_probability.clamp(0., 1.),
            seeds: seeds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn seeds_only<S: Into<String>>(seeds: impl IntoIterator<Item = S>) -> Self {
        Self::new(1., seeds)
    }

    pub fn hit_probability(&self) -> f64 {
        self.hit_probability
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R, synthesize: impl FnOnce() -> String) -> IdChoice {
        if rng.gen::<f64>() < self.hit_probability {
            if let Some(seed) = self.seeds.choose(rng) {
                return IdChoice::Seed(seed.clone());
            }
        }
        IdChoice::Synthesized(synthesize())
    }
}
