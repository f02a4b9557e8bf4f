//! Weighted scenario selection.
use rand::Rng;
use surge_core::{ConfigError, Domain, RunConfig, ScenarioDescriptor};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// One domain's catalog as a running sum of weights, in declaration order.
#[derive(Clone, Debug)]
pub struct CumulativeTable {
    entries: Vec<ScenarioDescriptor>,
    cumulative: Vec<f64>,
}

impl CumulativeTable {
    pub fn new(domain: Domain, entries: Vec<ScenarioDescriptor>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyCatalog(domain));
        }

        let mut total = 0.;
        let mut cumulative = Vec::with_capacity(entries.len());
        for entry in &entries {
            if !entry.weight.is_finite() || entry.weight <= 0. {
                return Err(ConfigError::InvalidWeight {
                    name: entry.name.clone(),
                    weight: entry.weight,
                });
            }
            total += entry.weight;
            cumulative.push(total);
        }

        Ok(Self { entries, cumulative })
    }

    pub fn total_weight(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or_default()
    }

    /// The first entry whose cumulative weight reaches `draw`, or the last entry when rounding
    /// leaves `draw` above every bound.
    pub fn pick(&self, draw: f64) -> &ScenarioDescriptor {
        let idx = self.cumulative.partition_point(|&c| c < draw);
        match self.entries.get(idx) {
            Some(entry) => entry,
            None => {
                error!("Weighted draw {draw} exceeded the catalog total; using the last entry.");
                &self.entries[self.entries.len() - 1]
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &ScenarioDescriptor {
        let draw = rng.gen::<f64>() * self.total_weight();
        self.pick(draw)
    }

    pub fn entries(&self) -> &[ScenarioDescriptor] {
        &self.entries
    }
}

/// Chooses a domain by the split probability, then a scenario by weight within it.
#[derive(Clone, Debug)]
pub struct ScenarioSelector {
    split: f64,
    users: CumulativeTable,
    orders: CumulativeTable,
}

impl ScenarioSelector {
    /// `split` is the probability of picking from `orders`. A catalog the split can never reach
    /// may be empty.
    pub fn new(
        split: f64,
        users: Vec<ScenarioDescriptor>,
        orders: Vec<ScenarioDescriptor>,
    ) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&split) {
            return Err(ConfigError::InvalidProbability {
                name: "domain_split",
                value: split,
            });
        }

        let (users, orders) = match (split > 0., split < 1.) {
            (true, true) => (
                CumulativeTable::new(Domain::Users, users)?,
                CumulativeTable::new(Domain::Orders, orders)?,
            ),
            // Only orders is reachable.
            (true, false) => {
                let orders = CumulativeTable::new(Domain::Orders, orders)?;
                (orders.clone(), orders)
            }
            _ => {
                let users = CumulativeTable::new(Domain::Users, users)?;
                (users.clone(), users)
            }
        };

        Ok(Self {
            split,
            users,
            orders,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        let (users, orders) = config
            .descriptors()
            .partition(|d| d.domain == Domain::Users);
        Self::new(config.domain_split, users, orders)
    }

    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &ScenarioDescriptor {
        let table = if rng.gen::<f64>() < self.split {
            &self.orders
        } else {
            &self.users
        };
        table.sample(rng)
    }

    /// Every selectable descriptor.
    pub fn descriptors(&self) -> impl Iterator<Item = &ScenarioDescriptor> {
        let orders = (self.split > 0.).then_some(self.orders.entries());
        let users = (self.split < 1.).then_some(self.users.entries());
        users.into_iter().chain(orders).flatten()
    }
}
