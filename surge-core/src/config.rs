use crate::constants::*;
use crate::error::ConfigError;
use crate::threshold::{self, ThresholdSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

/// A timed segment of the run. Concurrency ramps linearly from the previous stage's target to
/// `target` over `duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Users,
    Orders,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Users, Domain::Orders];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Users => "users",
            Domain::Orders => "orders",
        }
    }

    /// Singular noun, used in check names (`has valid user JSON`).
    pub fn noun(&self) -> &'static str {
        match self {
            Domain::Users => "user",
            Domain::Orders => "order",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ReadAll,
    ReadOne,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::ReadAll,
        Operation::ReadOne,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadAll => "read-all",
            Operation::ReadOne => "read-one",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Position in [`Operation::ALL`], for fixed-size per-operation tables.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation `{s}`"))
    }
}

/// One weighted entry of a domain's catalog, as written in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub weight: f64,
    pub operation: Operation,
}

impl CatalogEntry {
    pub fn new(name: &str, weight: f64, operation: Operation) -> Self {
        Self {
            name: name.to_string(),
            weight,
            operation,
        }
    }

    pub fn describe(&self, domain: Domain) -> ScenarioDescriptor {
        ScenarioDescriptor {
            name: self.name.clone(),
            weight: self.weight,
            domain,
            operation: self.operation,
        }
    }
}

/// A concrete, selectable scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioDescriptor {
    pub name: String,
    pub weight: f64,
    pub domain: Domain,
    pub operation: Operation,
}

/// Bounds for the uniformly distributed pause between two iterations of a virtual user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTime {
    #[serde(with = "duration_str")]
    pub min: Duration,
    #[serde(with = "duration_str")]
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self {
            min: DEFAULT_THINK_TIME_MIN,
            max: DEFAULT_THINK_TIME_MAX,
        }
    }
}

/// Per-operation latency budget checked inline by each scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LatencyBudgets {
    #[serde(with = "duration_str")]
    pub read_all: Duration,
    #[serde(with = "duration_str")]
    pub read_one: Duration,
    #[serde(with = "duration_str")]
    pub create: Duration,
    #[serde(with = "duration_str")]
    pub update: Duration,
    #[serde(with = "duration_str")]
    pub delete: Duration,
}

impl LatencyBudgets {
    pub fn budget(&self, operation: Operation) -> Duration {
        match operation {
            Operation::ReadAll => self.read_all,
            Operation::ReadOne => self.read_one,
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

impl Default for LatencyBudgets {
    fn default() -> Self {
        Self {
            read_all: Duration::from_millis(500),
            read_one: Duration::from_millis(300),
            create: Duration::from_millis(800),
            update: Duration::from_millis(600),
            delete: Duration::from_millis(400),
        }
    }
}

/// Everything a run needs. Immutable once the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub base_url: String,
    pub stages: Vec<Stage>,
    pub domain_split: f64,
    pub users_catalog: Vec<CatalogEntry>,
    pub orders_catalog: Vec<CatalogEntry>,
    #[serde(with = "threshold::by_metric")]
    pub thresholds: Vec<ThresholdSpec>,
    pub think_time: ThinkTime,
    pub id_hit_probability: f64,
    pub budgets: LatencyBudgets,
    pub rate_limit: Option<NonZeroU32>,
    #[serde(with = "duration_str")]
    pub progress_interval: Duration,
    #[serde(with = "duration_str")]
    pub tick: Duration,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        check_probability("domain_split", self.domain_split)?;
        check_probability("id_hit_probability", self.id_hit_probability)?;

        if self.think_time.min > self.think_time.max {
            return Err(ConfigError::InvalidThinkTime {
                min: self.think_time.min,
                max: self.think_time.max,
            });
        }

        if self.tick.is_zero() {
            return Err(ConfigError::ZeroInterval { name: "tick" });
        }
        if self.progress_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                name: "progress_interval",
            });
        }

        Ok(())
    }

    /// Both catalogs expanded into descriptors, users first.
    pub fn descriptors(&self) -> impl Iterator<Item = ScenarioDescriptor> + '_ {
        let users = self.users_catalog.iter().map(|e| e.describe(Domain::Users));
        let orders = self.orders_catalog.iter().map(|e| e.describe(Domain::Orders));
        users.chain(orders)
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stages: vec![
                Stage::new(Duration::from_secs(30), 10),
                Stage::new(Duration::from_secs(60), 50),
                Stage::new(Duration::from_secs(30), 100),
                Stage::new(Duration::from_secs(120), 100),
                Stage::new(Duration::from_secs(30), 0),
            ],
            domain_split: DEFAULT_DOMAIN_SPLIT,
            users_catalog: default_catalog(Domain::Users),
            orders_catalog: default_catalog(Domain::Orders),
            thresholds: threshold::default_thresholds(),
            think_time: ThinkTime::default(),
            id_hit_probability: DEFAULT_ID_HIT_PROBABILITY,
            budgets: LatencyBudgets::default(),
            rate_limit: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            tick: DEFAULT_SCHEDULER_TICK,
        }
    }
}

fn default_catalog(domain: Domain) -> Vec<CatalogEntry> {
    let (plural, singular) = match domain {
        Domain::Users => ("users", "user"),
        Domain::Orders => ("orders", "order"),
    };
    vec![
        CatalogEntry::new(&format!("get_all_{plural}"), 40., Operation::ReadAll),
        CatalogEntry::new(&format!("get_{singular}_by_id"), 30., Operation::ReadOne),
        CatalogEntry::new(&format!("create_{singular}"), 15., Operation::Create),
        CatalogEntry::new(&format!("update_{singular}"), 10., Operation::Update),
        CatalogEntry::new(&format!("delete_{singular}"), 5., Operation::Delete),
    ]
}

/// `humantime` strings (`"30s"`, `"1m 30s"`) for durations in configuration files.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
