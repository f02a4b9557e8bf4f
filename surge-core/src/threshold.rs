//! Threshold specifications.
//!
//! Thresholds are written in configuration as a map from metric key to a list of conditions:
//!
//! ```json
//! {
//!     "http_req_duration": ["p(95)<500"],
//!     "http_req_duration{operation:create}": ["avg<400"],
//!     "http_req_failed": ["rate<0.05"],
//!     "checks{check:GET /api/users status is 200}": ["rate>0.99"],
//!     "errors": ["rate<0.1"]
//! }
//! ```
//!
//! Durations are compared in milliseconds. `rate` on `http_req_failed` and `errors` is the
//! fraction that failed; on `checks` it is the fraction that passed.
use crate::config::Operation;
use crate::error::ConfigError;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum MetricKey {
    /// Latency of completed requests, optionally narrowed to one operation.
    RequestDuration(Option<Operation>),
    /// Requests that errored at the transport or returned a status the step does not accept.
    RequestFailed,
    /// Check results, optionally narrowed to one check name.
    Checks(Option<String>),
    /// Iterations in which at least one non-advisory check failed.
    Errors,
    Iterations,
}

impl MetricKey {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let (base, tag) = match raw.split_once('{') {
            Some((base, rest)) => {
                let tag = rest
                    .strip_suffix('}')
                    .ok_or_else(|| invalid(raw, "unterminated tag"))?;
                let (tag_name, value) = tag
                    .split_once(':')
                    .ok_or_else(|| invalid(raw, "tags are written as {name:value}"))?;
                (base.trim(), Some((tag_name.trim(), value.trim())))
            }
            None => (raw, None),
        };

        match (base, tag) {
            ("http_req_duration", None) => Ok(MetricKey::RequestDuration(None)),
            ("http_req_duration", Some(("operation", op))) => op
                .parse::<Operation>()
                .map(|op| MetricKey::RequestDuration(Some(op)))
                .map_err(|reason| invalid(raw, &reason)),
            ("http_req_failed", None) => Ok(MetricKey::RequestFailed),
            ("checks", None) => Ok(MetricKey::Checks(None)),
            ("checks", Some(("check", name))) => Ok(MetricKey::Checks(Some(name.to_string()))),
            ("errors", None) => Ok(MetricKey::Errors),
            ("iterations", None) => Ok(MetricKey::Iterations),
            (_, Some((tag_name, _))) => Err(invalid(raw, &format!("unsupported tag `{tag_name}`"))),
            _ => Err(invalid(raw, "unknown metric")),
        }
    }

    fn supports(&self, aggregation: Aggregation) -> bool {
        use Aggregation::*;
        match self {
            MetricKey::RequestDuration(_) => {
                matches!(aggregation, Percentile(_) | Avg | Min | Max | Med | Count)
            }
            MetricKey::RequestFailed | MetricKey::Checks(_) | MetricKey::Errors => {
                matches!(aggregation, Rate | Count)
            }
            MetricKey::Iterations => matches!(aggregation, Rate | Count),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::RequestDuration(None) => write!(f, "http_req_duration"),
            MetricKey::RequestDuration(Some(op)) => write!(f, "http_req_duration{{operation:{op}}}"),
            MetricKey::RequestFailed => write!(f, "http_req_failed"),
            MetricKey::Checks(None) => write!(f, "checks"),
            MetricKey::Checks(Some(name)) => write!(f, "checks{{check:{name}}}"),
            MetricKey::Errors => write!(f, "errors"),
            MetricKey::Iterations => write!(f, "iterations"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Aggregation {
    /// Percentile in `(0, 100]`.
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
}

impl Aggregation {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "avg" => Some(Aggregation::Avg),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            "med" => Some(Aggregation::Med),
            "count" => Some(Aggregation::Count),
            "rate" => Some(Aggregation::Rate),
            _ => {
                let p: f64 = raw
                    .strip_prefix("p(")?
                    .strip_suffix(')')?
                    .trim()
                    .parse()
                    .ok()?;
                (p > 0. && p <= 100.).then_some(Aggregation::Percentile(p))
            }
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    // Two-character operators first so `<=` is not read as `<`.
    const SYMBOLS: [(&'static str, Comparator); 6] = [
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];

    pub fn compare(&self, actual: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => actual < limit,
            Comparator::Le => actual <= limit,
            Comparator::Gt => actual > limit,
            Comparator::Ge => actual >= limit,
            Comparator::Eq => actual == limit,
            Comparator::Ne => actual != limit,
        }
    }

    pub fn symbol(&self) -> &'static str {
        Self::SYMBOLS
            .iter()
            .find(|(_, c)| c == self)
            .map(|(s, _)| *s)
            .unwrap_or("?")
    }
}

/// A pass/fail condition on one aggregated metric, evaluated against the final snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdSpec {
    pub metric: MetricKey,
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub limit: f64,
}

impl ThresholdSpec {
    pub fn new(
        metric: MetricKey,
        aggregation: Aggregation,
        comparator: Comparator,
        limit: f64,
    ) -> Result<Self, ConfigError> {
        if !metric.supports(aggregation) {
            return Err(ConfigError::InvalidThreshold {
                expr: format!("{metric}: {aggregation}"),
                reason: format!("`{aggregation}` is not available on `{metric}`"),
            });
        }
        if !limit.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                expr: format!("{metric}: {aggregation}{}{limit}", comparator.symbol()),
                reason: "limit must be finite".to_string(),
            });
        }
        Ok(Self {
            metric,
            aggregation,
            comparator,
            limit,
        })
    }

    /// Parse a metric key and a condition such as `p(95)<500`.
    pub fn parse(metric: &str, condition: &str) -> Result<Self, ConfigError> {
        let metric = MetricKey::parse(metric)?;

        let pos = condition
            .find(|c| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(|| invalid(condition, "missing comparison operator"))?;
        let (agg, rest) = condition.split_at(pos);

        let (symbol, comparator) = Comparator::SYMBOLS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
            .copied()
            .ok_or_else(|| invalid(condition, "unknown comparison operator"))?;

        let aggregation =
            Aggregation::parse(agg).ok_or_else(|| invalid(condition, "unknown aggregation"))?;
        let limit: f64 = rest[symbol.len()..]
            .trim()
            .parse()
            .map_err(|_| invalid(condition, "limit is not a number"))?;

        Self::new(metric, aggregation, comparator, limit)
    }

    /// The condition half of the expression, e.g. `p(95)<500`.
    pub fn condition(&self) -> String {
        format!(
            "{}{}{}",
            self.aggregation,
            self.comparator.symbol(),
            self.limit
        )
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.metric, self.condition())
    }
}

fn invalid(expr: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidThreshold {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

/// The three thresholds of the reference profile: p95 latency under 500ms, under 5% failed
/// requests and under 10% failing iterations.
pub(crate) fn default_thresholds() -> Vec<ThresholdSpec> {
    use Aggregation::*;
    use Comparator::*;
    // Ordered by metric key so configuration round-trips are stable.
    vec![
        ThresholdSpec {
            metric: MetricKey::Errors,
            aggregation: Rate,
            comparator: Lt,
            limit: 0.1,
        },
        ThresholdSpec {
            metric: MetricKey::RequestDuration(None),
            aggregation: Percentile(95.),
            comparator: Lt,
            limit: 500.,
        },
        ThresholdSpec {
            metric: MetricKey::RequestFailed,
            aggregation: Rate,
            comparator: Lt,
            limit: 0.05,
        },
    ]
}

/// Serde adapter for the `{ metric: [condition, ..] }` configuration form.
pub(crate) mod by_metric {
    use super::ThresholdSpec;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        specs: &[ThresholdSpec],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for spec in specs {
            map.entry(spec.metric.to_string())
                .or_default()
                .push(spec.condition());
        }
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ThresholdSpec>, D::Error> {
        let map = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
        let mut specs = vec![];
        for (metric, conditions) in &map {
            for condition in conditions {
                let spec =
                    ThresholdSpec::parse(metric, condition).map_err(serde::de::Error::custom)?;
                specs.push(spec);
            }
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conditions() {
        let spec = ThresholdSpec::parse("http_req_duration", "p(95)<500").unwrap();
        assert_eq!(spec.metric, MetricKey::RequestDuration(None));
        assert_eq!(spec.aggregation, Aggregation::Percentile(95.));
        assert_eq!(spec.comparator, Comparator::Lt);
        assert_eq!(spec.limit, 500.);

        let spec = ThresholdSpec::parse("http_req_failed", " rate <= 0.05 ").unwrap();
        assert_eq!(spec.comparator, Comparator::Le);
        assert_eq!(spec.limit, 0.05);

        let spec = ThresholdSpec::parse("http_req_duration{operation:delete}", "max>=1").unwrap();
        assert_eq!(
            spec.metric,
            MetricKey::RequestDuration(Some(Operation::Delete))
        );
        assert_eq!(spec.comparator, Comparator::Ge);

        let spec =
            ThresholdSpec::parse("checks{check:GET /api/users status is 200}", "rate>0.9").unwrap();
        assert_eq!(
            spec.metric,
            MetricKey::Checks(Some("GET /api/users status is 200".to_string()))
        );
    }

    #[test]
    fn display_round_trips() {
        for (metric, condition) in [
            ("http_req_duration", "p(99.9)<1500"),
            ("http_req_duration{operation:read-one}", "med!=0"),
            ("errors", "rate<0.1"),
            ("iterations", "count>=100"),
        ] {
            let spec = ThresholdSpec::parse(metric, condition).unwrap();
            assert_eq!(spec.metric.to_string(), metric);
            assert_eq!(spec.condition(), condition);
        }
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(ThresholdSpec::parse("http_req_duration", "p(95)500").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "p(0)<500").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "p(95)<fast").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "rate<0.1").is_err());
        assert!(ThresholdSpec::parse("http_req_failed", "p(95)<0.1").is_err());
        assert!(ThresholdSpec::parse("http_req_latency", "avg<1").is_err());
        assert!(ThresholdSpec::parse("errors{operation:create}", "rate<1").is_err());
        assert!(ThresholdSpec::parse("http_req_duration{operation:upsert}", "avg<1").is_err());
        assert!(ThresholdSpec::parse("http_req_duration{operation:create", "avg<1").is_err());
    }

    #[test]
    fn comparators() {
        assert!(Comparator::Lt.compare(1., 2.));
        assert!(!Comparator::Lt.compare(2., 2.));
        assert!(Comparator::Le.compare(2., 2.));
        assert!(Comparator::Gt.compare(3., 2.));
        assert!(Comparator::Ge.compare(2., 2.));
        assert!(Comparator::Eq.compare(2., 2.));
        assert!(Comparator::Ne.compare(1., 2.));
    }
}
