use crate::request::RequestOutcome;

/// A named boolean assertion over one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Advisory checks are counted under `checks` but never mark the iteration as errored.
    pub advisory: bool,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
            advisory: false,
        }
    }

    pub fn advisory(name: impl Into<String>, passed: bool) -> Self {
        Self {
            advisory: true,
            ..Self::new(name, passed)
        }
    }
}

/// Evaluates predicates against a single [`RequestOutcome`].
///
/// ```ignore
/// let results = Checks::new(&outcome)
///     .check("GET /api/users status is 200", |r| r.status_is(200))
///     .check("response time < 500ms", |r| r.faster_than(budget))
///     .finish();
/// ```
pub struct Checks<'a> {
    outcome: &'a RequestOutcome,
    results: Vec<CheckResult>,
}

impl<'a> Checks<'a> {
    pub fn new(outcome: &'a RequestOutcome) -> Self {
        Self {
            outcome,
            results: vec![],
        }
    }

    pub fn check(mut self, name: impl Into<String>, predicate: impl FnOnce(&RequestOutcome) -> bool) -> Self {
        let passed = predicate(self.outcome);
        self.results.push(CheckResult::new(name, passed));
        self
    }

    /// Like [`Checks::check`], but the result does not feed the `errors` rate.
    pub fn advisory(mut self, name: impl Into<String>, predicate: impl FnOnce(&RequestOutcome) -> bool) -> Self {
        let passed = predicate(self.outcome);
        self.results.push(CheckResult::advisory(name, passed));
        self
    }

    pub fn finish(self) -> Vec<CheckResult> {
        self.results
    }
}
