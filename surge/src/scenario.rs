//! Scenario executors and the registry that maps a descriptor to one.
use crate::check::CheckResult;
use crate::request::{RequestExecutor, RequestOutcome};
use crate::transport::HttpRequest;
use futures_util::future::BoxFuture;
use rand::rngs::SmallRng;
use std::collections::HashMap;
use surge_core::{ConfigError, Domain, Operation, RunConfig, ScenarioDescriptor};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

mod crud;
mod id_policy;
mod resource;
mod unique;

pub use crud::{Create, Delete, ReadAll, ReadOne, Update};
pub use id_policy::{IdChoice, IdSelectionPolicy};
pub use resource::Resource;
pub use unique::UniqueTokens;

/// Per-loop state handed to every scenario a virtual user runs.
pub struct VuContext {
    vu: usize,
    requests: RequestExecutor,
    tokens: UniqueTokens,
    rng: SmallRng,
}

impl VuContext {
    pub fn new(vu: usize, requests: RequestExecutor, rng: SmallRng) -> Self {
        Self {
            vu,
            requests,
            tokens: UniqueTokens,
            rng,
        }
    }

    pub fn vu(&self) -> usize {
        self.vu
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    pub fn token(&self) -> String {
        self.tokens.next()
    }

    pub async fn send(
        &self,
        operation: Operation,
        request: HttpRequest,
        accepted: &[u16],
    ) -> RequestOutcome {
        self.requests.execute(operation, request, accepted).await
    }
}

/// One business scenario: a few requests plus the checks over their responses.
pub trait ScenarioExecutor: Send + Sync {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>>;
}

/// `(domain, operation)` to executor.
#[derive(Default)]
pub struct ScenarioRegistry {
    executors: HashMap<(Domain, Operation), Box<dyn ScenarioExecutor>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ten built-in executors, with budgets and id policy taken from `config`.
    pub fn builtin(config: &RunConfig) -> Self {
        let mut registry = Self::new();
        for domain in Domain::ALL {
            let resource = Resource::new(domain);
            let budget = |op| config.budgets.budget(op);

            registry.register(
                domain,
                Operation::ReadAll,
                ReadAll::new(resource, budget(Operation::ReadAll)),
            );
            registry.register(
                domain,
                Operation::ReadOne,
                ReadOne::new(
                    resource,
                    budget(Operation::ReadOne),
                    IdSelectionPolicy::new(
                        config.id_hit_probability,
                        resource.seed_ids().iter().copied(),
                    ),
                ),
            );
            registry.register(
                domain,
                Operation::Create,
                Create::new(resource, budget(Operation::Create)),
            );
            registry.register(
                domain,
                Operation::Update,
                Update::new(resource, budget(Operation::Update)),
            );
            registry.register(
                domain,
                Operation::Delete,
                Delete::new(resource, budget(Operation::Delete)),
            );
        }
        registry
    }

    /// Add or replace the executor for `(domain, operation)`.
    pub fn register<E>(&mut self, domain: Domain, operation: Operation, executor: E) -> &mut Self
    where
        E: ScenarioExecutor + 'static,
    {
        self.executors
            .insert((domain, operation), Box::new(executor));
        self
    }

    pub fn get(&self, domain: Domain, operation: Operation) -> Option<&dyn ScenarioExecutor> {
        self.executors.get(&(domain, operation)).map(|e| e.as_ref())
    }

    /// Fails on the first descriptor without an executor.
    pub fn ensure_covers<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a ScenarioDescriptor>,
    ) -> Result<(), ConfigError> {
        for d in descriptors {
            if self.get(d.domain, d.operation).is_none() {
                return Err(ConfigError::MissingExecutor {
                    domain: d.domain,
                    operation: d.operation,
                });
            }
        }
        Ok(())
    }

    pub async fn execute(
        &self,
        descriptor: &ScenarioDescriptor,
        cx: &mut VuContext,
    ) -> Vec<CheckResult> {
        match self.get(descriptor.domain, descriptor.operation) {
            Some(executor) => executor.execute(cx).await,
            None => {
                error!(
                    "No executor for {} ({} {}); skipping.",
                    descriptor.name, descriptor.domain, descriptor.operation
                );
                vec![]
            }
        }
    }
}
