//! The five built-in operations, each parameterized by the [`Resource`] it targets.
use super::{IdSelectionPolicy, Resource, ScenarioExecutor, VuContext};
use crate::check::{CheckResult, Checks};
use crate::transport::HttpRequest;
use futures_util::future::{BoxFuture, FutureExt};
use std::time::Duration;
use surge_core::Operation;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

fn within(route: &str, budget: Duration) -> String {
    format!("{route} response time < {}ms", budget.as_millis())
}

/// `GET /api/{domain}`.
pub struct ReadAll {
    resource: Resource,
    budget: Duration,
}

impl ReadAll {
    pub fn new(resource: Resource, budget: Duration) -> Self {
        Self { resource, budget }
    }
}

impl ScenarioExecutor for ReadAll {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>> {
        async move {
            let route = self.resource.collection_path();
            let res = cx
                .send(Operation::ReadAll, HttpRequest::get(&route), &[200])
                .await;

            Checks::new(&res)
                .check(format!("GET {route} status is 200"), |r| r.status_is(200))
                .check(format!("GET {}", within(&route, self.budget)), |r| {
                    r.faster_than(self.budget)
                })
                .check(format!("GET {route} has valid JSON"), |r| r.json().is_some())
                .finish()
        }
        .boxed()
    }
}

/// `GET /api/{domain}/{id}`, against a seed record or a synthesized (missing) id.
pub struct ReadOne {
    resource: Resource,
    budget: Duration,
    ids: IdSelectionPolicy,
}

impl ReadOne {
    pub fn new(resource: Resource, budget: Duration, ids: IdSelectionPolicy) -> Self {
        Self {
            resource,
            budget,
            ids,
        }
    }
}

impl ScenarioExecutor for ReadOne {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>> {
        async move {
            let route = self.resource.item_route();
            let token = cx.token();
            let id = self
                .ids
                .choose(cx.rng(), || self.resource.synthesize_id(&token));
            trace!("VU {} reading {route} with {id:?}", cx.vu());

            let res = cx
                .send(
                    Operation::ReadOne,
                    HttpRequest::get(self.resource.item_path(id.as_str())),
                    &[200, 404],
                )
                .await;

            let mut checks = Checks::new(&res)
                .check(format!("GET {route} status is 200 or 404"), |r| {
                    r.status_in(&[200, 404])
                })
                .check(format!("GET {}", within(&route, self.budget)), |r| {
                    r.faster_than(self.budget)
                });

            if res.status_is(200) {
                checks = checks.advisory(
                    format!("GET {route} has valid {} JSON", self.resource.domain().noun()),
                    |r| {
                        r.json()
                            .is_some_and(|record| self.resource.has_required_fields(&record))
                    },
                );
            }

            checks.finish()
        }
        .boxed()
    }
}

/// `POST /api/{domain}` with a unique payload.
pub struct Create {
    resource: Resource,
    budget: Duration,
}

impl Create {
    pub fn new(resource: Resource, budget: Duration) -> Self {
        Self { resource, budget }
    }
}

impl ScenarioExecutor for Create {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>> {
        async move {
            let route = self.resource.collection_path();
            let token = cx.token();
            let payload = self.resource.create_payload(cx.rng(), &token);

            let res = cx
                .send(
                    Operation::Create,
                    HttpRequest::post(&route, payload.clone()),
                    &[201],
                )
                .await;

            Checks::new(&res)
                .check(format!("POST {route} status is 201"), |r| r.status_is(201))
                .check(format!("POST {}", within(&route, self.budget)), |r| {
                    r.faster_than(self.budget)
                })
                .check(
                    format!("POST {route} returns created {}", self.resource.domain().noun()),
                    |r| {
                        r.json()
                            .is_some_and(|record| self.resource.echoes(&payload, &record))
                    },
                )
                .finish()
        }
        .boxed()
    }
}

/// `PUT /api/{domain}/{id}` against a seed record.
pub struct Update {
    resource: Resource,
    budget: Duration,
    ids: IdSelectionPolicy,
}

impl Update {
    pub fn new(resource: Resource, budget: Duration) -> Self {
        Self {
            resource,
            budget,
            ids: IdSelectionPolicy::seeds_only(resource.seed_ids().iter().copied()),
        }
    }
}

impl ScenarioExecutor for Update {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>> {
        async move {
            let route = self.resource.item_route();
            let token = cx.token();
            let id = self
                .ids
                .choose(cx.rng(), || self.resource.synthesize_id(&token));

            let res = cx
                .send(
                    Operation::Update,
                    HttpRequest::put(
                        self.resource.item_path(id.as_str()),
                        self.resource.update_payload(&token),
                    ),
                    &[200, 404],
                )
                .await;

            Checks::new(&res)
                .check(format!("PUT {route} status is 200 or 404"), |r| {
                    r.status_in(&[200, 404])
                })
                .check(format!("PUT {}", within(&route, self.budget)), |r| {
                    r.faster_than(self.budget)
                })
                .finish()
        }
        .boxed()
    }
}

/// Creates a throwaway record and deletes it. Only the delete step is checked; when the create
/// does not return `201` with an id, nothing is recorded.
pub struct Delete {
    resource: Resource,
    budget: Duration,
}

impl Delete {
    pub fn new(resource: Resource, budget: Duration) -> Self {
        Self { resource, budget }
    }
}

impl ScenarioExecutor for Delete {
    fn execute<'a>(&'a self, cx: &'a mut VuContext) -> BoxFuture<'a, Vec<CheckResult>> {
        async move {
            let token = cx.token();
            let created = cx
                .send(
                    Operation::Create,
                    HttpRequest::post(
                        self.resource.collection_path(),
                        self.resource.disposable_payload(&token),
                    ),
                    &[201],
                )
                .await;

            let id = match created.json().as_ref().and_then(Resource::id_of) {
                Some(id) if created.status_is(201) => id,
                _ => {
                    debug!(
                        "Skipping {} delete; create returned {:?}",
                        self.resource.domain(),
                        created.status
                    );
                    return vec![];
                }
            };

            let route = self.resource.item_route();
            let res = cx
                .send(
                    Operation::Delete,
                    HttpRequest::delete(self.resource.item_path(&id)),
                    &[200],
                )
                .await;

            Checks::new(&res)
                .check(format!("DELETE {route} status is 200"), |r| r.status_is(200))
                .check(format!("DELETE {}", within(&route, self.budget)), |r| {
                    r.faster_than(self.budget)
                })
                .finish()
        }
        .boxed()
    }
}
