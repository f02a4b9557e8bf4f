#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod check;
pub mod error;
pub mod metrics;
pub mod request;
pub mod runner;
pub mod scenario;
pub mod scheduler;
pub mod selector;
pub mod threshold;
pub mod transport;

pub use error::{RunError, TransportError};
pub use runner::{LoadTest, RunReport};
pub use surge_core as core;

pub mod prelude {
    pub use crate::check::{CheckResult, Checks};
    pub use crate::runner::{LoadTest, RunReport};
    pub use crate::scenario::{ScenarioExecutor, ScenarioRegistry, VuContext};
    pub use crate::threshold::Verdict;
    pub use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

    pub use surge_core::{Domain, Operation, RunConfig, Stage, ThresholdSpec};
}
