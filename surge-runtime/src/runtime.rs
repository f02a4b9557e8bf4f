//! Command-line runtime for surge.
//!
//! Loads a [`RunConfig`] (from a JSON file or the built-in profile), applies command-line
//! overrides, runs the load test against a live service and prints the report.
use crate::error::RuntimeError;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use surge::{LoadTest, RunReport};
use surge_core::RunConfig;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

/// Exit status when any threshold is crossed.
const EXIT_THRESHOLDS_FAILED: u8 = 1;
/// Exit status when the run could not start (bad config, unhealthy service).
const EXIT_ABORTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "Run a staged load test against a CRUD service")]
struct SurgeCli {
    /// JSON run configuration. Omitted fields take the built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service base URL, overriding the config file.
    #[arg(short, long)]
    base_url: Option<String>,

    /// Seed for the virtual users' RNGs.
    #[arg(short, long)]
    seed: Option<u64>,
}

/// Default surge runtime.
///
/// # Example
///
/// ```ignore
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     SurgeRuntime::new().with_args().run().await
/// }
/// ```
#[derive(Debug, Default)]
pub struct SurgeRuntime {
    config_path: Option<PathBuf>,
    base_url: Option<String>,
    seed: Option<u64>,
}

impl SurgeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the default CLI arguments.
    ///
    /// `-c`, `--config` path to a JSON run configuration
    ///
    /// `-b`, `--base-url` to target another service
    ///
    /// `-s`, `--seed` for a reproducible scenario mix
    ///
    /// # Example
    /// ```ignore
    /// $ surge-runtime -c demos/crud-mix.json -b http://127.0.0.1:8080 -s 7
    /// ```
    pub fn with_args(self) -> Self {
        let args = SurgeCli::parse();
        Self {
            config_path: args.config,
            base_url: args.base_url.or(self.base_url),
            seed: args.seed.or(self.seed),
        }
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The configuration this runtime would run with.
    pub fn load_config(&self) -> Result<RunConfig, RuntimeError> {
        let mut config = match &self.config_path {
            Some(path) => read_config(path)?,
            None => RunConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        Ok(config)
    }

    /// Run the load test and return its report.
    #[instrument(name = "surge", skip_all)]
    pub async fn execute(&self) -> Result<RunReport, RuntimeError> {
        let config = self.load_config()?;
        info!("Targeting {}", config.base_url);

        let mut test = LoadTest::new(config);
        if let Some(seed) = self.seed {
            test = test.seed(seed);
        }
        Ok(test.await?)
    }

    /// Run the load test, print the report and map the verdict to an exit status.
    pub async fn run(self) -> ExitCode {
        match self.execute().await {
            Ok(report) => {
                println!("{report}");
                if report.passed() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(EXIT_THRESHOLDS_FAILED)
                }
            }
            Err(err) => {
                error!("{err}");
                ExitCode::from(EXIT_ABORTED)
            }
        }
    }
}

fn read_config(path: &Path) -> Result<RunConfig, RuntimeError> {
    debug!("Reading config from {}", path.display());
    let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}
