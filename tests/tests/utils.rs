use mock_service::MockConfig;
use std::sync::OnceLock;
use std::time::Duration;
use surge::prelude::*;
use surge::core::ThinkTime;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("surge=debug,mock_service=debug,axum::rejection=trace")
            .init();
    });
}

/// Start a mock service and return its base URL.
#[allow(unused)]
pub async fn mock(config: MockConfig) -> String {
    let addr = mock_service::spawn(config).await.unwrap();
    format!("http://{addr}")
}

/// A four second ramp up and down with short pauses.
#[allow(unused)]
pub fn short_run(base_url: &str) -> RunConfig {
    RunConfig {
        base_url: base_url.to_string(),
        stages: vec![
            Stage::new(Duration::from_secs(2), 4),
            Stage::new(Duration::from_secs(2), 0),
        ],
        think_time: ThinkTime {
            min: Duration::from_millis(10),
            max: Duration::from_millis(40),
        },
        progress_interval: Duration::from_secs(1),
        ..Default::default()
    }
}
