mod utils;
#[allow(unused)]
use utils::*;

use mock_service::MockConfig;
use std::collections::HashSet;
use surge::core::MetricKey;
use surge::prelude::*;
use surge::transport::Method;
use surge::RunError;
use surge_tests::{is_item_path, RecordingTransport};

#[tokio::test(flavor = "multi_thread")]
async fn crud_mix_passes_against_a_healthy_service() {
    init();
    let base_url = mock(MockConfig::default()).await;

    let report = LoadTest::new(short_run(&base_url)).seed(7).await.unwrap();

    assert!(report.passed(), "{report}");
    assert!(report.snapshot.iterations > 0);
    assert_eq!(report.snapshot.requests.failed, 0);
    assert_eq!(report.snapshot.scenarios.failed, 0);
    assert_eq!(report.snapshot.max_vus, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_service_aborts_before_load() {
    init();
    let base_url = mock(MockConfig {
        healthy: false,
        ..Default::default()
    })
    .await;
    let transport = RecordingTransport::new(&base_url);

    let err = LoadTest::new(short_run(&base_url))
        .transport(transport.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Unhealthy { status: 503 }));
    let paths: Vec<_> = transport.exchanges().into_iter().map(|e| e.path).collect();
    assert_eq!(paths, vec!["/health".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn read_one_sees_only_hits_and_misses() {
    init();
    let base_url = mock(MockConfig::default()).await;
    let transport = RecordingTransport::new(&base_url);

    LoadTest::new(short_run(&base_url))
        .transport(transport.clone())
        .seed(11)
        .await
        .unwrap();

    let statuses: HashSet<_> = transport
        .exchanges()
        .into_iter()
        .filter(|e| e.method == Method::GET && is_item_path(&e.path))
        .filter_map(|e| e.status)
        .collect();

    assert!(!statuses.is_empty());
    assert!(statuses.is_subset(&HashSet::from([200, 404])), "{statuses:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_records_are_gone() {
    init();
    let base_url = mock(MockConfig::default()).await;
    let transport = RecordingTransport::new(&base_url);

    LoadTest::new(short_run(&base_url))
        .transport(transport.clone())
        .seed(3)
        .await
        .unwrap();

    let deleted: Vec<_> = transport
        .exchanges()
        .into_iter()
        .filter(|e| e.method == Method::DELETE)
        .collect();
    assert!(!deleted.is_empty());

    let client = reqwest::Client::new();
    for exchange in deleted {
        assert_eq!(exchange.status, Some(200));
        let res = client
            .get(format!("{base_url}{}", exchange.path))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 404, "{} survived", exchange.path);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn injected_failures_cross_the_gate() {
    init();
    let base_url = mock(MockConfig {
        failure_rate: 0.3,
        ..Default::default()
    })
    .await;

    let report = LoadTest::new(short_run(&base_url)).seed(5).await.unwrap();

    assert!(!report.passed());
    let failed_requests = report.snapshot.requests.failure_ratio();
    assert!((0.15..0.45).contains(&failed_requests), "{failed_requests}");
    assert!(report
        .verdict
        .failures()
        .any(|r| r.spec.metric == MetricKey::RequestFailed));
}
