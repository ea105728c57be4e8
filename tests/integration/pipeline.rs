//! End-to-end cycle scenarios through `CycleScheduler`.

use std::sync::Arc;
use std::time::Duration;

use deal_scout::engine::analysis::ProcessAnalyzer;
use deal_scout::engine::scheduler::{CycleScheduler, TickOutcome};
use deal_scout::engine::zscore::ZScoreAnalyzer;
use deal_scout::marketplace::lostark::LostArkClient;
use deal_scout::types::*;

use crate::mock_source::{auction_listing, deal, MockSource, RecordingAnalyzer};

fn scheduler(source: Arc<MockSource>, analyzer: Arc<RecordingAnalyzer>) -> CycleScheduler {
    CycleScheduler::new(source, analyzer, SearchQuery::default(), Duration::from_secs(3600))
}

#[tokio::test]
async fn test_empty_search_completes_without_analysis() {
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Empty)));
    let analyzer = Arc::new(RecordingAnalyzer::new(Ok(Vec::new())));
    let sched = scheduler(source.clone(), analyzer.clone());

    let outcome = sched.tick().await;

    assert_eq!(analyzer.invocations(), 0);
    assert_eq!(
        outcome,
        TickOutcome::Completed(CycleOutcome::Success {
            empty: true,
            listings: 0,
            dropped: 0,
            deals: 0,
        })
    );
    let state = sched.status().snapshot().await;
    assert_eq!(state.health(), "ok");
    assert!(state.last_recommendations.is_empty());
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_start_price_listing_forwarded_as_single_element() {
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Listings(vec![
        auction_listing("원한", "전설", 0, 1500),
    ]))));
    let analyzer = Arc::new(RecordingAnalyzer::new(Ok(Vec::new())));
    let sched = scheduler(source, analyzer.clone());

    sched.tick().await;

    let requests = analyzer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].listings(),
        [NormalizedListing {
            name: "원한".into(),
            price: 1500,
            grade: "전설".into(),
        }]
    );
}

#[tokio::test]
async fn test_failure_then_recovery() {
    let source = Arc::new(
        MockSource::new(Ok(FetchOutcome::Listings(vec![
            auction_listing("원한", "전설", 900, 800),
            auction_listing("원한", "전설", 2000, 1800),
        ])))
        .with_script(vec![
            Err(FetchError::Unauthorized {
                detail: "HTTP 401".into(),
            }),
            Err(FetchError::Network {
                detail: "connection reset".into(),
            }),
        ]),
    );
    let analyzer = Arc::new(RecordingAnalyzer::new(Ok(vec![deal("원한", 900, -1.6)])));
    let sched = scheduler(source.clone(), analyzer.clone());

    sched.tick().await;
    sched.tick().await;
    let failed = sched.status().snapshot().await;
    assert_eq!(failed.consecutive_failures, 2);
    assert_eq!(failed.health(), "degraded");
    assert!(matches!(
        failed.last_outcome,
        Some(CycleOutcome::Failure { stage: CycleStage::Fetch, ref kind, .. }) if kind == "network"
    ));
    assert_eq!(analyzer.invocations(), 0);

    sched.tick().await;
    let recovered = sched.status().snapshot().await;
    assert_eq!(recovered.consecutive_failures, 0);
    assert_eq!(recovered.cycles_run, 3);
    assert_eq!(recovered.last_recommendations, vec![deal("원한", 900, -1.6)]);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_analysis_failure_reported_at_analysis_stage() {
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Listings(vec![
        auction_listing("원한", "전설", 900, 0),
    ]))));

    let good = Arc::new(RecordingAnalyzer::new(Ok(vec![deal("원한", 900, -2.0)])));
    let status = {
        let sched = scheduler(source.clone(), good);
        sched.tick().await;
        sched.status().snapshot().await
    };
    assert_eq!(status.last_recommendations.len(), 1);

    let bad = Arc::new(RecordingAnalyzer::new(Err(AnalysisError::MalformedOutput {
        detail: "not json".into(),
    })));
    let sched = CycleScheduler::new(source, bad, SearchQuery::default(), Duration::from_secs(3600));
    let outcome = sched.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Completed(CycleOutcome::Failure { stage: CycleStage::Analysis, .. })
    ));
}

#[tokio::test]
async fn test_run_loop_never_overlaps_cycles() {
    // Cycles take longer than the interval.
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Empty)).with_delay(Duration::from_millis(80)));
    let analyzer = Arc::new(RecordingAnalyzer::new(Ok(Vec::new())));
    let sched = CycleScheduler::new(
        source.clone(),
        analyzer,
        SearchQuery::default(),
        Duration::from_millis(10),
    );

    sched.run(tokio::time::sleep(Duration::from_millis(300))).await;

    assert_eq!(source.max_in_flight(), 1);
    assert!(source.calls() >= 2);
    // Ticks are never queued: at most one cycle per (delay + interval).
    assert!(source.calls() <= 5, "too many cycles: {}", source.calls());
}

#[tokio::test]
async fn test_concurrent_tick_is_skipped() {
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Empty)).with_delay(Duration::from_millis(200)));
    let analyzer = Arc::new(RecordingAnalyzer::new(Ok(Vec::new())));
    let sched = Arc::new(scheduler(source.clone(), analyzer));

    let background = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    for _ in 0..3 {
        assert_eq!(sched.tick().await, TickOutcome::Skipped);
    }
    background.await.unwrap();
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_builtin_engine_flags_outlier() {
    let mut listings: Vec<RawListing> = (0..5)
        .map(|_| auction_listing("원한", "전설", 2000, 1900))
        .collect();
    listings.push(auction_listing("원한", "전설", 0, 300));
    let source = Arc::new(MockSource::new(Ok(FetchOutcome::Listings(listings))));
    let sched = CycleScheduler::new(
        source,
        Arc::new(ZScoreAnalyzer::default()),
        SearchQuery::default(),
        Duration::from_secs(3600),
    );

    sched.tick().await;

    let state = sched.status().snapshot().await;
    assert_eq!(state.last_recommendations.len(), 1);
    assert_eq!(state.last_recommendations[0].price, 300);
    assert!(state.last_recommendations[0].z_score <= -1.5);
}

/// Real HTTP client against a local API, real analysis child process.
#[cfg(unix)]
#[tokio::test]
async fn test_full_stack_http_and_process() {
    use axum::{routing::post, Json, Router};
    use secrecy::SecretString;

    let router = Router::new().route(
        "/auctions/items",
        post(|| async {
            Json(serde_json::json!({
                "Items": [
                    {"Name": "원한", "Grade": "전설", "AuctionInfo": {"BuyPrice": 0, "StartPrice": 1500}},
                    {"Name": "broken", "Grade": "전설"}
                ]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let capture = std::env::temp_dir().join(format!("deal_scout_e2e_{}.json", uuid::Uuid::new_v4()));
    let script = format!(
        r#"printf '%s' "$0" > '{}'; echo '[{{"name":"원한","price":1500,"z_score":-1.7}}]'"#,
        capture.display()
    );
    let analyzer = ProcessAnalyzer::new("sh", vec!["-c".into(), script]).with_timeout(Duration::from_secs(10));
    let client = LostArkClient::new(
        format!("http://{addr}"),
        SecretString::new("test-key".into()),
        Duration::from_secs(5),
    )
    .unwrap();

    let sched = CycleScheduler::new(
        Arc::new(client),
        Arc::new(analyzer),
        SearchQuery::default(),
        Duration::from_secs(3600),
    );
    let outcome = sched.tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Completed(CycleOutcome::Success {
            empty: false,
            listings: 1,
            dropped: 1,
            deals: 1,
        })
    );
    let sent: Vec<NormalizedListing> =
        serde_json::from_str(&std::fs::read_to_string(&capture).unwrap()).unwrap();
    assert_eq!(
        sent,
        vec![NormalizedListing {
            name: "원한".into(),
            price: 1500,
            grade: "전설".into(),
        }]
    );
    std::fs::remove_file(&capture).unwrap();
}
