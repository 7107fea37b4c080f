//! End-to-end test over a real socket.

use std::sync::Arc;
use std::time::Duration;

use resilient_analytics::http::{AppState, HttpServer};
use resilient_analytics::lifecycle::Shutdown;
use resilient_analytics::resilience::{Clock, SystemClock};
use resilient_analytics::store::MemoryStore;

const WINDOW_SECS: u64 = 3600;

fn current_window() -> u64 {
    SystemClock.now().as_secs() / WINDOW_SECS
}

mod common;

#[tokio::test]
async fn test_serves_and_shuts_down_gracefully() {
    let mut config = common::test_config();
    config.rate_limit.window_secs = WINDOW_SECS;

    let state = AppState::new(&config, Arc::new(MemoryStore::new()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, state);
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let metric = serde_json::json!({
        "timestamp": "2024-05-01T12:00:00Z",
        "value": 3.5,
        "type": "cpu",
    });

    let first_window = current_window();
    for _ in 0..5 {
        let res = client
            .post(format!("http://{}/api/metrics", addr))
            .json(&metric)
            .send()
            .await
            .expect("server unreachable");
        assert_eq!(res.status(), 201);
    }

    let res = client
        .post(format!("http://{}/api/metrics", addr))
        .json(&metric)
        .send()
        .await
        .unwrap();

    // Crossing a window boundary mid-test legitimately resets the count.
    let stored = if current_window() == first_window {
        assert_eq!(res.status(), 429);
        let retry_after: u64 = res.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=WINDOW_SECS).contains(&retry_after));
        5
    } else if res.status() == 429 {
        5
    } else {
        assert_eq!(res.status(), 201);
        6
    };

    let summary: serde_json::Value = client
        .get(format!("http://{}/api/metrics/summary?type=cpu", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["count"], stored);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}
