//! Service forwarding through a running gateway.

mod common;

use std::time::Duration;

use common::{closed_port, gateway_config, MockBackend, Reply, TestGateway};

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

#[tokio::test]
async fn liveness_probe() {
    let gateway = TestGateway::start(gateway_config(closed_port(), &[], "http://127.0.0.1:1")).await;

    let response = reqwest::get(gateway.url("/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    gateway.stop().await;
}

#[tokio::test]
async fn sync_forward_is_transparent() {
    let backend = MockBackend::start(Reply {
        status: reqwest::StatusCode::IM_A_TEAPOT,
        content_type: "application/x-custom; charset=latin1",
        body: &[0x00, 0xff, b'\r', b'\n', 0x7f],
        delay: Duration::ZERO,
    })
    .await;
    let gateway =
        TestGateway::start(gateway_config(backend.port(), &["echo"], "http://127.0.0.1:1")).await;

    let response = reqwest::Client::new()
        .put(gateway.url("/default/echo/api//items?x=1&y=two"))
        .header("x-custom", "a")
        .header("traceparent", TRACEPARENT)
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 418);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-custom; charset=latin1"
    );
    assert_eq!(&response.bytes().await.unwrap()[..], &[0x00, 0xff, b'\r', b'\n', 0x7f]);

    let captured = backend.captured();
    assert_eq!(captured.len(), 1);
    let request = &captured[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.path_and_query, "/api/items?x=1&y=two");
    assert_eq!(&request.body[..], b"payload");
    assert_eq!(request.headers["x-custom"], "a");
    assert_eq!(
        request.headers["host"],
        format!("echo.default.svc.cluster.local:{}", backend.port()).as_str()
    );

    // Same trace, new span.
    let forwarded = request.headers["traceparent"].to_str().unwrap();
    assert!(forwarded.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"), "{forwarded}");
    assert_ne!(forwarded, TRACEPARENT);

    gateway.stop().await;
}

#[tokio::test]
async fn service_root_and_encoded_paths() {
    let backend = MockBackend::start(Reply::ok()).await;
    let gateway =
        TestGateway::start(gateway_config(backend.port(), &["echo"], "http://127.0.0.1:1")).await;
    let client = reqwest::Client::new();

    for path in ["/default/echo", "/default/echo/", "/default/echo/a%2Fb%3Fc"] {
        let response = client.get(gateway.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 200, "{path}");
    }

    let paths: Vec<String> = backend
        .captured()
        .into_iter()
        .map(|c| c.path_and_query)
        .collect();
    assert_eq!(paths, vec!["/", "/", "/a%2Fb%3Fc"]);

    gateway.stop().await;
}

#[tokio::test]
async fn unreachable_service_is_bad_gateway() {
    let gateway = TestGateway::start(gateway_config(closed_port(), &["gone"], "http://127.0.0.1:1")).await;

    let response = reqwest::get(gateway.url("/default/gone/ping")).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("upstream"), "{body}");

    gateway.stop().await;
}

#[tokio::test]
async fn slow_service_is_gateway_timeout() {
    let backend = MockBackend::start(Reply::ok().delayed(Duration::from_secs(3))).await;
    let mut config = gateway_config(backend.port(), &["slow"], "http://127.0.0.1:1");
    config.timeouts.request_secs = 1;
    let gateway = TestGateway::start(config).await;

    let response = reqwest::get(gateway.url("/default/slow/")).await.unwrap();
    assert_eq!(response.status(), 504);

    gateway.stop().await;
}

#[tokio::test]
async fn async_invoke_answers_before_the_service() {
    let backend = MockBackend::start(Reply::ok().delayed(Duration::from_millis(500))).await;
    let gateway =
        TestGateway::start(gateway_config(backend.port(), &["worker"], "http://127.0.0.1:1")).await;

    let client = reqwest::Client::new();
    let response = client
        .post(gateway.url("/async/default/worker/jobs?priority=high"))
        .header("traceparent", TRACEPARENT)
        .body("job payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(response.bytes().await.unwrap().is_empty());
    assert!(backend.captured().is_empty());

    // The caller going away does not cancel the forward.
    drop(client);
    assert!(backend.wait_for(1, Duration::from_secs(5)).await);

    let request = &backend.captured()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path_and_query, "/jobs?priority=high");
    assert_eq!(&request.body[..], b"job payload");
    let forwarded = request.headers["traceparent"].to_str().unwrap();
    assert!(forwarded.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"), "{forwarded}");

    gateway.stop().await;
}

#[tokio::test]
async fn async_forward_failure_is_only_logged() {
    let gateway = TestGateway::start(gateway_config(closed_port(), &["gone"], "http://127.0.0.1:1")).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/async/default/gone/x"))
        .body("lost")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(response.bytes().await.unwrap().is_empty());

    // The failed task still finishes and releases its slot.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while gateway.in_flight.active_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "async forward never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    gateway.stop().await;
}

#[tokio::test]
async fn async_invoke_fans_out_without_dedup() {
    let backend = MockBackend::start(Reply::ok()).await;
    let gateway =
        TestGateway::start(gateway_config(backend.port(), &["worker"], "http://127.0.0.1:1")).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client
            .post(gateway.url("/async/default/worker"))
            .body("same")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
    }
    assert!(backend.wait_for(3, Duration::from_secs(5)).await);

    gateway.stop().await;
}

#[tokio::test]
async fn shutdown_drains_async_forwards() {
    let backend = MockBackend::start(Reply::ok().delayed(Duration::from_millis(400))).await;
    let gateway =
        TestGateway::start(gateway_config(backend.port(), &["worker"], "http://127.0.0.1:1")).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/async/default/worker/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert_eq!(gateway.in_flight.active_count(), 1);

    let in_flight = gateway.in_flight.clone();
    gateway.stop().await;
    assert_eq!(in_flight.active_count(), 0);
    assert_eq!(backend.captured().len(), 1);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let backend = MockBackend::start(Reply::ok()).await;
    let mut config = gateway_config(backend.port(), &["worker"], "http://127.0.0.1:1");
    config.limits.max_body_bytes = 16;
    let gateway = TestGateway::start(config).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/async/default/worker"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(backend.captured().is_empty());

    gateway.stop().await;
}
