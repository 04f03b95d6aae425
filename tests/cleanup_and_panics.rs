// Cleanup ordering, failure propagation and panic recovery across a full
// request.
use std::sync::{Arc, Mutex};

use axum::body::Body;
use fieldroute::{BoxError, Closer, Fields, Input, Outcome, RequestContext, Router};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Pair {
    first: String,
    second: String,
}

impl Input for Pair {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("first", |p: &mut Self| &mut p.first)
            .field("second", |p: &mut Self| &mut p.second)
    }
}

fn outcome_label(outcome: Outcome<'_>) -> String {
    outcome.map_or_else(|| "ok".to_string(), |err| err.to_string())
}

/// Binds a path segment and records `label:<outcome>` once released.
fn tracked(log: &Log, label: &'static str) -> fieldroute::FieldOption<String> {
    let log = Arc::clone(log);
    fieldroute::closable_request_value(move |ctx: &RequestContext, value: &mut String| {
        *value = ctx.remaining_segments().next().unwrap_or_default().to_string();
        log.lock().unwrap().push(format!("open {label}"));
        let log = Arc::clone(&log);
        let closer: Closer = Box::new(move |outcome: Outcome<'_>| {
            log.lock().unwrap().push(format!("close {label}:{}", outcome_label(outcome)));
            Ok(())
        });
        Ok(closer)
    })
}

async fn get(router: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_cleanups_run_once_in_reverse_after_handler() {
    let log = Log::default();
    let handler_log = Arc::clone(&log);
    let router = Router::builder()
        .by_name("first", [tracked(&log, "first")])
        .by_name("second", [tracked(&log, "second")])
        .get(move |p: Pair| {
            handler_log.lock().unwrap().push("handler".to_string());
            async move { Ok::<_, BoxError>(format!("{}{}", p.first, p.second)) }
        })
        .build()
        .unwrap();

    assert_eq!(get(router, "/").await.0, StatusCode::OK);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "open first",
            "open second",
            "handler",
            "close second:ok",
            "close first:ok",
        ]
    );
}

#[tokio::test]
async fn test_handler_error_reaches_every_cleanup() {
    let log = Log::default();
    let router = Router::builder()
        .by_name("first", [tracked(&log, "first")])
        .by_name("second", [tracked(&log, "second")])
        .get(|_: Pair| async { Err::<String, _>("handler refused") })
        .build()
        .unwrap();

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "handling request: handler refused");

    let log = log.lock().unwrap();
    assert_eq!(log[2], "close second:handling request: handler refused");
    assert_eq!(log[3], "close first:handling request: handler refused");
}

#[tokio::test]
async fn test_panicking_field_stops_binding_and_releases_earlier_fields() {
    let log = Log::default();
    let router = Router::builder()
        .by_name("first", [tracked(&log, "first")])
        .by_name(
            "second",
            [fieldroute::request_value(
                |_: &RequestContext, _: &mut String| -> Result<(), BoxError> {
                    panic!("second field exploded")
                },
            )],
        )
        .get(|_: Pair| async { Ok::<_, BoxError>("unreachable") })
        .build()
        .unwrap();

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        "applying input option for field second: panic: second field exploded"
    );
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "open first",
            "close first:applying input option for field second: panic: second field exploded",
        ]
    );
}

#[tokio::test]
async fn test_panicking_handler_is_recovered() {
    let log = Log::default();
    let router = Router::builder()
        .by_name("first", [tracked(&log, "first")])
        .by_name("second", [tracked(&log, "second")])
        .get(|p: Pair| async move {
            if p.first.is_empty() {
                panic!("handler exploded");
            }
            Ok::<_, BoxError>(p.first)
        })
        .build()
        .unwrap();

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "panic: handler exploded");
    assert_eq!(log.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_failing_cleanup_replaces_success() {
    let log = Log::default();
    let router = Router::builder()
        .by_name(
            "first",
            [fieldroute::closable_request_value(
                |_: &RequestContext, _: &mut String| {
                    let closer: Closer = Box::new(|_: Outcome<'_>| Err("lock lost".into()));
                    Ok(closer)
                },
            )],
        )
        .by_name("second", [tracked(&log, "second")])
        .get(|_: Pair| async { Ok::<_, BoxError>("done") })
        .build()
        .unwrap();

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "releasing request resources: lock lost");
    // Released before the failing closer, so it still saw success.
    assert_eq!(log.lock().unwrap()[1], "close second:ok");
}

#[tokio::test]
async fn test_head_runs_fields_and_cleanups_without_handler() {
    let log = Log::default();
    let handler_log = Arc::clone(&log);
    let router = Router::builder()
        .by_name("first", [tracked(&log, "first")])
        .by_name("second", [tracked(&log, "second")])
        .get(move |_: Pair| {
            handler_log.lock().unwrap().push("handler".to_string());
            async { Ok::<_, BoxError>("body") }
        })
        .build()
        .unwrap();

    let req = Request::builder()
        .method(Method::HEAD)
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "open first",
            "open second",
            "close second:ok",
            "close first:ok",
        ]
    );
}
