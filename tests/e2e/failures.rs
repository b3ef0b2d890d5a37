use brain_api::client::{
    ErrorKind, Interaction, SessionConfig, Timeout, TransportFailure,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{mount_ok, setup};

#[tokio::test]
async fn test_server_side_failure_records_traceback() {
    let (server, config) = setup().await;
    Mock::given(method("POST"))
        .and(path("/marvin/api/query/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": -1,
            "error": "bad query",
            "traceback": "Traceback (most recent call last):\n  File \"query.py\", line 42"
        })))
        .mount(&server)
        .await;

    let err = Interaction::builder(&config, "query/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::ServerSide { .. }));
    assert!(err.to_string().contains("bad query"));
    assert_eq!(err.status, Some(200));
    assert!(config
        .last_traceback()
        .is_some_and(|tb| tb.contains("query.py")));
    assert_eq!(err.traceback(), config.last_traceback().as_deref());
    assert!(config.session_generation().is_none());
}

#[tokio::test]
async fn test_validation_error_carries_payload() {
    let (server, config) = setup().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": "invalid input",
            "validation_errors": {"release": ["Not a valid choice."]}
        })))
        .mount(&server)
        .await;

    let err = Interaction::builder(&config, "cubes/")
        .param("release", "DR99")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    match err.kind {
        ErrorKind::Validation { payload, .. } => {
            assert_eq!(payload, json!({"release": ["Not a valid choice."]}));
        }
        other => panic!("Expected Validation, got {other:?}"),
    }
    assert_eq!(err.status, Some(422));
}

#[tokio::test]
async fn test_unknown_route_is_request_error() {
    let (server, config) = setup().await;

    let err = Interaction::builder(&config, "nowhere/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    match &err.kind {
        ErrorKind::Request { status, message, .. } => {
            assert_eq!(*status, 404);
            assert!(message.contains("404-URL Not Found"));
            assert!(message.contains("/marvin/api/nowhere/"));
        }
        other => panic!("Expected Request, got {other:?}"),
    }
    assert_eq!(err.url.as_deref(), Some(format!("{}/marvin/api/nowhere/", server.uri()).as_str()));
}

#[tokio::test]
async fn test_timeout_is_transport_error_and_resets_session() {
    let (server, config) = setup().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 1, "data": 1}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = Interaction::builder(&config, "slow/")
        .timeout(Timeout::new(Duration::from_millis(100), Duration::from_millis(100)))
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Transport {
            failure: TransportFailure::Timeout,
            ..
        }
    ));
    assert!(config.session_generation().is_none());
}

#[tokio::test]
async fn test_short_read_timeout_applies_with_generous_connect() {
    let (server, config) = setup().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 1, "data": 1}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let err = Interaction::builder(&config, "slow/")
        .timeout(Timeout::new(Duration::from_secs(10), Duration::from_millis(500)))
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Transport {
            failure: TransportFailure::Timeout,
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(config.session_generation().is_none());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let config = Arc::new(SessionConfig::new("http://127.0.0.1:1/api/").unwrap());

    let err = Interaction::builder(&config, "cubes/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(matches!(
        err.kind,
        ErrorKind::Transport {
            failure: TransportFailure::Connection,
            ..
        }
    ));
    assert!(config.session_generation().is_none());
}

#[tokio::test]
async fn test_failure_does_not_clear_a_replaced_session() {
    let (server, config) = setup().await;
    mount_ok(&server, "cubes/", json!(1)).await;

    let stale = config.acquire_session().unwrap();
    config.close_session();
    let fresh = config.acquire_session().unwrap();
    assert_ne!(stale.generation(), fresh.generation());

    assert!(!config.invalidate_session(&stale));
    assert_eq!(config.session_generation(), Some(fresh.generation()));

    Interaction::builder(&config, "cubes/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();
    assert_eq!(config.session_generation(), Some(fresh.generation()));
}
