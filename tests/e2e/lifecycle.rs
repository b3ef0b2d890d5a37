use brain_api::client::{ErrorKind, Interaction};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{mount_ok, setup};

#[tokio::test]
async fn test_invalid_method_fails_before_network() {
    let (server, config) = setup().await;

    let err = Interaction::builder(&config, "cubes/")
        .method("put")
        .build()
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::InvalidMethod(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(config.session_generation().is_none());
}

#[tokio::test]
async fn test_token_mode_without_token_fails_before_network() {
    let (server, config) = setup().await;

    let err = Interaction::builder(&config, "cubes/")
        .auth("token")
        .build()
        .unwrap_err();

    assert!(err.is_auth_error());
    assert!(err.to_string().contains("valid token"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sequential_interactions_share_session() {
    let (server, config) = setup().await;
    mount_ok(&server, "cubes/", json!({"plateifu": "8485-1901"})).await;

    for _ in 0..2 {
        Interaction::builder(&config, "cubes/")
            .build()
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(config.session_generation(), Some(1));
    }
}

#[tokio::test]
async fn test_netrc_401_mentions_credential_file_and_resets_session() {
    let (server, config) = setup().await;
    let home = TempDir::new().unwrap();
    config.set_netrc_path(Some(home.path().join(".netrc")));

    mount_ok(&server, "cubes/", json!([1])).await;
    Mock::given(method("POST"))
        .and(path("/marvin/api/collab/cubes/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "login required"})))
        .mount(&server)
        .await;

    Interaction::builder(&config, "cubes/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();
    let before = config.session_generation();
    assert_eq!(before, Some(1));

    let err = Interaction::builder(&config, "collab/cubes/")
        .auth("netrc")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap_err();

    assert!(err.is_auth_error());
    assert!(err.to_string().contains(".netrc"));
    assert!(err.to_string().contains("login required"));
    assert_eq!(err.status, Some(401));
    assert!(config.session_generation().is_none());

    Interaction::builder(&config, "cubes/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();
    assert_eq!(config.session_generation(), Some(2));
}

#[cfg(unix)]
#[tokio::test]
async fn test_netrc_credentials_are_sent_for_matching_host() {
    use std::os::unix::fs::PermissionsExt;

    let (server, config) = setup().await;
    let home = TempDir::new().unwrap();
    let netrc = home.path().join(".netrc");
    std::fs::write(&netrc, "machine 127.0.0.1 login test password test\n").unwrap();
    std::fs::set_permissions(&netrc, std::fs::Permissions::from_mode(0o600)).unwrap();
    config.set_netrc_path(Some(netrc));

    Mock::given(method("POST"))
        .and(path("/marvin/api/collab/cubes/"))
        .and(header("authorization", "Basic dGVzdDp0ZXN0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "data": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "collab/cubes/")
        .auth("netrc")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();
    assert_eq!(result.data(), Some(&json!(1)));
}

#[tokio::test]
async fn test_token_is_sent_as_bearer() {
    let (server, config) = setup().await;
    config.update("token", "testtoken").unwrap();

    Mock::given(method("POST"))
        .and(path("/marvin/api/cubes/"))
        .and(header("authorization", "Bearer testtoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "data": 1})))
        .expect(1)
        .mount(&server)
        .await;

    Interaction::builder(&config, "cubes/")
        .auth("token")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_token_mode_ignores_matching_netrc_entry() {
    use std::os::unix::fs::PermissionsExt;

    let (server, config) = setup().await;
    let home = TempDir::new().unwrap();
    let netrc = home.path().join(".netrc");
    std::fs::write(&netrc, "machine 127.0.0.1 login test password test\n").unwrap();
    std::fs::set_permissions(&netrc, std::fs::Permissions::from_mode(0o600)).unwrap();
    config.set_netrc_path(Some(netrc));
    config.update("token", "testtoken").unwrap();

    Mock::given(method("POST"))
        .and(path("/marvin/api/cubes/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "data": 1})))
        .expect(1)
        .mount(&server)
        .await;

    Interaction::builder(&config, "cubes/")
        .auth("token")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let authorization: Vec<_> = requests[0]
        .headers
        .get_all("authorization")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(authorization, vec!["Bearer testtoken".to_string()]);
}

#[tokio::test]
async fn test_route_map_lookup() {
    let (server, config) = setup().await;
    Mock::given(method("GET"))
        .and(path("/marvin/api/general/getroutemap/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 1,
            "urlmap": {"api": {"getCube": {"url": "/marvin/api/cubes/{name}/"}}}
        })))
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "general/getroutemap/")
        .method("get")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    let routes = result.route_map();
    assert_eq!(
        routes.url_for("api", "getCube").unwrap(),
        "/marvin/api/cubes/{name}/"
    );
    assert_eq!(
        routes.get(&["api", "getRSS"]).unwrap_err().to_string(),
        "Key getRSS not found in urlmap."
    );
}
