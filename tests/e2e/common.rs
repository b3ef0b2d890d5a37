use brain_api::client::SessionConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock server plus a session rooted at `<server>/marvin/api/`.
pub async fn setup() -> (MockServer, Arc<SessionConfig>) {
    let server = MockServer::start().await;
    let config = SessionConfig::new(&format!("{}/marvin/api/", server.uri()))
        .expect("mock server URI should be a valid base URL");
    (server, Arc::new(config))
}

/// Success envelope as the server sends it.
pub fn envelope(data: Value) -> Value {
    json!({"status": 1, "data": data, "error": null, "traceback": null})
}

/// Mount a 200 JSON envelope on `route` (relative to the API root).
pub async fn mount_ok(server: &MockServer, route: &str, data: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/marvin/api/{route}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(data)))
        .mount(server)
        .await;
}
