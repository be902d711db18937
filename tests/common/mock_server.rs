//! Mock origin helpers for integration tests
//!
//! Wraps `wiremock` with the handful of server behaviours the engine and
//! the worker care about.

use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Accept every POST to `endpoint` with a 200
pub async fn mount_accept(server: &MockServer, endpoint: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Answer successive POSTs to `endpoint` with the given statuses
///
/// Requests past the end of the list get the last status.
pub async fn mount_status_sequence(server: &MockServer, endpoint: &str, statuses: &[u16]) {
    for (i, status) in statuses.iter().enumerate() {
        let mock = Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(*status))
            .with_priority(u8::try_from(i + 1).unwrap_or(u8::MAX));
        let mock = if i + 1 < statuses.len() {
            mock.up_to_n_times(1)
        } else {
            mock
        };
        mock.mount(server).await;
    }
}

/// Accept POSTs to `endpoint` only after `delay`
pub async fn mount_slow(server: &MockServer, endpoint: &str, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .mount(server)
        .await;
}

/// Serve every GET with a small body naming its path
pub async fn mount_shell(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(|request: &Request| {
            ResponseTemplate::new(200)
                .set_body_string(format!("shell:{}", request.url.path()))
                .insert_header("content-type", "text/html")
        })
        .mount(server)
        .await;
}

/// Make every GET hang for longer than any test request timeout
///
/// Clients configured with a short timeout then see the origin as
/// unreachable while the server itself keeps running.
pub async fn stall_origin(server: &MockServer) {
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(server)
        .await;
}

/// Form fields of every POST the server received at `endpoint`, in order
pub async fn received_forms(server: &MockServer, endpoint: &str) -> Vec<Vec<(String, String)>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST" && request.url.path() == endpoint)
        .map(|request| parse_form(&request.body))
        .collect()
}

/// Decode an `application/x-www-form-urlencoded` body
pub fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let mut url = reqwest::Url::parse("http://form.invalid/").unwrap();
    url.set_query(Some(&String::from_utf8_lossy(body)));
    url.query_pairs().into_owned().collect()
}

/// `action` field of every punch the server received, in order
pub async fn received_punch_actions(server: &MockServer) -> Vec<String> {
    received_forms(server, "/punch")
        .await
        .into_iter()
        .filter_map(|fields| {
            fields
                .into_iter()
                .find(|(key, _)| key == "action")
                .map(|(_, value)| value)
        })
        .collect()
}
