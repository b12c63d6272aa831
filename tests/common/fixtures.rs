//! Mock Gmail endpoints

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::TEST_TOKEN;

pub const MESSAGES_PATH: &str = "/gmail/v1/users/me/messages";

/// 2024-01-01T09:00:00Z
pub const JAN_1_2024_MILLIS: i64 = 1_704_099_600_000;

pub const DAY_MILLIS: i64 = 86_400_000;

fn refs(ids: &[&str]) -> Vec<serde_json::Value> {
    ids.iter().map(|id| json!({ "id": id })).collect()
}

/// Estimation call: page of size 1 reporting `estimate`
pub async fn mount_estimate(server: &MockServer, first_id: &str, estimate: u64) {
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .and(query_param("maxResults", "1"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": refs(&[first_id]),
            "nextPageToken": "after-estimate",
            "resultSizeEstimate": estimate,
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

/// First listing page (no page token, any size other than the estimate's)
pub async fn mount_first_page(server: &MockServer, ids: &[&str], next: Option<&str>) {
    let mut body = json!({ "messages": refs(ids), "resultSizeEstimate": ids.len() });
    if let Some(next) = next {
        body["nextPageToken"] = json!(next);
    }
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .with_priority(2)
        .mount(server)
        .await;
}

/// Listing page reached with `token`
pub async fn mount_page(server: &MockServer, token: &str, ids: &[&str], next: Option<&str>) {
    let mut body = json!({ "messages": refs(ids) });
    if let Some(next) = next {
        body["nextPageToken"] = json!(next);
    }
    Mock::given(method("GET"))
        .and(path(MESSAGES_PATH))
        .and(query_param("pageToken", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Message `id` dated `millis`, answered after `delay`
pub async fn mount_message(
    server: &MockServer,
    id: &str,
    snippet: &str,
    millis: i64,
    delay: Duration,
) {
    Mock::given(method("GET"))
        .and(path(format!("{MESSAGES_PATH}/{id}")))
        .and(query_param("format", "minimal"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "id": id,
                    "snippet": snippet,
                    "internalDate": millis.to_string(),
                }))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Application confirmations for `ids`, one day apart from Jan 1st 2024
pub async fn mount_applications(server: &MockServer, ids: &[&str], delay: Duration) {
    for (i, id) in ids.iter().enumerate() {
        mount_message(
            server,
            id,
            &format!("Your application was sent to Company {id}"),
            JAN_1_2024_MILLIS + i as i64 * DAY_MILLIS,
            delay,
        )
        .await;
    }
}
