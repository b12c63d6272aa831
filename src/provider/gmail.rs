//! Gmail REST client (users.messages.list / users.messages.get)

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{MailClient, MessagePage, MessageRef, RawMessage};
use crate::config::GmailConfig;
use crate::error::{Error, Result};

/// Gmail client authenticated with a bearer access token
pub struct GmailClient {
    http: reqwest::Client,
    messages_url: Url,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    result_size_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    id: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    internal_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

impl GmailClient {
    /// Create a client for `config.user_id`'s mailbox
    pub fn new(config: &GmailConfig, access_token: String) -> Result<Self> {
        let mut messages_url = Url::parse(&config.api_base_url)?;
        messages_url
            .path_segments_mut()
            .map_err(|_| Error::Config {
                message: format!("API base URL '{}' cannot be a base", config.api_base_url),
                key: Some("gmail.api_base_url".to_string()),
            })?
            .pop_if_empty()
            .extend(["gmail", "v1", "users", config.user_id.as_str(), "messages"]);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            messages_url,
            access_token,
        })
    }

    fn message_url(&self, id: &str) -> Result<Url> {
        let mut url = self.messages_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Other("messages URL cannot be a base".to_string()))?
            .push(id);
        Ok(url)
    }
}

/// Map a non-success response to the crate's error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        envelope.error.message
    };
    let rate_limit_reason = envelope
        .error
        .errors
        .iter()
        .any(|e| e.reason == "rateLimitExceeded" || e.reason == "userRateLimitExceeded");

    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(message),
        StatusCode::FORBIDDEN if rate_limit_reason => Error::RateLimited(message),
        StatusCode::UNAUTHORIZED => Error::ReauthenticationRequired(message),
        _ => Error::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

#[async_trait::async_trait]
impl MailClient for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage> {
        let mut request = self
            .http
            .get(self.messages_url.clone())
            .bearer_auth(&self.access_token)
            .query(&[("q", query)])
            .query(&[("maxResults", max_results)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = ensure_success(request.send().await?).await?;
        let body: ListResponse = response.json().await?;

        Ok(MessagePage {
            messages: body.messages.unwrap_or_default(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
            result_size_estimate: body.result_size_estimate,
        })
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let request = self
            .http
            .get(self.message_url(id)?)
            .bearer_auth(&self.access_token)
            .query(&[("format", "minimal")]);

        let response = ensure_success(request.send().await?).await?;
        let body: MessageResponse = response.json().await?;

        let malformed = |reason: String| Error::MalformedMessage {
            id: body.id.clone(),
            reason,
        };
        let internal_date = body
            .internal_date
            .as_deref()
            .ok_or_else(|| malformed("no internalDate".to_string()))?
            .parse::<i64>()
            .map_err(|e| malformed(format!("bad internalDate: {e}")))?;

        Ok(RawMessage {
            id: body.id,
            snippet: body.snippet.unwrap_or_default(),
            internal_date,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MESSAGES_PATH: &str = "/gmail/v1/users/me/messages";

    fn client_for(server: &MockServer) -> GmailClient {
        let config = GmailConfig {
            api_base_url: server.uri(),
            ..GmailConfig::default()
        };
        GmailClient::new(&config, "test-token".to_string()).unwrap()
    }

    #[tokio::test]
    async fn list_sends_query_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES_PATH))
            .and(query_param("q", "from:jobs-noreply@linkedin.com"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}],
                "nextPageToken": "page-2",
                "resultSizeEstimate": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_messages("from:jobs-noreply@linkedin.com", None, 2)
            .await
            .unwrap();

        let ids: Vec<_> = page.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(page.result_size_estimate, Some(3));
    }

    #[tokio::test]
    async fn list_forwards_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES_PATH))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m3"}],
                "resultSizeEstimate": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_messages("q", Some("page-2"), 500)
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn empty_listing_has_no_messages_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"resultSizeEstimate": 0})),
            )
            .mount(&server)
            .await;

        let page = client_for(&server).list_messages("q", None, 1).await.unwrap();
        assert!(page.messages.is_empty());
        assert_eq!(page.result_size_estimate, Some(0));
    }

    #[tokio::test]
    async fn get_parses_string_internal_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES_PATH}/m1")))
            .and(query_param("format", "minimal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "threadId": "t1",
                "snippet": "Your application was sent to Acme",
                "internalDate": "1700000000000"
            })))
            .mount(&server)
            .await;

        let msg = client_for(&server).get_message("m1").await.unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.snippet, "Your application was sent to Acme");
        assert_eq!(msg.internal_date, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn get_without_internal_date_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES_PATH}/m1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .mount(&server)
            .await;

        match client_for(&server).get_message("m1").await {
            Err(Error::MalformedMessage { id, reason }) => {
                assert_eq!(id, "m1");
                assert_eq!(reason, "no internalDate");
            }
            other => panic!("expected MalformedMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_with_unparsable_internal_date_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES_PATH}/m1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "m1", "internalDate": "yesterday"}),
            ))
            .mount(&server)
            .await;

        let err = client_for(&server).get_message("m1").await.unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
        assert_eq!(err.code(), "malformed_message");
    }

    #[tokio::test]
    async fn status_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Too many concurrent requests for user"}
            })))
            .mount(&server)
            .await;

        match client_for(&server).list_messages("q", None, 1).await {
            Err(Error::RateLimited(msg)) => assert!(msg.contains("Too many")),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_401_requires_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"code": 401, "message": "Invalid Credentials"}
            })))
            .mount(&server)
            .await;

        match client_for(&server).get_message("m1").await {
            Err(Error::ReauthenticationRequired(msg)) => assert_eq!(msg, "Invalid Credentials"),
            other => panic!("expected ReauthenticationRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_rate_limit_reason_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "User Rate Limit Exceeded",
                    "errors": [{"reason": "userRateLimitExceeded"}]
                }
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).list_messages("q", None, 1).await,
            Err(Error::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn other_failures_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        match client_for(&server).list_messages("q", None, 1).await {
            Err(Error::Provider { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "Service Unavailable");
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[test]
    fn base_url_with_path_is_extended() {
        let config = GmailConfig {
            api_base_url: "http://localhost:8080/proxy/".to_string(),
            ..GmailConfig::default()
        };
        let client = GmailClient::new(&config, "t".into()).unwrap();
        assert_eq!(
            client.messages_url.as_str(),
            "http://localhost:8080/proxy/gmail/v1/users/me/messages"
        );
        assert_eq!(
            client.message_url("a/b").unwrap().as_str(),
            "http://localhost:8080/proxy/gmail/v1/users/me/messages/a%2Fb"
        );
    }
}
