//! Gmail REST adapter: message listing, message fetch, OAuth refresh.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use inboxpay_ai::MessageContent;

use super::{MessagePage, MessageSource, RefreshedToken, SourceError, TokenRefresher, network_error};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Gmail pads body data inconsistently.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GmailClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_base: GMAIL_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Point the client at different endpoints (local mocks, proxies).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let resp = request.send().await.map_err(|e| SourceError::Network(network_error(e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        resp.json::<T>().await.map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessagePart {
    mime_type: String,
    headers: Vec<Header>,
    body: Option<PartBody>,
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
}

impl MessagePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn decoded_body(&self) -> Option<String> {
        let data = self.body.as_ref()?.data.as_deref()?;
        if data.is_empty() {
            return None;
        }
        let bytes = BODY_ENGINE.decode(data).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// First text/plain and first text/html body, depth-first.
    fn collect_bodies(&self, bodies: &mut Bodies) {
        if let Some(decoded) = self.decoded_body() {
            match self.mime_type.as_str() {
                "text/plain" if bodies.text.is_none() => bodies.text = Some(decoded),
                "text/html" if bodies.html.is_none() => bodies.html = Some(decoded),
                _ => {}
            }
        }
        for part in &self.parts {
            part.collect_bodies(bodies);
        }
    }
}

fn into_content(message: GmailMessage) -> MessageContent {
    let payload = message.payload;
    let mut bodies = Bodies::default();
    payload.collect_bodies(&mut bodies);

    MessageContent {
        from: payload.header("From").unwrap_or_default().to_string(),
        subject: payload.header("Subject").unwrap_or_default().to_string(),
        body: bodies.html.or(bodies.text).unwrap_or_default(),
    }
}

#[async_trait]
impl MessageSource for GmailClient {
    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<MessagePage, SourceError> {
        let url = format!("{}/users/me/messages", self.api_base);
        let mut params = vec![("q", query.to_string()), ("maxResults", page_size.to_string())];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }

        let list: ListResponse = self
            .send_json(self.http.get(&url).bearer_auth(access_token).query(&params))
            .await?;

        debug!(
            message_count = list.messages.len(),
            has_more = list.next_page_token.is_some(),
            "listed message ids"
        );

        Ok(MessagePage {
            ids: list.messages.into_iter().map(|m| m.id).collect(),
            next_cursor: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_message(&self, access_token: &str, message_id: &str) -> Result<MessageContent, SourceError> {
        let url = format!("{}/users/me/messages/{}", self.api_base, message_id);
        let message: GmailMessage = self
            .send_json(
                self.http
                    .get(&url)
                    .bearer_auth(access_token)
                    .query(&[("format", "full")]),
            )
            .await?;

        Ok(into_content(message))
    }
}

#[async_trait]
impl TokenRefresher for GmailClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, SourceError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token: TokenResponse = self.send_json(self.http.post(&self.token_url).form(&form)).await?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .filter(|rotated| !rotated.is_empty() && rotated != refresh_token),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> GmailClient {
        GmailClient::new("client-id", "client-secret")
            .with_endpoints(server.base_url(), server.url("/token"))
    }

    #[tokio::test]
    async fn lists_ids_with_query_and_cursor() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users/me/messages")
                    .query_param("q", "in:inbox -in:spam")
                    .query_param("maxResults", "50")
                    .query_param("pageToken", "tok1")
                    .header("authorization", "Bearer access");
                then.status(200).json_body(json!({
                    "messages": [{"id": "a", "threadId": "t"}, {"id": "b", "threadId": "t"}],
                    "nextPageToken": "tok2"
                }));
            })
            .await;

        let page = client(&server)
            .list_message_ids("access", "in:inbox -in:spam", 50, Some("tok1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(page.next_cursor.as_deref(), Some("tok2"));
    }

    #[tokio::test]
    async fn empty_mailbox_is_last_page() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/me/messages");
                then.status(200).json_body(json!({"resultSizeEstimate": 0}));
            })
            .await;

        let page = client(&server).list_message_ids("access", "q", 10, None).await.unwrap();
        assert!(page.ids.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn provider_error_carries_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/me/messages");
                then.status(429).body("rate limited");
            })
            .await;

        let err = client(&server).list_message_ids("access", "q", 10, None).await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Api {
                status: 429,
                body: "rate limited".to_string()
            }
        );
    }

    #[tokio::test]
    async fn fetch_prefers_html_part() {
        let server = MockServer::start_async().await;
        let html = URL_SAFE_NO_PAD.encode("<p>Your Netflix bill</p>");
        let text = URL_SAFE_NO_PAD.encode("Your Netflix bill");
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users/me/messages/m1")
                    .query_param("format", "full");
                then.status(200).json_body(json!({
                    "id": "m1",
                    "payload": {
                        "mimeType": "multipart/alternative",
                        "headers": [
                            {"name": "From", "value": "billing@netflix.com"},
                            {"name": "Subject", "value": "Your invoice"}
                        ],
                        "body": {"size": 0},
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": text}},
                            {"mimeType": "text/html", "body": {"data": html}}
                        ]
                    }
                }));
            })
            .await;

        let content = client(&server).fetch_message("access", "m1").await.unwrap();
        assert_eq!(content.from, "billing@netflix.com");
        assert_eq!(content.subject, "Your invoice");
        assert_eq!(content.body, "<p>Your Netflix bill</p>");
    }

    #[tokio::test]
    async fn fetch_falls_back_to_plain_text() {
        let server = MockServer::start_async().await;
        let text = URL_SAFE_NO_PAD.encode("Rent due on the 1st");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/me/messages/m2");
                then.status(200).json_body(json!({
                    "payload": {
                        "mimeType": "text/plain",
                        "headers": [{"name": "subject", "value": "Rent"}],
                        "body": {"data": text}
                    }
                }));
            })
            .await;

        let content = client(&server).fetch_message("access", "m2").await.unwrap();
        assert_eq!(content.subject, "Rent");
        assert_eq!(content.from, "");
        assert_eq!(content.body, "Rent due on the 1st");
    }

    #[tokio::test]
    async fn refresh_keeps_unrotated_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=refresh-1");
                then.status(200).json_body(json!({
                    "access_token": "access-2",
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }));
            })
            .await;

        let before = Utc::now();
        let token = client(&server).refresh("refresh-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "access-2");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_at > before + chrono::Duration::minutes(59));
    }

    #[tokio::test]
    async fn refresh_reports_rotated_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).json_body(json!({
                    "access_token": "access-2",
                    "expires_in": 3600,
                    "refresh_token": "refresh-2"
                }));
            })
            .await;

        let token = client(&server).refresh("refresh-1").await.unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn invalid_grant_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({"error": "invalid_grant"}));
            })
            .await;

        let err = client(&server).refresh("revoked").await.unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 400, .. }));
    }
}
