//! Managed HTTP email API transport.
//!
//! A send is a `POST {endpoint}/emails:send` that returns a long-running
//! operation; the operation is then polled until it reports a final status.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header::HeaderValue, Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::html::strip_html;
use super::types::{DeliveryReceipt, EmailProvider, OutboundEmail, ProviderError};
use crate::config::ManagedApiConfig;
use crate::metrics::DeliveryMetrics;

const OPERATION_LOCATION: &str = "operation-location";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender_address: &'a str,
    content: Content<'a>,
    recipients: Recipients<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ApiAttachment<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Content<'a> {
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plain_text: Option<String>,
}

#[derive(Serialize)]
struct Recipients<'a> {
    to: Vec<Recipient<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<Recipient<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<Recipient<'a>>,
}

#[derive(Serialize)]
struct Recipient<'a> {
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttachment<'a> {
    name: &'a str,
    content_type: &'a str,
    content_in_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl OperationStatus {
    fn failure_message(&self) -> String {
        match &self.error {
            Some(err) => format!(
                "{}: {}",
                err.code.as_deref().unwrap_or("Unknown"),
                err.message.as_deref().unwrap_or("no details")
            ),
            None => format!("operation {}", self.status),
        }
    }
}

enum PollState {
    Succeeded,
    Failed(String),
    Running,
}

fn poll_state(status: &OperationStatus) -> PollState {
    match status.status.as_str() {
        "Succeeded" => PollState::Succeeded,
        "Failed" | "Canceled" => PollState::Failed(status.failure_message()),
        _ => PollState::Running,
    }
}

/// Map an unsuccessful HTTP status to a failure class.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Transient(message)
    } else if status.is_client_error() {
        ProviderError::Permanent(message)
    } else {
        ProviderError::Transient(message)
    }
}

fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Transient(format!("Request failed: {}", e))
}

pub struct ManagedApiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ManagedApiProvider {
    pub fn new(config: &ManagedApiConfig) -> Result<Self, ProviderError> {
        if config.endpoint.trim().is_empty() {
            return Err(ProviderError::Validation(
                "managed_api.endpoint is required".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(ProviderError::Validation(
                "managed_api.api_key is required".to_string(),
            ));
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Validation(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            poll_timeout: Duration::from_secs(config.poll_timeout_seconds),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/emails:send?api-version={}", self.endpoint, self.api_version)
    }

    fn operation_url(&self, operation_id: &str) -> String {
        format!(
            "{}/emails/operations/{}?api-version={}",
            self.endpoint, operation_id, self.api_version
        )
    }

    async fn start(&self, email: &OutboundEmail) -> Result<(String, OperationStatus), ProviderError> {
        let html = email.html();
        let plain_text = email
            .text()
            .map(str::to_string)
            .or_else(|| html.map(strip_html));

        let request = SendRequest {
            sender_address: email.from_address.trim(),
            content: Content {
                subject: &email.subject,
                html,
                plain_text,
            },
            recipients: Recipients {
                to: email.to.iter().map(|a| Recipient { address: a }).collect(),
                cc: email.cc.iter().map(|a| Recipient { address: a }).collect(),
                bcc: email.bcc.iter().map(|a| Recipient { address: a }).collect(),
            },
            attachments: email
                .attachments
                .iter()
                .map(|a| ApiAttachment {
                    name: &a.filename,
                    content_type: &a.content_type,
                    content_in_base64: STANDARD.encode(&a.content),
                    content_id: a.content_id.as_deref(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(&self.api_key)
            // Lets the provider drop a duplicate submission of the same email
            .header("Operation-Id", email.id.to_string())
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let location = response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let operation: OperationStatus = if body.trim().is_empty() {
            OperationStatus {
                id: None,
                status: "Running".to_string(),
                error: None,
            }
        } else {
            serde_json::from_str(&body).map_err(|e| {
                ProviderError::Transient(format!("Unreadable send response: {}", e))
            })?
        };

        let operation_id = operation
            .id
            .clone()
            .or_else(|| location.as_deref().and_then(operation_id_from_location))
            .ok_or_else(|| {
                ProviderError::Transient("Send response carried no operation id".to_string())
            })?;

        Ok((operation_id, operation))
    }

    async fn poll(&self, operation_id: &str) -> Result<OperationStatus, ProviderError> {
        let response = self
            .client
            .get(self.operation_url(operation_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Transient(format!("Unreadable operation status: {}", e)))
    }

    async fn wait_for_completion(
        &self,
        email: &OutboundEmail,
        operation_id: &str,
    ) -> Result<(), ProviderError> {
        let deadline = Instant::now() + self.poll_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(ProviderError::Transient(format!(
                    "Operation {} did not complete within {}s",
                    operation_id,
                    self.poll_timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.poll_interval).await;

            match self.poll(operation_id).await {
                Ok(status) => match poll_state(&status) {
                    PollState::Succeeded => return Ok(()),
                    PollState::Failed(reason) => return Err(ProviderError::Permanent(reason)),
                    PollState::Running => {
                        tracing::trace!(
                            email_id = %email.id,
                            operation_id = %operation_id,
                            status = %status.status,
                            "Email operation still running"
                        );
                    }
                },
                Err(e @ ProviderError::Transient(_)) => {
                    tracing::debug!(
                        email_id = %email.id,
                        operation_id = %operation_id,
                        error = %e,
                        "Operation poll failed, will retry until deadline"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Last path segment of an operation-location URL, without the query.
fn operation_id_from_location(location: &str) -> Option<String> {
    let path = location.split('?').next()?;
    path.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl EmailProvider for ManagedApiProvider {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, ProviderError> {
        email.validate()?;

        let start = std::time::Instant::now();
        let result = async {
            let (operation_id, initial) = self.start(email).await?;
            match poll_state(&initial) {
                PollState::Succeeded => {}
                PollState::Failed(reason) => return Err(ProviderError::Permanent(reason)),
                PollState::Running => self.wait_for_completion(email, &operation_id).await?,
            }
            Ok(operation_id)
        }
        .await;
        DeliveryMetrics::observe_send_latency(self.name(), start.elapsed().as_secs_f64());

        let operation_id = result?;
        tracing::debug!(
            email_id = %email.id,
            operation_id = %operation_id,
            "Email API reported delivery"
        );

        Ok(DeliveryReceipt {
            provider: self.name(),
            message_id: Some(operation_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::email::Attachment;

    #[derive(Clone)]
    struct MockApi {
        send_status: StatusCode,
        /// Statuses returned by successive polls; the last one repeats
        poll_statuses: Arc<Vec<&'static str>>,
        polls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<Value>>>,
        last_auth: Arc<Mutex<Option<String>>>,
    }

    impl MockApi {
        fn new(send_status: StatusCode, poll_statuses: Vec<&'static str>) -> Self {
            Self {
                send_status,
                poll_statuses: Arc::new(poll_statuses),
                polls: Arc::new(AtomicUsize::new(0)),
                last_request: Arc::new(Mutex::new(None)),
                last_auth: Arc::new(Mutex::new(None)),
            }
        }
    }

    async fn send_handler(
        State(api): State<MockApi>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        *api.last_request.lock().unwrap() = Some(body);
        *api.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if api.send_status.is_success() {
            (api.send_status, Json(json!({"id": "op-1", "status": "Running"})))
        } else {
            (
                api.send_status,
                Json(json!({"error": {"code": "Rejected", "message": "nope"}})),
            )
        }
    }

    async fn poll_handler(State(api): State<MockApi>, Path(id): Path<String>) -> Json<Value> {
        let n = api.polls.fetch_add(1, Ordering::SeqCst);
        let status = api
            .poll_statuses
            .get(n)
            .or_else(|| api.poll_statuses.last())
            .copied()
            .unwrap_or("Running");

        if status == "Failed" {
            Json(json!({"id": id, "status": status, "error": {"code": "BadContent", "message": "blocked"}}))
        } else {
            Json(json!({"id": id, "status": status}))
        }
    }

    async fn spawn(api: MockApi) -> String {
        let app = Router::new()
            .route("/emails:send", post(send_handler))
            .route("/emails/operations/{id}", get(poll_handler))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(endpoint: String, poll_timeout_seconds: u64) -> ManagedApiProvider {
        ManagedApiProvider::new(&ManagedApiConfig {
            endpoint,
            api_key: "test-key".to_string(),
            poll_interval_ms: 5,
            poll_timeout_seconds,
            ..ManagedApiConfig::default()
        })
        .unwrap()
    }

    fn outbound() -> OutboundEmail {
        OutboundEmail {
            id: Uuid::new_v4(),
            from_address: "events@example.org".to_string(),
            from_name: None,
            to: vec!["sam@example.com".to_string()],
            cc: vec!["alex@example.com".to_string()],
            bcc: vec![],
            subject: "Hello".to_string(),
            html_body: Some("<p>Hi <b>Sam</b></p><img src=\"cid:logo\">".to_string()),
            text_body: None,
            attachments: vec![Attachment {
                filename: "logo.png".to_string(),
                content_type: "image/png".to_string(),
                content: b"png".to_vec(),
                content_id: Some("logo".to_string()),
            }],
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::BAD_REQUEST, "").is_retryable() == false);
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Permanent(_)
        ));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
    }

    #[test]
    fn test_operation_id_from_location() {
        assert_eq!(
            operation_id_from_location("https://x.example/emails/operations/abc-123?api-version=1"),
            Some("abc-123".to_string())
        );
        assert_eq!(operation_id_from_location("https://x.example/"), None);
    }

    #[test]
    fn test_config_required() {
        assert!(ManagedApiProvider::new(&ManagedApiConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_send_polls_until_succeeded() {
        let api = MockApi::new(StatusCode::ACCEPTED, vec!["Running", "Succeeded"]);
        let endpoint = spawn(api.clone()).await;
        let provider = provider(endpoint, 5);

        let receipt = provider.send(&outbound()).await.unwrap();

        assert_eq!(receipt.provider, "api");
        assert_eq!(receipt.message_id.as_deref(), Some("op-1"));
        assert_eq!(api.polls.load(Ordering::SeqCst), 2);
        assert_eq!(api.last_auth.lock().unwrap().as_deref(), Some("Bearer test-key"));

        let body = api.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(body["senderAddress"], "events@example.org");
        assert_eq!(body["recipients"]["to"][0]["address"], "sam@example.com");
        assert_eq!(body["recipients"]["cc"][0]["address"], "alex@example.com");
        assert_eq!(body["content"]["plainText"], "Hi Sam");
        assert_eq!(body["attachments"][0]["contentId"], "logo");
        assert_eq!(body["attachments"][0]["contentInBase64"], "cG5n");
    }

    #[tokio::test]
    async fn test_failed_operation_is_permanent() {
        let api = MockApi::new(StatusCode::ACCEPTED, vec!["Failed"]);
        let provider = provider(spawn(api).await, 5);

        let err = provider.send(&outbound()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(ref m) if m.contains("BadContent")));
    }

    #[tokio::test]
    async fn test_rejected_request_is_permanent() {
        let api = MockApi::new(StatusCode::BAD_REQUEST, vec![]);
        let provider = provider(spawn(api.clone()).await, 5);

        let err = provider.send(&outbound()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
        assert_eq!(api.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_throttled_request_is_transient() {
        let api = MockApi::new(StatusCode::TOO_MANY_REQUESTS, vec![]);
        let provider = provider(spawn(api).await, 5);

        assert!(provider.send(&outbound()).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_poll_timeout_is_transient() {
        let api = MockApi::new(StatusCode::ACCEPTED, vec!["Running"]);
        let provider = provider(spawn(api).await, 0);

        let err = provider.send(&outbound()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(ref m) if m.contains("did not complete")));
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_request() {
        let api = MockApi::new(StatusCode::ACCEPTED, vec!["Succeeded"]);
        let provider = provider(spawn(api.clone()).await, 5);

        let mut email = outbound();
        email.subject = "  ".to_string();

        assert!(matches!(
            provider.send(&email).await,
            Err(ProviderError::Validation(_))
        ));
        assert!(api.last_request.lock().unwrap().is_none());
    }
}
