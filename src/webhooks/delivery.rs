//! Webhook delivery backend trait and HTTP implementation.
//!
//! A delivery never fails with an error: every transport problem, timeout or
//! non-2xx response becomes a [`DeliveryOutcome`] that is recorded on the
//! task.

use super::payload::delivery_target;
use super::signing::{SIGNATURE_PREFIX, compute_signature};
use crate::config::WebhookSettings;
use crate::models::{
    ContentType, DeliveryOutcome, DeliveryTask, HookEventType, HttpMethod, Registration, TaskId,
};
use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "X-Hookrelay-Signature";
/// Header carrying `sha256=<hex>` for GitHub-compatible receivers.
pub const HUB_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Hookrelay-Event";
/// Header carrying the task ID.
pub const DELIVERY_HEADER: &str = "X-Hookrelay-Delivery";

/// Everything needed to send one task to one registration.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Task being delivered.
    pub task_id: TaskId,
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Body encoding.
    pub content_type: ContentType,
    /// Event type.
    pub event_type: HookEventType,
    /// Shaped payload bytes.
    pub body: Vec<u8>,
    /// `Authorization` header value.
    pub authorization: Option<SecretString>,
    /// Signing secret.
    pub secret: Option<SecretString>,
}

impl DeliveryRequest {
    /// Combines a stored task with its registration's transport settings.
    #[must_use]
    pub fn new(task: &DeliveryTask, registration: &Registration) -> Self {
        let target = delivery_target(registration, task.id);
        Self {
            task_id: task.id,
            url: target.url,
            method: target.method,
            content_type: registration.content_type,
            event_type: task.event_type,
            body: task.payload.clone(),
            authorization: registration.authorization_header.clone(),
            secret: registration.secret.clone(),
        }
    }

    /// Signature of the body, if the registration has a secret.
    #[must_use]
    pub fn signature(&self) -> Option<String> {
        self.secret
            .as_ref()
            .map(|secret| compute_signature(secret.expose_secret(), &self.body))
    }
}

/// Trait for webhook delivery backends.
///
/// This trait allows for different delivery implementations (HTTP, mock for testing).
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    /// Sends the request and reports what happened.
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryOutcome;
}

/// HTTP delivery backend using reqwest.
#[derive(Debug, Clone)]
pub struct HttpDeliverer {
    /// HTTP client with connection pooling.
    client: reqwest::Client,
    timeout: Duration,
    snippet_limit: usize,
}

impl HttpDeliverer {
    /// Builds the client from delivery settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the TLS backend cannot
    /// be initialised.
    pub fn new(settings: &WebhookSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.delivery_timeout_secs);
        let mut builder = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .danger_accept_invalid_certs(settings.skip_tls_verify);

        if let Some(proxy_url) = &settings.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::InvalidInput(format!("Invalid proxy_url {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| Error::OperationFailed {
            operation: "build_http_client".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            client,
            timeout,
            snippet_limit: settings.response_snippet_limit,
        })
    }

    fn build(
        &self,
        request: &DeliveryRequest,
    ) -> std::result::Result<reqwest::RequestBuilder, String> {
        let body_text = String::from_utf8_lossy(&request.body).into_owned();

        let mut builder = match request.method {
            HttpMethod::Get => {
                let mut url = reqwest::Url::parse(&request.url)
                    .map_err(|e| format!("invalid url {}: {e}", strip_query(&request.url)))?;
                url.query_pairs_mut().append_pair("payload", &body_text);
                self.client.get(url)
            },
            HttpMethod::Post | HttpMethod::Put => {
                let builder = if request.method == HttpMethod::Post {
                    self.client.post(&request.url)
                } else {
                    self.client.put(&request.url)
                };
                match request.content_type {
                    ContentType::Json => builder
                        .header(reqwest::header::CONTENT_TYPE, ContentType::Json.mime())
                        .body(request.body.clone()),
                    ContentType::Form => builder.form(&[("payload", body_text)]),
                }
            },
        };

        builder = builder
            .header(DELIVERY_HEADER, request.task_id.to_string())
            .header(EVENT_HEADER, request.event_type.as_str());

        if let Some(signature) = request.signature() {
            builder = builder
                .header(HUB_SIGNATURE_HEADER, format!("{SIGNATURE_PREFIX}{signature}"))
                .header(SIGNATURE_HEADER, signature);
        }
        if let Some(authorization) = &request.authorization {
            builder =
                builder.header(reqwest::header::AUTHORIZATION, authorization.expose_secret());
        }

        Ok(builder)
    }

    /// Reads the response body up to the snippet limit and drops the rest.
    async fn read_snippet(&self, mut response: reqwest::Response) -> String {
        let mut body = Vec::new();
        while body.len() < self.snippet_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return self.describe_error(e),
            }
        }
        truncate_snippet(&String::from_utf8_lossy(&body), self.snippet_limit)
    }

    /// Error text without the request URL, which may carry credentials.
    fn describe_error(&self, error: reqwest::Error) -> String {
        let error = error.without_url();
        if error.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs())
        } else {
            format!("request failed: {error}")
        }
    }
}

#[async_trait]
impl WebhookDelivery for HttpDeliverer {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryOutcome {
        let start = Instant::now();

        let builder = match self.build(request) {
            Ok(builder) => builder,
            Err(message) => return DeliveryOutcome::failure(elapsed_ms(start), message),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = self.describe_error(e);
                tracing::debug!(
                    task_id = %request.task_id,
                    url = %strip_query(&request.url),
                    error = %message,
                    "Delivery request failed"
                );
                return DeliveryOutcome::failure(elapsed_ms(start), message);
            },
        };

        let status = response.status().as_u16();
        let snippet = self.read_snippet(response).await;

        DeliveryOutcome::from_response(status, elapsed_ms(start), snippet)
    }
}

/// Gets elapsed milliseconds, saturating at `u64::MAX`.
fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Cuts `text` to at most `limit` bytes on a character boundary.
fn truncate_snippet(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
