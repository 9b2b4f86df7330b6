//! HTTP-backed nodes: `api_call` and `webhook`.
//!
//! Both share one [`HttpNode`] transport.  They differ only in how a non-2xx
//! answer is treated: an API call fails the step, a webhook reports the
//! status inside its own output and always succeeds.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

fn default_get() -> String {
    "GET".to_owned()
}

fn default_post() -> String {
    "POST".to_owned()
}

/// Configuration of an `api_call` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallConfig {
    pub url: String,
    #[serde(default = "default_get")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Configuration of a `webhook` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_post")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Body to send; defaults to every context variable.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// A received HTTP response with its body already decoded.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP transport with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpNode {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNode {
    pub fn new(timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Send one request and decode the body.
    ///
    /// Only transport problems are errors here; the caller decides what a
    /// non-2xx status means.
    #[instrument(skip(self, headers, body))]
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<HttpResponse, NodeError> {
        if url.trim().is_empty() {
            return Err(NodeError::InvalidConfig("url must not be empty".into()));
        }
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("unsupported HTTP method '{method}'")))?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;

        debug!(status = status.as_u16(), bytes = bytes.len(), "HTTP response received");

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            body: decode_body(&bytes),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> NodeError {
        if err.is_timeout() {
            NodeError::Timeout { after_ms: self.timeout.as_millis() as u64 }
        } else {
            NodeError::Request(err.to_string())
        }
    }
}

/// JSON when the body parses, the raw text otherwise, `null` when empty.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn render_headers(headers: &HashMap<String, String>, ctx: &ExecutionContext) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), ctx.render(v)))
        .collect()
}

/// Executes `api_call` steps.  Non-2xx responses fail with
/// [`NodeError::ApiCallFailed`].
#[derive(Debug, Clone)]
pub struct ApiCallNode {
    http: HttpNode,
}

impl ApiCallNode {
    pub fn new(http: HttpNode) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ExecutableNode for ApiCallNode {
    type Config = ApiCallConfig;

    async fn execute(&self, config: &ApiCallConfig, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let url = ctx.render(&config.url);
        let headers = render_headers(&config.headers, ctx);
        let body = config.body.as_ref().map(|b| ctx.render_value(b));

        let response = self.http.send(&config.method, &url, &headers, body.as_ref()).await?;
        if !response.is_success() {
            return Err(NodeError::ApiCallFailed {
                status: response.status,
                status_text: response.status_text,
            });
        }
        Ok(response.body)
    }
}

/// Executes `webhook` steps.  The status code is reported, never raised.
#[derive(Debug, Clone)]
pub struct WebhookNode {
    http: HttpNode,
}

impl WebhookNode {
    pub fn new(http: HttpNode) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ExecutableNode for WebhookNode {
    type Config = WebhookConfig;

    async fn execute(&self, config: &WebhookConfig, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let url = ctx.render(&config.url);
        let headers = render_headers(&config.headers, ctx);
        let payload = match &config.payload {
            Some(p) => ctx.render_value(p),
            None => ctx.to_object(),
        };

        let response = self.http.send(&config.method, &url, &headers, Some(&payload)).await?;
        Ok(json!({
            "status": response.status,
            "success": response.is_success(),
            "response": response.body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpNode {
        HttpNode::new(Duration::from_secs(5)).expect("client builds")
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("auto", Uuid::new_v4(), json!({ "customer": "c-42", "token": "t0k" }))
    }

    fn api_config(url: String) -> ApiCallConfig {
        ApiCallConfig { url, method: "GET".into(), headers: HashMap::new(), body: None }
    }

    #[tokio::test]
    async fn api_call_returns_parsed_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/c-42"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c-42", "tier": "gold" })))
            .mount(&server)
            .await;

        let mut config = api_config(format!("{}/customers/{{{{customer}}}}", server.uri()));
        config.headers.insert("authorization".into(), "Bearer {{token}}".into());

        let out = ApiCallNode::new(http()).execute(&config, &ctx()).await.expect("call succeeds");
        assert_eq!(out, json!({ "id": "c-42", "tier": "gold" }));
    }

    #[tokio::test]
    async fn api_call_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = ApiCallNode::new(http())
            .execute(&api_config(server.uri()), &ctx())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NodeError::ApiCallFailed { status: 503, status_text: "Service Unavailable".into() }
        );
    }

    #[tokio::test]
    async fn webhook_reports_failure_status_without_erroring() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let config = WebhookConfig {
            url: format!("{}/hook", server.uri()),
            method: "POST".into(),
            headers: HashMap::new(),
            payload: Some(json!({ "who": "{{customer}}" })),
        };
        let out = WebhookNode::new(http()).execute(&config, &ctx()).await.expect("webhook never fails on status");
        assert_eq!(out["status"], 500);
        assert_eq!(out["success"], false);
        assert_eq!(out["response"], "boom");
    }

    #[tokio::test]
    async fn webhook_defaults_payload_to_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(ctx_object()))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let config = WebhookConfig {
            url: server.uri(),
            method: "POST".into(),
            headers: HashMap::new(),
            payload: None,
        };
        let out = WebhookNode::new(http()).execute(&config, &fixed_ctx()).await.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["response"], Value::Null);
    }

    fn fixed_ctx() -> ExecutionContext {
        let id = Uuid::nil();
        ExecutionContext::new("auto", id, json!({ "k": 1 }))
    }

    fn ctx_object() -> Value {
        fixed_ctx().to_object()
    }

    #[tokio::test]
    async fn empty_url_is_rejected_before_sending() {
        let err = ApiCallNode::new(http())
            .execute(&api_config(String::new()), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }

    /// A local address with nothing listening on it.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        format!("http://{addr}/hook")
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let node = ApiCallNode::new(HttpNode::new(Duration::from_millis(100)).unwrap());
        let err = node.execute(&api_config(server.uri()), &ctx()).await.unwrap_err();
        assert_eq!(err, NodeError::Timeout { after_ms: 100 });
    }

    #[tokio::test]
    async fn webhook_transport_failure_is_an_error() {
        let config = WebhookConfig {
            url: closed_port_url(),
            method: "POST".into(),
            headers: HashMap::new(),
            payload: None,
        };
        let err = WebhookNode::new(http()).execute(&config, &ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::Request(_)), "{err:?}");
    }

    #[test]
    fn non_json_bodies_fall_back_to_text() {
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
        assert_eq!(decode_body(b"  "), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({ "a": 1 }));
    }
}
