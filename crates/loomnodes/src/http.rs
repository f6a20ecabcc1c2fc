use async_trait::async_trait;
use hmac::{Hmac, Mac};
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use reqwest::{Method, RequestBuilder};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Issues an HTTP request and exposes the raw response
pub struct ApiInputNode {
    client: reqwest::Client,
}

impl Default for ApiInputNode {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Node for ApiInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("api_input", "API Input", "Makes HTTP requests to APIs", "Input")
            .with_icon("🌐")
            .output("response", "string", "Response body")
            .output("status_code", "number", "HTTP status code")
            .output("headers", "object", "Response headers")
            .property("url", "string", "URL", "API endpoint URL", "", true)
            .select("method", "HTTP Method", "HTTP method to use", "GET", METHODS)
            .property("headers", "text", "Headers", "JSON object with request headers", "{}", false)
            .property("body", "text", "Request Body", "Request body (for POST/PUT)", "", false)
            .property("timeout", "number", "Timeout", "Request timeout in seconds", 30.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let url = required_url(&ctx, "url")?;
        let method = parse_method(&ctx.property_str("method", "GET"))?;
        ctx.events.info(format!("{} {}", method, url));

        let mut request = self
            .client
            .request(method.clone(), &url)
            .timeout(timeout(&ctx)?);
        request = apply_headers(request, &ctx.property_str("headers", "{}"))?;

        let body = ctx.property_str("body", "");
        if matches!(method, Method::POST | Method::PUT | Method::PATCH) && !body.is_empty() {
            request = match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => request.json(&json),
                Err(_) => request.body(body),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Http(format!("API request failed: {}", e)))?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    Value::from(String::from_utf8_lossy(v.as_bytes()).into_owned()),
                )
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| NodeError::Http(format!("Failed to read response: {}", e)))?;

        ctx.events.debug(format!("Response status: {}", status));
        Ok(NodeOutput::new()
            .with_output("response", text)
            .with_output("status_code", status as f64)
            .with_output("headers", Value::Object(headers)))
    }
}

/// Sends `data` to an endpoint wrapped under `data_key`
pub struct ApiOutputNode {
    client: reqwest::Client,
}

impl Default for ApiOutputNode {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Node for ApiOutputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("api_output", "API Output", "Sends data to HTTP API endpoints", "Output")
            .with_icon("🌐")
            .input("data", "any", "Data to send", true)
            .output("response", "string", "API response")
            .output("status_code", "number", "HTTP status code")
            .output("success", "boolean", "Whether request was successful")
            .property("url", "string", "URL", "API endpoint URL", "", true)
            .select("method", "HTTP Method", "HTTP method to use", "POST", METHODS)
            .property("headers", "text", "Headers", "JSON object with request headers", "{}", false)
            .property("timeout", "number", "Timeout", "Request timeout in seconds", 30.0, false)
            .property("data_key", "string", "Data Key", "Key name for data in request body", "data", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.require_input("data")?;
        let url = required_url(&ctx, "url")?;
        let method = parse_method(&ctx.property_str("method", "POST"))?;

        let mut request = self
            .client
            .request(method.clone(), &url)
            .timeout(timeout(&ctx)?);
        request = apply_headers(request, &ctx.property_str("headers", "{}"))?;
        if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
            request = request.json(&wrap_payload(data, &ctx.property_str("data_key", "data")));
        }

        ctx.events.info(format!("{} {}", method, url));
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Http(format!("API request failed: {}", e)))?;
        respond(response).await
    }
}

/// `{data_key: data}`; without a key, objects go as-is and anything else under `data`.
fn wrap_payload(data: &Value, data_key: &str) -> serde_json::Value {
    let key = match (data_key.is_empty(), data) {
        (true, Value::Object(_)) => return data.to_json(),
        (true, _) => "data",
        (false, _) => data_key,
    };
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), data.to_json());
    serde_json::Value::Object(body)
}

/// Posts a payload, signed with HMAC-SHA256 when a secret is configured
pub struct WebhookNode {
    client: reqwest::Client,
}

impl Default for WebhookNode {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Node for WebhookNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("webhook", "Webhook", "Sends webhook notifications", "Output")
            .with_icon("🔗")
            .input("payload", "any", "Webhook payload", true)
            .output("response", "string", "Webhook response")
            .output("status_code", "number", "HTTP status code")
            .output("success", "boolean", "Whether webhook was successful")
            .property("webhook_url", "string", "Webhook URL", "URL to send webhook to", "", true)
            .property("secret", "string", "Secret", "Webhook secret for signing", "", false)
            .select(
                "content_type",
                "Content Type",
                "Request content type",
                "application/json",
                &["application/json", "application/x-www-form-urlencoded"],
            )
            .property("timeout", "number", "Timeout", "Request timeout in seconds", 30.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let payload = ctx.require_input("payload")?;
        let url = required_url(&ctx, "webhook_url")?;
        let content_type = ctx.property_str("content_type", "application/json");

        let body = match payload {
            Value::Array(_) | Value::Object(_) => payload.to_json().to_string(),
            other => other.to_string(),
        };

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout(&ctx)?)
            .header(reqwest::header::CONTENT_TYPE, content_type.as_str());

        let secret = ctx.property_str("secret", "");
        if !secret.is_empty() {
            request = request.header("X-Signature-SHA256", sign_payload(&secret, &body)?);
        }

        request = match (content_type.as_str(), payload) {
            ("application/json", Value::Array(_) | Value::Object(_)) => request.body(body),
            ("application/json", other) => request.body(other.to_json().to_string()),
            (_, Value::Object(map)) => {
                let fields: Vec<(String, String)> =
                    map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
                request.form(&fields)
            }
            (_, _) => request.body(body),
        };

        ctx.events.info(format!("POST {}", url));
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Http(format!("Webhook request failed: {}", e)))?;
        respond(response).await
    }
}

/// `sha256=<hex digest>` of `body` keyed by `secret`.
pub fn sign_payload(secret: &str, body: &str) -> Result<String, NodeError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| NodeError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn required_url(ctx: &NodeContext, name: &str) -> Result<String, NodeError> {
    let url = ctx.property_str(name, "");
    if url.trim().is_empty() {
        return Err(NodeError::Configuration("URL is required".to_string()));
    }
    Ok(url)
}

fn parse_method(method: &str) -> Result<Method, NodeError> {
    let upper = method.to_uppercase();
    if !METHODS.contains(&upper.as_str()) {
        return Err(NodeError::Configuration(format!("Unsupported method: {}", method)));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| NodeError::Configuration(format!("Unsupported method: {}", method)))
}

fn timeout(ctx: &NodeContext) -> Result<Duration, NodeError> {
    crate::time::seconds("timeout", ctx.property_f64("timeout", 30.0).max(0.1))
}

/// Headers come as a JSON object in a text property.
fn apply_headers(mut request: RequestBuilder, text: &str) -> Result<RequestBuilder, NodeError> {
    if text.trim().is_empty() {
        return Ok(request);
    }
    let headers: BTreeMap<String, Value> = serde_json::from_str(text)
        .map_err(|_| NodeError::Configuration("Headers must be valid JSON".to_string()))?;
    for (name, value) in headers {
        request = request.header(name, value.to_string());
    }
    Ok(request)
}

async fn respond(response: reqwest::Response) -> Result<NodeOutput, NodeError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| NodeError::Http(format!("Failed to read response: {}", e)))?;
    Ok(NodeOutput::new()
        .with_output("response", text)
        .with_output("status_code", status.as_u16() as f64)
        .with_output("success", status.is_success()))
}
