use async_trait::async_trait;
use relaycore::{
    CredentialError, ExecutionContext, Item, Node, NodeDescriptor, NodeError, NodeOutput,
    ParameterKind, ParameterSchema,
};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Credential type holding a single header: `{ "name": ..., "value": ... }`
pub const HEADER_AUTH_CREDENTIAL: &str = "httpHeaderAuth";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// HTTP request node, one request per input item
pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub const NODE_TYPE: &'static str = "http.request";

    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("HTTP Request", 1, 1)
            .with_description("Make HTTP requests")
            .with_tag("http")
            .with_credential(HEADER_AUTH_CREDENTIAL, false)
            .with_parameter(ParameterSchema::new("url", ParameterKind::String).required())
            .with_parameter(
                ParameterSchema::new(
                    "method",
                    ParameterKind::Options(
                        ["GET", "POST", "PUT", "PATCH", "DELETE"]
                            .iter()
                            .map(|m| m.to_string())
                            .collect(),
                    ),
                )
                .with_default("GET"),
            )
            .with_parameter(ParameterSchema::new("headers", ParameterKind::Json))
            .with_parameter(ParameterSchema::new("body", ParameterKind::Json))
            .with_parameter(
                ParameterSchema::new("max_retries", ParameterKind::Number)
                    .with_default(2)
                    .with_description("Retries on transport errors and 5xx responses"),
            )
    }

    async fn request_once(
        &self,
        method: &str,
        url: &str,
        headers: &Map<String, Value>,
        body: &Value,
        auth: Option<(&str, &str)>,
    ) -> Result<reqwest::Response, String> {
        let mut request = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => return Err(format!("Unsupported method: {}", other)),
        };

        for (key, value) in headers {
            if let Some(val_str) = value.as_str() {
                request = request.header(key, val_str);
            }
        }
        if let Some((name, value)) = auth {
            request = request.header(name, value);
        }
        request = match body {
            Value::Null => request,
            Value::String(text) => request.body(text.clone()),
            other => request.json(other),
        };

        request
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let auth = match ctx.get_credentials(HEADER_AUTH_CREDENTIAL).await {
            Ok(credential) => match (credential.get_str("name"), credential.get_str("value")) {
                (Some(name), Some(value)) => Some((name.to_string(), value.to_string())),
                _ => {
                    return Err(NodeError::Configuration(format!(
                        "Credential '{}' needs 'name' and 'value'",
                        credential.name
                    )))
                }
            },
            // Auth is optional unless the node explicitly references a credential
            Err(CredentialError::NotFound { .. })
                if !ctx.node().credentials.contains_key(HEADER_AUTH_CREDENTIAL) =>
            {
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut output = Vec::with_capacity(ctx.items().len());
        for index in 0..ctx.items().len() {
            let url = ctx.get_parameter_str("url", index)?;
            let method = ctx
                .get_parameter("method", index, Value::from("GET"))
                .as_str()
                .unwrap_or("GET")
                .to_uppercase();
            let headers = match ctx.get_parameter("headers", index, Value::Null) {
                Value::Object(headers) => headers,
                _ => Map::new(),
            };
            let body = ctx.get_parameter("body", index, Value::Null);
            let max_retries = ctx
                .get_parameter("max_retries", index, Value::from(2))
                .as_u64()
                .unwrap_or(2);

            ctx.emitter().info(format!("{} {}", method, url));

            let mut attempt = 0;
            let response = loop {
                let auth_header = auth.as_ref().map(|(n, v)| (n.as_str(), v.as_str()));
                let result = self
                    .request_once(&method, &url, &headers, &body, auth_header)
                    .await;

                let retryable = match &result {
                    Ok(response) => response.status().is_server_error(),
                    Err(_) => true,
                };
                if !retryable || attempt >= max_retries {
                    break result.map_err(NodeError::ExecutionFailed)?;
                }

                attempt += 1;
                ctx.emitter()
                    .warn(format!("Retrying {} {} (attempt {})", method, url, attempt + 1));
                tokio::time::sleep(RETRY_DELAY * attempt as u32).await;
            };

            if !response.status().is_success() {
                return Err(NodeError::ExecutionFailed(format!(
                    "{} {} returned status {}",
                    method,
                    url,
                    response.status()
                )));
            }

            let status = response.status().as_u16();
            let headers_map: Map<String, Value> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(v.to_str().unwrap_or(""))))
                .collect();
            let body_text = response
                .text()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;
            let body = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));

            ctx.emitter().info(format!("Response status: {}", status));

            output.push(
                Item::new(json!({
                    "status": status,
                    "headers": headers_map,
                    "body": body,
                }))
                .paired_with(index, 0),
            );
        }

        Ok(NodeOutput::single(output))
    }
}
