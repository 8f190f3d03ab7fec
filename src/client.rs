use crate::config::{Credentials, ServiceConfig};
use crate::error::{AppError, Result};
use crate::signing::{self, SigningScope};
use chrono::Utc;
use log::debug;
use reqwest::{StatusCode, Url};
use serde_json::Value;

/// HTTP transport shared by the service adapters.
///
/// Applies the configured timeout to every call and maps transport failures
/// onto the error taxonomy. API keys go out as bearer tokens; AWS access keys
/// sign the exact headers and body that are sent. Bodies are returned as raw JSON
/// so each adapter can parse its own response shape.
#[derive(Clone)]
pub struct ServiceClient {
    config: ServiceConfig,
    client: reqwest::Client,
}

impl ServiceClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::service("create HTTP client", e.to_string()))?;
        Ok(ServiceClient { config, client })
    }

    /// Invoke a hosted model with a JSON body
    pub async fn invoke_model(&self, model_id: &str, body: &Value, operation: &str) -> Result<Value> {
        let url = format!("{}/model/{}/invoke", self.config.endpoint, model_id);
        debug!("{}: POST {}", operation, url);

        let headers = vec![
            ("Accept", "application/json".to_string()),
            ("Content-Type", "application/json".to_string()),
        ];
        self.send(&url, headers, body, operation).await
    }

    /// Call a JSON 1.1 action identified by its target header
    pub async fn call_target(&self, target: &str, body: &Value, operation: &str) -> Result<Value> {
        let url = format!("{}/", self.config.endpoint);
        debug!("{}: POST {} ({})", operation, url, target);

        let headers = vec![
            ("X-Amz-Target", target.to_string()),
            ("Content-Type", "application/x-amz-json-1.1".to_string()),
        ];
        self.send(&url, headers, body, operation).await
    }

    async fn send(
        &self,
        url: &str,
        headers: Vec<(&'static str, String)>,
        body: &Value,
        operation: &str,
    ) -> Result<Value> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| AppError::service(operation, format!("failed to encode request: {e}")))?;
        let auth_headers = self.authorize(url, &headers, &payload)?;

        let mut request = self.client.post(url);
        for (name, value) in headers.into_iter().chain(auth_headers) {
            request = request.header(name, value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        if !status.is_success() {
            return Err(status_error(operation, status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::malformed(operation, format!("body is not valid JSON: {e}")))
    }

    /// Headers proving who sent the request
    fn authorize(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        payload: &[u8],
    ) -> Result<Vec<(&'static str, String)>> {
        match self.config.credentials.credentials()? {
            Credentials::ApiKey(api_key) => {
                Ok(vec![("Authorization", format!("Bearer {}", api_key))])
            }
            Credentials::Aws(aws) => {
                let url = Url::parse(url).map_err(|e| {
                    AppError::invalid_config("endpoint", format!("'{}' is not a URL: {}", url, e))
                })?;
                let scope = SigningScope {
                    region: &self.config.region,
                    service: &self.config.signing_name,
                };
                let signed = signing::sign(&aws, scope, "POST", &url, headers, payload, Utc::now())?;
                Ok(signed.into_headers())
            }
        }
    }

    fn transport_error(&self, operation: &str, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::service(
                operation,
                format!("timed out after {}s", self.config.timeout.as_secs_f32()),
            )
        } else if error.is_connect() {
            AppError::service(
                operation,
                format!("could not connect to {}: {}", self.config.endpoint, error),
            )
        } else {
            AppError::service(operation, error.to_string())
        }
    }
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> AppError {
    let body = body.trim();
    let detail = if body.is_empty() { "no details" } else { body };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::service(
            operation,
            format!("credentials were rejected ({}): {}", status, detail),
        ),
        _ => AppError::service(operation, format!("API request failed: {} {}", status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_flags_credentials() {
        let err = status_error("invoke model", StatusCode::FORBIDDEN, "bad token");
        let message = err.to_string();
        assert!(message.contains("credentials were rejected"));
        assert!(message.contains("bad token"));
    }

    #[test]
    fn test_status_error_without_body() {
        let err = status_error("embed", StatusCode::INTERNAL_SERVER_ERROR, "  ");
        assert!(matches!(err, AppError::Service { .. }));
        assert!(err.to_string().contains("no details"));
    }
}
