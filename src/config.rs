use crate::error::{AppError, Result};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Credentials attached to every request
#[derive(Clone)]
pub enum Credentials {
    /// Sent as a bearer token, e.g. a Bedrock API key or a gateway token
    ApiKey(String),
    /// Access key pair used to sign each request with SigV4
    Aws(AwsCredentials),
}

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
            Credentials::Aws(aws) => aws.fmt(f),
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of credentials, resolved on every call
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

/// Credentials fixed at construction time
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        StaticCredentials(Credentials::ApiKey(api_key.into()))
    }

    pub fn aws(credentials: AwsCredentials) -> Self {
        StaticCredentials(Credentials::Aws(credentials))
    }
}

impl CredentialsProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

/// API key read from an environment variable when a request is made
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        EnvCredentials { var: var.into() }
    }

    pub fn is_set(&self) -> bool {
        non_empty_var(&self.var).is_some()
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        EnvCredentials::new("BEDROCK_API_KEY")
    }
}

impl CredentialsProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        non_empty_var(&self.var)
            .map(Credentials::ApiKey)
            .ok_or_else(|| AppError::service("load credentials", format!("{} is not set", self.var)))
    }
}

/// Access key pair read from the environment when a request is made
pub struct AwsEnvCredentials {
    access_key_var: String,
    secret_key_var: String,
    session_token_var: String,
}

impl AwsEnvCredentials {
    pub fn new(
        access_key_var: impl Into<String>,
        secret_key_var: impl Into<String>,
        session_token_var: impl Into<String>,
    ) -> Self {
        AwsEnvCredentials {
            access_key_var: access_key_var.into(),
            secret_key_var: secret_key_var.into(),
            session_token_var: session_token_var.into(),
        }
    }
}

impl Default for AwsEnvCredentials {
    fn default() -> Self {
        AwsEnvCredentials::new(
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
            "AWS_SESSION_TOKEN",
        )
    }
}

impl CredentialsProvider for AwsEnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let missing =
            |var: &str| AppError::service("load credentials", format!("{} is not set", var));
        let access_key_id =
            non_empty_var(&self.access_key_var).ok_or_else(|| missing(&self.access_key_var))?;
        let secret_access_key =
            non_empty_var(&self.secret_key_var).ok_or_else(|| missing(&self.secret_key_var))?;
        Ok(Credentials::Aws(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: non_empty_var(&self.session_token_var),
        }))
    }
}

/// Connection settings for one managed service
#[derive(Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub region: String,
    /// Name the service is signed under when SigV4 credentials are used
    pub signing_name: String,
    pub timeout: Duration,
    pub credentials: Arc<dyn CredentialsProvider>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("signing_name", &self.signing_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    pub fn new(endpoint: impl Into<String>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        ServiceConfig {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            region: DEFAULT_REGION.to_string(),
            signing_name: "bedrock".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_signing_name(mut self, signing_name: impl Into<String>) -> Self {
        self.signing_name = signing_name.into();
        self
    }
}

/// Configuration for every service the demos talk to
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bedrock: ServiceConfig,
    pub rekognition: ServiceConfig,
}

impl AppConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let region = env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());
        let timeout = match env::var("SERVICE_TIMEOUT_SECS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    AppError::invalid_config(
                        "SERVICE_TIMEOUT_SECS",
                        format!("expected a positive number of seconds, got {value:?}"),
                    )
                })?,
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let bedrock_endpoint = env::var("BEDROCK_ENDPOINT")
            .unwrap_or_else(|_| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        let rekognition_endpoint = env::var("REKOGNITION_ENDPOINT")
            .unwrap_or_else(|_| format!("https://rekognition.{region}.amazonaws.com"));

        // Rekognition has no API keys, so it is always signed
        let api_key = EnvCredentials::default();
        let bedrock_credentials: Arc<dyn CredentialsProvider> = if api_key.is_set() {
            Arc::new(api_key)
        } else {
            Arc::new(AwsEnvCredentials::default())
        };

        Ok(AppConfig {
            bedrock: ServiceConfig::new(bedrock_endpoint, bedrock_credentials)
                .with_region(region.clone())
                .with_signing_name("bedrock")
                .with_timeout(timeout),
            rekognition: ServiceConfig::new(rekognition_endpoint, Arc::new(AwsEnvCredentials::default()))
                .with_region(region)
                .with_signing_name("rekognition")
                .with_timeout(timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::new(
            "http://localhost:8080/",
            Arc::new(StaticCredentials::new("key")),
        );
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.signing_name, "bedrock");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = StaticCredentials::new("super-secret").credentials().unwrap();
        assert!(!format!("{:?}", creds).contains("super-secret"));
    }

    #[test]
    fn test_aws_credentials_debug_is_redacted() {
        let creds = StaticCredentials::aws(AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: Some("token-secret".to_string()),
        })
        .credentials()
        .unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("token-secret"));
    }

    #[test]
    fn test_aws_env_credentials() {
        env::set_var("BEDROCK_DEMOS_TEST_ACCESS_KEY", "AKID");
        env::set_var("BEDROCK_DEMOS_TEST_SECRET_KEY", "secret");
        let provider = AwsEnvCredentials::new(
            "BEDROCK_DEMOS_TEST_ACCESS_KEY",
            "BEDROCK_DEMOS_TEST_SECRET_KEY",
            "BEDROCK_DEMOS_TEST_UNSET_TOKEN",
        );
        match provider.credentials().unwrap() {
            Credentials::Aws(aws) => {
                assert_eq!(aws.access_key_id, "AKID");
                assert_eq!(aws.secret_access_key, "secret");
                assert!(aws.session_token.is_none());
            }
            other => panic!("unexpected credentials: {other:?}"),
        }

        let provider = AwsEnvCredentials::new(
            "BEDROCK_DEMOS_TEST_ACCESS_KEY",
            "BEDROCK_DEMOS_TEST_UNSET_SECRET",
            "BEDROCK_DEMOS_TEST_UNSET_TOKEN",
        );
        let err = provider.credentials().unwrap_err();
        assert!(err.to_string().contains("BEDROCK_DEMOS_TEST_UNSET_SECRET"));
    }

    #[test]
    fn test_env_credentials_missing_variable() {
        let provider = EnvCredentials::new("BEDROCK_DEMOS_TEST_UNSET_KEY");
        let err = provider.credentials().unwrap_err();
        assert!(matches!(err, AppError::Service { .. }));
    }
}
