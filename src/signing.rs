//! AWS Signature Version 4 request signing

use crate::config::AwsCredentials;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Where a signature is valid: region plus the service's signing name
#[derive(Debug, Clone, Copy)]
pub struct SigningScope<'a> {
    pub region: &'a str,
    pub service: &'a str,
}

/// Headers to add to a request for it to be accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    pub fn into_headers(self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Authorization", self.authorization),
            ("X-Amz-Date", self.amz_date),
        ];
        if let Some(token) = self.security_token {
            headers.push(("X-Amz-Security-Token", token));
        }
        headers
    }
}

/// Sign a request.
///
/// `headers` are the headers sent with the request besides `Host`, which is
/// derived from `url`; all of them are signed.
pub fn sign(
    credentials: &AwsCredentials,
    scope: SigningScope<'_>,
    method: &str,
    url: &Url,
    headers: &[(&str, String)],
    body: &[u8],
    time: DateTime<Utc>,
) -> Result<SignedHeaders> {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(AppError::invalid_config(
                "endpoint",
                format!("'{}' has no host", url),
            ))
        }
    };

    let mut signed: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    signed.push(("host".to_string(), host));
    signed.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        signed.push(("x-amz-security-token".to_string(), token.clone()));
    }
    signed.sort();

    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_names = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed_names,
        hex(&Sha256::digest(body)),
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date, scope.region, scope.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        hex(&Sha256::digest(canonical_request.as_bytes())),
    );

    let k_date = hmac(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    )?;
    let k_region = hmac(&k_date, scope.region.as_bytes())?;
    let k_service = hmac(&k_region, scope.service.as_bytes())?;
    let k_signing = hmac(&k_service, b"aws4_request")?;
    let signature = hex(&hmac(&k_signing, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, credential_scope, signed_names, signature
        ),
        amz_date,
        security_token: credentials.session_token.clone(),
    })
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::service("sign request", e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn uri_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// The path as sent, each segment encoded once more
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        }
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_sign_get_vanilla() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let signed = sign(
            &example_credentials(),
            SigningScope {
                region: "us-east-1",
                service: "service",
            },
            "GET",
            &url,
            &[],
            b"",
            example_time(),
        )
        .unwrap();

        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_extra_headers_and_token_are_signed() {
        let mut credentials = example_credentials();
        credentials.session_token = Some("session".to_string());
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        let signed = sign(
            &credentials,
            SigningScope {
                region: "eu-west-1",
                service: "rekognition",
            },
            "POST",
            &url,
            &[
                ("X-Amz-Target", "RekognitionService.CompareFaces".to_string()),
                ("Content-Type", "application/x-amz-json-1.1".to_string()),
            ],
            b"{}",
            example_time(),
        )
        .unwrap();

        assert!(signed.authorization.contains("/eu-west-1/rekognition/aws4_request"));
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target,"));
        assert_eq!(signed.security_token.as_deref(), Some("session"));
        assert_eq!(signed.into_headers().len(), 3);
    }

    #[test]
    fn test_signature_depends_on_body() {
        let url = Url::parse("https://bedrock-runtime.us-east-1.amazonaws.com/model/m/invoke").unwrap();
        let scope = SigningScope {
            region: "us-east-1",
            service: "bedrock",
        };
        let a = sign(&example_credentials(), scope, "POST", &url, &[], b"{\"a\":1}", example_time()).unwrap();
        let b = sign(&example_credentials(), scope, "POST", &url, &[], b"{\"a\":2}", example_time()).unwrap();
        assert_ne!(a.authorization, b.authorization);
    }

    #[test]
    fn test_canonical_uri_encodes_segments() {
        let url = Url::parse("https://host/model/amazon.titan-text-premier-v1:0/invoke").unwrap();
        assert_eq!(
            canonical_uri(&url),
            "/model/amazon.titan-text-premier-v1%3A0/invoke"
        );
        let url = Url::parse("https://host/model/a%3Ab/invoke").unwrap();
        assert_eq!(canonical_uri(&url), "/model/a%253Ab/invoke");
    }
}
