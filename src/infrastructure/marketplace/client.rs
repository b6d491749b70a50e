//! Marketplace Metering Service client (REST API)
//!
//! Posts `MeterUsage` calls to the regional metering endpoint with
//! SigV4 request signing. Success is an HTTP 200; anything else is
//! surfaced as a structured sink error.

use crate::domain::errors::SinkError;
use crate::domain::ports::{MeteringSink, SinkResponse};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

const SERVICE: &str = "aws-marketplace";
const TARGET: &str = "AWSMPMeteringService.MeterUsage";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

pub struct MarketplaceMeteringClient {
    client: ClientWithMiddleware,
    endpoint: String,
    host: String,
    region: String,
    product_code: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MeterUsageRequest<'a> {
    product_code: &'a str,
    /// Epoch seconds; the hour this falls in is the billable window.
    timestamp: i64,
    usage_dimension: &'a str,
    usage_quantity: u64,
    dry_run: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MeterUsageResponse {
    metering_record_id: Option<String>,
}

#[derive(Default, Deserialize)]
struct ServiceErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(rename = "message", alias = "Message")]
    message: Option<String>,
}

impl MarketplaceMeteringClient {
    pub fn new(
        region: String,
        product_code: String,
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
        endpoint_override: Option<String>,
    ) -> Self {
        let endpoint = endpoint_override
            .unwrap_or_else(|| format!("https://metering.marketplace.{region}.amazonaws.com/"));
        let host = host_of(&endpoint);

        Self {
            client: HttpClientFactory::create_client(),
            endpoint,
            host,
            region,
            product_code,
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// SigV4 authorization header over the signed POST request.
    fn authorization_header(&self, body: &str, amz_date: &str) -> String {
        let date = &amz_date[..8];
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        // Canonical headers must stay sorted by name.
        let mut canonical_headers = format!(
            "content-type:{CONTENT_TYPE}\nhost:{}\nx-amz-date:{amz_date}\n",
            self.host
        );
        let mut signed_headers = String::from("content-type;host;x-amz-date");
        if let Some(token) = &self.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
            signed_headers.push_str(";x-amz-security-token");
        }
        canonical_headers.push_str(&format!("x-amz-target:{TARGET}\n"));
        signed_headers.push_str(";x-amz-target");

        let canonical_request =
            format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(hmac_sha256(&self.signing_key(date), string_to_sign.as_bytes()));
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key_id
        )
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// `__type` payloads come namespaced (`com.amazonaws...#ThrottlingException`).
fn error_code(error_type: Option<String>, http_status: u16) -> String {
    match error_type {
        Some(full) => full
            .rsplit('#')
            .next()
            .unwrap_or(full.as_str())
            .to_string(),
        None => format!("HTTP{http_status}"),
    }
}

#[async_trait]
impl MeteringSink for MarketplaceMeteringClient {
    async fn send(
        &self,
        name: &str,
        quantity: u64,
        timestamp: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<SinkResponse, SinkError> {
        let request = MeterUsageRequest {
            product_code: &self.product_code,
            timestamp: timestamp.timestamp(),
            usage_dimension: name,
            usage_quantity: quantity,
            dry_run,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SinkError::transport(format!("failed to encode request: {e}")))?;

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = self.authorization_header(&body, &amz_date);

        let mut http_request = self
            .client
            .post(&self.endpoint)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET)
            .header("x-amz-date", &amz_date)
            .header("authorization", authorization);
        if let Some(token) = &self.session_token {
            http_request = http_request.header("x-amz-security-token", token);
        }

        let response = http_request
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SinkError::transport(format!("failed to read response body: {e}")))?;

        if http_status == 200 {
            let decoded: MeterUsageResponse =
                serde_json::from_str(&text).unwrap_or(MeterUsageResponse {
                    metering_record_id: None,
                });
            info!(
                "MarketplaceMeteringClient: metered {name} x{quantity} (dry_run={dry_run}, record={:?})",
                decoded.metering_record_id
            );
            return Ok(SinkResponse {
                http_status,
                metering_record_id: decoded.metering_record_id,
            });
        }

        let decoded: ServiceErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let code = error_code(decoded.error_type, http_status);
        let message = decoded.message.unwrap_or(text);
        warn!("MarketplaceMeteringClient: MeterUsage rejected ({code}): {message}");
        Err(SinkError::Service { code, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MarketplaceMeteringClient {
        MarketplaceMeteringClient::new(
            "us-east-1".to_string(),
            "testproduct".to_string(),
            "AKIDEXAMPLE".to_string(),
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            None,
            None,
        )
    }

    #[test]
    fn test_request_body_uses_service_field_names() {
        let request = MeterUsageRequest {
            product_code: "testproduct",
            timestamp: 1_700_000_000,
            usage_dimension: "unique-hosts",
            usage_quantity: 10,
            dry_run: true,
        };

        let json = serde_json::to_string(&request).expect("Failed to serialize");
        assert!(json.contains("\"ProductCode\":\"testproduct\""));
        assert!(json.contains("\"UsageDimension\":\"unique-hosts\""));
        assert!(json.contains("\"UsageQuantity\":10"));
        assert!(json.contains("\"DryRun\":true"));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let client = client();
        let first = client.authorization_header("{}", "20260301T120000Z");
        let second = client.authorization_header("{}", "20260301T120000Z");

        assert_eq!(first, second);
        assert!(first.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260301/us-east-1/aws-marketplace/aws4_request"
        ));
        assert!(first.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target"));

        let signature = first
            .rsplit("Signature=")
            .next()
            .expect("header carries a signature");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let first = client().authorization_header("{}", "20260301T120000Z");
        let other = MarketplaceMeteringClient::new(
            "us-east-1".to_string(),
            "testproduct".to_string(),
            "AKIDEXAMPLE".to_string(),
            "another-secret".to_string(),
            None,
            None,
        );
        let second = other.authorization_header("{}", "20260301T120000Z");

        assert_ne!(first, second);
    }

    #[test]
    fn test_session_token_joins_signed_headers() {
        let client = MarketplaceMeteringClient::new(
            "us-east-1".to_string(),
            "testproduct".to_string(),
            "AKIDEXAMPLE".to_string(),
            "secret".to_string(),
            Some("session-token".to_string()),
            None,
        );

        let header = client.authorization_header("{}", "20260301T120000Z");
        assert!(header.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
    }

    #[test]
    fn test_default_endpoint_is_regional() {
        let client = client();
        assert_eq!(
            client.endpoint,
            "https://metering.marketplace.us-east-1.amazonaws.com/"
        );
        assert_eq!(client.host, "metering.marketplace.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_host_of_strips_scheme_and_path() {
        assert_eq!(host_of("http://localhost:8080/meter"), "localhost:8080");
        assert_eq!(
            host_of("https://metering.marketplace.eu-west-1.amazonaws.com/"),
            "metering.marketplace.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_error_code_drops_namespace() {
        assert_eq!(
            error_code(
                Some("com.amazonaws.services.marketplacemetering#ThrottlingException".to_string()),
                400
            ),
            "ThrottlingException"
        );
        assert_eq!(error_code(None, 503), "HTTP503");
    }
}
