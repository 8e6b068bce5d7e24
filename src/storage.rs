//! Object storage access for the document corpus.
//!
//! The pipeline consumes storage through the [`ObjectStore`] trait:
//! `list` the corpus objects, `download` one object's bytes. The
//! production implementation, [`CorpusBucket`], speaks the S3 REST API
//! with AWS Signature V4 authentication and works against any
//! S3-compatible endpoint (AWS, MinIO, GCS interoperability mode) via
//! `endpoint_url`. [`MemoryObjectStore`] backs tests.
//!
//! Signing uses only pure-Rust dependencies (`hmac`, `sha2`), so no C
//! library is required at build time.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials)
//!
//! Missing credentials fail [`CorpusBucket::new`] with a configuration
//! error; nothing is checked lazily per call.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Descriptor for one corpus object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub name: String,
    pub size: u64,
}

/// Read-only view of the corpus bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the corpus objects, filtered and sorted by name.
    async fn list(&self) -> Result<Vec<ObjectMeta>>;

    /// Download one object's raw bytes.
    async fn download(&self, name: &str) -> Result<Vec<u8>>;
}

// ============ S3-compatible bucket ============

/// S3-compatible corpus bucket client.
pub struct CorpusBucket {
    config: StorageConfig,
    creds: AwsCredentials,
    include: GlobSet,
    client: reqwest::Client,
}

impl CorpusBucket {
    /// Create a bucket client, reading credentials from the environment.
    pub fn new(config: StorageConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let include = build_globset(&config.include_globs)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            creds,
            include,
            client,
        })
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    /// Sign and send a GET request against the bucket.
    async fn signed_get(
        &self,
        canonical_uri: &str,
        query_params: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut sorted_params = query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let url = if canonical_querystring.is_empty() {
            format!("https://{}{}", host, canonical_uri)
        } else {
            format!("https://{}{}?{}", host, canonical_uri, canonical_querystring)
        };

        let mut req = self
            .client
            .get(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        req.send()
            .await
            .map_err(|e| Error::Storage(format!("request to {} failed: {}", host, e)))
    }
}

#[async_trait]
impl ObjectStore for CorpusBucket {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query_params = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                query_params.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query_params.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.signed_get("/", &query_params).await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Storage(format!(
                    "ListObjectsV2 failed for bucket '{}' (HTTP {}): {}",
                    self.config.bucket,
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let xml = resp
                .text()
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            let (batch, is_truncated, next_token) = parse_list_response(&xml);
            objects.extend(batch);

            if is_truncated {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        // Strip the prefix before glob matching so `**/*.pdf` behaves the
        // same regardless of where the corpus lives in the bucket.
        let prefix = self.config.prefix.trim_end_matches('/');
        objects.retain(|obj| {
            let rel = obj
                .name
                .strip_prefix(prefix)
                .map(|s| s.trim_start_matches('/'))
                .unwrap_or(&obj.name);
            self.include.is_match(rel)
        });

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let encoded_key = name
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let canonical_uri = format!("/{}", encoded_key);

        let resp = self.signed_get(&canonical_uri, &[]).await?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                name
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============ Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Error::Config("AWS_ACCESS_KEY_ID environment variable not set".into()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            Error::Config("AWS_SECRET_ACCESS_KEY environment variable not set".into())
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ SigV4 helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding as required by SigV4 canonical requests.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ ListObjectsV2 XML parsing ============

fn parse_list_response(xml: &str) -> (Vec<ObjectMeta>, bool, Option<String>) {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut objects = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        // Skip folder placeholder keys
        if !key.is_empty() && !key.ends_with('/') {
            let size = extract_xml_value(block, "Size")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            objects.push(ObjectMeta { name: key, size });
        }

        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    (objects, is_truncated, next_token)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)?;
    let value_start = start + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid include glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid include globs: {}", e)))
}

// ============ In-memory store ============

/// In-memory [`ObjectStore`] for tests and local experimentation.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.objects.insert(name.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        let mut metas: Vec<ObjectMeta> = self
            .objects
            .iter()
            .map(|(name, bytes)| ObjectMeta {
                name: name.clone(),
                size: bytes.len() as u64,
            })
            .collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metas)
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.objects
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("object not found: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_response() {
        let xml = r#"
        <ListBucketResult>
            <IsTruncated>false</IsTruncated>
            <Contents>
                <Key>acts/employment-code.pdf</Key>
                <Size>1024</Size>
            </Contents>
            <Contents>
                <Key>acts/</Key>
                <Size>0</Size>
            </Contents>
            <Contents>
                <Key>acts/penal-code.pdf</Key>
                <Size>2048</Size>
            </Contents>
        </ListBucketResult>
        "#;
        let (objects, truncated, token) = parse_list_response(xml);
        assert!(!truncated);
        assert!(token.is_none());
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name, "acts/employment-code.pdf");
        assert_eq!(objects[0].size, 1024);
    }

    #[test]
    fn test_parse_list_response_truncated() {
        let xml = r#"
        <ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>abc123</NextContinuationToken>
        </ListBucketResult>
        "#;
        let (_, truncated, token) = parse_list_response(xml);
        assert!(truncated);
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("employment code.pdf"), "employment%20code.pdf");
        assert_eq!(uri_encode("safe-name_1.txt"), "safe-name_1.txt");
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let mut store = MemoryObjectStore::new();
        store.insert("b.txt", b"beta".to_vec());
        store.insert("a.txt", b"alpha".to_vec());

        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "a.txt");

        let bytes = store.download("b.txt").await.unwrap();
        assert_eq!(bytes, b"beta");

        let err = store.download("missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
