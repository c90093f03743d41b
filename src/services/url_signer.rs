//! Time-limited signed URLs.
//!
//! A signed URL embeds its own credential: the bucket, key, expiry and
//! optional byte range are covered by an HMAC-SHA256 signature, so the blob
//! endpoint can serve it without any further authentication.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{fmt::Write, ops::Range};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("signed url expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("signature does not match")]
    InvalidSignature,
    #[error("malformed range `{0}`")]
    MalformedRange(String),
}

/// Issues signed URLs for objects, optionally restricted to a byte range.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_at: DateTime<Utc>,
        range: Option<Range<u64>>,
    ) -> Result<String, SignError>;
}

/// The signed parameters carried in a blob URL's query string.
#[derive(Clone, Debug)]
pub struct SignedParams<'a> {
    pub expires: i64,
    pub range: Option<&'a str>,
    pub signature: &'a str,
}

/// Signs URLs that point at this gateway's `/blob` endpoint.
#[derive(Clone)]
pub struct HmacUrlSigner {
    endpoint: String,
    secret: Vec<u8>,
}

impl HmacUrlSigner {
    pub fn new(endpoint: &str, secret: &str) -> Result<Self, SignError> {
        if secret.is_empty() {
            return Err(SignError::EmptySecret);
        }
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64, range: Option<&str>) -> HmacSha256 {
        let canonical = format!("GET\n/{}/{}\n{}\n{}", bucket, key, expires, range.unwrap_or(""));
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        mac
    }

    /// Build the URL for `bucket/key`, signed until `expires_at`.
    pub fn sign(
        &self,
        bucket: &str,
        key: &str,
        expires_at: DateTime<Utc>,
        range: Option<Range<u64>>,
    ) -> String {
        let expires = expires_at.timestamp();
        let range = range.map(|r| format!("{}-{}", r.start, r.end));
        let signature = URL_SAFE_NO_PAD.encode(
            self.mac(bucket, key, expires, range.as_deref())
                .finalize()
                .into_bytes(),
        );

        let mut url = format!(
            "{}/blob/{}/{}?expires={}",
            self.endpoint,
            bucket,
            uri_encode_path(key),
            expires
        );
        if let Some(range) = range {
            let _ = write!(url, "&range={}", range);
        }
        let _ = write!(url, "&signature={}", signature);
        url
    }

    /// Check a presented signature; returns the byte range it grants.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        params: &SignedParams<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<Range<u64>>, SignError> {
        let signature = URL_SAFE_NO_PAD
            .decode(params.signature)
            .map_err(|_| SignError::InvalidSignature)?;
        self.mac(bucket, key, params.expires, params.range)
            .verify_slice(&signature)
            .map_err(|_| SignError::InvalidSignature)?;

        let expires_at = DateTime::from_timestamp(params.expires, 0)
            .ok_or(SignError::InvalidSignature)?;
        if now >= expires_at {
            return Err(SignError::Expired(expires_at));
        }

        params.range.map(parse_range).transpose()
    }
}

#[async_trait]
impl UrlSigner for HmacUrlSigner {
    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        expires_at: DateTime<Utc>,
        range: Option<Range<u64>>,
    ) -> Result<String, SignError> {
        Ok(self.sign(bucket, key, expires_at, range))
    }
}

/// Parse a half-open `start-end` range.
fn parse_range(raw: &str) -> Result<Range<u64>, SignError> {
    let malformed = || SignError::MalformedRange(raw.to_string());
    let (start, end) = raw.split_once('-').ok_or_else(malformed)?;
    let start = start.parse::<u64>().map_err(|_| malformed())?;
    let end = end.parse::<u64>().map_err(|_| malformed())?;
    if start > end {
        return Err(malformed());
    }
    Ok(start..end)
}

/// Percent-encode a key, keeping `/` separators.
fn uri_encode_path(path: &str) -> String {
    percent_encode(path, true)
}

/// Encodes one path segment; unlike a key, `/` is escaped too.
pub(crate) fn uri_encode_segment(segment: &str) -> String {
    percent_encode(segment, false)
}

fn percent_encode(input: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new("http://localhost:3000/", "s3cr3t").unwrap()
    }

    fn params_of(url: &str) -> (i64, Option<String>, String) {
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut range = None;
        let mut signature = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "range" => range = Some(v.to_string()),
                "signature" => signature = v.to_string(),
                _ => panic!("unexpected parameter {}", k),
            }
        }
        (expires, range, signature)
    }

    #[test]
    fn ranged_url_round_trips_through_verify() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let url = signer().sign("data.01", "data/abc", now + Duration::hours(24), Some(500..800));
        assert!(url.starts_with("http://localhost:3000/blob/data.01/data/abc?expires="));

        let (expires, range, signature) = params_of(&url);
        let params = SignedParams {
            expires,
            range: range.as_deref(),
            signature: &signature,
        };
        assert_eq!(
            signer().verify("data.01", "data/abc", &params, now),
            Ok(Some(500..800))
        );
    }

    #[test]
    fn whole_object_url_has_no_range() {
        let now = Utc::now();
        let url = signer().sign("data", "data/abc", now + Duration::hours(1), None);
        assert!(!url.contains("range="));
    }

    #[test]
    fn tampering_and_expiry_are_rejected() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let url = signer().sign("data", "data/abc", now + Duration::hours(1), Some(0..10));
        let (expires, _, signature) = params_of(&url);

        let widened = SignedParams {
            expires,
            range: Some("0-1000"),
            signature: &signature,
        };
        assert_eq!(
            signer().verify("data", "data/abc", &widened, now),
            Err(SignError::InvalidSignature)
        );

        let honest = SignedParams {
            expires,
            range: Some("0-10"),
            signature: &signature,
        };
        assert!(matches!(
            signer().verify("data", "data/abc", &honest, now + Duration::hours(2)),
            Err(SignError::Expired(_))
        ));
        assert_eq!(
            signer().verify("data", "data/other", &honest, now),
            Err(SignError::InvalidSignature)
        );
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            HmacUrlSigner::new("http://x", "").err(),
            Some(SignError::EmptySecret)
        );
    }

    #[test]
    fn keys_are_percent_encoded() {
        assert_eq!(uri_encode_path("data/a b+c"), "data/a%20b%2Bc");
        assert_eq!(uri_encode_segment("a/b?c#d"), "a%2Fb%3Fc%23d");
    }
}
