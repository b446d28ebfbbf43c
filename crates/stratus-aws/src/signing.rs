//! AWS Signature Version 4.
//!
//! <https://docs.aws.amazon.com/general/latest/gr/sigv4_signing.html>
//!
//! 1. Create a canonical request
//! 2. Create the string to sign
//! 3. Calculate the signing key
//! 4. Add the signature to the request

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hash of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// RFC 3986 unreserved characters stay literal, everything else is escaped.
const STRICT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PATH: &AsciiSet = &STRICT.remove(b'/');

/// Signs requests for one (region, service) scope.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
    /// S3 requires `x-amz-content-sha256` to be signed.
    sign_payload_header: bool,
}

impl SigV4Signer {
    pub fn new(credentials: &AwsCredentials, region: &str, service: &str) -> Self {
        Self {
            credentials: credentials.clone(),
            region: region.to_string(),
            service: service.to_string(),
            sign_payload_header: service == "s3",
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Add `x-amz-date`, the optional session token and `authorization` to `headers`.
    ///
    /// `headers` must already carry `host`; header names are expected lowercase.
    pub fn sign(
        &self,
        method: &str,
        url: &url::Url,
        headers: &mut BTreeMap<String, String>,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(ref token) = self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }
        let payload_hash = sha256_hex(body);
        if self.sign_payload_header {
            headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        }

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri(url),
            canonical_query(url),
            canonical_headers(headers),
            signed_header_names(headers),
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key_id,
            credential_scope,
            signed_header_names(headers),
            signature
        );
        headers.insert("authorization".to_string(), authorization);
    }

    /// kSecret  = "AWS4" + SecretAccessKey
    /// kDate    = HMAC-SHA256(kSecret, Date)
    /// kRegion  = HMAC-SHA256(kDate, Region)
    /// kService = HMAC-SHA256(kRegion, Service)
    /// kSigning = HMAC-SHA256(kService, "aws4_request")
    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn canonical_uri(url: &url::Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    // The url crate keeps the path percent-encoded; decode before re-encoding
    // so every segment is encoded exactly once.
    let decoded = percent_encoding::percent_decode_str(path).decode_utf8_lossy();
    utf8_percent_encode(&decoded, PATH).to_string()
}

fn canonical_query(url: &url::Url) -> String {
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

/// Lowercased, trimmed `name:value\n` lines in name order.
fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
        .collect()
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers
        .keys()
        .map(|k| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode a query key or value (RFC 3986, `/` escaped).
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, STRICT).to_string()
}

/// Percent-encode a URL path, preserving `/`.
pub fn uri_encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// `k=v&k=v` in key order, each side encoded with [`uri_encode`].
pub fn encode_form(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn fixed_time() -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2015, 8, 30)
            .unwrap()
            .and_hms_opt(12, 36, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn sha256_empty_payload() {
        assert_eq!(sha256_hex(b""), EMPTY_PAYLOAD_HASH);
    }

    #[test]
    fn signing_key_matches_documented_example() {
        let signer = SigV4Signer::new(&example_credentials(), "us-east-1", "iam");
        let key = signer.derive_signing_key("20150830");
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn get_vanilla_signature() {
        let signer = SigV4Signer::new(&example_credentials(), "us-east-1", "service");
        let url = url::Url::parse("https://example.amazonaws.com/").unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.amazonaws.com".to_string());
        signer.sign("GET", &url, &mut headers, b"", fixed_time());
        assert_eq!(
            headers["authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(headers["x-amz-date"], "20150830T123600Z");
    }

    #[test]
    fn session_token_is_signed() {
        let creds = AwsCredentials::new_temporary("ASIAEXAMPLE", "secret", "token-1", None);
        let signer = SigV4Signer::new(&creds, "us-east-1", "sts");
        let url = url::Url::parse("https://sts.us-east-1.amazonaws.com/").unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "sts.us-east-1.amazonaws.com".to_string());
        signer.sign("POST", &url, &mut headers, b"Action=GetCallerIdentity", Utc::now());
        assert_eq!(headers["x-amz-security-token"], "token-1");
        assert!(headers["authorization"].contains("x-amz-security-token"));
    }

    #[test]
    fn s3_signs_payload_hash_header() {
        let signer = SigV4Signer::new(&example_credentials(), "us-east-1", "s3");
        let url = url::Url::parse("https://s3.us-east-1.amazonaws.com/bucket?location").unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "s3.us-east-1.amazonaws.com".to_string());
        signer.sign("GET", &url, &mut headers, b"", Utc::now());
        assert_eq!(headers["x-amz-content-sha256"], EMPTY_PAYLOAD_HASH);
        assert!(headers["authorization"].contains("host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn canonical_query_sorted_and_encoded() {
        let url = url::Url::parse("https://example.com/?Z=1&A=a%2Fb&location").unwrap();
        assert_eq!(canonical_query(&url), "A=a%2Fb&Z=1&location=");
    }

    #[test]
    fn canonical_uri_encodes_once() {
        let url = url::Url::parse("https://example.com/my%20bucket/a b").unwrap();
        assert_eq!(canonical_uri(&url), "/my%20bucket/a%20b");
    }

    #[test]
    fn uri_encode_rules() {
        assert_eq!(uri_encode("abcABC123-_.~"), "abcABC123-_.~");
        assert_eq!(uri_encode("a b/c=d"), "a%20b%2Fc%3Dd");
        assert_eq!(uri_encode_path("/a b/c"), "/a%20b/c");
    }

    #[test]
    fn encode_form_orders_keys() {
        let mut params = BTreeMap::new();
        params.insert("Version".to_string(), "2016-11-15".to_string());
        params.insert("Action".to_string(), "DescribeVpcs".to_string());
        assert_eq!(encode_form(&params), "Action=DescribeVpcs&Version=2016-11-15");
    }

    #[test]
    fn hmac_accepts_keys_longer_than_a_block() {
        // RFC 4231 test case 6.
        let key = [0xaa_u8; 131];
        let mac = hmac_sha256(&key, b"Test Using Larger Than Block-Size Key - Hash Key First");
        assert_eq!(
            hex::encode(mac),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }
}
