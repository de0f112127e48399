//! Shared Key request signing
//!
//! Builds the canonical string-to-sign for the Blob service and signs it
//! with HMAC-SHA256 over the decoded account key.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Standard headers that take part in the signature, in signing order
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Canonical string-to-sign for a request
pub(crate) fn string_to_sign(account: &str, method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(method.as_str());
    out.push('\n');

    for name in SIGNED_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // A zero length is signed as an empty string.
        if name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }

    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(account, url));
    out
}

/// `x-ms-*` headers, lowercase, sorted, one `name:value\n` per header
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        if name.starts_with("x-ms-") {
            ms.insert(name, value.to_str().unwrap_or_default().trim().to_string());
        }
    }

    ms.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect()
}

/// `/{account}{path}` followed by each query parameter as `\nname:value`
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in url.query_pairs() {
        params
            .entry(k.to_ascii_lowercase())
            .or_default()
            .push(v.into_owned());
    }

    for (k, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&k);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

/// Sign a string with the account key, returning the base64 signature
pub(crate) fn sign(key: &[u8], string_to_sign: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::Signing(format!("HMAC key error: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// `Authorization` header value for a request
pub(crate) fn authorization(
    account: &str,
    key: &[u8],
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
) -> Result<String> {
    let signature = sign(key, &string_to_sign(account, method, url, headers))?;
    Ok(format!("SharedKey {}:{}", account, signature))
}
