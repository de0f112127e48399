//! Storage account connection strings
//!
//! Parses the `Key=Value;Key=Value` connection strings issued by the Azure
//! portal, including SAS-only strings and the `UseDevelopmentStorage=true`
//! shorthand for a local emulator.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::error::{Error, Result};

/// Account name of the local storage emulator
pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known account key of the local storage emulator
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";
const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// How requests to the account are authorized
#[derive(Clone)]
pub enum Credential {
    /// Shared Key: requests are signed with the decoded account key
    SharedKey { account: String, key: Vec<u8> },
    /// Shared access signature appended to every request URL
    Sas { token: String },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"<redacted>")
                .finish(),
            Credential::Sas { .. } => f.debug_struct("Sas").field("token", &"<redacted>").finish(),
        }
    }
}

/// Parsed storage connection string
#[derive(Debug, Clone)]
pub struct ConnectionString {
    /// Account name, when the string names one
    pub account_name: Option<String>,
    /// Blob service endpoint without a trailing slash
    pub blob_endpoint: String,
    /// Request authorization
    pub credential: Credential,
}

impl ConnectionString {
    /// Parse a connection string
    pub fn parse(raw: &str) -> Result<Self> {
        let mut settings: HashMap<String, String> = HashMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::ConnectionString(format!("setting without a value: {:?}", part))
            })?;
            settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self::development());
        }

        let account_name = settings.get("accountname").cloned();

        let blob_endpoint = match settings.get("blobendpoint") {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => {
                let account = account_name.as_deref().ok_or_else(|| {
                    Error::ConnectionString("AccountName or BlobEndpoint is required".into())
                })?;
                let protocol = settings
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL);
                let suffix = settings
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{}://{}.blob.{}", protocol, account, suffix)
            }
        };

        let credential = if let Some(key) = settings.get("accountkey") {
            let account = account_name.clone().ok_or_else(|| {
                Error::ConnectionString("AccountKey requires AccountName".into())
            })?;
            let key = BASE64_STANDARD.decode(key).map_err(|e| {
                Error::ConnectionString(format!("AccountKey is not valid base64: {}", e))
            })?;
            Credential::SharedKey { account, key }
        } else if let Some(sas) = settings.get("sharedaccesssignature") {
            Credential::Sas {
                token: sas.trim_start_matches('?').to_string(),
            }
        } else {
            return Err(Error::ConnectionString(
                "either AccountKey or SharedAccessSignature is required".into(),
            ));
        };

        Ok(Self {
            account_name,
            blob_endpoint,
            credential,
        })
    }

    /// Settings for the local storage emulator
    pub fn development() -> Self {
        Self {
            account_name: Some(DEV_ACCOUNT_NAME.to_string()),
            blob_endpoint: DEV_BLOB_ENDPOINT.to_string(),
            credential: Credential::SharedKey {
                account: DEV_ACCOUNT_NAME.to_string(),
                // The emulator key is a valid base64 constant.
                key: BASE64_STANDARD.decode(DEV_ACCOUNT_KEY).unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_key() {
        let conn = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=wolfacct;AccountKey=c2VjcmV0LWtleQ==;EndpointSuffix=core.windows.net",
        )
        .unwrap();

        assert_eq!(conn.account_name.as_deref(), Some("wolfacct"));
        assert_eq!(conn.blob_endpoint, "https://wolfacct.blob.core.windows.net");
        match conn.credential {
            Credential::SharedKey { account, key } => {
                assert_eq!(account, "wolfacct");
                assert_eq!(key, b"secret-key");
            }
            other => panic!("unexpected credential {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults_protocol_and_suffix() {
        let conn = ConnectionString::parse("AccountName=acct;AccountKey=a2V5").unwrap();
        assert_eq!(conn.blob_endpoint, "https://acct.blob.core.windows.net");
    }

    #[test]
    fn test_parse_sas_with_blob_endpoint() {
        let conn = ConnectionString::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=?sv=2021-08-06&sig=abc%3D",
        )
        .unwrap();

        assert_eq!(conn.blob_endpoint, "https://acct.blob.core.windows.net");
        assert!(conn.account_name.is_none());
        match conn.credential {
            Credential::Sas { token } => assert_eq!(token, "sv=2021-08-06&sig=abc%3D"),
            other => panic!("unexpected credential {:?}", other),
        }
    }

    #[test]
    fn test_parse_development_storage() {
        let conn = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(conn.account_name.as_deref(), Some(DEV_ACCOUNT_NAME));
        assert_eq!(conn.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
        assert!(matches!(conn.credential, Credential::SharedKey { ref key, .. } if key.len() == 64));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConnectionString::parse("").is_err());
        assert!(ConnectionString::parse("AccountName=acct").is_err());
        assert!(ConnectionString::parse("AccountKey=a2V5").is_err());
        assert!(ConnectionString::parse("AccountName=acct;AccountKey=***").is_err());
        assert!(ConnectionString::parse("AccountName").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let conn = ConnectionString::development();
        let rendered = format!("{:?}", conn);
        assert!(!rendered.contains(DEV_ACCOUNT_KEY));
        assert!(rendered.contains("<redacted>"));
    }
}
