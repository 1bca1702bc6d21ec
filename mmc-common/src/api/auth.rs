//! API authentication via static client keys
//!
//! # Architecture
//!
//! - Clients send `Authorization: key <value>`
//! - The key table comes from one environment-provided string of the form
//!   `system:env=key[;system:env=key]*`, whitespace permitted around tokens
//! - The table is read-only for the lifetime of the process
//! - `/_info` is exempt so monitoring can probe without a key

use std::collections::HashMap;

/// Path that never requires authentication
pub const AUTH_EXEMPT_PATH: &str = "/_info";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No Authorization header on the request
    MissingHeader,

    /// Authorization header present but not `key <value>`
    InvalidScheme(String),

    /// Key not in the client table
    UnknownKey,

    /// Client-key configuration string could not be parsed
    InvalidConfig(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingHeader => write!(f, "No Authorization header supplied"),
            ApiAuthError::InvalidScheme(scheme) => {
                write!(f, "Unsupported authorization scheme {:?}, expected \"key\"", scheme)
            }
            ApiAuthError::UnknownKey => write!(f, "Key not recognised"),
            ApiAuthError::InvalidConfig(msg) => write!(f, "Invalid client key configuration: {}", msg),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Client Key Table
// ========================================

/// Who a key belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub system: String,
    pub environment: String,
}

/// Map of opaque key -> client identity
#[derive(Debug, Clone, Default)]
pub struct ClientKeys {
    keys: HashMap<String, ClientIdentity>,
}

impl ClientKeys {
    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate an `Authorization` header value
    ///
    /// # Examples
    ///
    /// ```
    /// use mmc_common::api::auth::parse_client_keys;
    ///
    /// let keys = parse_client_keys("media_manager:production=abc123").unwrap();
    /// let client = keys.authenticate(Some("key abc123")).unwrap();
    /// assert_eq!(client.system, "media_manager");
    ///
    /// assert!(keys.authenticate(Some("key wrong")).is_err());
    /// assert!(keys.authenticate(None).is_err());
    /// ```
    pub fn authenticate(&self, header: Option<&str>) -> Result<&ClientIdentity, ApiAuthError> {
        let header = header.ok_or(ApiAuthError::MissingHeader)?.trim();
        let (scheme, value) = header
            .split_once(char::is_whitespace)
            .unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("key") {
            return Err(ApiAuthError::InvalidScheme(scheme.to_string()));
        }
        let value = value.trim();
        if value.is_empty() {
            return Err(ApiAuthError::UnknownKey);
        }
        self.keys.get(value).ok_or(ApiAuthError::UnknownKey)
    }
}

/// Parse the client-key configuration string
///
/// Empty entries (e.g. a trailing `;`) are skipped.
///
/// # Examples
///
/// ```
/// use mmc_common::api::auth::parse_client_keys;
///
/// let keys = parse_client_keys(" a:prod = k1 ; b:dev=k2 ;").unwrap();
/// assert_eq!(keys.len(), 2);
/// assert_eq!(keys.authenticate(Some("key k2")).unwrap().environment, "dev");
/// ```
pub fn parse_client_keys(raw: &str) -> Result<ClientKeys, ApiAuthError> {
    let mut keys = HashMap::new();

    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (client, key) = entry
            .split_once('=')
            .ok_or_else(|| ApiAuthError::InvalidConfig(format!("missing '=' in {:?}", entry)))?;
        let (system, environment) = client
            .split_once(':')
            .ok_or_else(|| ApiAuthError::InvalidConfig(format!("missing ':' in {:?}", entry)))?;

        let (system, environment, key) = (system.trim(), environment.trim(), key.trim());
        if system.is_empty() || environment.is_empty() || key.is_empty() {
            return Err(ApiAuthError::InvalidConfig(format!("empty token in {:?}", entry)));
        }

        keys.insert(
            key.to_string(),
            ClientIdentity {
                system: system.to_string(),
                environment: environment.to_string(),
            },
        );
    }

    Ok(ClientKeys { keys })
}

// ========================================
// Tests
// ========================================
