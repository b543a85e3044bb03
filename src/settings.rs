//! Connection settings.

use std::time::Duration;

use serde::Deserialize;

/// How to reach and authenticate against a mail server.
///
/// Supplied once when a retriever is built and never changed afterwards. Every field has a
/// default, so a settings file only needs to name what differs:
///
/// ```
/// # use mail_retriever::Settings;
/// let settings: Settings = serde_json::from_str(r#"{
///     "address": "imap.example.com",
///     "port": 993,
///     "enable_ssl": true,
///     "user_name": "alice",
///     "password": "secret"
/// }"#).unwrap();
/// assert_eq!(settings.max_retries, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host name or IP address of the server.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub user_name: Option<String>,
    /// Password, or the access token for `XOAUTH2`.
    pub password: Option<String>,
    /// SASL mechanism (`PLAIN`, `XOAUTH2`). `None` or `LOGIN` uses the plain `LOGIN` command.
    pub authentication: Option<String>,
    /// Wrap the connection in TLS from the start.
    pub enable_ssl: bool,
    /// Skip certificate and host name verification.
    pub accept_invalid_certs: bool,
    /// How many times a failed unit of work is retried before giving up.
    pub max_retries: u32,
    /// Base backoff between retries; attempt `n` waits `n` times this long.
    pub retry_delay_ms: u64,
}

impl Settings {
    /// Settings for `address:port` with every other field at its default.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Settings {
            address: address.into(),
            port,
            ..Settings::default()
        }
    }

    /// The backoff before retry number `attempt` (counting from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            address: "localhost".to_string(),
            port: 143,
            user_name: None,
            password: None,
            authentication: None,
            enable_ssl: false,
            accept_invalid_certs: false,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"address": "mail.example.com"}"#).unwrap();
        assert_eq!(settings.address, "mail.example.com");
        assert_eq!(settings.port, 143);
        assert!(!settings.enable_ssl);
        assert_eq!(settings.authentication, None);
    }

    #[test]
    fn backoff_grows_linearly() {
        let settings = Settings {
            retry_delay_ms: 250,
            ..Settings::default()
        };
        assert_eq!(settings.backoff(1), Duration::from_millis(250));
        assert_eq!(settings.backoff(3), Duration::from_millis(750));
    }
}
