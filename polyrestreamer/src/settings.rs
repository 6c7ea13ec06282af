//! Paramètres de connexion au service Restreamer

use std::fmt;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::models::SecretString;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Où et comment joindre le service
#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_https: bool,
    /// Timeout global d'une requête HTTP
    pub timeout: Duration,
    /// Durée de vie appliquée quand le serveur ne donne pas d'expiration
    pub token_lifetime: Duration,
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: Zeroizing::new(String::new()),
            use_https: false,
            timeout: DEFAULT_TIMEOUT,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = Zeroizing::new(password.into());
        self
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    /// Port effectif: 0 retombe sur le port par défaut
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 { DEFAULT_PORT } else { self.port }
    }

    /// `http(s)://host:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.effective_port())
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_https", &self.use_https)
            .field("timeout", &self.timeout)
            .field("token_lifetime", &self.token_lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let settings = ConnectionSettings::new("restreamer.lan", 0);
        assert_eq!(settings.base_url(), "http://restreamer.lan:8080");

        let settings = ConnectionSettings::new("restreamer.lan", 8181).with_https(true);
        assert_eq!(settings.base_url(), "https://restreamer.lan:8181");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = ConnectionSettings::new("h", 1).with_credentials("admin", "hunter2");
        assert!(settings.has_credentials());
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
