//! Extension pour lire la connexion Restreamer depuis polyconfig
//!
//! Ce module fournit le trait `RestreamerConfigExt` qui ajoute à
//! `polyconfig::Config` la construction des [`ConnectionSettings`].

use std::time::Duration;

use anyhow::{Result, anyhow};
use polyconfig::Config;

use crate::settings::ConnectionSettings;

/// Trait d'extension pour la configuration Restreamer
///
/// # Exemple
///
/// ```rust,ignore
/// use polyconfig::get_config;
/// use polyrestreamer::{RestreamerConfigExt, Session};
///
/// let settings = get_config().get_connection_settings()?;
/// let mut session = Session::connect(settings);
/// session.login()?;
/// ```
pub trait RestreamerConfigExt {
    /// Construit les paramètres de connexion (host, port, credentials, timeouts)
    ///
    /// # Errors
    ///
    /// Retourne une erreur si le host configuré est vide
    fn get_connection_settings(&self) -> Result<ConnectionSettings>;
}

impl RestreamerConfigExt for Config {
    fn get_connection_settings(&self) -> Result<ConnectionSettings> {
        let host = self.get_restreamer_host();
        if host.trim().is_empty() {
            return Err(anyhow!("restreamer.host is not configured"));
        }

        let mut settings = ConnectionSettings::new(host.trim(), self.get_restreamer_port())
            .with_https(self.get_restreamer_use_https());
        settings.username = self.get_restreamer_username();
        settings.password = self.get_restreamer_password();
        settings.timeout = Duration::from_secs(self.get_restreamer_timeout_secs().max(1));
        settings.token_lifetime = Duration::from_secs(self.get_token_lifetime_secs());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = Config::from_yaml(concat!(
            "restreamer:\n",
            "  host: 10.0.0.5\n",
            "  port: 8181\n",
            "  username: admin\n",
            "  password: pw\n",
            "  use_https: true\n",
            "  timeout_secs: 3\n",
        ))
        .unwrap();
        let settings = config.get_connection_settings().unwrap();
        assert_eq!(settings.base_url(), "https://10.0.0.5:8181");
        assert_eq!(settings.username, "admin");
        assert_eq!(settings.password.as_str(), "pw");
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.token_lifetime, Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let config = Config::from_yaml("restreamer:\n  host: \"\"\n").unwrap();
        assert!(config.get_connection_settings().is_err());
    }
}
