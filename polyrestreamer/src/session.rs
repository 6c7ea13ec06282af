//! Session authentifiée auprès du service Restreamer
//!
//! Le [`Session`] est le seul point de passage vers le réseau. Il détient les
//! credentials, les tokens et l'état de backoff du login. Il n'est jamais
//! cloné: son créateur le possède et le prête par référence.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};
use crate::error::{RestreamerError, Result};
use crate::http::HttpTransport;
use crate::models::{
    AuthTokens, ProcessCommand, ProcessConfig, ProcessInfo, ProcessOutput, SecretString,
};
use crate::settings::ConnectionSettings;
use crate::transport::Transport;

/// Intervalle de backoff initial après un premier échec de login
pub const BASE_LOGIN_BACKOFF: Duration = Duration::from_secs(1);

pub struct Session {
    settings: ConnectionSettings,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    token_expiry: Option<SystemTime>,
    login_retry_count: u32,
    login_backoff_interval: Duration,
    last_login_attempt: Option<SystemTime>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(
        settings: ConnectionSettings,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            transport,
            clock,
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            login_retry_count: 0,
            login_backoff_interval: BASE_LOGIN_BACKOFF,
            last_login_attempt: None,
            last_error: None,
        }
    }

    /// Session HTTP réelle sur l'horloge système
    pub fn connect(settings: ConnectionSettings) -> Self {
        let transport = HttpTransport::from_settings(&settings);
        info!(url = %transport.base_url(), "Creating Restreamer session");
        Self::new(settings, Box::new(transport), Arc::new(SystemClock))
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    pub fn port(&self) -> u16 {
        self.settings.effective_port()
    }

    pub fn use_https(&self) -> bool {
        self.settings.use_https
    }

    pub fn base_url(&self) -> String {
        self.settings.base_url()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    pub fn login_retry_count(&self) -> u32 {
        self.login_retry_count
    }

    pub fn login_backoff_interval(&self) -> Duration {
        self.login_backoff_interval
    }

    pub fn last_login_attempt(&self) -> Option<SystemTime> {
        self.last_login_attempt
    }

    pub fn token_expiry(&self) -> Option<SystemTime> {
        self.token_expiry
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && !self.access_token_expired()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Vrai si aucun token n'est détenu ou si son expiration est atteinte
    pub fn access_token_expired(&self) -> bool {
        match (&self.access_token, self.token_expiry) {
            (None, _) => true,
            (Some(_), Some(expiry)) => self.clock.now() >= expiry,
            (Some(_), None) => false,
        }
    }

    fn record_error(&mut self, message: String) {
        warn!(host = %self.settings.host, "{}", message);
        self.last_error = Some(message);
    }

    /// Temps restant avant qu'un nouveau login soit autorisé
    fn throttle_remaining(&self) -> Option<Duration> {
        if self.login_retry_count == 0 {
            return None;
        }
        let last = self.last_login_attempt?;
        // Une horloge qui recule compte comme un temps écoulé nul
        let elapsed = self.clock.now().duration_since(last).unwrap_or(Duration::ZERO);
        if elapsed < self.login_backoff_interval {
            Some(self.login_backoff_interval - elapsed)
        } else {
            None
        }
    }

    /// Vrai si un login est actuellement interdit par le backoff
    ///
    /// Quand c'est le cas, `last_error` explique combien de temps attendre.
    pub fn is_login_throttled(&mut self) -> bool {
        match self.throttle_remaining() {
            Some(remaining) => {
                let err = RestreamerError::Throttled { retry_in: remaining };
                self.last_error = Some(err.to_string());
                true
            }
            None => false,
        }
    }

    /// Comptabilise un échec d'authentification
    ///
    /// Le backoff double à chaque échec, sans plafond: c'est à l'appelant de
    /// décider s'il continue à réessayer.
    pub fn handle_login_failure(&mut self, http_status: Option<u16>) {
        self.login_retry_count = self.login_retry_count.saturating_add(1);
        self.login_backoff_interval = self.login_backoff_interval.saturating_mul(2);
        self.last_login_attempt = Some(self.clock.now());
        warn!(
            status = ?http_status,
            retry_count = self.login_retry_count,
            backoff_secs = self.login_backoff_interval.as_secs(),
            "Restreamer login failed"
        );
    }

    fn store_tokens(&mut self, tokens: AuthTokens) {
        let now = self.clock.now();
        self.token_expiry = Some(match tokens.expires_at {
            Some(at) => UNIX_EPOCH + Duration::from_secs(at),
            None => now + self.settings.token_lifetime,
        });
        self.access_token = Some(tokens.access_token);
        if let Some(refresh) = tokens.refresh_token {
            self.refresh_token = Some(refresh);
        }
        self.login_retry_count = 0;
        self.login_backoff_interval = BASE_LOGIN_BACKOFF;
        self.last_error = None;
    }

    /// S'authentifie avec les credentials configurés
    ///
    /// # Errors
    ///
    /// * `RestreamerError::Throttled` - fenêtre de backoff en cours (pas de tentative)
    /// * `RestreamerError::MissingCredentials` - utilisateur ou mot de passe vide
    /// * toute erreur du transport, comptée comme un échec de login
    pub fn login(&mut self) -> Result<()> {
        if let Some(remaining) = self.throttle_remaining() {
            let err = RestreamerError::Throttled { retry_in: remaining };
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        if !self.settings.has_credentials() {
            self.record_error("Missing Restreamer credentials".to_string());
            return Err(RestreamerError::MissingCredentials);
        }

        debug!(
            host = %self.settings.host,
            user = %self.settings.username,
            "Logging in to Restreamer"
        );

        match self
            .transport
            .login(&self.settings.username, &self.settings.password)
        {
            Ok(tokens) => {
                self.store_tokens(tokens);
                info!(host = %self.settings.host, "Logged in to Restreamer");
                Ok(())
            }
            Err(err) => {
                self.handle_login_failure(err.status_code());
                self.record_error(format!("Login failed: {}", err));
                Err(err)
            }
        }
    }

    /// Échange le refresh token contre un nouvel access token
    ///
    /// Un échec est traité exactement comme un échec de login.
    pub fn refresh_token(&mut self) -> Result<()> {
        let refresh = self
            .refresh_token
            .as_ref()
            .map(|t| Zeroizing::new(t.to_string()));
        let Some(refresh) = refresh else {
            self.record_error("No refresh token available".to_string());
            return Err(RestreamerError::NoRefreshToken);
        };

        match self.transport.refresh(&refresh) {
            Ok(tokens) => {
                self.store_tokens(tokens);
                debug!(host = %self.settings.host, "Restreamer token refreshed");
                Ok(())
            }
            Err(err) => {
                self.handle_login_failure(err.status_code());
                if err.is_auth_error() {
                    self.refresh_token = None;
                }
                self.record_error(format!("Token refresh failed: {}", err));
                Err(err)
            }
        }
    }

    /// Oublie les tokens puis refait un login complet
    pub fn force_login(&mut self) -> Result<()> {
        self.logout();
        self.login()
    }

    /// Oublie les tokens (le contenu est effacé)
    pub fn logout(&mut self) {
        debug!(host = %self.settings.host, "Dropping Restreamer tokens");
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = None;
    }

    pub fn test_connection(&mut self) -> Result<()> {
        self.login()
    }

    /// Garantit un access token valide et en retourne une copie effaçable
    pub fn ensure_authenticated(&mut self) -> Result<SecretString> {
        if self.access_token_expired() {
            let refreshed = self.access_token.is_some()
                && self.refresh_token.is_some()
                && self.refresh_token().is_ok();
            if !refreshed {
                self.login()?;
            }
        }

        self.access_token
            .as_ref()
            .map(|t| Zeroizing::new(t.to_string()))
            .ok_or_else(|| RestreamerError::Unauthorized("no access token".to_string()))
    }

    /// Appel distant authentifié; les erreurs sont reportées dans `last_error`
    fn call<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&dyn Transport, &str) -> Result<T>,
    ) -> Result<T> {
        let token = self.ensure_authenticated()?;
        match f(&*self.transport, token.as_str()) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_auth_error() {
                    self.access_token = None;
                    self.token_expiry = None;
                }
                self.record_error(format!("{} failed: {}", operation, err));
                Err(err)
            }
        }
    }

    pub fn list_processes(&mut self) -> Result<Vec<ProcessInfo>> {
        self.call("List processes", |t, token| t.list_processes(token))
    }

    /// Cherche le process distant dont la référence correspond
    pub fn find_process_by_reference(&mut self, reference: &str) -> Result<Option<ProcessInfo>> {
        let processes = self.list_processes()?;
        Ok(processes.into_iter().find(|p| p.reference == reference))
    }

    pub fn get_process(&mut self, process_id: &str) -> Result<ProcessInfo> {
        self.call("Get process", |t, token| t.get_process(token, process_id))
    }

    pub fn get_process_outputs(&mut self, process_id: &str) -> Result<Vec<String>> {
        self.call("Get process outputs", |t, token| {
            t.get_process_outputs(token, process_id)
        })
    }

    pub fn create_process(&mut self, config: &ProcessConfig) -> Result<String> {
        self.call("Create process", |t, token| t.create_process(token, config))
    }

    pub fn start_process(&mut self, process_id: &str) -> Result<()> {
        self.call("Start process", |t, token| {
            t.process_command(token, process_id, ProcessCommand::Start)
        })
    }

    pub fn stop_process(&mut self, process_id: &str) -> Result<()> {
        self.call("Stop process", |t, token| {
            t.process_command(token, process_id, ProcessCommand::Stop)
        })
    }

    pub fn restart_process(&mut self, process_id: &str) -> Result<()> {
        self.call("Restart process", |t, token| {
            t.process_command(token, process_id, ProcessCommand::Restart)
        })
    }

    pub fn delete_process(&mut self, process_id: &str) -> Result<()> {
        self.call("Delete process", |t, token| t.delete_process(token, process_id))
    }

    pub fn add_process_output(&mut self, process_id: &str, output: &ProcessOutput) -> Result<()> {
        self.call("Add output", |t, token| t.add_output(token, process_id, output))
    }

    pub fn remove_process_output(&mut self, process_id: &str, output_id: &str) -> Result<()> {
        self.call("Remove output", |t, token| {
            t.remove_output(token, process_id, output_id)
        })
    }
}
