//! Binding REST/JSON bloquant de l'API Restreamer (v3)

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::debug;
use ureq::Agent;
use zeroize::Zeroizing;

use crate::error::{RestreamerError, Result};
use crate::models::{
    AuthTokens, ProcessCommand, ProcessConfig, ProcessInfo, ProcessOutput, SecretString,
    zeroize_json,
};
use crate::settings::ConnectionSettings;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Deserialize)]
struct CreatedProcess {
    id: String,
}

#[derive(Deserialize)]
struct OutputRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutputList {
    Wrapped { outputs: Vec<OutputRef> },
    Bare(Vec<OutputRef>),
}

pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Caractères laissés tels quels dans un segment de chemin (RFC 3986, non réservés)
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, PATH_SEGMENT).to_string()
}

/// Client HTTP bloquant vers un serveur Restreamer
pub struct HttpTransport {
    agent: Agent,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            agent: build_agent(timeout),
            base_url,
        }
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self::new(settings.base_url(), settings.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exécute la requête et retourne le corps de la réponse (effacé à la libération)
    fn execute(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&str>,
    ) -> Result<SecretString> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = method.as_str(), url = %url, "Restreamer request");

        let authorization = bearer.map(|token| Zeroizing::new(format!("Bearer {}", token)));

        let result = match method {
            Method::Get => {
                let mut request = self.agent.get(&url);
                if let Some(auth) = &authorization {
                    request = request.header("Authorization", auth.as_str());
                }
                request.call()
            }
            Method::Delete => {
                let mut request = self.agent.delete(&url);
                if let Some(auth) = &authorization {
                    request = request.header("Authorization", auth.as_str());
                }
                request.call()
            }
            Method::Post => {
                let mut request = self
                    .agent
                    .post(&url)
                    .header("Content-Type", "application/json");
                if let Some(auth) = &authorization {
                    request = request.header("Authorization", auth.as_str());
                }
                request.send(body.unwrap_or("{}").as_bytes())
            }
        };

        let mut response = result.map_err(|e| {
            RestreamerError::Transport(format!("{} {} failed: {}", method.as_str(), path, e))
        })?;

        let status = response.status().as_u16();
        let text = Zeroizing::new(response.body_mut().read_to_string().map_err(|e| {
            RestreamerError::Transport(format!("Failed to read response body: {}", e))
        })?);

        debug!(method = method.as_str(), path, status, "Restreamer response");

        if !(200..300).contains(&status) {
            return Err(RestreamerError::from_status_code(
                status,
                error_message(&text, status),
            ));
        }

        Ok(text)
    }

    fn parse_tokens(text: &str) -> Result<AuthTokens> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;

        let access_token = match value.get_mut("access_token").map(serde_json::Value::take) {
            Some(serde_json::Value::String(token)) if !token.is_empty() => Zeroizing::new(token),
            _ => {
                zeroize_json(value);
                return Err(RestreamerError::MalformedResponse(
                    "missing access_token".to_string(),
                ));
            }
        };

        let refresh_token = match value.get_mut("refresh_token").map(serde_json::Value::take) {
            Some(serde_json::Value::String(token)) if !token.is_empty() => {
                Some(Zeroizing::new(token))
            }
            _ => None,
        };

        let expires_at = value.get("expires_at").and_then(serde_json::Value::as_u64);
        zeroize_json(value);

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn process_path(process_id: &str) -> String {
        format!("/api/v3/process/{}", percent_encode(process_id))
    }
}

/// Extrait un message lisible d'un corps d'erreur
fn error_message(text: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        for key in ["message", "error", "details"] {
            if let Some(msg) = value.get(key).and_then(serde_json::Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("HTTP status {}", status)
    } else {
        trimmed.chars().take(200).collect()
    }
}

impl Transport for HttpTransport {
    fn login(&self, username: &str, password: &str) -> Result<AuthTokens> {
        let body = serde_json::json!({ "username": username, "password": password });
        let text = Zeroizing::new(body.to_string());
        zeroize_json(body);

        let response = self.execute(Method::Post, "/api/login", None, Some(text.as_str()))?;
        Self::parse_tokens(&response)
    }

    fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let response = self.execute(Method::Post, "/api/v3/refresh", Some(refresh_token), None)?;
        Self::parse_tokens(&response)
    }

    fn list_processes(&self, token: &str) -> Result<Vec<ProcessInfo>> {
        let response = self.execute(Method::Get, "/api/v3/process", Some(token), None)?;
        Ok(serde_json::from_str(&response)?)
    }

    fn get_process(&self, token: &str, process_id: &str) -> Result<ProcessInfo> {
        let response = self.execute(
            Method::Get,
            &Self::process_path(process_id),
            Some(token),
            None,
        )?;
        Ok(serde_json::from_str(&response)?)
    }

    fn get_process_outputs(&self, token: &str, process_id: &str) -> Result<Vec<String>> {
        let path = format!("{}/outputs", Self::process_path(process_id));
        let response = self.execute(Method::Get, &path, Some(token), None)?;
        let outputs = match serde_json::from_str::<OutputList>(&response)? {
            OutputList::Wrapped { outputs } | OutputList::Bare(outputs) => outputs,
        };
        Ok(outputs.into_iter().map(|o| o.id).collect())
    }

    fn create_process(&self, token: &str, config: &ProcessConfig) -> Result<String> {
        let body = config.to_json();
        let response = self.execute(
            Method::Post,
            "/api/v3/process",
            Some(token),
            Some(body.as_str()),
        )?;
        let created: CreatedProcess = serde_json::from_str(&response)?;
        if created.id.is_empty() {
            return Err(RestreamerError::MalformedResponse(
                "created process has no id".to_string(),
            ));
        }
        Ok(created.id)
    }

    fn process_command(
        &self,
        token: &str,
        process_id: &str,
        command: ProcessCommand,
    ) -> Result<()> {
        let path = format!("{}/command", Self::process_path(process_id));
        let body = serde_json::json!({ "command": command.as_str() }).to_string();
        self.execute(Method::Post, &path, Some(token), Some(body.as_str()))?;
        Ok(())
    }

    fn delete_process(&self, token: &str, process_id: &str) -> Result<()> {
        self.execute(
            Method::Delete,
            &Self::process_path(process_id),
            Some(token),
            None,
        )?;
        Ok(())
    }

    fn add_output(&self, token: &str, process_id: &str, output: &ProcessOutput) -> Result<()> {
        let path = format!("{}/outputs", Self::process_path(process_id));
        let body = output.to_json();
        self.execute(Method::Post, &path, Some(token), Some(body.as_str()))?;
        Ok(())
    }

    fn remove_output(&self, token: &str, process_id: &str, output_id: &str) -> Result<()> {
        let path = format!(
            "{}/outputs/{}",
            Self::process_path(process_id),
            percent_encode(output_id)
        );
        self.execute(Method::Delete, &path, Some(token), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("YouTube_0"), "YouTube_0");
        assert_eq!(percent_encode("X (Twitter)_2"), "X%20%28Twitter%29_2");
        assert_eq!(percent_encode("chaîne~1"), "cha%C3%AEne~1");
    }

    #[test]
    fn test_parse_tokens() {
        let tokens = HttpTransport::parse_tokens(
            r#"{"access_token":"a","refresh_token":"r","expires_at":1700000000}"#,
        )
        .unwrap();
        assert_eq!(tokens.access_token.as_str(), "a");
        assert_eq!(tokens.refresh_token.as_deref().map(String::as_str), Some("r"));
        assert_eq!(tokens.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn test_parse_tokens_requires_access_token() {
        let err = HttpTransport::parse_tokens(r#"{"refresh_token":"r"}"#).unwrap_err();
        assert!(matches!(err, RestreamerError::MalformedResponse(_)));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"message":"bad things"}"#, 500), "bad things");
        assert_eq!(error_message("", 502), "HTTP status 502");
        assert_eq!(error_message("plain", 400), "plain");
    }
}
