//! Gestion des erreurs pour le client Restreamer

use std::time::Duration;
use thiserror::Error;

/// Type Result personnalisé pour polyrestreamer
pub type Result<T> = std::result::Result<T, RestreamerError>;

/// Erreurs possibles lors d'un échange avec le service Restreamer
#[derive(Error, Debug)]
pub enum RestreamerError {
    /// Erreur d'authentification (credentials ou token invalides)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Ressource non trouvée (process, output)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Erreur de transport (connexion, timeout, lecture du corps)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Réponse lisible mais incomplète
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Erreur de l'API Restreamer
    #[error("Restreamer API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// Quota dépassé (rate limiting côté serveur)
    #[error("Rate limit exceeded, please try again later")]
    RateLimitExceeded,

    /// Login refusé localement pendant la fenêtre de backoff
    #[error("Login throttled, retry in {} seconds", .retry_in.as_secs().max(1))]
    Throttled { retry_in: Duration },

    /// Nom d'utilisateur ou mot de passe absent
    #[error("Missing credentials")]
    MissingCredentials,

    /// Pas de refresh token disponible
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Erreur de configuration (host, port, ...)
    #[error("Restreamer configuration error: {0}")]
    Configuration(String),
}

impl RestreamerError {
    /// Crée une erreur API depuis un code de statut HTTP et un message
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimitExceeded,
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }

    /// Code HTTP associé à l'erreur quand il est connu
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RestreamerError::Unauthorized(_) => Some(401),
            RestreamerError::NotFound(_) => Some(404),
            RestreamerError::RateLimitExceeded => Some(429),
            RestreamerError::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Vérifie si l'erreur est une erreur de credentials (401/403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, RestreamerError::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RestreamerError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_code() {
        assert!(RestreamerError::from_status_code(401, "bad").is_auth_error());
        assert!(RestreamerError::from_status_code(403, "bad").is_auth_error());
        assert!(RestreamerError::from_status_code(404, "gone").is_not_found());
        assert!(matches!(
            RestreamerError::from_status_code(429, ""),
            RestreamerError::RateLimitExceeded
        ));
        match RestreamerError::from_status_code(500, "boom") {
            RestreamerError::ApiError { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_throttled_message() {
        let err = RestreamerError::Throttled {
            retry_in: Duration::from_millis(3500),
        };
        assert_eq!(err.to_string(), "Login throttled, retry in 3 seconds");
        let err = RestreamerError::Throttled {
            retry_in: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "Login throttled, retry in 1 seconds");
    }
}
