//! Contrat du collaborateur distant
//!
//! Le [`Session`](crate::Session) ne parle jamais directement au réseau: il
//! délègue chaque appel à une implémentation de [`Transport`]. Deux sont
//! fournies: [`HttpTransport`](crate::HttpTransport) (REST/JSON bloquant) et
//! [`MemoryTransport`](crate::MemoryTransport) (service simulé en mémoire).

use crate::error::Result;
use crate::models::{AuthTokens, ProcessCommand, ProcessConfig, ProcessInfo, ProcessOutput};

/// Opérations synchrones exposées par un service de type Restreamer.
///
/// Chaque appel authentifié reçoit le bearer token explicitement.
pub trait Transport: Send {
    fn login(&self, username: &str, password: &str) -> Result<AuthTokens>;

    fn refresh(&self, refresh_token: &str) -> Result<AuthTokens>;

    fn list_processes(&self, token: &str) -> Result<Vec<ProcessInfo>>;

    fn get_process(&self, token: &str, process_id: &str) -> Result<ProcessInfo>;

    /// Identifiants des sorties actuellement attachées au process
    fn get_process_outputs(&self, token: &str, process_id: &str) -> Result<Vec<String>>;

    /// Crée le process et retourne son identifiant distant
    fn create_process(&self, token: &str, config: &ProcessConfig) -> Result<String>;

    fn process_command(&self, token: &str, process_id: &str, command: ProcessCommand)
    -> Result<()>;

    fn delete_process(&self, token: &str, process_id: &str) -> Result<()>;

    fn add_output(&self, token: &str, process_id: &str, output: &ProcessOutput) -> Result<()>;

    fn remove_output(&self, token: &str, process_id: &str, output_id: &str) -> Result<()>;
}
