//! Service Restreamer simulé en mémoire
//!
//! Implémente [`Transport`] sans réseau. Sert aux tests et aux démonstrations:
//! on peut y injecter des pannes, casser des sorties ou faire expirer les
//! tokens pour observer la réaction du moteur.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use zeroize::Zeroizing;

use crate::error::{RestreamerError, Result};
use crate::models::{
    AuthTokens, ProcessCommand, ProcessConfig, ProcessInfo, ProcessOutput, SecretString,
};
use crate::transport::Transport;

/// Opérations du [`Transport`], pour l'injection de pannes et le comptage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Refresh,
    ListProcesses,
    GetProcess,
    GetProcessOutputs,
    CreateProcess,
    ProcessCommand,
    DeleteProcess,
    AddOutput,
    RemoveOutput,
}

struct MemoryProcess {
    info: ProcessInfo,
    input_url: String,
    outputs: Vec<ProcessOutput>,
}

#[derive(Default)]
struct MemoryState {
    username: String,
    password: SecretString,
    access_tokens: Vec<SecretString>,
    refresh_tokens: Vec<SecretString>,
    token_counter: u64,
    token_expires_at: Option<u64>,
    processes: Vec<MemoryProcess>,
    process_counter: u64,
    failures: HashMap<Operation, u32>,
    calls: HashMap<Operation, u32>,
}

impl MemoryState {
    fn enter(&mut self, op: Operation) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if let Some(remaining) = self.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RestreamerError::Transport(format!(
                    "simulated failure of {:?}",
                    op
                )));
            }
        }
        Ok(())
    }

    fn authorize(&self, token: &str) -> Result<()> {
        if self.access_tokens.iter().any(|t| t.as_str() == token) {
            Ok(())
        } else {
            Err(RestreamerError::Unauthorized("invalid access token".to_string()))
        }
    }

    fn issue_tokens(&mut self) -> AuthTokens {
        self.token_counter += 1;
        let access = format!("access-{}", self.token_counter);
        let refresh = format!("refresh-{}", self.token_counter);
        self.access_tokens.push(Zeroizing::new(access.clone()));
        self.refresh_tokens.push(Zeroizing::new(refresh.clone()));
        AuthTokens {
            access_token: Zeroizing::new(access),
            refresh_token: Some(Zeroizing::new(refresh)),
            expires_at: self.token_expires_at,
        }
    }

    fn process_mut(&mut self, process_id: &str) -> Result<&mut MemoryProcess> {
        self.processes
            .iter_mut()
            .find(|p| p.info.id == process_id)
            .ok_or_else(|| RestreamerError::NotFound(format!("process {}", process_id)))
    }
}

/// Restreamer en mémoire. Les clones partagent le même état.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Service acceptant un seul compte
    pub fn new(username: &str, password: &str) -> Self {
        let transport = Self::default();
        {
            let mut state = transport.lock();
            state.username = username.to_string();
            state.password = Zeroizing::new(password.to_string());
        }
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Les `count` prochains appels de `op` échoueront
    pub fn fail_next(&self, op: Operation, count: u32) {
        self.lock().failures.insert(op, count);
    }

    /// Nombre d'appels de `op` reçus (échecs compris)
    pub fn calls(&self, op: Operation) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Expiration annoncée pour les prochains tokens
    pub fn set_token_expires_at(&self, expires_at: Option<u64>) {
        self.lock().token_expires_at = expires_at;
    }

    /// Révoque tous les access tokens délivrés
    pub fn revoke_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }

    /// Révoque tous les refresh tokens délivrés
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.lock().processes.iter().map(|p| p.info.clone()).collect()
    }

    pub fn process_by_reference(&self, reference: &str) -> Option<ProcessInfo> {
        self.lock()
            .processes
            .iter()
            .find(|p| p.info.reference == reference)
            .map(|p| p.info.clone())
    }

    pub fn input_url(&self, process_id: &str) -> Option<String> {
        self.lock()
            .processes
            .iter()
            .find(|p| p.info.id == process_id)
            .map(|p| p.input_url.clone())
    }

    pub fn output_ids(&self, process_id: &str) -> Vec<String> {
        self.lock()
            .processes
            .iter()
            .find(|p| p.info.id == process_id)
            .map(|p| p.outputs.iter().map(|o| o.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Copie de la sortie `output_id` telle que poussée au service
    pub fn output(&self, process_id: &str, output_id: &str) -> Option<ProcessOutput> {
        self.lock()
            .processes
            .iter()
            .find(|p| p.info.id == process_id)
            .and_then(|p| p.outputs.iter().find(|o| o.id == output_id).cloned())
    }

    /// Simule la perte d'une sortie côté serveur
    pub fn drop_output(&self, process_id: &str, output_id: &str) -> bool {
        let mut state = self.lock();
        match state.process_mut(process_id) {
            Ok(process) => {
                let before = process.outputs.len();
                process.outputs.retain(|o| o.id != output_id);
                before != process.outputs.len()
            }
            Err(_) => false,
        }
    }

    /// Force l'état rapporté d'un process ("running", "failed", ...)
    pub fn set_process_state(&self, process_id: &str, state: &str) -> bool {
        match self.lock().process_mut(process_id) {
            Ok(process) => {
                process.info.state = state.to_string();
                true
            }
            Err(_) => false,
        }
    }

    /// Supprime un process sans passer par l'API (crash côté serveur)
    pub fn forget_process(&self, process_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.processes.len();
        state.processes.retain(|p| p.info.id != process_id);
        before != state.processes.len()
    }
}

impl Transport for MemoryTransport {
    fn login(&self, username: &str, password: &str) -> Result<AuthTokens> {
        let mut state = self.lock();
        state.enter(Operation::Login)?;
        if username != state.username || password != state.password.as_str() {
            return Err(RestreamerError::Unauthorized(
                "invalid username or password".to_string(),
            ));
        }
        Ok(state.issue_tokens())
    }

    fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let mut state = self.lock();
        state.enter(Operation::Refresh)?;
        if !state.refresh_tokens.iter().any(|t| t.as_str() == refresh_token) {
            return Err(RestreamerError::Unauthorized(
                "invalid refresh token".to_string(),
            ));
        }
        let mut tokens = state.issue_tokens();
        tokens.refresh_token = None;
        Ok(tokens)
    }

    fn list_processes(&self, token: &str) -> Result<Vec<ProcessInfo>> {
        let mut state = self.lock();
        state.enter(Operation::ListProcesses)?;
        state.authorize(token)?;
        Ok(state.processes.iter().map(|p| p.info.clone()).collect())
    }

    fn get_process(&self, token: &str, process_id: &str) -> Result<ProcessInfo> {
        let mut state = self.lock();
        state.enter(Operation::GetProcess)?;
        state.authorize(token)?;
        Ok(state.process_mut(process_id)?.info.clone())
    }

    fn get_process_outputs(&self, token: &str, process_id: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.enter(Operation::GetProcessOutputs)?;
        state.authorize(token)?;
        let process = state.process_mut(process_id)?;
        Ok(process.outputs.iter().map(|o| o.id.clone()).collect())
    }

    fn create_process(&self, token: &str, config: &ProcessConfig) -> Result<String> {
        let mut state = self.lock();
        state.enter(Operation::CreateProcess)?;
        state.authorize(token)?;
        if state
            .processes
            .iter()
            .any(|p| p.info.reference == config.reference)
        {
            return Err(RestreamerError::from_status_code(
                409,
                format!("process with reference {} already exists", config.reference),
            ));
        }
        state.process_counter += 1;
        let id = format!("restreamer-{}", state.process_counter);
        state.processes.push(MemoryProcess {
            info: ProcessInfo {
                id: id.clone(),
                reference: config.reference.clone(),
                state: "finished".to_string(),
                ..Default::default()
            },
            input_url: config.input_url.clone(),
            outputs: config.outputs.clone(),
        });
        Ok(id)
    }

    fn process_command(
        &self,
        token: &str,
        process_id: &str,
        command: ProcessCommand,
    ) -> Result<()> {
        let mut state = self.lock();
        state.enter(Operation::ProcessCommand)?;
        state.authorize(token)?;
        let process = state.process_mut(process_id)?;
        process.info.state = match command {
            ProcessCommand::Start | ProcessCommand::Restart => "running",
            ProcessCommand::Stop => "finished",
        }
        .to_string();
        Ok(())
    }

    fn delete_process(&self, token: &str, process_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter(Operation::DeleteProcess)?;
        state.authorize(token)?;
        state.process_mut(process_id)?;
        state.processes.retain(|p| p.info.id != process_id);
        Ok(())
    }

    fn add_output(&self, token: &str, process_id: &str, output: &ProcessOutput) -> Result<()> {
        let mut state = self.lock();
        state.enter(Operation::AddOutput)?;
        state.authorize(token)?;
        let process = state.process_mut(process_id)?;
        if process.outputs.iter().any(|o| o.id == output.id) {
            return Err(RestreamerError::from_status_code(
                409,
                format!("output {} already exists", output.id),
            ));
        }
        process.outputs.push(output.clone());
        Ok(())
    }

    fn remove_output(&self, token: &str, process_id: &str, output_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter(Operation::RemoveOutput)?;
        state.authorize(token)?;
        let process = state.process_mut(process_id)?;
        let before = process.outputs.len();
        process.outputs.retain(|o| o.id != output_id);
        if before == process.outputs.len() {
            return Err(RestreamerError::NotFound(format!("output {}", output_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(transport: &MemoryTransport) -> String {
        transport
            .login("admin", "secret")
            .unwrap()
            .access_token
            .to_string()
    }

    #[test]
    fn test_login_checks_credentials() {
        let transport = MemoryTransport::new("admin", "secret");
        assert!(transport.login("admin", "wrong").unwrap_err().is_auth_error());
        assert!(transport.login("admin", "secret").is_ok());
        assert_eq!(transport.calls(Operation::Login), 2);
    }

    #[test]
    fn test_process_lifecycle() {
        let transport = MemoryTransport::new("admin", "secret");
        let token = login(&transport);
        let config = ProcessConfig {
            reference: "channel_a".to_string(),
            input_url: "rtmp://localhost/live/obs_input".to_string(),
            outputs: vec![],
        };
        let id = transport.create_process(&token, &config).unwrap();
        assert!(!transport.get_process(&token, &id).unwrap().is_running());

        transport
            .process_command(&token, &id, ProcessCommand::Start)
            .unwrap();
        assert!(transport.get_process(&token, &id).unwrap().is_running());

        transport.delete_process(&token, &id).unwrap();
        assert!(transport.get_process(&token, &id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let transport = MemoryTransport::new("admin", "secret");
        transport.fail_next(Operation::Login, 1);
        assert!(matches!(
            transport.login("admin", "secret"),
            Err(RestreamerError::Transport(_))
        ));
        assert!(transport.login("admin", "secret").is_ok());
    }

    #[test]
    fn test_revoked_token_is_unauthorized() {
        let transport = MemoryTransport::new("admin", "secret");
        let token = login(&transport);
        transport.revoke_access_tokens();
        assert!(transport.list_processes(&token).unwrap_err().is_auth_error());
    }
}
