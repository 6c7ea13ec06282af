//! Modèles de données échangés avec le service Restreamer

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Chaîne dont le contenu est effacé (mis à zéro) à la libération
pub type SecretString = Zeroizing<String>;

/// Tokens délivrés par `/api/login` ou `/api/v3/refresh`
pub struct AuthTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Expiration en secondes depuis l'epoch, si le serveur la fournit
    pub expires_at: Option<u64>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process tel que listé par `/api/v3/process`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory: u64,
}

impl ProcessInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Commande de contrôle d'un process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCommand {
    Start,
    Stop,
    Restart,
}

impl ProcessCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessCommand::Start => "start",
            ProcessCommand::Stop => "stop",
            ProcessCommand::Restart => "restart",
        }
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sortie poussée par un process vers une plateforme
///
/// L'URL contient la clé de stream et est donc traitée comme un secret.
#[derive(Clone)]
pub struct ProcessOutput {
    pub id: String,
    pub url: SecretString,
    pub video_filter: Option<String>,
    /// Options d'encodage passées à l'encodeur (`-b:v`, `-s`, ...)
    pub options: Vec<String>,
}

impl ProcessOutput {
    /// Corps JSON attendu par l'API, effacé à la libération
    pub fn to_json(&self) -> SecretString {
        let mut body = serde_json::json!({
            "id": self.id,
            "url": self.url.as_str(),
        });
        if let Some(filter) = &self.video_filter {
            body["video_filter"] = serde_json::Value::String(filter.clone());
        }
        if !self.options.is_empty() {
            body["options"] = serde_json::json!(self.options);
        }
        let text = Zeroizing::new(body.to_string());
        zeroize_json(body);
        text
    }
}

impl fmt::Debug for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOutput")
            .field("id", &self.id)
            .field("url", &"<redacted>")
            .field("video_filter", &self.video_filter)
            .field("options", &self.options)
            .finish()
    }
}

/// Description d'un process à créer: une entrée, plusieurs sorties
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub reference: String,
    pub input_url: String,
    pub outputs: Vec<ProcessOutput>,
}

impl ProcessConfig {
    pub fn to_json(&self) -> SecretString {
        let outputs: Vec<serde_json::Value> = self
            .outputs
            .iter()
            .map(|o| {
                let mut value = serde_json::json!({
                    "id": o.id,
                    "address": o.url.as_str(),
                });
                let mut options: Vec<&str> = Vec::new();
                if let Some(filter) = &o.video_filter {
                    options.extend(["-vf", filter.as_str()]);
                }
                options.extend(o.options.iter().map(String::as_str));
                if !options.is_empty() {
                    value["options"] = serde_json::json!(options);
                }
                value
            })
            .collect();

        let body = serde_json::json!({
            "reference": self.reference,
            "input": [{ "id": "input_0", "address": self.input_url }],
            "output": outputs,
            "autostart": false,
        });
        let text = Zeroizing::new(body.to_string());
        zeroize_json(body);
        text
    }
}

/// Efface les chaînes contenues dans une valeur JSON avant sa libération
pub(crate) fn zeroize_json(value: serde_json::Value) {
    use zeroize::Zeroize;
    match value {
        serde_json::Value::String(mut s) => s.zeroize(),
        serde_json::Value::Array(items) => items.into_iter().for_each(zeroize_json),
        serde_json::Value::Object(map) => map.into_iter().for_each(|(_, v)| zeroize_json(v)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_output_json() {
        let output = ProcessOutput {
            id: "YouTube_0".to_string(),
            url: Zeroizing::new("rtmp://a.rtmp.youtube.com/live2/key".to_string()),
            video_filter: Some("scale=1080:1080,setsar=1".to_string()),
            options: vec!["-b:v".to_string(), "4500k".to_string()],
        };
        let json: serde_json::Value = serde_json::from_str(&output.to_json()).unwrap();
        assert_eq!(json["id"], "YouTube_0");
        assert_eq!(json["url"], "rtmp://a.rtmp.youtube.com/live2/key");
        assert_eq!(json["video_filter"], "scale=1080:1080,setsar=1");
        assert_eq!(json["options"], serde_json::json!(["-b:v", "4500k"]));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let output = ProcessOutput {
            id: "Twitch_1".to_string(),
            url: Zeroizing::new("rtmp://live.twitch.tv/app/secret".to_string()),
            video_filter: None,
            options: Vec::new(),
        };
        assert!(!format!("{:?}", output).contains("secret"));

        let tokens = AuthTokens {
            access_token: Zeroizing::new("abc".to_string()),
            refresh_token: Some(Zeroizing::new("def".to_string())),
            expires_at: Some(10),
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("abc"));
        assert!(!debug.contains("def"));
    }

    #[test]
    fn test_process_config_json() {
        let config = ProcessConfig {
            reference: "channel_1".to_string(),
            input_url: "rtmp://localhost/live/obs_input".to_string(),
            outputs: vec![ProcessOutput {
                id: "Twitch_0".to_string(),
                url: Zeroizing::new("rtmp://live.twitch.tv/app/k".to_string()),
                video_filter: Some("scale=1080:1920".to_string()),
                options: vec!["-r".to_string(), "30".to_string()],
            }],
        };
        let json: serde_json::Value = serde_json::from_str(&config.to_json()).unwrap();
        assert_eq!(json["reference"], "channel_1");
        assert_eq!(json["input"][0]["address"], "rtmp://localhost/live/obs_input");
        assert_eq!(json["output"][0]["id"], "Twitch_0");
        assert_eq!(
            json["output"][0]["options"],
            serde_json::json!(["-vf", "scale=1080:1920", "-r", "30"])
        );
        assert_eq!(json["autostart"], false);
    }

    #[test]
    fn test_process_running() {
        let process = ProcessInfo {
            id: "p".to_string(),
            state: "running".to_string(),
            ..Default::default()
        };
        assert!(process.is_running());
        assert!(!ProcessInfo::default().is_running());
    }
}
