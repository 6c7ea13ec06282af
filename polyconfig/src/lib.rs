//! # Polyemesis Configuration Module
//!
//! This module provides configuration management for polyemesis, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed getters for the Restreamer connection and the channel policies
//!
//! The configuration is never written back to disk: values changed through
//! the setters only live in memory for the lifetime of the process.
//!
//! String values are wiped from memory when they are replaced and when the
//! [`Config`] is dropped, since `restreamer.password` lives among them.
//!
//! ## Usage
//!
//! ```no_run
//! use polyconfig::get_config;
//!
//! let config = get_config();
//! let host = config.get_restreamer_host();
//! let port = config.get_restreamer_port();
//! println!("Restreamer at {}:{}", host, port);
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};
use zeroize::{Zeroize, Zeroizing};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("polyemesis.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(Config::load_config("").unwrap_or_else(|err| {
        warn!(error = %err, "Failed to load polyemesis configuration, using embedded defaults");
        Config::embedded()
    }));
}

const ENV_CONFIG_DIR: &str = "POLYEMESIS_CONFIG";
const ENV_PREFIX: &str = "POLYEMESIS_CONFIG__";
const CONFIG_DIR_NAME: &str = ".polyemesis";

// Default values for configuration
pub const DEFAULT_RESTREAMER_HOST: &str = "localhost";
pub const DEFAULT_RESTREAMER_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 3;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u64 = 5;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_PREVIEW_DURATION_SECS: u64 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) => s,
                Ok(Value::Number(n)) => n.to_string(),
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: &str) -> Result<()> {
            self.set_value($path, Value::String(value.to_string()))
        }
    };
}

/// Configuration manager for polyemesis
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
///
/// # Examples
///
/// ```no_run
/// use polyconfig::get_config;
///
/// let config = get_config();
/// let threshold = config.get_health_failure_threshold();
/// println!("Failure threshold: {}", threshold);
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.lock().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        zeroize_value(&mut self.lock());
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        CONFIG_DIR_NAME.to_string()
    }

    /// Loads the configuration from the specified directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `POLYEMESIS_CONFIG` environment variable
    /// 3. `.polyemesis` in the current directory
    /// 4. `.polyemesis` in the user's home directory
    ///
    /// The embedded defaults are merged with `config.yaml` from that
    /// directory when it exists, then `POLYEMESIS_CONFIG__SECTION__KEY`
    /// environment variables are applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.yaml` exists but is not valid YAML
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                let data = Zeroizing::new(data);
                info!(config_file=%path, "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)
                    .map_err(|e| anyhow!("Invalid configuration file {}: {}", path, e))?;
                if !external_value.is_null() {
                    let mut external_value = Self::lower_keys_value(external_value);
                    merge_yaml(&mut config_value, &external_value);
                    zeroize_value(&mut external_value);
                }
            }
            Err(_) => {
                info!(config_file=%path, "Config file not found, using default embedded config");
            }
        }

        let mut config_value = Self::lower_keys_value(config_value);
        Self::apply_env_overrides(&mut config_value);

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Builds a configuration from a YAML document merged over the
    /// embedded defaults, without touching the filesystem or the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external_value: Value = serde_yaml::from_str(yaml)?;
        let mut external_value = Self::lower_keys_value(external_value);
        merge_yaml(&mut config_value, &external_value);
        zeroize_value(&mut external_value);

        Ok(Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(Self::lower_keys_value(config_value)),
        })
    }

    /// Configuration made of the embedded defaults only
    pub fn embedded() -> Self {
        let data = serde_yaml::from_str(DEFAULT_CONFIG)
            .map(Self::lower_keys_value)
            .unwrap_or(Value::Mapping(Mapping::new()));
        Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(data),
        }
    }

    /// Directory the configuration was looked up in
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Path of the `config.yaml` file merged over the defaults
    pub fn config_file(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets a configuration value at the specified path (in memory only)
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["restreamer", "port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.lock();
        Self::set_value_internal(&mut data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            let mut previous = std::mem::replace(data, value);
            zeroize_value(&mut previous);
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                if let Some(mut previous) = map.insert(key_value, value) {
                    zeroize_value(&mut previous);
                }
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["health", "failure_threshold"]`)
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the YAML value or an error if the path doesn't exist
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Deserializes a whole configuration subtree into a typed value
    pub fn get_section<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let value = self.get_value(path)?;
        serde_yaml::from_value(value)
            .map_err(|e| anyhow!("Invalid section {}: {}", path.join("."), e))
    }

    fn apply_env_overrides(config: &mut Value) {
        Self::apply_overrides(config, env::vars());
    }

    fn apply_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, mut value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(variable = %key, error = %err, "Ignoring configuration override");
                }
            }
            value.zeroize();
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        let new_val = Self::lower_keys_value(v);
                        new_map.insert(new_key, new_val);
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Gets the Restreamer port from configuration
    ///
    /// Returns the configured port, or the default port (8080) if not configured,
    /// invalid or zero.
    pub fn get_restreamer_port(&self) -> u16 {
        let port = match self.get_value(&["restreamer", "port"]) {
            Ok(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Ok(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        };
        match port {
            Some(port) if port != 0 => port,
            _ => {
                warn!(
                    "Restreamer port missing or invalid, using default {}",
                    DEFAULT_RESTREAMER_PORT
                );
                DEFAULT_RESTREAMER_PORT
            }
        }
    }

    /// Sets the Restreamer port in configuration
    pub fn set_restreamer_port(&self, port: u16) -> Result<()> {
        self.set_value(&["restreamer", "port"], Value::Number(Number::from(port)))
    }

    impl_string_config!(
        get_restreamer_host,
        set_restreamer_host,
        &["restreamer", "host"],
        DEFAULT_RESTREAMER_HOST
    );

    impl_string_config!(
        get_restreamer_username,
        set_restreamer_username,
        &["restreamer", "username"],
        ""
    );

    /// Gets the Restreamer password. The returned buffer is wiped when
    /// dropped.
    pub fn get_restreamer_password(&self) -> Zeroizing<String> {
        match self.get_value(&["restreamer", "password"]) {
            Ok(Value::String(s)) => Zeroizing::new(s),
            Ok(Value::Number(n)) => Zeroizing::new(n.to_string()),
            Ok(mut other) => {
                zeroize_value(&mut other);
                Zeroizing::new(String::new())
            }
            Err(_) => Zeroizing::new(String::new()),
        }
    }

    /// Sets the Restreamer password (in memory only). The previous one is
    /// wiped.
    pub fn set_restreamer_password(&self, password: &str) -> Result<()> {
        self.set_value(&["restreamer", "password"], Value::String(password.to_string()))
    }

    impl_bool_config!(
        get_restreamer_use_https,
        set_restreamer_use_https,
        &["restreamer", "use_https"],
        false
    );

    impl_u64_config!(
        get_restreamer_timeout_secs,
        set_restreamer_timeout_secs,
        &["restreamer", "timeout_secs"],
        DEFAULT_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_token_lifetime_secs,
        set_token_lifetime_secs,
        &["restreamer", "token_lifetime_secs"],
        DEFAULT_TOKEN_LIFETIME_SECS
    );

    impl_u64_config!(
        get_health_check_interval_secs,
        set_health_check_interval_secs,
        &["health", "check_interval_secs"],
        DEFAULT_HEALTH_CHECK_INTERVAL_SECS
    );

    impl_u64_config!(
        get_health_failure_threshold,
        set_health_failure_threshold,
        &["health", "failure_threshold"],
        DEFAULT_FAILURE_THRESHOLD
    );

    impl_u64_config!(
        get_max_reconnect_attempts,
        set_max_reconnect_attempts,
        &["health", "max_reconnect_attempts"],
        DEFAULT_MAX_RECONNECT_ATTEMPTS
    );

    impl_u64_config!(
        get_reconnect_delay_secs,
        set_reconnect_delay_secs,
        &["health", "reconnect_delay_secs"],
        DEFAULT_RECONNECT_DELAY_SECS
    );

    impl_u64_config!(
        get_preview_default_duration_secs,
        set_preview_default_duration_secs,
        &["preview", "default_duration_secs"],
        DEFAULT_PREVIEW_DURATION_SECS
    );

    impl_string_config!(
        get_log_level,
        set_log_level,
        &["logging", "level"],
        DEFAULT_LOG_LEVEL
    );
}

/// Returns the global configuration instance
///
/// This function provides access to the singleton configuration instance,
/// which is lazily loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
/// Wipes every string held by `value`, keys excepted
fn zeroize_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Sequence(items) => items.iter_mut().for_each(zeroize_value),
        Value::Mapping(map) => map.values_mut().for_each(zeroize_value),
        Value::Tagged(tagged) => zeroize_value(&mut tagged.value),
        _ => {}
    }
}

fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}
