//! Configuration de la bibliothèque.
//!
//! The embedded default YAML is merged with an optional `library.yaml`
//! found in the configuration directory, then `PMOLIBRARY__*` environment
//! variables override single keys (`PMOLIBRARY__EVENTS__QUEUE_CAPACITY=64`).

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dirs::home_dir;
use pmoevents::ManagerOptions;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::kind::{NameRule, DEFAULT_PLAYLIST_EXTENSIONS, DEFAULT_TRACK_EXTENSIONS};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmolibrary.yaml");

const ENV_CONFIG_DIR: &str = "PMOLIBRARY_CONFIG";
const ENV_PREFIX: &str = "PMOLIBRARY__";
const CONFIG_FILE: &str = "library.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub queue_capacity: usize,
    pub thread_name: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            thread_name: "pmolibrary-events".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub tracks: Vec<String>,
    pub playlists: Vec<String>,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            tracks: DEFAULT_TRACK_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            playlists: DEFAULT_PLAYLIST_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directive `EnvFilter` utilisée quand `RUST_LOG` est absent
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub events: EventsConfig,
    pub extensions: ExtensionsConfig,
    pub logging: LoggingConfig,
}

impl LibraryConfig {
    /// Loads the configuration.
    ///
    /// The directory is searched in the following order:
    /// 1. `directory` if given
    /// 2. The `PMOLIBRARY_CONFIG` environment variable
    /// 3. `.pmomusic` in the user's home directory, if it exists
    ///
    /// A missing `library.yaml` is not an error: the embedded defaults apply.
    pub fn load(directory: Option<&Path>) -> Result<Self> {
        let external = match find_config_dir(directory) {
            Some(dir) => {
                let path = dir.join(CONFIG_FILE);
                match fs::read_to_string(&path) {
                    Ok(data) => {
                        info!(config_file = %path.display(), "Loaded library config file");
                        Some(data)
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        info!(config_file = %path.display(), "Config file not found, using embedded defaults");
                        None
                    }
                    Err(e) => {
                        return Err(Error::Config(format!(
                            "cannot read {}: {}",
                            path.display(),
                            e
                        )));
                    }
                }
            }
            None => None,
        };

        Self::from_sources(external.as_deref(), env::vars())
    }

    /// Builds the configuration from an optional YAML document and a set of
    /// environment variables.
    pub fn from_sources<I>(external: Option<&str>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG).map_err(config_error)?;

        if let Some(external) = external {
            let external_value: Value = serde_yaml::from_str(external).map_err(config_error)?;
            merge_yaml(&mut value, &external_value);
        }

        let mut value = lower_keys_value(value);
        apply_env_overrides(&mut value, vars);

        serde_yaml::from_value(value).map_err(config_error)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            queue_capacity: self.events.queue_capacity,
            thread_name: self.events.thread_name.clone(),
        }
    }

    pub fn track_name_rule(&self) -> NameRule {
        file_rule(&self.extensions.tracks)
    }

    pub fn playlist_name_rule(&self) -> NameRule {
        file_rule(&self.extensions.playlists)
    }
}

fn file_rule(extensions: &[String]) -> NameRule {
    NameRule::File {
        extensions: extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect(),
    }
}

fn config_error(err: serde_yaml::Error) -> Error {
    Error::Config(err.to_string())
}

fn find_config_dir(directory: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = directory {
        return Some(dir.to_path_buf());
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
        info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load library config from env");
        return Some(PathBuf::from(env_path));
    }

    home_dir()
        .map(|home| home.join(".pmomusic"))
        .filter(|dir| dir.is_dir())
}

fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(path) = key.strip_prefix(ENV_PREFIX) {
            let key_path: Vec<&str> = path.split("__").collect();
            if let Err(e) = set_value(config, &key_path, convert_env_value(&value)) {
                warn!(env_var = %key, "Ignoring environment override: {}", e);
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn set_value(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    let Value::Mapping(map) = data else {
        return Err(Error::Config(format!("'{}' is not a mapping", path.join("."))));
    };

    let key = Value::String(path[0].to_lowercase());
    if path.len() == 1 {
        map.insert(key, value);
        Ok(())
    } else {
        let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
        set_value(entry, &path[1..], value)
    }
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (k, v) in map {
                let k = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(k, lower_keys_value(v));
            }
            Value::Mapping(lowered)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges `external` into `default`: mappings are merged key by key,
/// scalars and sequences are replaced.
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
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn embedded_defaults_match_default_impl() {
        let config = LibraryConfig::from_sources(None, no_env()).unwrap();
        assert_eq!(config, LibraryConfig::default());
    }

    #[test]
    fn external_file_is_merged() {
        let external = "events:\n  queue_capacity: 128\nextensions:\n  playlists: [m3u, M3U8]\n";
        let config = LibraryConfig::from_sources(Some(external), no_env()).unwrap();

        assert_eq!(config.events.queue_capacity, 128);
        assert_eq!(config.events.thread_name, "pmolibrary-events");
        assert_eq!(
            config.playlist_name_rule(),
            NameRule::File {
                extensions: vec!["m3u".into(), "m3u8".into()]
            }
        );
    }

    #[test]
    fn env_overrides_win() {
        let vars = vec![
            ("PMOLIBRARY__EVENTS__QUEUE_CAPACITY".to_string(), "16".to_string()),
            ("PMOLIBRARY__LOGGING__FILTER".to_string(), "pmolibrary=debug".to_string()),
            ("PMOLIBRARY__EXTENSIONS__TRACKS".to_string(), "[mp3]".to_string()),
            ("UNRELATED".to_string(), "1".to_string()),
        ];
        let config = LibraryConfig::from_sources(Some("events:\n  queue_capacity: 8\n"), vars).unwrap();

        assert_eq!(config.events.queue_capacity, 16);
        assert_eq!(config.logging.filter, "pmolibrary=debug");
        assert_eq!(config.extensions.tracks, vec!["mp3".to_string()]);
        assert_eq!(config.manager_options().queue_capacity, 16);
    }

    #[test]
    fn malformed_env_override_is_skipped() {
        let vars = vec![
            ("PMOLIBRARY__LOGGING__FILTER__X".to_string(), "1".to_string()),
            ("PMOLIBRARY__EVENTS__THREAD_NAME".to_string(), "events".to_string()),
        ];
        let config = LibraryConfig::from_sources(None, vars).unwrap();

        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.events.thread_name, "events");
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Un répertoire à la place du fichier : lecture impossible
        fs::create_dir(dir.path().join(CONFIG_FILE)).unwrap();

        let err = LibraryConfig::load(Some(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.events.thread_name, "pmolibrary-events");
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = LibraryConfig::from_sources(Some("events: [unclosed"), no_env()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_from_explicit_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "events:\n  thread_name: custom\n").unwrap();

        let config = LibraryConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.events.thread_name, "custom");
    }
}
