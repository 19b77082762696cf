use rollcall_core::{FaceSelection, MatchPolicy, Tolerance};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("workers must be at least 1")]
    NoWorkers,
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "system" => Ok(Self::System),
            other => Err(format!("unknown bus {other:?} (expected session|system)")),
        }
    }
}

/// Daemon configuration.
///
/// Built from defaults, then the TOML file named by `ROLLCALL_CONFIG` (if
/// any), then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite blob store.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub tolerance: Tolerance,
    /// Extractor worker threads; each loads its own copy of the models.
    /// Also bounds how many reference images are processed at once.
    pub workers: usize,
    /// How to choose one face when an image contains several.
    pub face_selection: FaceSelection,
    pub match_policy: MatchPolicy,
    /// Keep extracted enrollment vectors in memory between checks.
    pub cache_enrollments: bool,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: rollcall_core::default_model_dir(),
            db_path: default_data_dir().join("blobs.db"),
            tolerance: Tolerance::default(),
            workers: 4,
            face_selection: FaceSelection::default(),
            match_policy: MatchPolicy::default(),
            cache_enrollments: true,
            bus: BusKind::default(),
        }
    }
}

impl Config {
    /// Load configuration from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ROLLCALL_*` overrides read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_TOLERANCE") {
            let raw: f32 = parse_env("ROLLCALL_TOLERANCE", &v)?;
            self.tolerance = Tolerance::new(raw).map_err(|e| ConfigError::InvalidEnv {
                key: "ROLLCALL_TOLERANCE",
                value: v,
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = lookup("ROLLCALL_WORKERS") {
            self.workers = parse_env("ROLLCALL_WORKERS", &v)?;
        }
        if let Some(v) = lookup("ROLLCALL_FACE_SELECTION") {
            self.face_selection = parse_env("ROLLCALL_FACE_SELECTION", &v)?;
        }
        if let Some(v) = lookup("ROLLCALL_MATCH_POLICY") {
            self.match_policy = parse_env("ROLLCALL_MATCH_POLICY", &v)?;
        }
        if let Some(v) = lookup("ROLLCALL_CACHE_ENROLLMENTS") {
            self.cache_enrollments = v != "0";
        }
        if let Some(v) = lookup("ROLLCALL_BUS") {
            self.bus = parse_env("ROLLCALL_BUS", &v)?;
        }

        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(self)
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default().with_env(env(&[])).unwrap();
        assert_eq!(config.tolerance.value(), 0.5);
        assert_eq!(config.workers, 4);
        assert_eq!(config.face_selection, FaceSelection::First);
        assert_eq!(config.match_policy, MatchPolicy::Any);
        assert!(config.cache_enrollments);
        assert_eq!(config.bus, BusKind::Session);
        assert!(config.db_path.ends_with("rollcall/blobs.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_env(env(&[
                ("ROLLCALL_TOLERANCE", "0.6"),
                ("ROLLCALL_WORKERS", "2"),
                ("ROLLCALL_FACE_SELECTION", "largest"),
                ("ROLLCALL_MATCH_POLICY", "nearest"),
                ("ROLLCALL_CACHE_ENROLLMENTS", "0"),
                ("ROLLCALL_BUS", "system"),
                ("ROLLCALL_DB_PATH", "/var/lib/rollcall/blobs.db"),
            ]))
            .unwrap();
        assert!((config.tolerance.value() - 0.6).abs() < 1e-6);
        assert_eq!(config.workers, 2);
        assert_eq!(config.face_selection, FaceSelection::Largest);
        assert_eq!(config.match_policy, MatchPolicy::Nearest);
        assert!(!config.cache_enrollments);
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/rollcall/blobs.db"));
    }

    #[test]
    fn test_invalid_env_rejected() {
        let err = Config::default().with_env(env(&[("ROLLCALL_TOLERANCE", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "ROLLCALL_TOLERANCE", .. }));

        let err = Config::default().with_env(env(&[("ROLLCALL_WORKERS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "ROLLCALL_WORKERS", .. }));

        let err = Config::default().with_env(env(&[("ROLLCALL_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::NoWorkers));
    }

    #[test]
    fn test_toml_file() {
        let config: Config = toml::from_str(
            r#"
            tolerance = 0.45
            workers = 8
            face_selection = "largest"
            match_policy = "nearest"
            model_dir = "/opt/models"
            "#,
        )
        .unwrap();
        assert!((config.tolerance.value() - 0.45).abs() < 1e-6);
        assert_eq!(config.workers, 8);
        assert_eq!(config.face_selection, FaceSelection::Largest);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert!(config.cache_enrollments, "unset keys keep defaults");
    }

    #[test]
    fn test_toml_rejects_bad_tolerance_and_unknown_keys() {
        assert!(toml::from_str::<Config>("tolerance = -0.5").is_err());
        assert!(toml::from_str::<Config>("tolerence = 0.5").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/rollcall.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
