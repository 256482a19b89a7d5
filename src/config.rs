use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Sketchgrade";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "SKETCHGRADE_CONFIG";

/// Prefix for per-field environment overrides (`SKETCHGRADE_BIND_ADDR`, ...).
const ENV_PREFIX: &str = "SKETCHGRADE_";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "sketchgrade=info,tower_http=info"
}

/// Get the application data directory.
/// ~/Sketchgrade/ when a home directory exists, `./sketchgrade-data` otherwise.
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from("sketchgrade-data"),
    }
}

/// Default location of the assessment database.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("assessments.db")
}

/// Get the models directory (for ONNX image embeddings).
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Which feature extractor backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Stroke-outline grid (default, no model files needed).
    InkGrid,
    /// 256-bit DoubleGradient perceptual hash.
    PerceptualHash,
    /// ONNX image embedding model (requires the `onnx-embeddings` feature).
    Onnx,
}

impl std::str::FromStr for ExtractorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ink_grid" => Ok(Self::InkGrid),
            "perceptual_hash" => Ok(Self::PerceptualHash),
            "onnx" => Ok(Self::Onnx),
            _ => Err(ConfigError::InvalidValue {
                key: "extractor".into(),
                value: s.into(),
            }),
        }
    }
}

/// Runtime configuration for the service.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// SQLite file for assessments. `None` keeps results in memory only.
    pub database_path: Option<PathBuf>,
    /// JSON manifest listing the selectable targets.
    pub catalog_path: PathBuf,
    /// Side length of the canonical square raster.
    pub canonical_size: u32,
    /// Minimum ink coverage ratio for a drawing to be scored.
    pub min_coverage: f32,
    pub extractor: ExtractorKind,
    /// Directory holding `model.onnx` for the ONNX extractor.
    pub model_dir: PathBuf,
    pub model_load_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_path: Some(default_database_path()),
            catalog_path: PathBuf::from("resources/targets/catalog.json"),
            canonical_size: crate::pipeline::raster::CANONICAL_SIZE,
            min_coverage: crate::pipeline::coverage::DEFAULT_MIN_COVERAGE,
            extractor: ExtractorKind::InkGrid,
            model_dir: models_dir().join("sketch-embedder"),
            model_load_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load config: defaults, then the optional JSON file named by
    /// `SKETCHGRADE_CONFIG`, then `SKETCHGRADE_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        check_coverage("min_coverage", config.min_coverage)?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (keys without the env prefix).
    ///
    /// `DATABASE_PATH=memory` switches to the in-memory store.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = parse_value("BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = match v.as_str() {
                "memory" | "" => None,
                path => Some(PathBuf::from(path)),
            };
        }
        if let Some(v) = lookup("CATALOG_PATH") {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CANONICAL_SIZE") {
            self.canonical_size = parse_value("CANONICAL_SIZE", &v)?;
        }
        if let Some(v) = lookup("MIN_COVERAGE") {
            self.min_coverage = check_coverage("MIN_COVERAGE", parse_value("MIN_COVERAGE", &v)?)?;
        }
        if let Some(v) = lookup("EXTRACTOR") {
            self.extractor = v.parse()?;
        }
        if let Some(v) = lookup("MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODEL_LOAD_TIMEOUT_SECS") {
            self.model_load_timeout_secs = parse_value("MODEL_LOAD_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    })
}

/// Coverage thresholds are ratios; NaN would disable the emptiness guard.
fn check_coverage(key: &str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.into(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        let dir = app_data_dir();
        assert!(dir.ends_with("Sketchgrade") || dir.ends_with("sketchgrade-data"));
    }

    #[test]
    fn default_database_under_app_data() {
        assert!(default_database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.canonical_size, 256);
        assert!((config.min_coverage - 0.05).abs() < f32::EPSILON);
        assert_eq!(config.extractor, ExtractorKind::InkGrid);
        assert_eq!(config.model_load_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_json_object_is_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.canonical_size, 256);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"bind_addr":"0.0.0.0:8080","extractor":"perceptual_hash","database_path":null}"#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.extractor, ExtractorKind::PerceptualHash);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = ServiceConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ServiceConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("MIN_COVERAGE", "0.1"),
                ("DATABASE_PATH", "memory"),
                ("EXTRACTOR", "onnx"),
            ]))
            .unwrap();

        assert!((config.min_coverage - 0.1).abs() < f32::EPSILON);
        assert!(config.database_path.is_none());
        assert_eq!(config.extractor, ExtractorKind::Onnx);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("CANONICAL_SIZE", "big")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CANONICAL_SIZE"));
    }

    #[test]
    fn non_finite_or_out_of_range_coverage_is_rejected() {
        for bad in ["NaN", "inf", "-0.1", "1.5"] {
            let mut config = ServiceConfig::default();
            let err = config
                .apply_overrides(lookup_from(&[("MIN_COVERAGE", bad)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MIN_COVERAGE"),
                "{bad}"
            );
            assert!((config.min_coverage - 0.05).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn out_of_range_coverage_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "min_coverage": 2.0 }"#).unwrap();
        let err = ServiceConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "min_coverage"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
