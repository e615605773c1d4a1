use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use facegate_core::{decision, detector};
use facegate_ledger::InventoryLedger;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the HTTP surface (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Optional TOML seed file for the inventory ledger
    /// (top-level `sku = quantity` map). Absent: built-in seed set.
    pub seed_path: Option<PathBuf>,
    /// Label of the authorized identity.
    pub authorized_label: i32,
    /// Distance ceiling for a positive match (strict comparison).
    pub match_threshold: f32,
    /// Minimum detector score for a box to count as a face.
    pub detect_score_threshold: f32,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("FACEGATE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            model_dir: std::env::var("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            seed_path: std::env::var("FACEGATE_SEED_PATH").ok().map(PathBuf::from),
            authorized_label: env_i32("FACEGATE_AUTHORIZED_LABEL", decision::AUTHORIZED_LABEL),
            match_threshold: env_f32("FACEGATE_MATCH_THRESHOLD", decision::MATCH_THRESHOLD),
            detect_score_threshold: env_f32(
                "FACEGATE_DETECT_SCORE_THRESHOLD",
                detector::DEFAULT_SCORE_THRESHOLD,
            ),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("face_detect.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the trained identity classifier model.
    pub fn classifier_model_path(&self) -> String {
        self.model_dir
            .join("face_classifier.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Read the inventory seed set: the configured TOML file, or the
    /// built-in seed when no file is configured.
    pub fn load_seed(&self) -> anyhow::Result<BTreeMap<String, i64>> {
        let Some(path) = &self.seed_path else {
            return Ok(InventoryLedger::default_seed());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed = toml::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        Ok(seed)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_file_parses_top_level_map() {
        let dir = std::env::temp_dir().join("facegate-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("seed.toml");
        std::fs::write(&path, "apple = 10\npear = 0\n").unwrap();

        let config = Config {
            seed_path: Some(path),
            ..test_config()
        };
        let seed = config.load_seed().unwrap();
        assert_eq!(seed["apple"], 10);
        assert_eq!(seed["pear"], 0);
    }

    #[test]
    fn test_missing_seed_path_uses_builtin_seed() {
        let seed = test_config().load_seed().unwrap();
        assert_eq!(seed["apple"], 100);
        assert_eq!(seed["banana"], 150);
        assert_eq!(seed["orange"], 120);
    }

    #[test]
    fn test_unreadable_seed_file_errors() {
        let config = Config {
            seed_path: Some(PathBuf::from("/nonexistent/seed.toml")),
            ..test_config()
        };
        assert!(config.load_seed().is_err());
    }

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            model_dir: PathBuf::from("models"),
            seed_path: None,
            authorized_label: decision::AUTHORIZED_LABEL,
            match_threshold: decision::MATCH_THRESHOLD,
            detect_score_threshold: detector::DEFAULT_SCORE_THRESHOLD,
        }
    }
}
