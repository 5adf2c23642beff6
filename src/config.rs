//! Layered configuration.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`ATTRIBUTION_*`)
//! 2. TOML file passed to [`AttributionConfig::load`]
//! 3. Compiled defaults
//!
//! The merged result is validated before it is returned.
//!
//! ```
//! use u_attribution::config::AttributionConfig;
//!
//! let config = AttributionConfig::from_toml(
//!     "[refuter]\nplacebo_simulations = 20\n\n[estimator]\nconfidence_level = 0.9\n",
//! )
//! .unwrap();
//! assert_eq!(config.refuter.placebo_simulations, 20);
//! assert_eq!(config.refuter.seed, 42);
//! assert_eq!(config.uplift.z_critical, 1.96);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AttributionError;
use crate::estimator::{EstimatorConfig, LinearBackdoorModel, RefuterConfig};
use crate::session::StoreConfig;
use crate::simulate::SimulationConfig;
use crate::telemetry::LogConfig;
use crate::uplift::UpliftConfig;

/// Top-level configuration aggregating all sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub uplift: UpliftConfig,
    pub estimator: EstimatorConfig,
    pub refuter: RefuterConfig,
    pub simulation: SimulationConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl AttributionConfig {
    /// Loads defaults, then `path` (if given), then the process
    /// environment, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, AttributionError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, AttributionError> {
        toml::from_str(toml_str).map_err(|e| AttributionError::ConfigParse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    fn from_file(path: &Path) -> Result<Self, AttributionError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AttributionError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Applies `ATTRIBUTION_*` overrides from `(name, value)` pairs.
    /// Values that do not parse are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, val) in vars {
            let Some(name) = key.strip_prefix("ATTRIBUTION_") else {
                continue;
            };
            let applied = match name {
                "UPLIFT_TREATMENT_THRESHOLD" => set(&mut self.uplift.treatment_threshold, &val),
                "UPLIFT_Z_CRITICAL" => set(&mut self.uplift.z_critical, &val),
                "ESTIMATOR_CONFIDENCE_LEVEL" => set(&mut self.estimator.confidence_level, &val),
                "REFUTER_PLACEBO_SIMULATIONS" => set(&mut self.refuter.placebo_simulations, &val),
                "REFUTER_SEED" => set(&mut self.refuter.seed, &val),
                "SIMULATION_SAMPLES" => set(&mut self.simulation.samples, &val),
                "SIMULATION_SEED" => set(&mut self.simulation.seed, &val),
                "LOG_JSON" => set(&mut self.log.json, &val),
                "SNAPSHOT_DIR" => {
                    self.store.snapshot_dir = (!val.is_empty()).then(|| PathBuf::from(&val));
                    true
                }
                _ => true,
            };
            if !applied {
                tracing::warn!(variable = %key, value = %val, "ignoring unparseable override");
            }
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), AttributionError> {
        let invalid = |field: &str, message: &str| {
            Err(AttributionError::ConfigInvalid {
                field: field.to_string(),
                message: message.to_string(),
            })
        };
        if !self.uplift.treatment_threshold.is_finite() {
            return invalid("uplift.treatment_threshold", "must be finite");
        }
        if !(self.uplift.z_critical.is_finite() && self.uplift.z_critical > 0.0) {
            return invalid("uplift.z_critical", "must be a positive number");
        }
        let level = self.estimator.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return invalid("estimator.confidence_level", "must be between 0 and 1 (exclusive)");
        }
        if self.refuter.placebo_simulations == 0 {
            return invalid("refuter.placebo_simulations", "must be at least 1");
        }
        if self.simulation.samples < 2 {
            return invalid("simulation.samples", "must be at least 2");
        }
        Ok(())
    }

    /// The built-in model configured from the estimator and refuter
    /// sections.
    pub fn model(&self) -> LinearBackdoorModel {
        LinearBackdoorModel::new(self.estimator.clone(), self.refuter.clone())
    }
}

fn set<T: std::str::FromStr>(slot: &mut T, val: &str) -> bool {
    match val.trim().parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let c = AttributionConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.uplift.treatment_threshold, 0.5);
        assert_eq!(c.estimator.confidence_level, 0.95);
        assert_eq!(c.refuter.placebo_simulations, 100);
        assert_eq!(c.simulation.samples, 1000);
        assert_eq!(c.store.snapshot_dir, None);
        assert_eq!(c.log.filter, "info");
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(AttributionConfig::from_toml("").unwrap(), AttributionConfig::default());
    }

    #[test]
    fn toml_sections_override() {
        let c = AttributionConfig::from_toml(
            r#"
            [uplift]
            z_critical = 2.576

            [store]
            snapshot_dir = "/var/lib/attribution"

            [log]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(c.uplift.z_critical, 2.576);
        assert_eq!(c.uplift.treatment_threshold, 0.5);
        assert_eq!(c.store.snapshot_dir, Some(PathBuf::from("/var/lib/attribution")));
        assert!(c.log.json);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        assert!(matches!(
            AttributionConfig::from_toml("[uplift\nz = "),
            Err(AttributionError::ConfigParse { .. })
        ));
        assert!(matches!(
            AttributionConfig::from_toml("[refuter]\nseed = \"abc\"\n"),
            Err(AttributionError::ConfigParse { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut c = AttributionConfig::default();
        c.apply_env_overrides(env(&[
            ("ATTRIBUTION_REFUTER_PLACEBO_SIMULATIONS", "25"),
            ("ATTRIBUTION_ESTIMATOR_CONFIDENCE_LEVEL", " 0.9 "),
            ("ATTRIBUTION_SNAPSHOT_DIR", "/tmp/snaps"),
            ("ATTRIBUTION_LOG_JSON", "true"),
            ("ATTRIBUTION_SIMULATION_SEED", "not-a-number"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(c.refuter.placebo_simulations, 25);
        assert_eq!(c.estimator.confidence_level, 0.9);
        assert_eq!(c.store.snapshot_dir, Some(PathBuf::from("/tmp/snaps")));
        assert!(c.log.json);
        assert_eq!(c.simulation.seed, 42);
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let cases: Vec<(&str, fn(&mut AttributionConfig))> = vec![
            ("estimator.confidence_level", |c: &mut AttributionConfig| c.estimator.confidence_level = 1.0),
            ("uplift.z_critical", |c: &mut AttributionConfig| c.uplift.z_critical = 0.0),
            ("uplift.treatment_threshold", |c: &mut AttributionConfig| c.uplift.treatment_threshold = f64::NAN),
            ("refuter.placebo_simulations", |c: &mut AttributionConfig| c.refuter.placebo_simulations = 0),
            ("simulation.samples", |c: &mut AttributionConfig| c.simulation.samples = 1),
        ];
        for (field, mutate) in cases {
            let mut c = AttributionConfig::default();
            mutate(&mut c);
            match c.validate() {
                Err(AttributionError::ConfigInvalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{field}: expected ConfigInvalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attribution.toml");
        std::fs::write(&path, "[simulation]\nsamples = 250\n").unwrap();
        let c = AttributionConfig::load(Some(&path)).unwrap();
        assert_eq!(c.simulation.samples, 250);

        assert!(matches!(
            AttributionConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(AttributionError::Io(_))
        ));
    }

    #[test]
    fn load_validates_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attribution.toml");
        std::fs::write(&path, "[estimator]\nconfidence_level = 1.5\n").unwrap();
        assert!(matches!(
            AttributionConfig::load(Some(&path)),
            Err(AttributionError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn model_uses_sections() {
        let mut c = AttributionConfig::default();
        c.refuter.seed = 7;
        assert_eq!(c.model().refuter.seed, 7);
    }
}
