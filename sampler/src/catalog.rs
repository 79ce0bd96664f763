use crate::assignment::{AssignmentStrategy, UNSAMPLED_BUCKET};
use crate::bucket::SamplingBucketEngine;
use crate::error::{Result, SamplingError};
use crate::hash::{HashAlgorithm, IdentifierHasher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Experiment definition as written in the config directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentDef {
    /// Unique experiment name; need not match the config file name
    pub name: String,

    /// Fraction of pages in the sample, within [0, 1]
    pub sampling_ratio: f64,

    /// Ordered bucket names; position decides which pages land where
    #[serde(default)]
    pub buckets: Vec<String>,

    /// Request parameter that forces a bucket (QA / test harnesses)
    #[serde(default)]
    pub override_param: Option<String>,

    #[serde(default)]
    pub hash: HashAlgorithm,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExperimentDef {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // Try JSON first, then YAML
        let def: ExperimentDef = serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content).map_err(SamplingError::from))?;

        Ok(def)
    }
}

/// Definition compiled into a ready-to-use assignment strategy
#[derive(Debug, Clone)]
pub struct Experiment {
    pub def: ExperimentDef,
    pub strategy: AssignmentStrategy,
}

impl Experiment {
    pub fn compile(def: ExperimentDef) -> Result<Self> {
        if def.name.trim().is_empty() {
            return Err(SamplingError::InvalidParameter(
                "Experiment name must not be empty".to_string(),
            ));
        }

        if def.buckets.iter().any(|b| b == UNSAMPLED_BUCKET) {
            return Err(SamplingError::InvalidParameter(format!(
                "Experiment {}: bucket name '{}' is reserved",
                def.name, UNSAMPLED_BUCKET
            )));
        }

        let engine = SamplingBucketEngine::new(def.sampling_ratio, def.buckets.clone())?;
        let strategy = AssignmentStrategy::new(
            engine,
            IdentifierHasher::new(def.hash),
            def.override_param.clone(),
        );

        Ok(Self { def, strategy })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::compile(ExperimentDef::from_file(path)?)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Returns true for files the catalog reads
pub fn is_config_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

/// Experiments loaded from the config directory
#[derive(Debug, Clone)]
pub struct ExperimentCatalog {
    /// name -> (experiment, source file)
    experiments: HashMap<String, (Experiment, PathBuf)>,
}

impl ExperimentCatalog {
    /// Load every definition in `dir`. Any invalid file fails the whole load.
    pub fn load_from_dir(dir: PathBuf) -> Result<Self> {
        let mut experiments = HashMap::new();

        if !dir.exists() {
            tracing::warn!("Experiments directory does not exist: {:?}", dir);
            return Ok(Self { experiments });
        }

        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();

            if !path.is_file() || !is_config_file(&path) {
                continue;
            }

            let experiment = Experiment::from_file(&path).map_err(|e| {
                tracing::error!("Failed to load experiment from {:?}: {}", path, e);
                e
            })?;

            if experiments.contains_key(experiment.name()) {
                return Err(SamplingError::InvalidParameter(format!(
                    "Duplicate experiment name {} (file: {:?})",
                    experiment.name(),
                    path
                )));
            }

            tracing::info!(
                "Loaded experiment: {} (ratio: {}, buckets: {:?})",
                experiment.name(),
                experiment.def.sampling_ratio,
                experiment.def.buckets
            );

            experiments.insert(experiment.name().to_string(), (experiment, path));
        }

        Ok(Self { experiments })
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Experiment> {
        self.experiments.get(name).map(|(exp, _)| exp)
    }

    pub fn into_entries(self) -> impl Iterator<Item = (Experiment, PathBuf)> {
        self.experiments.into_values()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}
