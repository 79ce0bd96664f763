use crate::catalog::{Experiment, ExperimentCatalog};
use crate::error::{Result, SamplingError};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Previous versions kept per experiment for rollback
pub const MAX_HISTORY: usize = 16;

/// Experiment version tracking
#[derive(Debug, Clone)]
struct ExperimentVersion {
    experiment: Arc<Experiment>,
    /// Definition file, `None` for experiments inserted in-process
    file_path: Option<PathBuf>,
}

impl ExperimentVersion {
    /// Files are matched by name; the experiments directory is flat
    fn is_from(&self, path: &Path) -> bool {
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .is_some_and(|name| Some(name) == path.file_name())
    }
}

type ExperimentMap = HashMap<String, ExperimentVersion>;

/// Experiment registry - lock-free reads, hot reload and rollback
///
/// Writers go through `ArcSwap::rcu`, so concurrent updates (watcher and
/// HTTP rollback) never overwrite each other.
pub struct ExperimentRegistry {
    experiments_dir: PathBuf,

    /// name -> ExperimentVersion
    experiments: Arc<ArcSwap<ExperimentMap>>,

    /// Rollback history: name -> previous versions, oldest first
    history: Arc<RwLock<HashMap<String, Vec<Arc<Experiment>>>>>,
}

impl ExperimentRegistry {
    pub fn new(experiments_dir: PathBuf) -> Self {
        Self {
            experiments_dir,
            experiments: Arc::new(ArcSwap::from_pointee(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn experiments_dir(&self) -> &Path {
        &self.experiments_dir
    }

    /// Replace the whole registry with the contents of the experiments directory
    pub fn load_all(&self) -> Result<usize> {
        let catalog = ExperimentCatalog::load_from_dir(self.experiments_dir.clone())?;

        let new_experiments: ExperimentMap = catalog
            .into_entries()
            .map(|(experiment, file_path)| {
                (
                    experiment.name().to_string(),
                    ExperimentVersion {
                        experiment: Arc::new(experiment),
                        file_path: Some(file_path),
                    },
                )
            })
            .collect();

        let count = new_experiments.len();

        // Atomic swap
        self.experiments.store(Arc::new(new_experiments));

        Ok(count)
    }

    /// Load or reload the experiment defined in `file_path`.
    ///
    /// The experiment is keyed by the `name` inside the file, as in
    /// `load_all`. If the file previously defined another name, that entry is
    /// dropped. A name already owned by a different file is rejected.
    /// Returns the experiment name.
    pub fn load_file(&self, file_path: &Path) -> Result<String> {
        let experiment = Arc::new(Experiment::from_file(file_path)?);
        let name = experiment.name().to_string();

        let mut conflict = None;
        let mut renamed_from = None;

        let previous = self.experiments.rcu(|current| {
            conflict = current
                .get(&name)
                .filter(|v| v.file_path.is_some() && !v.is_from(file_path))
                .and_then(|v| v.file_path.clone());
            if conflict.is_some() {
                return Arc::clone(current);
            }

            let mut new_experiments = (**current).clone();
            renamed_from = new_experiments
                .iter()
                .find(|(other, v)| **other != name && v.is_from(file_path))
                .map(|(other, _)| other.clone());
            if let Some(other) = &renamed_from {
                new_experiments.remove(other);
            }

            new_experiments.insert(
                name.clone(),
                ExperimentVersion {
                    experiment: experiment.clone(),
                    file_path: Some(file_path.to_path_buf()),
                },
            );
            Arc::new(new_experiments)
        });

        if let Some(owner) = conflict {
            return Err(SamplingError::InvalidParameter(format!(
                "Duplicate experiment name {} (file: {:?}, already defined in {:?})",
                name, file_path, owner
            )));
        }

        if let Some(other) = renamed_from {
            tracing::info!("Experiment {} renamed to {} in {:?}", other, name, file_path);
        }

        match previous.get(&name) {
            Some(old_version) => {
                tracing::info!(
                    "Updating experiment {} (ratio {} -> {})",
                    name,
                    old_version.experiment.def.sampling_ratio,
                    experiment.def.sampling_ratio
                );
                self.push_history(&name, old_version.experiment.clone());
            }
            None => tracing::info!(
                "Adding new experiment: {} (ratio: {})",
                name,
                experiment.def.sampling_ratio
            ),
        }

        Ok(name)
    }

    /// Insert an already compiled experiment with no backing file.
    ///
    /// Entry point for embedding the registry in-process and for tests; file
    /// events never touch such entries.
    pub fn insert(&self, experiment: Experiment) {
        let experiment = Arc::new(experiment);
        let name = experiment.name().to_string();

        let previous = self.experiments.rcu(|current| {
            let mut new_experiments = (**current).clone();
            new_experiments.insert(
                name.clone(),
                ExperimentVersion {
                    experiment: experiment.clone(),
                    file_path: None,
                },
            );
            new_experiments
        });

        if let Some(old_version) = previous.get(&name) {
            self.push_history(&name, old_version.experiment.clone());
        }
    }

    pub fn remove_experiment(&self, name: &str) -> Result<()> {
        let previous = self.experiments.rcu(|current| {
            if !current.contains_key(name) {
                return Arc::clone(current);
            }
            let mut new_experiments = (**current).clone();
            new_experiments.remove(name);
            Arc::new(new_experiments)
        });

        if previous.contains_key(name) {
            tracing::info!("Removed experiment: {}", name);
            Ok(())
        } else {
            Err(SamplingError::ExperimentNotFound(name.to_string()))
        }
    }

    /// Remove whichever experiment was loaded from `file_path`.
    /// Returns the removed experiment's name.
    pub fn remove_file(&self, file_path: &Path) -> Result<String> {
        let mut removed = None;

        self.experiments.rcu(|current| {
            removed = current
                .iter()
                .find(|(_, v)| v.is_from(file_path))
                .map(|(name, _)| name.clone());

            match &removed {
                Some(name) => {
                    let mut new_experiments = (**current).clone();
                    new_experiments.remove(name);
                    Arc::new(new_experiments)
                }
                None => Arc::clone(current),
            }
        });

        match removed {
            Some(name) => {
                tracing::info!("Removed experiment {} (file {:?})", name, file_path);
                Ok(name)
            }
            None => Err(SamplingError::ExperimentNotFound(format!(
                "no experiment loaded from {:?}",
                file_path
            ))),
        }
    }

    /// Restore the previous version of an experiment
    pub fn rollback_experiment(&self, name: &str) -> Result<()> {
        let mut history = self.history.write();

        if let Some(prev) = history.get_mut(name).and_then(|versions| versions.pop()) {
            let previous = self.experiments.rcu(|current| {
                let Some(version) = current.get(name) else {
                    return Arc::clone(current);
                };
                let mut new_experiments = (**current).clone();
                new_experiments.insert(
                    name.to_string(),
                    ExperimentVersion {
                        experiment: prev.clone(),
                        file_path: version.file_path.clone(),
                    },
                );
                Arc::new(new_experiments)
            });

            if previous.contains_key(name) {
                tracing::info!(
                    "Rolled back experiment {} to ratio {}",
                    name,
                    prev.def.sampling_ratio
                );
                return Ok(());
            }

            // Experiment was removed since; keep the version for later
            history.entry(name.to_string()).or_default().push(prev);
        }

        Err(SamplingError::InvalidVersion(format!(
            "No rollback version available for experiment {}",
            name
        )))
    }

    fn push_history(&self, name: &str, experiment: Arc<Experiment>) {
        let mut history = self.history.write();
        let versions = history.entry(name.to_string()).or_default();
        versions.push(experiment);
        if versions.len() > MAX_HISTORY {
            let excess = versions.len() - MAX_HISTORY;
            versions.drain(..excess);
        }
    }

    /// Number of rollback versions held for an experiment
    pub fn history_len(&self, name: &str) -> usize {
        self.history.read().get(name).map_or(0, Vec::len)
    }

    pub fn get_experiment(&self, name: &str) -> Option<Arc<Experiment>> {
        self.experiments
            .load()
            .get(name)
            .map(|v| v.experiment.clone())
    }

    /// Enabled experiment by name
    pub fn get_active(&self, name: &str) -> Option<Arc<Experiment>> {
        self.get_experiment(name).filter(|exp| exp.def.enabled)
    }

    /// All enabled experiments, sorted by name
    pub fn active_experiments(&self) -> Vec<Arc<Experiment>> {
        let experiments = self.experiments.load();
        let mut active: Vec<Arc<Experiment>> = experiments
            .values()
            .filter(|v| v.experiment.def.enabled)
            .map(|v| v.experiment.clone())
            .collect();
        active.sort_by(|a, b| a.name().cmp(b.name()));
        active
    }

    pub fn experiment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.experiments.load().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.experiments.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExperimentDef;
    use crate::hash::HashAlgorithm;
    use tempfile::TempDir;

    fn write_def(dir: &Path, name: &str, ratio: f64, enabled: bool) -> PathBuf {
        let def = ExperimentDef {
            name: name.to_string(),
            sampling_ratio: ratio,
            buckets: vec!["control".to_string(), "treatment".to_string()],
            override_param: Some("force".to_string()),
            hash: HashAlgorithm::Md5,
            enabled,
        };
        let path = dir.join(format!("{}.json", name));
        std::fs::write(&path, serde_json::to_string_pretty(&def).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_all_and_active() {
        let temp_dir = TempDir::new().unwrap();
        write_def(temp_dir.path(), "on", 0.5, true);
        write_def(temp_dir.path(), "off", 0.5, false);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        assert_eq!(registry.load_all().unwrap(), 2);

        assert_eq!(registry.experiment_names(), vec!["off", "on"]);
        assert!(registry.get_experiment("off").is_some());
        assert!(registry.get_active("off").is_none());
        assert_eq!(registry.active_experiments().len(), 1);
    }

    #[test]
    fn test_reload_and_rollback() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_def(temp_dir.path(), "split", 0.1, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        write_def(temp_dir.path(), "split", 0.3, true);
        registry.load_file(&path).unwrap();
        assert_eq!(
            registry.get_experiment("split").unwrap().def.sampling_ratio,
            0.3
        );

        registry.rollback_experiment("split").unwrap();
        assert_eq!(
            registry.get_experiment("split").unwrap().def.sampling_ratio,
            0.1
        );

        let err = registry.rollback_experiment("split").unwrap_err();
        assert!(matches!(err, SamplingError::InvalidVersion(_)));
    }

    fn write_named(path: &Path, name: &str, ratio: f64) {
        std::fs::write(
            path,
            format!("name: {}\nsampling_ratio: {}\nbuckets: [a, b]\n", name, ratio),
        )
        .unwrap();
    }

    #[test]
    fn test_reload_file_whose_stem_differs_from_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("page-split.yaml");
        write_named(&path, "page_split", 0.1);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        assert_eq!(registry.load_all().unwrap(), 1);

        write_named(&path, "page_split", 0.4);
        assert_eq!(registry.load_file(&path).unwrap(), "page_split");
        assert_eq!(registry.experiment_names(), vec!["page_split"]);
        assert_eq!(
            registry.get_experiment("page_split").unwrap().def.sampling_ratio,
            0.4
        );

        assert_eq!(registry.remove_file(&path).unwrap(), "page_split");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_inside_file_replaces_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("exp.yaml");
        write_named(&path, "old_name", 0.1);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        write_named(&path, "new_name", 0.1);
        registry.load_file(&path).unwrap();
        assert_eq!(registry.experiment_names(), vec!["new_name"]);
    }

    #[test]
    fn test_name_owned_by_other_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_def(temp_dir.path(), "split", 0.1, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        let copy = temp_dir.path().join("copy.yaml");
        write_named(&copy, "split", 0.9);
        let err = registry.load_file(&copy).unwrap_err();
        assert!(format!("{}", err).contains("Duplicate experiment name"));
        assert_eq!(
            registry.get_experiment("split").unwrap().def.sampling_ratio,
            0.1
        );
    }

    #[test]
    fn test_remove_unknown_file() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        let err = registry
            .remove_file(&temp_dir.path().join("ghost.json"))
            .unwrap_err();
        assert!(matches!(err, SamplingError::ExperimentNotFound(_)));
    }

    #[test]
    fn test_inserted_experiments_ignore_file_events() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_def(temp_dir.path(), "split", 0.1, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.insert(Experiment::from_file(&path).unwrap());

        assert!(registry.remove_file(&path).is_err());
        assert!(registry.get_experiment("split").is_some());
    }

    #[test]
    fn test_history_is_capped() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_def(temp_dir.path(), "split", 0.0, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        for i in 1..=(MAX_HISTORY + 5) {
            write_def(temp_dir.path(), "split", i as f64 / 100.0, true);
            registry.load_file(&path).unwrap();
        }
        assert_eq!(registry.history_len("split"), MAX_HISTORY);

        // Newest history entry is the version just before the current one
        registry.rollback_experiment("split").unwrap();
        assert_eq!(
            registry.get_experiment("split").unwrap().def.sampling_ratio,
            (MAX_HISTORY + 4) as f64 / 100.0
        );
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let registry = Arc::new(ExperimentRegistry::new(PathBuf::from("unused")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let def = ExperimentDef {
                            name: format!("exp_{}_{}", t, i),
                            sampling_ratio: 0.5,
                            buckets: vec![],
                            override_param: None,
                            hash: HashAlgorithm::Md5,
                            enabled: true,
                        };
                        registry.insert(Experiment::compile(def).unwrap());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_invalid_reload_keeps_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_def(temp_dir.path(), "split", 0.1, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        write_def(temp_dir.path(), "split", 7.0, true);
        assert!(registry.load_file(&path).is_err());
        assert_eq!(
            registry.get_experiment("split").unwrap().def.sampling_ratio,
            0.1
        );
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        write_def(temp_dir.path(), "split", 0.1, true);

        let registry = ExperimentRegistry::new(temp_dir.path().to_path_buf());
        registry.load_all().unwrap();

        registry.remove_experiment("split").unwrap();
        assert!(registry.get_experiment("split").is_none());
        assert!(matches!(
            registry.remove_experiment("split"),
            Err(SamplingError::ExperimentNotFound(_))
        ));
    }
}
