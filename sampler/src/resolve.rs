use crate::assignment::Assignment;
use crate::catalog::Experiment;
use crate::metrics;
use crate::registry::ExperimentRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Assignment request for one page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentRequest {
    /// Missing when the caller could not resolve a page
    #[serde(default)]
    pub page_id: Option<u64>,

    /// Experiments to resolve; empty means every active experiment
    #[serde(default)]
    pub experiments: Vec<String>,

    /// Request query parameters, consulted for overrides
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Per-experiment result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentResult {
    /// Bucket name, the `unsampled` sentinel, or null
    pub bucket: Option<String>,

    /// Sampling status; null when overridden or no page id was given
    pub sampled: Option<bool>,

    pub overridden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResponse {
    pub page_id: Option<u64>,
    pub results: HashMap<String, AssignmentResult>,
}

/// Resolve a page against several experiments
pub fn resolve_batch(
    request: &AssignmentRequest,
    registry: &ExperimentRegistry,
) -> AssignmentResponse {
    let experiments = if request.experiments.is_empty() {
        registry.active_experiments()
    } else {
        request
            .experiments
            .iter()
            .filter_map(|name| {
                let found = registry.get_active(name);
                if found.is_none() {
                    tracing::warn!("Unknown or disabled experiment '{}', skipping", name);
                }
                found
            })
            .collect()
    };

    let results = experiments
        .iter()
        .map(|exp| {
            let result = resolve_experiment(exp, request.page_id, &request.params);
            (exp.name().to_string(), result)
        })
        .collect();

    AssignmentResponse {
        page_id: request.page_id,
        results,
    }
}

/// Resolve a single experiment.
///
/// An override never needs the page id; without one, a missing page id
/// yields no assignment.
pub fn resolve_experiment(
    experiment: &Experiment,
    page_id: Option<u64>,
    params: &HashMap<String, String>,
) -> AssignmentResult {
    let strategy = &experiment.strategy;
    let resolution = strategy.resolve(page_id, strategy.override_from(params));

    let outcome = match resolution.assignment {
        _ if resolution.overridden => "override",
        Some(Assignment::Bucket(_)) => "bucket",
        Some(Assignment::Unsampled) => "unsampled",
        None => "none",
    };
    metrics::record_outcome(outcome);

    if page_id.is_none() && !resolution.overridden {
        tracing::debug!(
            "No page id for experiment '{}', leaving unassigned",
            experiment.name()
        );
    }

    AssignmentResult {
        bucket: resolution.assignment.map(|a| a.name().to_string()),
        sampled: resolution.sampled,
        overridden: resolution.overridden,
    }
}
