pub mod assignment;
pub mod bucket;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod registry;
pub mod resolve;
pub mod server;
pub mod watcher;

// Re-export commonly used items
pub use assignment::{Assignment, AssignmentStrategy, Override, Resolution, UNSAMPLED_BUCKET};
pub use bucket::SamplingBucketEngine;
pub use catalog::{Experiment, ExperimentCatalog, ExperimentDef};
pub use error::{Result, SamplingError};
pub use hash::{hash_identifier, HashAlgorithm, IdentifierHasher};
pub use registry::ExperimentRegistry;
