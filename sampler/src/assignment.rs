use crate::bucket::SamplingBucketEngine;
use crate::hash::IdentifierHasher;
use serde::Serialize;
use std::collections::HashMap;

/// Reserved bucket name for ids that fall outside the sample
pub const UNSAMPLED_BUCKET: &str = "unsampled";

/// Explicit bucket choice taken from a request parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    Unset,
    False,
    True,
}

impl Override {
    /// Absent parameter is `Unset`. `""`, `0`, `false`, `no` and `off`
    /// (case-insensitive) are `False`, any other value is `True`.
    pub fn from_param(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Override::Unset;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" | "off" => Override::False,
            _ => Override::True,
        }
    }

    /// Bucket index forced by this override
    pub fn bucket_index(self) -> Option<usize> {
        match self {
            Override::Unset => None,
            Override::False => Some(0),
            Override::True => Some(1),
        }
    }
}

/// Outcome of bucket resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment<'a> {
    Bucket(&'a str),
    Unsampled,
}

impl<'a> Assignment<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Assignment::Bucket(name) => name,
            Assignment::Unsampled => UNSAMPLED_BUCKET,
        }
    }
}

/// Outcome of `AssignmentStrategy::resolve`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub assignment: Option<Assignment<'a>>,
    /// `None` when overridden or when no page id was available
    pub sampled: Option<bool>,
    pub overridden: bool,
}

/// Hash-based experiment assignment with an optional request override.
///
/// When the configured override parameter is present on the request, the
/// bucket is taken from it directly and the page id is never hashed.
#[derive(Debug, Clone)]
pub struct AssignmentStrategy {
    engine: SamplingBucketEngine,
    hasher: IdentifierHasher,
    override_param: Option<String>,
}

impl AssignmentStrategy {
    pub fn new(
        engine: SamplingBucketEngine,
        hasher: IdentifierHasher,
        override_param: Option<String>,
    ) -> Self {
        Self {
            engine,
            hasher,
            override_param,
        }
    }

    pub fn engine(&self) -> &SamplingBucketEngine {
        &self.engine
    }

    pub fn hasher(&self) -> &IdentifierHasher {
        &self.hasher
    }

    pub fn override_param(&self) -> Option<&str> {
        self.override_param.as_deref()
    }

    /// Read the override for this strategy from request parameters
    pub fn override_from(&self, params: &HashMap<String, String>) -> Override {
        match &self.override_param {
            Some(name) => Override::from_param(params.get(name).map(String::as_str)),
            None => Override::Unset,
        }
    }

    pub fn resolve_bucket(
        &self,
        page_id: u64,
        params: &HashMap<String, String>,
    ) -> Option<Assignment<'_>> {
        self.resolve_with_override(page_id, self.override_from(params))
    }

    pub fn resolve_with_override(&self, page_id: u64, forced: Override) -> Option<Assignment<'_>> {
        self.resolve(Some(page_id), forced).assignment
    }

    /// Full decision for one page.
    ///
    /// An override wins without touching the page id. Without an override, a
    /// missing page id yields no assignment; otherwise the id is hashed once
    /// and that value drives both the sampling status and the bucket.
    pub fn resolve(&self, page_id: Option<u64>, forced: Override) -> Resolution<'_> {
        if let Some(index) = forced.bucket_index() {
            return Resolution {
                assignment: self.forced_bucket(index),
                sampled: None,
                overridden: true,
            };
        }

        let Some(page_id) = page_id else {
            return Resolution {
                assignment: None,
                sampled: None,
                overridden: false,
            };
        };

        let random = self.hasher.hash(page_id);
        let sampled = self.engine.is_sampled(random);
        let assignment = if sampled {
            self.engine.get_bucket(random).map(Assignment::Bucket)
        } else {
            Some(Assignment::Unsampled)
        };

        Resolution {
            assignment,
            sampled: Some(sampled),
            overridden: false,
        }
    }

    /// Bucket at a forced index, `None` when the list is too short
    pub fn forced_bucket(&self, index: usize) -> Option<Assignment<'_>> {
        self.engine
            .buckets()
            .get(index)
            .map(|name| Assignment::Bucket(name.as_str()))
    }

    /// Sampling gate without bucketing, used for staged rollouts
    pub fn is_sampled(&self, page_id: u64) -> bool {
        self.engine.is_sampled(self.hasher.hash(page_id))
    }
}
