use crate::error::{Result, SamplingError};

/// Decides sampling status and bucket for a pre-computed random value in [0, 1).
///
/// A single value drives both decisions: scaled by the bucket count, its
/// integer part selects the bucket and its fractional part is compared against
/// the sampling ratio. Sampling and bucketing are therefore independent, and
/// raising the ratio never drops a value that was already sampled.
///
/// The two decisions are deliberately separate: `get_bucket` answers even for
/// values that are not sampled. Callers that need "sampled and in bucket X"
/// must check both.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingBucketEngine {
    sampling_ratio: f64,
    buckets: Vec<String>,
}

impl SamplingBucketEngine {
    /// Fails with `InvalidSamplingRatio` unless `0 <= sampling_ratio <= 1`.
    /// An empty bucket list is valid (sampling only, e.g. staged rollouts).
    pub fn new(sampling_ratio: f64, buckets: Vec<String>) -> Result<Self> {
        if !(0.0..=1.0).contains(&sampling_ratio) {
            return Err(SamplingError::InvalidSamplingRatio(sampling_ratio));
        }

        Ok(Self {
            sampling_ratio,
            buckets,
        })
    }

    pub fn sampling_ratio(&self) -> f64 {
        self.sampling_ratio
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    pub fn is_sampled(&self, random: f64) -> bool {
        let (_, fraction) = self.position(random);
        fraction < self.sampling_ratio
    }

    /// Returns `None` only when the bucket list is empty.
    pub fn get_bucket(&self, random: f64) -> Option<&str> {
        if self.buckets.is_empty() {
            return None;
        }

        let (index, _) = self.position(random);

        // Out-of-contract input (random >= 1) lands in the last bucket
        self.buckets
            .get(index.min(self.buckets.len() - 1))
            .map(String::as_str)
    }

    /// Integer and fractional part of `random * max(1, n)`.
    ///
    /// The product can round just below an exact boundary `k / n`; the index
    /// is corrected so the value lands in the half-open interval
    /// `[k / n, (k + 1) / n)` containing it, and the fraction is taken from
    /// the corrected index.
    fn position(&self, random: f64) -> (usize, f64) {
        let count = self.buckets.len().max(1);
        let scaled = random * count as f64;
        let mut index = scaled.floor().max(0.0) as usize;

        if (index + 1) as f64 / count as f64 <= random {
            index += 1;
        }

        let fraction = (scaled - index as f64).max(0.0);
        (index, fraction)
    }
}
