use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Width of the digest prefix (6 hex characters)
const PREFIX_BITS: u32 = 24;

/// 2^24, the size of the prefix space
const PREFIX_RANGE: f64 = 16_777_216.0;

/// Hash values are reported on a 0.001 grid
const PRECISION: f64 = 1000.0;

/// Largest value on the grid below 1.0
const MAX_HASH: f64 = 0.999;

/// Digest used to derive the 24-bit prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// MD5 of the decimal id. Agrees with existing consumers of the sampling data.
    #[default]
    Md5,
    /// XXH3-64 of the decimal id. Faster, but not comparable with MD5 assignments.
    Xxh3,
}

/// Maps a page id to a stable pseudo-random value in [0, 1).
///
/// The value is the first 24 bits of the digest of the id's decimal string,
/// divided by 2^24 and rounded to 3 decimal places. A value that would round
/// up to 1.000 is reported as 0.999 so the result never leaves [0, 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentifierHasher {
    algorithm: HashAlgorithm,
}

impl IdentifierHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hash(&self, id: u64) -> f64 {
        let prefix = match self.algorithm {
            HashAlgorithm::Md5 => md5_prefix(id),
            HashAlgorithm::Xxh3 => xxh3_prefix(id),
        };
        normalize(prefix)
    }
}

/// Hash an id with the default (MD5) hasher
pub fn hash_identifier(id: u64) -> f64 {
    IdentifierHasher::default().hash(id)
}

fn md5_prefix(id: u64) -> u32 {
    let digest = Md5::digest(id.to_string().as_bytes());
    u32::from_be_bytes([0, digest[0], digest[1], digest[2]])
}

fn xxh3_prefix(id: u64) -> u32 {
    // Top bits, same reading order as the hex prefix of the MD5 path
    (xxh3_64(id.to_string().as_bytes()) >> (64 - PREFIX_BITS)) as u32
}

fn normalize(prefix: u32) -> f64 {
    let value = f64::from(prefix) / PREFIX_RANGE;
    ((value * PRECISION).round() / PRECISION).min(MAX_HASH)
}
