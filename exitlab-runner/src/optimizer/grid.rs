//! Parameter grid — cartesian product, seeded sampling, combination ids.
//!
//! Combinations are addressed by their index in the full product (mixed-radix
//! over the axes, last axis fastest), so a sample never materializes the
//! whole grid.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{CombinationId, ConfigError};

use super::params::ParamName;

/// One parameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub index: usize,
    pub params: Vec<(ParamName, Decimal)>,
}

impl Combination {
    /// Parameter name → value, keyed by the configured name.
    pub fn named(&self) -> BTreeMap<String, Decimal> {
        self.params
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    /// BLAKE3 over the canonical JSON of the named assignment.
    pub fn id(&self) -> CombinationId {
        let json = serde_json::to_string(&self.named()).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(ParamName, Vec<Decimal>)>,
}

impl ParamGrid {
    pub fn new(axes: Vec<(ParamName, Vec<Decimal>)>) -> Self {
        Self { axes }
    }

    pub fn axes(&self) -> &[(ParamName, Vec<Decimal>)] {
        &self.axes
    }

    /// Size of the full product; `None` on overflow.
    pub fn size(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
    }

    /// Decode the combination at `index` of the full product.
    pub fn combination(&self, index: usize) -> Combination {
        let mut rem = index;
        let mut params = vec![(ParamName::StopLossPercentage, Decimal::ZERO); self.axes.len()];
        for (slot, (name, values)) in self.axes.iter().enumerate().rev() {
            let radix = values.len().max(1);
            params[slot] = (*name, values[rem % radix]);
            rem /= radix;
        }
        Combination { index, params }
    }

    /// Indices to run: the whole product when it fits in `max`, otherwise a
    /// seeded sample of exactly `max` distinct indices (sorted) when sampling
    /// is allowed.
    pub fn plan(&self, max: usize, sample: bool, seed: u64) -> Result<Vec<usize>, ConfigError> {
        match self.size() {
            Some(n) if n <= max => Ok((0..n).collect()),
            Some(n) if sample => {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut picked = rand::seq::index::sample(&mut rng, n, max).into_vec();
                picked.sort_unstable();
                Ok(picked)
            }
            size => Err(ConfigError::TooManyCombinations {
                combinations: size
                    .map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string()),
                max,
            }),
        }
    }

    pub fn combinations(&self, indices: &[usize]) -> Vec<Combination> {
        indices.iter().map(|&i| self.combination(i)).collect()
    }
}
