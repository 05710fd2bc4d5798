//! Execution result types.
//!
//! Bitstring ordering: character `k` of a bitstring is the state of atom
//! `k` of the register, `1` meaning the atom was found in the Rydberg
//! state. For a register `q0, q1, q2`, `"100"` means only `q0` was excited.

use std::ops::Index;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Measurement counts from one execution.
///
/// Maps bitstrings to occurrence counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counts {
    counts: FxHashMap<String, u64>,
}

impl Counts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build counts from `(bitstring, count)` pairs, summing repeats.
    pub fn from_pairs(iter: impl IntoIterator<Item = (impl Into<String>, u64)>) -> Self {
        iter.into_iter()
            .map(|(bits, count)| (bits.into(), count))
            .collect()
    }

    /// Add `count` occurrences of `bitstring`.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        *self.counts.entry(bitstring.into()).or_default() += count;
    }

    pub fn get(&self, bitstring: &str) -> u64 {
        self.counts.get(bitstring).map_or(0, |&c| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counts.iter()
    }

    pub fn total_shots(&self) -> u64 {
        self.counts.values().copied().sum()
    }

    /// Number of atoms measured, taken from the longest bitstring.
    pub fn num_bits(&self) -> usize {
        self.counts.keys().map(String::len).max().unwrap_or(0)
    }

    /// Highest count; ties go to the smallest bitstring.
    pub fn most_frequent(&self) -> Option<(&String, &u64)> {
        self.sorted().into_iter().next()
    }

    pub fn probabilities(&self) -> FxHashMap<String, f64> {
        let total = self.total_shots();
        self.counts
            .iter()
            .filter_map(|(bits, &c)| Some((bits.clone(), fraction(c, total)?)))
            .collect()
    }

    /// Share of shots in which each atom ended in the Rydberg state, indexed
    /// like the register.
    pub fn rydberg_populations(&self) -> Vec<f64> {
        let mut excited = vec![0_u64; self.num_bits()];
        for (bits, &c) in &self.counts {
            for (k, _) in bits.char_indices().filter(|&(_, b)| b == '1') {
                excited[k] += c;
            }
        }
        let total = self.total_shots();
        excited
            .into_iter()
            .map(|e| fraction(e, total).unwrap_or(0.0))
            .collect()
    }

    /// Counts keyed by the integer each bitstring spells, read with the
    /// leftmost character as the most significant bit.
    ///
    /// Bitstrings that are not binary or do not fit in a `u64` are skipped.
    pub fn int_counts(&self) -> FxHashMap<u64, u64> {
        let mut out = FxHashMap::default();
        for (bits, &count) in &self.counts {
            if let Ok(value) = u64::from_str_radix(bits, 2) {
                *out.entry(value).or_default() += count;
            }
        }
        out
    }

    /// Counts sorted by count, descending. Ties are ordered by bitstring.
    pub fn sorted(&self) -> Vec<(&String, &u64)> {
        let mut items: Vec<_> = self.counts.iter().collect();
        items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        items
    }

    /// Number of distinct bitstrings.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(String, u64)> for Counts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut out = Self::new();
        iter.into_iter().for_each(|(bits, c)| out.insert(bits, c));
        out
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

/// Result of running one sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub counts: Counts,
    pub shots: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Backend-specific details, e.g. the emulator or batch id.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ExecutionResult {
    pub fn new(counts: Counts, shots: u32) -> Self {
        Self {
            counts,
            shots,
            execution_time_ms: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = Some(time_ms);
        self
    }

    /// Attach backend details. Objects are merged into existing metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match (&mut self.metadata, metadata) {
            (serde_json::Value::Object(current), serde_json::Value::Object(extra)) => {
                current.extend(extra);
            }
            (current, extra) => *current = extra,
        }
        self
    }

    pub fn probabilities(&self) -> FxHashMap<String, f64> {
        self.counts.probabilities()
    }

    /// The most frequent bitstring and its probability.
    pub fn most_frequent(&self) -> Option<(&String, f64)> {
        let total = self.counts.total_shots();
        let (bits, &c) = self.counts.most_frequent()?;
        Some((bits, fraction(c, total)?))
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::new(Counts::new(), 0)
    }
}

/// Outcome of one sampler pub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerPubResult {
    pub counts: Counts,
    pub shots: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl From<ExecutionResult> for SamplerPubResult {
    fn from(result: ExecutionResult) -> Self {
        Self {
            counts: result.counts,
            shots: result.shots,
            metadata: result.metadata,
        }
    }
}

/// Results of a sampler run, one entry per pub in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerResult {
    pub pub_results: Vec<SamplerPubResult>,
    pub backend_name: String,
    pub job_ids: Vec<JobId>,
    pub date: DateTime<Utc>,
}

impl SamplerResult {
    pub fn len(&self) -> usize {
        self.pub_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pub_results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SamplerPubResult> {
        self.pub_results.iter()
    }
}

impl Index<usize> for SamplerResult {
    type Output = SamplerPubResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.pub_results[index]
    }
}
