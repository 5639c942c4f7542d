//! Canonical record digests and the run-wide deduplication index.
//!
//! Two records are duplicates when their canonical forms serialize to the
//! same bytes. The canonical form sorts object keys at every level, formats
//! numbers stably and, depending on [`NormalizationPolicy`], trims string
//! leaves and sorts lists made only of scalars. Lists holding objects or
//! nested lists keep their order; their elements are canonicalized in place.

use std::collections::HashSet;
use std::fmt;

use recordsmith_core::{Record, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Normalizations applied before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Trim leading and trailing whitespace from string leaves.
    pub trim_strings: bool,
    /// Sort lists whose elements are all strings, numbers or booleans.
    pub sort_scalar_lists: bool,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            trim_strings: true,
            sort_scalar_lists: true,
        }
    }
}

impl NormalizationPolicy {
    /// Hash records exactly as produced.
    pub fn strict() -> Self {
        Self {
            trim_strings: false,
            sort_scalar_lists: false,
        }
    }
}

/// A record that has no canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("non-finite float at {path}")]
    NonFiniteFloat { path: String },
}

/// SHA-256 digest of a record's canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordDigest([u8; 32]);

impl RecordDigest {
    pub fn of(record: &Record, policy: &NormalizationPolicy) -> Result<Self, DigestError> {
        let bytes = canonical_bytes(record, policy)?;
        let mut digest = [0_u8; 32];
        digest.copy_from_slice(&Sha256::digest(&bytes));
        Ok(Self(digest))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for RecordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Deterministic serialization of the canonical form of `record`.
pub fn canonical_bytes(record: &Record, policy: &NormalizationPolicy) -> Result<Vec<u8>, DigestError> {
    let mut out = Vec::with_capacity(64);
    write_record(record, policy, "", &mut out)?;
    Ok(out)
}

fn write_record(
    record: &Record,
    policy: &NormalizationPolicy,
    path: &str,
    out: &mut Vec<u8>,
) -> Result<(), DigestError> {
    let mut entries: Vec<(&str, &Value)> = record.iter().collect();
    entries.sort_by(|left, right| left.0.cmp(right.0));

    out.push(b'{');
    for (idx, (key, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(b',');
        }
        write_string(key, out);
        out.push(b':');
        write_value(value, policy, &format!("{path}/{key}"), out)?;
    }
    out.push(b'}');
    Ok(())
}

fn write_value(
    value: &Value,
    policy: &NormalizationPolicy,
    path: &str,
    out: &mut Vec<u8>,
) -> Result<(), DigestError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(flag) => out.extend_from_slice(if *flag { b"true" } else { b"false" }),
        Value::Int(number) => out.extend_from_slice(number.to_string().as_bytes()),
        Value::Float(number) => {
            let text = canonical_float(*number).ok_or_else(|| DigestError::NonFiniteFloat {
                path: path.to_string(),
            })?;
            out.extend_from_slice(text.as_bytes());
        }
        Value::Text(text) => write_string(normalized_text(text, policy), out),
        Value::Object(record) => write_record(record, policy, path, out)?,
        Value::List(items) => write_list(items, policy, path, out)?,
    }
    Ok(())
}

fn write_list(
    items: &[Value],
    policy: &NormalizationPolicy,
    path: &str,
    out: &mut Vec<u8>,
) -> Result<(), DigestError> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    if policy.sort_scalar_lists && items.iter().all(Value::is_scalar) {
        let mut keys = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            keys.push(scalar_sort_key(item, policy, &format!("{path}/{idx}"))?);
        }
        order.sort_by(|left, right| keys[*left].cmp(&keys[*right]));
    }

    out.push(b'[');
    for (position, idx) in order.into_iter().enumerate() {
        if position > 0 {
            out.push(b',');
        }
        write_value(&items[idx], policy, &format!("{path}/{idx}"), out)?;
    }
    out.push(b']');
    Ok(())
}

/// Sort key for a scalar list element: its canonical text, then a type rank
/// so that `"1"` and `1` order consistently.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ScalarKey {
    projection: String,
    rank: u8,
}

fn scalar_sort_key(
    value: &Value,
    policy: &NormalizationPolicy,
    path: &str,
) -> Result<ScalarKey, DigestError> {
    let (projection, rank) = match value {
        Value::Bool(flag) => (flag.to_string(), 0),
        Value::Int(number) => (number.to_string(), 1),
        Value::Float(number) => (
            canonical_float(*number).ok_or_else(|| DigestError::NonFiniteFloat {
                path: path.to_string(),
            })?,
            1,
        ),
        Value::Text(text) => (normalized_text(text, policy).to_string(), 2),
        _ => (String::new(), u8::MAX),
    };
    Ok(ScalarKey { projection, rank })
}

/// Shortest round-trip text for a finite float; integral values print like
/// integers and `-0.0` folds to `0`.
fn canonical_float(number: f64) -> Option<String> {
    if !number.is_finite() {
        return None;
    }
    if number == 0.0 {
        return Some("0".to_string());
    }
    Some(number.to_string())
}

fn normalized_text<'a>(text: &'a str, policy: &NormalizationPolicy) -> &'a str {
    if policy.trim_strings { text.trim() } else { text }
}

fn write_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in text.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            ch if (ch as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", ch as u32).as_bytes());
            }
            ch => {
                let mut buf = [0_u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// Counters exposed by [`Deduplicator::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub unique: u64,
    pub duplicates: u64,
    /// Records dropped because no digest could be computed.
    pub malformed: u64,
}

impl DedupStats {
    pub fn total_processed(&self) -> u64 {
        self.unique + self.duplicates + self.malformed
    }

    /// Share of checked records that were duplicates.
    pub fn duplicate_rate(&self) -> f64 {
        let checked = self.unique + self.duplicates;
        if checked == 0 {
            0.0
        } else {
            self.duplicates as f64 / checked as f64
        }
    }
}

/// Run-wide set of digests of admitted records.
///
/// The index only grows; it is never persisted.
#[derive(Debug, Default)]
pub struct Deduplicator {
    policy: NormalizationPolicy,
    seen: HashSet<RecordDigest>,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
            stats: DedupStats::default(),
        }
    }

    pub fn policy(&self) -> &NormalizationPolicy {
        &self.policy
    }

    /// Check-and-insert: true when the record was not seen before.
    ///
    /// Records without a canonical form count as malformed and are rejected.
    pub fn is_unique(&mut self, record: &Record) -> bool {
        match RecordDigest::of(record, &self.policy) {
            Ok(digest) => {
                if self.seen.insert(digest) {
                    self.stats.unique += 1;
                    true
                } else {
                    self.stats.duplicates += 1;
                    false
                }
            }
            Err(err) => {
                debug!(error = %err, "record dropped as malformed");
                self.stats.malformed += 1;
                false
            }
        }
    }

    /// Keep first occurrences, preserving input order.
    pub fn filter_unique(&mut self, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .filter(|record| self.is_unique(record))
            .collect()
    }

    /// Like [`filter_unique`](Self::filter_unique) but admits at most
    /// `limit` records; candidates after the limit is reached are not
    /// inspected and leave no trace in the index.
    pub fn filter_unique_limit(&mut self, records: Vec<Record>, limit: usize) -> Vec<Record> {
        let mut survivors = Vec::with_capacity(records.len().min(limit));
        for record in records {
            if survivors.len() >= limit {
                break;
            }
            if self.is_unique(&record) {
                survivors.push(record);
            }
        }
        survivors
    }

    pub fn contains(&self, digest: &RecordDigest) -> bool {
        self.seen.contains(digest)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}
