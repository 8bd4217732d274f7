use alloy_primitives::B256;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::logs::LogEvent;
use crate::reconciler::canonical::canonical_keys;

/// Canonical keys for one side of a window and the digest over them.
#[derive(Debug, Clone)]
pub struct DigestedLogs {
    pub keys: Vec<String>,
    pub digest: B256,
}

impl DigestedLogs {
    pub fn new(logs: &[LogEvent], ignore_order: bool) -> Self {
        let mut keys = canonical_keys(logs);
        if ignore_order {
            keys.sort_unstable();
        }
        let digest = digest_keys(&keys);
        Self { keys, digest }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// SHA-256 over the keys joined with `\n`.
pub fn digest_keys(keys: &[String]) -> B256 {
    let mut hasher = Sha256::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(key.as_bytes());
    }
    B256::from(<[u8; 32]>::from(hasher.finalize()))
}

/// Where two key sequences first disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    At {
        index: usize,
        first: String,
        second: String,
    },
    LengthDiffers {
        first: usize,
        second: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Equal,
    Mismatch(Option<Divergence>),
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub first: DigestedLogs,
    pub second: DigestedLogs,
    pub verdict: Verdict,
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        self.verdict == Verdict::Equal
    }

    pub fn divergence(&self) -> Option<&Divergence> {
        match &self.verdict {
            Verdict::Mismatch(divergence) => divergence.as_ref(),
            Verdict::Equal => None,
        }
    }
}

pub fn compare(first: &[LogEvent], second: &[LogEvent], ignore_order: bool) -> Comparison {
    let first = DigestedLogs::new(first, ignore_order);
    let second = DigestedLogs::new(second, ignore_order);

    // The positional scan only runs once the digests disagree
    let verdict = if first.digest == second.digest {
        Verdict::Equal
    } else {
        Verdict::Mismatch(locate_divergence(&first.keys, &second.keys))
    };

    Comparison {
        first,
        second,
        verdict,
    }
}

/// Best-effort localization of the first difference between two key sequences.
pub fn locate_divergence(first: &[String], second: &[String]) -> Option<Divergence> {
    if let Some(index) = first.iter().zip(second).position(|(a, b)| a != b) {
        return Some(Divergence::At {
            index,
            first: first[index].clone(),
            second: second[index].clone(),
        });
    }

    if first.len() != second.len() {
        return Some(Divergence::LengthDiffers {
            first: first.len(),
            second: second.len(),
        });
    }

    None
}
