//! Identity keys and target deduplication.
//!
//! Suspected targets arrive from two places: supplied directly on the request
//! or extracted from auxiliary documents. Both are keyed by the canonical
//! structure hash so one logical molecule yields one matrix row per claim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborators::NormalizedMolecule;

/// Stable SHA-256 fingerprint over an ordered list of parts.
///
/// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

/// Order-insensitive fingerprint of a set of identifiers.
pub fn set_fingerprint<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = items
        .into_iter()
        .map(|s| s.as_ref().trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    fingerprint(normalized)
}

/// Where a suspected target came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSource {
    /// Listed on the request.
    Direct,
    /// Extracted from an auxiliary document.
    Extracted { document_id: String },
}

/// A deduplicated target with every source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub molecule: NormalizedMolecule,
    pub sources: Vec<TargetSource>,
}

/// Merges targets sharing a structure hash, keeping first-seen order.
pub fn dedup_targets<I>(candidates: I) -> Vec<Target>
where
    I: IntoIterator<Item = (NormalizedMolecule, TargetSource)>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut targets: Vec<Target> = Vec::new();

    for (molecule, source) in candidates {
        match index.get(&molecule.structure_hash) {
            Some(&pos) => {
                let existing = &mut targets[pos];
                if !existing.sources.contains(&source) {
                    existing.sources.push(source);
                }
            }
            None => {
                index.insert(molecule.structure_hash.clone(), targets.len());
                targets.push(Target {
                    molecule,
                    sources: vec![source],
                });
            }
        }
    }

    targets
}
