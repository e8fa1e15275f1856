// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Weight key normalization
//!
//! Training runs serialize the same network under different key layouts:
//! `module.` when wrapped for multi-device training, `model.` when the network
//! sits inside a wrapper module. The normalizer never decides which layout is
//! right. It produces an ordered list of candidates; the loader tries each one
//! (filtered first, then full) until a load attempt succeeds.

use std::collections::BTreeSet;

use super::blob::WeightBlob;

/// Prefix added by multi-device training wrappers
pub const WRAPPER_PREFIX: &str = "module.";

/// Prefix added when the network is held by a wrapper module
pub const SECONDARY_PREFIX: &str = "model.";

/// How a candidate's keys were derived from the cleaned blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateVariant {
    AsIs,
    SecondaryStripped,
    SecondaryAdded,
    BothStripped,
}

impl CandidateVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsIs => "as-is",
            Self::SecondaryStripped => "secondary-stripped",
            Self::SecondaryAdded => "secondary-added",
            Self::BothStripped => "both-stripped",
        }
    }
}

/// One key layout to attempt
#[derive(Debug, Clone)]
pub struct Candidate {
    pub variant: CandidateVariant,
    /// Every key of the rewritten blob
    pub full: WeightBlob,
    /// Only the keys the target architecture expects
    pub filtered: WeightBlob,
}

impl Candidate {
    /// Attempt order: filtered before full
    pub fn attempts(&self) -> [&WeightBlob; 2] {
        [&self.filtered, &self.full]
    }
}

#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    wrapper_prefix: String,
    secondary_prefix: String,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(WRAPPER_PREFIX, SECONDARY_PREFIX)
    }
}

impl KeyNormalizer {
    pub fn new(wrapper_prefix: impl Into<String>, secondary_prefix: impl Into<String>) -> Self {
        Self {
            wrapper_prefix: wrapper_prefix.into(),
            secondary_prefix: secondary_prefix.into(),
        }
    }

    /// Strip the wrapper prefix from every key carrying it, if any key does.
    ///
    /// A blob with no wrapper keys comes back unchanged.
    pub fn clean(&self, blob: &WeightBlob) -> WeightBlob {
        if blob.keys().any(|k| k.starts_with(&self.wrapper_prefix)) {
            strip_prefix(blob, &self.wrapper_prefix)
        } else {
            blob.clone()
        }
    }

    /// Candidate layouts for `blob`, deduplicated by key set, in attempt order
    pub fn candidates(&self, blob: &WeightBlob, expected: &BTreeSet<String>) -> Vec<Candidate> {
        let base = self.clean(blob);

        let variants = [
            (CandidateVariant::AsIs, base.clone()),
            (
                CandidateVariant::SecondaryStripped,
                strip_prefix(&base, &self.secondary_prefix),
            ),
            (
                CandidateVariant::SecondaryAdded,
                add_prefix(&base, &self.secondary_prefix),
            ),
            (
                CandidateVariant::BothStripped,
                strip_prefix(
                    &strip_prefix(&base, &self.secondary_prefix),
                    &self.wrapper_prefix,
                ),
            ),
        ];

        let mut seen: Vec<BTreeSet<String>> = Vec::new();
        let mut candidates = Vec::new();
        for (variant, full) in variants {
            let key_set = full.key_set();
            if seen.contains(&key_set) {
                continue;
            }
            seen.push(key_set);

            let filtered = full
                .iter()
                .filter(|(k, _)| expected.contains(*k))
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();

            candidates.push(Candidate {
                variant,
                full,
                filtered,
            });
        }

        candidates
    }
}

fn strip_prefix(blob: &WeightBlob, prefix: &str) -> WeightBlob {
    blob.iter()
        .map(|(k, v)| {
            let key = k.strip_prefix(prefix).unwrap_or(k);
            (key.to_string(), v.clone())
        })
        .collect()
}

fn add_prefix(blob: &WeightBlob, prefix: &str) -> WeightBlob {
    blob.iter()
        .map(|(k, v)| (format!("{}{}", prefix, k), v.clone()))
        .collect()
}
