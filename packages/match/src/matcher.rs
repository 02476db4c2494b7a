//! Scored matching of an upload against known dataset fingerprints.

use std::collections::BTreeSet;

use field_sync_models::{DatasetFingerprint, MatchReason};
use geojson::FeatureCollection;

use crate::signature::{normalize_name, signature};

/// Similarity thresholds for attribute matching.
///
/// The defaults come from observed re-upload behavior rather than a derived
/// model; they are kept as data so deployments can recalibrate them.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchThresholds {
    /// Minimum shared token count that makes a match regardless of score.
    pub min_overlap: usize,
    /// Minimum mean of precision and recall that makes a match regardless
    /// of overlap.
    pub min_score: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            min_overlap: 3,
            min_score: 0.58,
        }
    }
}

/// The upload side of a match: its fallback name and computed signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFingerprint {
    /// Name the dataset would get if no match is found (typically the
    /// file stem).
    pub name: String,
    /// Signature of the uploaded collection.
    pub signature: BTreeSet<String>,
}

impl CandidateFingerprint {
    /// Builds a candidate from an uploaded collection and its fallback name.
    #[must_use]
    pub fn from_collection(name: &str, collection: &FeatureCollection) -> Self {
        Self {
            name: name.to_string(),
            signature: signature(collection),
        }
    }
}

/// A successful match against an existing dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Matched dataset id.
    pub dataset_id: String,
    /// Matched dataset display name.
    pub dataset_name: String,
    /// Why the match was made.
    pub reason: MatchReason,
}

/// Decides whether the candidate is a re-upload of a known dataset.
///
/// An empty candidate signature never matches (nothing to match on). An
/// exact normalized-name hit is authoritative and skips scoring entirely.
/// Otherwise every existing dataset with a non-empty signature is scored by
/// `overlap`, `precision = overlap/|candidate|`, `recall =
/// overlap/|existing|`, and `score = (precision + recall) / 2`; the best
/// dataset clearing `overlap >= min_overlap` or `score >= min_score` wins.
/// Ties keep the first-seen dataset (only a strictly greater score
/// replaces the running best).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn find_match(
    candidate: &CandidateFingerprint,
    existing: &[DatasetFingerprint],
    thresholds: &MatchThresholds,
) -> Option<MatchResult> {
    if candidate.signature.is_empty() {
        return None;
    }

    let wanted = normalize_name(&candidate.name);
    if !wanted.is_empty() {
        if let Some(hit) = existing
            .iter()
            .find(|dataset| normalize_name(&dataset.name) == wanted)
        {
            log::debug!("matched {:?} to {:?} by name", candidate.name, hit.name);
            return Some(MatchResult {
                dataset_id: hit.id.clone(),
                dataset_name: hit.name.clone(),
                reason: MatchReason::Name,
            });
        }
    }

    let mut best: Option<(f64, MatchResult)> = None;

    for dataset in existing {
        if dataset.signature.is_empty() {
            continue;
        }

        let overlap = candidate
            .signature
            .intersection(&dataset.signature)
            .count();
        // Disjoint signatures are never a match
        if overlap == 0 {
            continue;
        }

        let precision = overlap as f64 / candidate.signature.len() as f64;
        let recall = overlap as f64 / dataset.signature.len() as f64;
        let score = (precision + recall) / 2.0;

        if overlap < thresholds.min_overlap && score < thresholds.min_score {
            continue;
        }

        if best
            .as_ref()
            .is_none_or(|(best_score, _)| score > *best_score)
        {
            log::debug!(
                "candidate {:?} vs {:?}: overlap={overlap} score={score:.3}",
                candidate.name,
                dataset.name
            );
            best = Some((
                score,
                MatchResult {
                    dataset_id: dataset.id.clone(),
                    dataset_name: dataset.name.clone(),
                    reason: MatchReason::Attributes { score, overlap },
                },
            ));
        }
    }

    best.map(|(_, result)| result)
}
