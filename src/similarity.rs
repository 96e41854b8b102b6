//! # Exact Similarity
//!
//! Jaccard similarity between signatures, bounded top-k selection and the
//! score-weighted neighbour vote used to classify a track.
//!
//! ## Tie-breaking
//!
//! - Top-k: a candidate must strictly beat the current window minimum to
//!   enter, so among equal scores the first-seen candidate stays. When several
//!   window slots share the minimum, the earliest slot is replaced.
//! - Ranking: descending score, then ascending candidate index.
//! - Vote: highest accumulated score, then the more severe label.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::corpus::ReferenceRecord;
use crate::shingle::SignatureSet;
use crate::Difficulty;

/// A selected candidate and its Jaccard similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Position of the candidate in the input sequence.
    pub index: usize,
    pub score: f64,
}

/// Outcome of the neighbour vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyVote {
    pub label: Difficulty,
    /// Accumulated similarity of the winning label.
    pub score: f64,
    /// Accumulated similarity per label present among the neighbours.
    pub tally: BTreeMap<Difficulty, f64>,
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`.
///
/// Two empty sets have similarity 0.0: tracks without signal are not
/// considered alike.
pub fn jaccard(a: &SignatureSet, b: &SignatureSet) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Up to `k` candidates with the highest Jaccard similarity to `query`.
///
/// Keeps a window of `k` picks and the position of its weakest entry instead
/// of sorting all candidates: O(n·k) worst case. Results come back in window
/// order, not sorted; use [`rank_by_similarity`] for a ranked list.
pub fn top_k_by_similarity<'a, I>(query: &SignatureSet, candidates: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = &'a SignatureSet>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut window: Vec<Neighbor> = Vec::with_capacity(k);
    let mut weakest = 0;

    for (index, candidate) in candidates.into_iter().enumerate() {
        let score = jaccard(query, candidate);

        if window.len() < k {
            window.push(Neighbor { index, score });
            if window.len() == k {
                weakest = weakest_slot(&window);
            }
            continue;
        }

        if score > window[weakest].score {
            window[weakest] = Neighbor { index, score };
            weakest = weakest_slot(&window);
        }
    }

    window
}

/// [`top_k_by_similarity`] sorted by descending score, ties by index.
pub fn rank_by_similarity<'a, I>(query: &SignatureSet, candidates: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = &'a SignatureSet>,
{
    let mut ranked = top_k_by_similarity(query, candidates, k);
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    ranked
}

/// Predict a difficulty from the `k` most similar reference records.
///
/// Each neighbour adds its similarity score to its label's total. Returns
/// `None` when there are no records or `k` is zero.
pub fn classify_by_knn(
    query: &SignatureSet,
    records: &[ReferenceRecord],
    k: usize,
) -> Option<DifficultyVote> {
    let neighbors = top_k_by_similarity(query, records.iter().map(|r| &r.signature), k);
    if neighbors.is_empty() {
        return None;
    }

    let mut tally: BTreeMap<Difficulty, f64> = BTreeMap::new();
    for n in &neighbors {
        *tally.entry(records[n.index].label).or_insert(0.0) += n.score;
    }

    // Labels iterate in severity order; equal totals resolve to the later one
    let (label, score) = tally.iter().fold(None, |best, (&label, &score)| match best {
        Some((_, best_score)) if score < best_score => best,
        _ => Some((label, score)),
    })?;

    Some(DifficultyVote {
        label,
        score,
        tally,
    })
}

/// Earliest slot holding the lowest score.
fn weakest_slot(window: &[Neighbor]) -> usize {
    let mut slot = 0;
    for (i, n) in window.iter().enumerate().skip(1) {
        if n.score < window[slot].score {
            slot = i;
        }
    }
    slot
}
