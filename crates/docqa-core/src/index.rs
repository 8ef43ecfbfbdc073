//! Exact k-nearest-neighbor ranking over stored passages.
//!
//! Every [`VectorIndex`](crate::store::VectorIndex) implementation hands its
//! candidate passages to [`rank_passages`], so access filtering and ordering
//! are identical no matter where vectors are stored.
//!
//! Ranking is a full linear scan. Passages outside the allowed set are
//! removed *before* selection, so an inaccessible passage never displaces an
//! accessible one. Equal similarities are ordered by `document_id`
//! ascending, then `chunk_index` ascending.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::models::{Passage, ScoredPassage};

/// Rank `passages` against `query_vec` and keep the best `k`.
///
/// `allowed = None` means every passage is eligible; `Some(set)` restricts
/// ranking to passages of documents in `set` (an empty set yields nothing).
pub fn rank_passages<I>(
    passages: I,
    query_vec: &[f32],
    k: usize,
    allowed: Option<&HashSet<String>>,
) -> Vec<ScoredPassage>
where
    I: IntoIterator<Item = Passage>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredPassage> = passages
        .into_iter()
        .filter(|p| allowed.map_or(true, |ids| ids.contains(&p.document_id)))
        .map(|passage| {
            let similarity = cosine_similarity(query_vec, &passage.vector);
            ScoredPassage {
                passage,
                similarity,
            }
        })
        .collect();

    scored.sort_by(compare_ranked);
    scored.truncate(k);
    scored
}

fn compare_ranked(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
        .then_with(|| a.passage.chunk_index.cmp(&b.passage.chunk_index))
}
