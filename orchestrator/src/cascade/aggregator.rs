// Aggregator: ranks and truncates per-theme hits into the response contract

use super::retriever::{RawOutcome, RawThemeResult};
use crate::models::{CascadeResponse, CascadeResult, Hit, ThemeStatus};

/// Shape raw per-theme outcomes into a response.
///
/// Input order is kept as theme order. Hits are ordered by descending score
/// with ties left in the index's order, then cut to `top_k`. Nothing is
/// merged or deduplicated across themes.
pub fn assemble(per_theme_raw: Vec<RawThemeResult>, top_k: usize) -> CascadeResponse {
    let results = per_theme_raw
        .into_iter()
        .map(|raw| {
            let (hits, status) = match raw.outcome {
                RawOutcome::Hits(hits) => (rank(hits, top_k), ThemeStatus::Ok),
                RawOutcome::Failed(reason) => (Vec::new(), ThemeStatus::Failed { reason }),
                RawOutcome::Skipped(reason) => (Vec::new(), ThemeStatus::Skipped { reason }),
                RawOutcome::Aborted(reason) => (Vec::new(), ThemeStatus::Aborted { reason }),
            };
            CascadeResult {
                theme: raw.theme,
                sub_query: raw.sub_query,
                hits,
                status,
            }
        })
        .collect();

    CascadeResponse { results }
}

fn rank(mut hits: Vec<Hit>, top_k: usize) -> Vec<Hit> {
    // `sort_by` is stable; equal scores keep their input positions.
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits
}
