//! Grounding-context selection for chat answers.
//!
//! A chat answer is grounded on a wider candidate set than a plain query:
//! fetch `candidate_k` results, drop chunks that carry no information, then
//! spread the selection across source types so one noisy integration cannot
//! crowd out the rest.

use regex::RegexSet;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::config::RetrievalConfig;
use crate::models::SimilarityResult;

/// Slack system messages that never help answer a question.
const SLACK_NOISE_PATTERNS: &[&str] = &[
    r"(?i)has joined the channel",
    r"(?i)has left the channel",
    r"(?i)set the channel topic",
    r"(?i)pinned a message",
    r"(?i)unpinned a message",
    r"(?i)uploaded a file",
    r"(?i)started a call",
    r"(?i)ended a call",
    r"(?i)changed the channel name",
    r"(?i)archived this channel",
    r"(?i)unarchived this channel",
    r"(?i)<@U[A-Z0-9]+> has joined",
    r"(?i)<@U[A-Z0-9]+> has left",
];

static SLACK_NOISE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(SLACK_NOISE_PATTERNS).expect("slack noise patterns are valid")
});

/// Drop chunks too short to be useful and Slack system messages.
pub fn filter_low_quality(
    results: Vec<SimilarityResult>,
    config: &RetrievalConfig,
) -> Vec<SimilarityResult> {
    results
        .into_iter()
        .filter(|r| {
            let len = r.chunk_text.trim().chars().count();
            if r.source_type == "slack"
                && (SLACK_NOISE.is_match(&r.chunk_text) || len < config.min_slack_message_length)
            {
                return false;
            }
            len >= config.min_chunk_length
        })
        .collect()
}

/// Spread the selection across source types.
///
/// Takes up to `max_per_source_type` chunks from each source type (source
/// types in first-seen order), tops up with the best remaining chunks until
/// `target` is reached, and re-sorts by descending score. When there are
/// more source types than `target / max_per_source_type`, the per-type
/// picks may exceed `target`; every source type keeps its share.
pub fn ensure_source_diversity(
    results: Vec<SimilarityResult>,
    max_per_source_type: usize,
    target: usize,
) -> Vec<SimilarityResult> {
    let mut taken_per_type: HashMap<String, usize> = HashMap::new();
    let mut selected = vec![false; results.len()];
    let mut selected_count = 0;

    for (i, r) in results.iter().enumerate() {
        let taken = taken_per_type.entry(r.source_type.clone()).or_insert(0);
        if *taken < max_per_source_type {
            *taken += 1;
            selected[i] = true;
            selected_count += 1;
        }
    }

    for flag in selected.iter_mut() {
        if selected_count >= target {
            break;
        }
        if !*flag {
            *flag = true;
            selected_count += 1;
        }
    }

    let mut picked: Vec<SimilarityResult> = results
        .into_iter()
        .zip(selected)
        .filter_map(|(r, keep)| keep.then_some(r))
        .collect();
    picked.sort_by(|a, b| b.score.total_cmp(&a.score));
    picked
}

/// Full selection pipeline for chat context.
pub fn select_context(
    candidates: Vec<SimilarityResult>,
    config: &RetrievalConfig,
) -> Vec<SimilarityResult> {
    let filtered = filter_low_quality(candidates, config);
    ensure_source_diversity(
        filtered,
        config.max_chunks_per_source_type,
        config.max_context_chunks,
    )
}

/// What a chat context selection contains, per source type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub chunks_found: usize,
    /// Source types in the order they first appear in the selection.
    pub source_types_found: Vec<String>,
    pub source_type_distribution: BTreeMap<String, usize>,
}

pub fn summarize(results: &[SimilarityResult]) -> ContextSummary {
    let mut source_types_found: Vec<String> = Vec::new();
    let mut source_type_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for r in results {
        let count = source_type_distribution
            .entry(r.source_type.clone())
            .or_insert(0);
        if *count == 0 {
            source_types_found.push(r.source_type.clone());
        }
        *count += 1;
    }
    ContextSummary {
        chunks_found: results.len(),
        source_types_found,
        source_type_distribution,
    }
}
