use std::{cmp::Ordering, collections::HashMap};

use common::storage::types::thread_setting::SearchMode;
use serde::Serialize;

/// A chunk returned by one retrieval signal, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub chunk_id: String,
    pub scope: Option<String>,
}

impl Candidate {
    pub fn new(chunk_id: impl Into<String>, scope: Option<&str>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            scope: scope.map(str::to_string),
        }
    }
}

/// A chunk after reciprocal rank fusion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedCandidate {
    pub chunk_id: String,
    pub scope: Option<String>,
    /// 1-based position in the dense list.
    pub dense_rank: Option<usize>,
    /// 1-based position in the lexical list.
    pub lexical_rank: Option<usize>,
    pub rrf_score: f64,
    pub same_scope: bool,
}

/// Scope context and mode applied to a fused candidate set.
#[derive(Debug, Clone, Copy)]
pub struct ScopeRule<'a> {
    pub mode: SearchMode,
    pub context: Option<&'a str>,
}

impl<'a> ScopeRule<'a> {
    pub const fn new(mode: SearchMode, context: Option<&'a str>) -> Self {
        Self { mode, context }
    }

    pub fn is_same_scope(&self, scope: Option<&str>) -> bool {
        matches!((self.context, scope), (Some(context), Some(scope)) if context == scope)
    }

    /// `ISOLATED` keeps the context's own chunks and scope-less ones; `PRIORITY` keeps all.
    pub fn is_visible(&self, scope: Option<&str>) -> bool {
        match self.mode {
            SearchMode::Priority => true,
            SearchMode::Isolated => scope.is_none() || self.is_same_scope(scope),
        }
    }
}

fn rrf_term(k: f64, rank: usize) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuses two ranked lists into their full outer union.
///
/// A chunk scores `1/(k + rank)` for each list it appears in. Output keeps first-seen
/// order (dense list first, then lexical), which later serves as the stable tie-break.
/// A chunk repeated within one list keeps its best rank.
pub fn reciprocal_rank_fusion(
    dense: &[Candidate],
    lexical: &[Candidate],
    k: f64,
) -> Vec<FusedCandidate> {
    let k = if k.is_finite() && k > 0.0 { k } else { 60.0 };
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::with_capacity(dense.len() + lexical.len());

    for (signal, list) in [(Signal::Dense, dense), (Signal::Lexical, lexical)] {
        for (index, candidate) in list.iter().enumerate() {
            let rank = index + 1;
            let slot = *positions
                .entry(candidate.chunk_id.clone())
                .or_insert_with(|| {
                    fused.push(FusedCandidate {
                        chunk_id: candidate.chunk_id.clone(),
                        scope: candidate.scope.clone(),
                        dense_rank: None,
                        lexical_rank: None,
                        rrf_score: 0.0,
                        same_scope: false,
                    });
                    fused.len() - 1
                });

            let Some(entry) = fused.get_mut(slot) else {
                continue;
            };
            let rank_slot = match signal {
                Signal::Dense => &mut entry.dense_rank,
                Signal::Lexical => &mut entry.lexical_rank,
            };
            if rank_slot.is_none() {
                *rank_slot = Some(rank);
                entry.rrf_score += rrf_term(k, rank);
            }
        }
    }

    fused
}

#[derive(Clone, Copy)]
enum Signal {
    Dense,
    Lexical,
}

/// Drops invisible chunks, then orders by same-scope first and RRF score descending.
/// The sort is stable, so ties keep fusion order.
pub fn apply_scope_rules(fused: Vec<FusedCandidate>, rule: ScopeRule<'_>) -> Vec<FusedCandidate> {
    let mut visible: Vec<FusedCandidate> = fused
        .into_iter()
        .filter(|candidate| rule.is_visible(candidate.scope.as_deref()))
        .map(|mut candidate| {
            candidate.same_scope = rule.is_same_scope(candidate.scope.as_deref());
            candidate
        })
        .collect();

    visible.sort_by(|a, b| {
        b.same_scope.cmp(&a.same_scope).then_with(|| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(Ordering::Equal)
        })
    });
    visible
}

/// Full hybrid ranking: fuse, filter by scope, order, truncate to `final_k`.
pub fn rank_hybrid(
    dense: &[Candidate],
    lexical: &[Candidate],
    rule: ScopeRule<'_>,
    rrf_k: u32,
    final_k: usize,
) -> Vec<FusedCandidate> {
    let fused = reciprocal_rank_fusion(dense, lexical, f64::from(rrf_k));
    let mut ranked = apply_scope_rules(fused, rule);
    ranked.truncate(final_k);
    ranked
}
