pub mod candidates;
pub mod index;
pub mod parents;
pub mod scoring;
pub mod search;

pub use index::KnowledgeIndex;
pub use parents::{resolve_parents, unique_parent_ids};
pub use scoring::{
    apply_scope_rules, rank_hybrid, reciprocal_rank_fusion, Candidate, FusedCandidate, ScopeRule,
};
pub use search::{KnowledgeSearch, RetrievedDocument};
