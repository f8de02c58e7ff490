// Pipeline processing: expansion, normalization, widening, and unification

pub mod expand;
pub mod flatten;
pub mod normalize;
pub mod prune;
pub mod unify;

// Re-export key types and functions
pub use expand::{expand, ExpandedRow, ExpandedTable};
pub use flatten::{flatten, flatten_nested_fields, FlattenOutcome, PassContext, PassSummary};
pub use normalize::{normalize_element, unwrap_collection};
pub use prune::PrunePolicy;
