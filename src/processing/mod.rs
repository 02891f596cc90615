/*! Content processing

Stage level operations, each working on a single unit (a shard range, a set of partials,
a corpus file, a count info file). Orchestration over many units lives in [crate::pipelines].
!*/
pub mod annotate;
pub mod extract;
pub mod hash;
pub mod kway;
pub mod merge;
pub mod plan;
pub mod table;

pub use plan::ShardPlan;
