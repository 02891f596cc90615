//! Pipelines.
//!
//! One pipeline per stage, each running its stage over every unit of work (ranges, files)
//! in parallel. The module provides a light [pipeline::Pipeline] trait
//! returning the run statistics of the stage.
mod annotation;
mod extraction;
mod hashing;
mod merging;
pub mod pipeline;

pub use annotation::AnnotatePipeline;
pub use extraction::{sweep_grid, ExtractPipeline};
pub use hashing::HashPipeline;
pub use merging::MergePipeline;
pub use pipeline::Pipeline;
