//! Hash merging pipeline.
use log::info;

use super::pipeline::Pipeline;
use crate::config::Config;
use crate::error::Error;
use crate::io::WorkDir;
use crate::processing::merge::{merge, MergeOptions, MergeStats};

pub struct MergePipeline {
    work: WorkDir,
    name: String,
    snapshots: Vec<String>,
    options: MergeOptions,
}

impl MergePipeline {
    pub fn new(work: WorkDir, name: String, snapshots: Vec<String>, config: &Config) -> Self {
        Self {
            work,
            name,
            snapshots,
            options: MergeOptions {
                memory_budget: config.memory_budget.0,
                fan_in: config.fan_in,
            },
        }
    }
}

impl Pipeline<MergeStats> for MergePipeline {
    fn run(&self) -> Result<MergeStats, Error> {
        if self.snapshots.is_empty() {
            return Err(Error::Custom(format!(
                "[{}] no snapshot to merge",
                self.name
            )));
        }
        info!(
            "[{}] merging snapshots {}",
            self.name,
            self.snapshots.join(", ")
        );
        merge(&self.work, &self.name, &self.snapshots, &self.options)
    }
}
