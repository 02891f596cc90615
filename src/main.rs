//! # linefreq
//!
//! Cross-document line frequencies for web crawl corpora, and boilerplate filtering based on them.
//!
//! ## Getting started
//!
//! ```sh
//! # count lines of every range of a snapshot, then merge the partials
//! linefreq hash corpus/ work/ --snapshot 2019-04
//! linefreq merge work/ --snapshot 2019-04
//!
//! # attach global counts to every line, then filter with several policies at once
//! linefreq annotate work/ --snapshot 2019-04
//! linefreq extract work/ --name 2019-04 --policy pld:2,50,1000 --sweep-k 1,3,5
//! ```
//!
//! Logging is controlled by `RUST_LOG` (e.g. `RUST_LOG=linefreq=info`).
use structopt::StructOpt;

use linefreq::error::Error;
use linefreq::filtering::{FilterPolicy, Ptf};
use linefreq::io::WorkDir;
use linefreq::pipelines::{
    sweep_grid, AnnotatePipeline, ExtractPipeline, HashPipeline, MergePipeline, Pipeline,
};
use linefreq::processing::ShardPlan;

#[macro_use]
extern crate log;

mod cli;

fn main() -> Result<(), Error> {
    env_logger::init();

    let opt = cli::Linefreq::from_args();
    debug!("cli args\n{:#?}", opt);
    let mut config = cli::load_config(opt.config.as_deref())?;

    match opt.cmd {
        cli::Command::Hash(h) => {
            let snapshots = h.snapshots.resolve()?;
            if let Some(files_per_range) = h.files_per_range {
                config.files_per_range = files_per_range;
            }
            if let Some(budget) = h.memory_budget {
                config.memory_budget = budget;
            }
            config.validate()?;
            let p = HashPipeline::new(h.src, WorkDir::new(h.work), snapshots, config)
                .ranges(h.ranges)
                .force(h.force);
            p.run()?;
        }

        cli::Command::Missing(m) => {
            let work = WorkDir::new(m.work);
            let mut nb_missing = 0;
            for snapshot in m.snapshots.resolve()? {
                let plan = ShardPlan::load(&work.plan_path(&snapshot))?;
                for range in plan.missing_ranges(&work) {
                    println!("{}\t{}", snapshot, range);
                    nb_missing += 1;
                }
            }
            info!("{} missing ranges", nb_missing);
        }

        cli::Command::Merge(m) => {
            let snapshots = m.snapshots.resolve()?;
            if let Some(budget) = m.memory_budget {
                config.memory_budget = budget;
            }
            if let Some(fan_in) = m.fan_in {
                config.fan_in = fan_in;
            }
            config.validate()?;
            let name = cli::table_name(m.name, &snapshots);
            let p = MergePipeline::new(WorkDir::new(m.work), name, snapshots, &config);
            p.run()?;
        }

        cli::Command::Annotate(a) => {
            let snapshots = a.snapshots.resolve()?;
            if let Some(budget) = a.memory_budget {
                config.memory_budget = budget;
            }
            if let Some(batch_size) = a.batch_size {
                config.batch_size = batch_size;
            }
            config.validate()?;
            let name = cli::table_name(a.name, &snapshots);
            let p = AnnotatePipeline::new(WorkDir::new(a.work), name, snapshots, config)
                .force(a.force);
            p.run()?;
        }

        cli::Command::Extract(e) => {
            let mut policies = e.policies;
            for k in e.sweep_k {
                policies.push(FilterPolicy::Ptf(Ptf::new(k)?));
            }
            if let Some(rules) = e.band_rules {
                policies = policies
                    .into_iter()
                    .map(|p| p.with_rules(rules))
                    .collect();
            }
            let extractions = sweep_grid(&policies, &e.punct_gap);
            let p = ExtractPipeline::new(WorkDir::new(e.work), e.name, extractions)?;
            p.run()?;
        }
    };
    Ok(())
}
