/*! # linefreq

Builds a cross-document line frequency index over web crawl corpora,
and uses it to filter out boilerplate lines.

Stages run in order, each one consuming the complete output of the previous one:

1. hashing ([processing::hash]): per shard range, the number of documents containing each normalized line,
2. merging ([processing::merge]): partials summed into a frequency table,
3. annotation ([processing::annotate]): corpus lines paired with their global count (count info),
4. extraction ([processing::extract]): count info filtered by [filtering] policies.

[pipelines] run each stage over a whole work directory ([io::WorkDir]).
!*/
pub mod config;
pub mod error;
pub mod filtering;
pub mod io;
pub mod normalize;
pub mod pipelines;
pub mod processing;
pub mod snapshots;
pub mod types;
