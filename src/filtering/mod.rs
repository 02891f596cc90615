/*! Filtering utilities

Line filtering operates on count info documents, deciding for each line whether it is kept.

Filters implement [filter::Filter] (a single item, like a count or a line)
or [filter::DocumentFilter] (every line of a document at once):
- [Ptf] keeps lines whose count is under a threshold,
- [Pld] bands counts with three thresholds, then applies per band rules or keeps main text,
- [PunctuationFilter] refines the lines kept by another filter.

[FilterPolicy] is the validated form of the policies given on the command line.
!*/
mod filter;
mod pld;
mod policy;
mod ptf;
mod punctuation;

pub use filter::{DocumentFilter, Filter, LineDecision};
pub use pld::{Band, BandAction, BandRule, BandRules, Pld, PldMode};
pub use policy::FilterPolicy;
pub use ptf::Ptf;
pub use punctuation::PunctuationFilter;
