//! Filter policies, as given on the command line.
//!
//! - `ptf:<k>` drops lines found in more than `k` documents.
//! - `pld:<r>,<y>,<g>` bands lines by count, keeping main text (context mode).
//! - `pld:<r>,<y>,<g>:banded` bands lines by count, applying band actions only.
use std::fmt;
use std::str::FromStr;

use super::filter::{DocumentFilter, LineDecision};
use super::pld::{BandRules, Pld, PldMode};
use super::ptf::Ptf;
use crate::error::Error;
use crate::types::CountInfoDocument;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterPolicy {
    Ptf(Ptf),
    Pld(Pld),
}

fn parse_threshold(policy: &str, value: &str) -> Result<i64, Error> {
    value.trim().parse::<i64>().map_err(|e| {
        Error::InvalidPolicy(format!(
            "invalid threshold {:?} in policy {:?}: {}",
            value, policy, e
        ))
    })
}

impl FilterPolicy {
    /// Identifier of the policy, used in output paths.
    ///
    /// Band rules other than the default ones are part of it.
    pub fn name(&self) -> String {
        match self {
            FilterPolicy::Ptf(ptf) => format!("ptf-k{}", ptf.k()),
            FilterPolicy::Pld(pld) => {
                let (r, y, g) = pld.thresholds();
                let mut name = match pld.mode() {
                    PldMode::Context => format!("pld-r{}-y{}-g{}", r, y, g),
                    PldMode::Banded => format!("pld-r{}-y{}-g{}-banded", r, y, g),
                };
                if *pld.rules() != BandRules::default() {
                    name.push('-');
                    name.push_str(&pld.rules().short_name());
                }
                name
            }
        }
    }

    /// Use `rules` for banded policies.
    pub fn with_rules(self, rules: BandRules) -> Self {
        match self {
            FilterPolicy::Pld(pld) => FilterPolicy::Pld(pld.with_rules(rules)),
            ptf => ptf,
        }
    }
}

impl FromStr for FilterPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, params) = s.split_once(':').ok_or_else(|| {
            Error::InvalidPolicy(format!(
                "policy {:?} should be ptf:<k> or pld:<r>,<y>,<g>[:banded]",
                s
            ))
        })?;
        match family {
            "ptf" => Ok(FilterPolicy::Ptf(Ptf::new(parse_threshold(s, params)?)?)),
            "pld" => {
                let (thresholds, mode) = match params.split_once(':') {
                    None => (params, PldMode::Context),
                    Some((thresholds, "banded")) => (thresholds, PldMode::Banded),
                    Some((_, other)) => {
                        return Err(Error::InvalidPolicy(format!(
                            "unknown pld mode {:?} in {:?}",
                            other, s
                        )))
                    }
                };
                let thresholds = thresholds
                    .split(',')
                    .map(|t| parse_threshold(s, t))
                    .collect::<Result<Vec<_>, _>>()?;
                match thresholds[..] {
                    [r, y, g] => Ok(FilterPolicy::Pld(Pld::new(
                        r,
                        y,
                        g,
                        mode,
                        BandRules::default(),
                    )?)),
                    _ => Err(Error::InvalidPolicy(format!(
                        "pld needs 3 thresholds, got {} in {:?}",
                        thresholds.len(),
                        s
                    ))),
                }
            }
            other => Err(Error::InvalidPolicy(format!(
                "unknown policy family {:?} (expected ptf or pld)",
                other
            ))),
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl DocumentFilter for FilterPolicy {
    fn decide(&self, doc: &CountInfoDocument) -> Vec<LineDecision> {
        match self {
            FilterPolicy::Ptf(ptf) => ptf.decide(doc),
            FilterPolicy::Pld(pld) => pld.decide(doc),
        }
    }
}
