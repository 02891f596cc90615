/*! Banded line filtering

Thresholds `r <= y <= g` split counts into four bands:

| band          | counts    | default rule   |
|---------------|-----------|----------------|
| `rare`        | `[1, r)`  | keep, code `g` |
| `common`      | `[r, y)`  | annotate, `y`  |
| `frequent`    | `[y, g)`  | annotate, `y`  |
| `boilerplate` | `[g, ∞)`  | drop, `r`      |

A count of 0 is rare.

In *banded* mode each line gets its band's action. In *context* mode (the default),
each line is encoded by its band's code, and only the lines covered by a main text
pattern over the document's code string are kept. A run of rare lines can then carry
a few frequent lines along, while an isolated rare line amid boilerplate is dropped.
Lines that are empty, `{` or `}` are coded `y` whatever their count.
Kept lines whose band action is not `keep` are annotated.
!*/
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::filter::{DocumentFilter, LineDecision};
use crate::error::Error;
use crate::types::CountInfoDocument;

/// Main text patterns, over band codes.
const MAIN_PATTERNS: [&str; 3] = [
    r"g{2,}",
    r"g{2,}(y+g{1,})+g",
    r"g{2,}([yr]{0,3}g{1,})+g",
];

const NEUTRAL_CODE: char = 'y';
const CODES: [char; 3] = ['g', 'y', 'r'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Rare,
    Common,
    Frequent,
    Boilerplate,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Rare, Band::Common, Band::Frequent, Band::Boilerplate];

    pub fn index(&self) -> usize {
        match self {
            Band::Rare => 0,
            Band::Common => 1,
            Band::Frequent => 2,
            Band::Boilerplate => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Band::Rare => "rare",
            Band::Common => "common",
            Band::Frequent => "frequent",
            Band::Boilerplate => "boilerplate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandAction {
    Keep,
    Drop,
    Annotate,
}

impl FromStr for BandAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(BandAction::Keep),
            "drop" => Ok(BandAction::Drop),
            "annotate" => Ok(BandAction::Annotate),
            other => Err(Error::InvalidPolicy(format!(
                "unknown band action {:?} (expected keep, drop or annotate)",
                other
            ))),
        }
    }
}

impl fmt::Display for BandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BandAction::Keep => "keep",
            BandAction::Drop => "drop",
            BandAction::Annotate => "annotate",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRule {
    pub action: BandAction,
    /// one of `g`, `y`, `r`.
    pub code: char,
}

/// One rule per band, in band order.
///
/// Written `keep/g,annotate/y,annotate/y,drop/r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRules([BandRule; 4]);

impl BandRules {
    pub fn new(rules: [BandRule; 4]) -> Result<Self, Error> {
        if let Some(rule) = rules.iter().find(|r| !CODES.contains(&r.code)) {
            return Err(Error::InvalidPolicy(format!(
                "band code must be one of g, y, r (got {:?})",
                rule.code
            )));
        }
        Ok(Self(rules))
    }

    pub fn get(&self, band: Band) -> &BandRule {
        &self.0[band.index()]
    }

    /// Path safe form, e.g. `kgayaydr` for the default rules.
    pub fn short_name(&self) -> String {
        self.0
            .iter()
            .map(|r| {
                let action = match r.action {
                    BandAction::Keep => 'k',
                    BandAction::Drop => 'd',
                    BandAction::Annotate => 'a',
                };
                format!("{}{}", action, r.code)
            })
            .collect()
    }
}

impl Default for BandRules {
    fn default() -> Self {
        Self([
            BandRule {
                action: BandAction::Keep,
                code: 'g',
            },
            BandRule {
                action: BandAction::Annotate,
                code: 'y',
            },
            BandRule {
                action: BandAction::Annotate,
                code: 'y',
            },
            BandRule {
                action: BandAction::Drop,
                code: 'r',
            },
        ])
    }
}

impl FromStr for BandRules {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rules = s
            .split(',')
            .map(|rule| {
                let (action, code) = rule.trim().split_once('/').ok_or_else(|| {
                    Error::InvalidPolicy(format!("band rule {:?} is not action/code", rule))
                })?;
                let mut chars = code.chars();
                match (chars.next(), chars.next()) {
                    (Some(code), None) => Ok(BandRule {
                        action: action.parse()?,
                        code,
                    }),
                    _ => Err(Error::InvalidPolicy(format!(
                        "band code {:?} is not a single character",
                        code
                    ))),
                }
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let rules: [BandRule; 4] = rules.try_into().map_err(|v: Vec<BandRule>| {
            Error::InvalidPolicy(format!("expected 4 band rules, got {}", v.len()))
        })?;
        Self::new(rules)
    }
}

impl fmt::Display for BandRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<String> = self
            .0
            .iter()
            .map(|r| format!("{}/{}", r.action, r.code))
            .collect();
        write!(f, "{}", rules.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PldMode {
    Context,
    Banded,
}

#[derive(Debug, Clone)]
pub struct Pld {
    r: u32,
    y: u32,
    g: u32,
    mode: PldMode,
    rules: BandRules,
    patterns: Vec<Regex>,
}

impl PartialEq for Pld {
    fn eq(&self, other: &Self) -> bool {
        (self.r, self.y, self.g, self.mode, self.rules)
            == (other.r, other.y, other.g, other.mode, other.rules)
    }
}

fn threshold(name: &str, value: i64) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| {
        Error::InvalidPolicy(format!(
            "pld threshold {} must be in 0..={} (got {})",
            name,
            u32::MAX,
            value
        ))
    })
}

impl Pld {
    pub fn new(r: i64, y: i64, g: i64, mode: PldMode, rules: BandRules) -> Result<Self, Error> {
        let (r, y, g) = (threshold("r", r)?, threshold("y", y)?, threshold("g", g)?);
        if !(r <= y && y <= g) {
            return Err(Error::InvalidPolicy(format!(
                "pld thresholds must satisfy r <= y <= g (got {}, {}, {})",
                r, y, g
            )));
        }
        let patterns = MAIN_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            r,
            y,
            g,
            mode,
            rules,
            patterns,
        })
    }

    pub fn thresholds(&self) -> (u32, u32, u32) {
        (self.r, self.y, self.g)
    }

    pub fn mode(&self) -> PldMode {
        self.mode
    }

    pub fn rules(&self) -> &BandRules {
        &self.rules
    }

    pub fn with_rules(mut self, rules: BandRules) -> Self {
        self.rules = rules;
        self
    }

    #[inline]
    pub fn band(&self, count: u32) -> Band {
        if count < self.r || count == 0 {
            Band::Rare
        } else if count < self.y {
            Band::Common
        } else if count < self.g {
            Band::Frequent
        } else {
            Band::Boilerplate
        }
    }

    fn decide_banded(&self, bands: &[Band]) -> Vec<LineDecision> {
        bands
            .iter()
            .map(|band| {
                let action = self.rules.get(*band).action;
                LineDecision {
                    keep: action != BandAction::Drop,
                    band: Some(*band),
                    annotate: action == BandAction::Annotate,
                }
            })
            .collect()
    }

    fn decide_context(&self, lines: &[String], bands: &[Band]) -> Vec<LineDecision> {
        let codes: String = lines
            .iter()
            .zip(bands)
            .map(|(line, band)| match line.trim() {
                "" | "{" | "}" => NEUTRAL_CODE,
                _ => self.rules.get(*band).code,
            })
            .collect();

        // codes are ASCII, so byte offsets are line indices
        let mut covered = vec![false; lines.len()];
        for pattern in &self.patterns {
            for m in pattern.find_iter(&codes) {
                covered[m.range()].iter_mut().for_each(|c| *c = true);
            }
        }

        covered
            .into_iter()
            .zip(bands)
            .map(|(keep, band)| LineDecision {
                keep,
                band: Some(*band),
                annotate: keep && self.rules.get(*band).action != BandAction::Keep,
            })
            .collect()
    }
}

impl DocumentFilter for Pld {
    fn decide(&self, doc: &CountInfoDocument) -> Vec<LineDecision> {
        let bands: Vec<Band> = doc.counts.iter().map(|c| self.band(*c)).collect();
        match self.mode {
            PldMode::Banded => self.decide_banded(&bands),
            PldMode::Context => self.decide_context(&doc.lines, &bands),
        }
    }
}
