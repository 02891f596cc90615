//! Punctuation refinement.
//!
//! Applied after a policy, on the lines it kept: lines ending with terminal punctuation
//! are kept, and so are runs of at most `max_gap` other lines between two of them.
use super::filter::{Filter, LineDecision};

const TERMINAL: [char; 5] = ['.', '?', '!', '"', '\''];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunctuationFilter {
    max_gap: usize,
}

impl PunctuationFilter {
    pub fn new(max_gap: usize) -> Self {
        Self { max_gap }
    }

    pub fn max_gap(&self) -> usize {
        self.max_gap
    }

    /// Drop kept lines that are not part of a punctuated run.
    pub fn refine(&self, lines: &[String], decisions: &mut [LineDecision]) {
        let kept: Vec<usize> = (0..decisions.len())
            .filter(|idx| decisions[*idx].keep)
            .collect();
        let terminal: Vec<bool> = kept
            .iter()
            .map(|idx| self.detect(lines[*idx].as_str()))
            .collect();

        // positions are in kept lines
        let mut keep = vec![false; kept.len()];
        let mut last_terminal: Option<usize> = None;
        for pos in 0..kept.len() {
            if !terminal[pos] {
                continue;
            }
            keep[pos] = true;
            if let Some(prev) = last_terminal {
                if pos - prev - 1 <= self.max_gap {
                    keep[prev + 1..pos].iter_mut().for_each(|k| *k = true);
                }
            }
            last_terminal = Some(pos);
        }

        for (idx, keep) in kept.into_iter().zip(keep) {
            if !keep {
                decisions[idx].keep = false;
                decisions[idx].annotate = false;
            }
        }
    }
}

impl Filter<&str> for PunctuationFilter {
    /// true if the line ends with terminal punctuation.
    fn detect(&self, line: &str) -> bool {
        line.trim_end()
            .chars()
            .last()
            .map_or(false, |c| TERMINAL.contains(&c))
    }
}
