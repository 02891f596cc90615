/*! Line normalization and line keys.

Two lines are "the same line" when their normalized forms are equal.
The normalized form is then hashed into a [LineKey]: the first 8 bytes of its SHA-1 digest,
read as a little endian integer.

Hashing and annotation **must** use the same [NormalizeOptions], otherwise looked up counts
do not match the counted ones.
!*/
use std::collections::HashSet;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Identity of a normalized line.
pub type LineKey = u64;

lazy_static! {
    /// Unicode punctuation removed from keys (CCNet punctuation table).
    static ref UNICODE_PUNCT: HashSet<char> = [
        '，', '。', '、', '„', '”', '“', '«', '»', '１', '」', '「', '《', '》', '´', '∶', '：',
        '？', '！', '（', '）', '；', '–', '—', '．', '～', '’', '…', '━', '〈', '〉', '【', '】',
        '％', '►',
    ]
    .iter()
    .copied()
    .collect();
}

/// Zero width and replacement characters that are dropped outright.
const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{FFFC}',
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub lowercase: bool,
    /// Replace every decimal digit by `0`.
    pub digits: bool,
    pub unicode_punctuation: bool,
    pub ascii_punctuation: bool,
    pub collapse_whitespace: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            digits: true,
            unicode_punctuation: true,
            ascii_punctuation: false,
            collapse_whitespace: true,
        }
    }
}

/// Computes normalized forms and keys of lines.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Normalized form of a line. Empty when the line carries no countable content.
    pub fn normalize(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut pending_space = false;

        for c in line.trim().chars() {
            if c.is_whitespace() {
                if self.options.collapse_whitespace {
                    pending_space = true;
                } else {
                    out.push(' ');
                }
                continue;
            }
            if INVISIBLE.contains(&c) || c.is_control() {
                continue;
            }
            if self.options.unicode_punctuation && UNICODE_PUNCT.contains(&c) {
                continue;
            }
            if self.options.ascii_punctuation && c.is_ascii_punctuation() {
                continue;
            }

            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;

            if self.options.digits && c.is_ascii_digit() {
                out.push('0');
            } else if self.options.lowercase {
                out.extend(c.to_lowercase());
            } else {
                out.push(c);
            }
        }

        if self.options.collapse_whitespace {
            out
        } else {
            // removed characters can leave spaces at both ends
            out.trim().to_string()
        }
    }

    /// Key of a line, or [None] for lines that are empty once normalized.
    pub fn key(&self, line: &str) -> Option<LineKey> {
        let normalized = self.normalize(line);
        if normalized.is_empty() {
            None
        } else {
            Some(hash_normalized(&normalized))
        }
    }
}

/// Hash an already normalized line.
#[inline]
pub fn hash_normalized(normalized: &str) -> LineKey {
    let digest = Sha1::digest(normalized.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
