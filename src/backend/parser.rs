//! Device protocol decoding
//!
//! Each line from the rig is free text with `Tag:value` pairs embedded
//! anywhere, optionally prefixed by the experiment marker `>`:
//!
//! ```text
//! >Time:234.56,Fixed_X:1.23,Fixed_Z:4.56
//! Time:12.0 Fx:2.34 Fz:5.67
//! Pump running. Force adjustment stage active.
//! ```
//!
//! # Tag vocabularies
//!
//! The firmware reports force under two namings depending on the sensor in
//! use: `Fixed_X`/`Fixed_Z` for the fixed sensor and `Fx`/`Fz` for the
//! controlled (free-sphere) sensor. The short tags only match at a word
//! boundary. When both namings are present for an axis, the fixed value
//! becomes the canonical force and the controlled value is kept alongside.
//!
//! # Dropped lines
//!
//! A line with no force tag is surfaced as a status [`Reading`] only if it
//! mentions one of [`STATUS_KEYWORDS`]; anything else is noise and yields
//! `None`. A tag whose value does not parse as a number is treated as
//! absent; the rest of the line is still decoded.

use crate::types::Reading;

/// Prefix marking lines that belong to a running experiment
pub const EXPERIMENT_MARKER: char = '>';

/// Case-insensitive keywords identifying device status lines
pub const STATUS_KEYWORDS: [&str; 5] = ["experiment", "started", "finished", "pump", "motor"];

/// A `Tag:<number>` matcher
#[derive(Debug, Clone, Copy)]
struct TagMatcher {
    tag: &'static str,
    /// Require a non-word character (or line start) before the tag
    word_boundary: bool,
}

const TIME: TagMatcher = TagMatcher {
    tag: "Time:",
    word_boundary: false,
};
const FIXED_X: TagMatcher = TagMatcher {
    tag: "Fixed_X:",
    word_boundary: false,
};
const FIXED_Z: TagMatcher = TagMatcher {
    tag: "Fixed_Z:",
    word_boundary: false,
};
const FX: TagMatcher = TagMatcher {
    tag: "Fx:",
    word_boundary: true,
};
const FZ: TagMatcher = TagMatcher {
    tag: "Fz:",
    word_boundary: true,
};

impl TagMatcher {
    /// Find the first occurrence of the tag followed by a numeric token.
    ///
    /// Returns `None` if no such occurrence exists. A numeric token that
    /// fails to parse (e.g. `1.2.3`) also yields `None`.
    fn extract(&self, line: &str) -> Option<f64> {
        let mut search_from = 0;
        while let Some(offset) = line[search_from..].find(self.tag) {
            let start = search_from + offset;
            search_from = start + self.tag.len();

            if self.word_boundary && !at_word_boundary(line, start) {
                continue;
            }

            let token = numeric_token(&line[search_from..]);
            if token.is_empty() {
                continue;
            }

            return match token.parse::<f64>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Ignoring {}{:?}: {}", self.tag, token, e);
                    None
                }
            };
        }
        None
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn at_word_boundary(line: &str, index: usize) -> bool {
    line[..index]
        .chars()
        .next_back()
        .map_or(true, |c| !is_word_char(c))
}

/// Leading run of digits, `.` and `-`
fn numeric_token(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(s.len());
    &s[..end]
}

/// Decoder for the line-oriented device protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolParser;

impl ProtocolParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Decode one line into a [`Reading`]
    ///
    /// Returns `None` for lines that are neither measurements nor status
    /// messages.
    pub fn parse(&self, line: &str) -> Option<Reading> {
        let (is_experiment, line) = match line.strip_prefix(EXPERIMENT_MARKER) {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        let mut reading = Reading {
            is_experiment,
            raw: line.to_string(),
            time: TIME.extract(line),
            fixed_x: FIXED_X.extract(line),
            fixed_z: FIXED_Z.extract(line),
            fx: FX.extract(line),
            fz: FZ.extract(line),
            ..Default::default()
        };

        reading.force_x = reading.fixed_x.or(reading.fx);
        reading.force_z = reading.fixed_z.or(reading.fz);

        if reading.force_x.is_some() || reading.force_z.is_some() {
            return Some(reading);
        }

        if is_status_line(line) {
            reading.message = Some(line.to_string());
            return Some(reading);
        }

        None
    }
}

/// Check whether a line mentions any status keyword
pub fn is_status_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    STATUS_KEYWORDS.iter().any(|k| lower.contains(k))
}
