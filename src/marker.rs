use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static HANDLED_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!-- claude:handled-note:(\d+) -->").unwrap());

/// Invisible token prefixed to every posted response, recording the id of the
/// note it answers. Previously posted markers are the only record of which
/// mentions have been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandledMarker(i64);

impl HandledMarker {
    pub fn new(note_id: i64) -> Self {
        Self(note_id)
    }

    pub fn note_id(&self) -> i64 {
        self.0
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// First well-formed marker in `text`, if any.
    pub fn decode(text: &str) -> Option<Self> {
        Self::decode_all(text).next()
    }

    /// Every well-formed marker in `text`; ids that overflow are skipped.
    pub fn decode_all(text: &str) -> impl Iterator<Item = Self> + '_ {
        HANDLED_MARKER_PATTERN
            .captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<i64>().ok())
            .map(Self)
    }
}

impl fmt::Display for HandledMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!-- claude:handled-note:{} -->", self.0)
    }
}
