//! Verb-prefixed text messages exchanged between bots.
//!
//! A request is a single line such as `TASK:TRADE:AAPL` or `RECALL 5`. The
//! verb is the leading token up to the first `:` or whitespace and is
//! case-sensitive. Everything after that delimiter is the payload.

use std::fmt;

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub verb: String,
    /// Text after the verb delimiter, trimmed. `None` when absent or empty.
    pub payload: Option<String>,
    /// The delimiter that ended the verb, if any.
    pub delimiter: Option<char>,
}

impl Message {
    /// Parse a raw request. Returns `None` for empty input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let split = raw
            .char_indices()
            .find(|(_, c)| *c == ':' || c.is_ascii_whitespace());

        let (verb, delimiter, rest) = match split {
            Some((idx, c)) => (&raw[..idx], Some(c), &raw[idx + c.len_utf8()..]),
            None => (raw, None, ""),
        };

        let rest = rest.trim();
        Some(Self {
            verb: verb.to_string(),
            payload: (!rest.is_empty()).then(|| rest.to_string()),
            delimiter,
        })
    }

    pub fn new(verb: impl Into<String>, payload: Option<String>) -> Self {
        Self {
            verb: verb.into(),
            delimiter: payload.as_ref().map(|_| ':'),
            payload,
        }
    }

    pub fn payload(&self) -> &str {
        self.payload.as_deref().unwrap_or("")
    }

    /// True when the payload was introduced with `:` (e.g. `RECALL:query`).
    pub fn is_colon_form(&self) -> bool {
        self.delimiter == Some(':')
    }

    /// Split the payload on `:` into at most `n` parts.
    pub fn payload_parts(&self, n: usize) -> Vec<&str> {
        match &self.payload {
            Some(p) => p.splitn(n, ':').collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(p) => write!(f, "{}{}{}", self.verb, self.delimiter.unwrap_or(':'), p),
            None => write!(f, "{}", self.verb),
        }
    }
}
