pub mod candidature;
pub mod location;
pub mod party;
pub mod problem;
pub mod project;

use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
    expected: Vec<&'static str>,
}

impl ParseValueError {
    pub fn new(kind: &'static str, value: &str, expected: &[&'static str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: expected.to_vec(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}': expected one of {}",
            self.kind,
            self.value,
            self.expected.join(", ")
        )
    }
}

impl Error for ParseValueError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub entity: &'static str,
    pub id: u64,
    pub from: &'static str,
    pub to: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} #{} transition: {} -> {}",
            self.entity, self.id, self.from, self.to
        )
    }
}

impl Error for InvalidTransition {}

pub(crate) fn normalize_token(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| if ch == '-' || ch.is_whitespace() { '_' } else { ch })
        .collect()
}
