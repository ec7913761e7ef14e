//! Output expectations and their evaluation
//!
//! Every expectation is checked; violations are collected rather than
//! stopping at the first, so one run reports every mismatch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Assertion on a single output value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputExpectation {
    /// Value contains the substring
    Contains(String),
    /// Value equals the string exactly
    Equals(String),
    /// Value is the empty string
    Empty,
    /// Value is byte-equal to another output
    EqualsOutput(String),
}

impl OutputExpectation {
    /// Check `actual`, returning a description of the mismatch if any
    fn check(&self, actual: &str, outputs: &BTreeMap<String, String>) -> Option<String> {
        match self {
            Self::Contains(needle) => (!actual.contains(needle.as_str()))
                .then(|| format!("expected to contain '{needle}', got '{actual}'")),
            Self::Equals(expected) => (actual != expected)
                .then(|| format!("expected '{expected}', got '{actual}'")),
            Self::Empty => (!actual.is_empty()).then(|| format!("expected empty, got '{actual}'")),
            Self::EqualsOutput(other) => {
                let other_value = lookup(outputs, other);
                (actual != other_value).then(|| {
                    format!("expected to equal output '{other}' ('{other_value}'), got '{actual}'")
                })
            }
        }
    }
}

impl fmt::Display for OutputExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(s) => write!(f, "contains '{s}'"),
            Self::Equals(s) => write!(f, "equals '{s}'"),
            Self::Empty => write!(f, "is empty"),
            Self::EqualsOutput(o) => write!(f, "equals output '{o}'"),
        }
    }
}

/// One unmet expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub output: String,
    pub expectation: OutputExpectation,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.output, self.message)
    }
}

/// Outputs absent from the map read as empty
fn lookup<'a>(outputs: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    outputs.get(name).map(String::as_str).unwrap_or("")
}

/// Evaluate all expectations against resolved outputs
pub fn evaluate(
    outputs: &BTreeMap<String, String>,
    expectations: &[(String, OutputExpectation)],
) -> Result<(), Vec<Violation>> {
    let violations: Vec<Violation> = expectations
        .iter()
        .filter_map(|(output, expectation)| {
            expectation
                .check(lookup(outputs, output), outputs)
                .map(|message| Violation {
                    output: output.clone(),
                    expectation: expectation.clone(),
                    message,
                })
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Every output an expectation list reads, including `EqualsOutput` targets
pub fn referenced_outputs(expectations: &[(String, OutputExpectation)]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (output, expectation) in expectations {
        names.insert(output.clone());
        if let OutputExpectation::EqualsOutput(other) = expectation {
            names.insert(other.clone());
        }
    }
    names
}
