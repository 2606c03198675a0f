use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Top-level section of a projection request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputSection {
    Profile,
    Income,
    Expenses,
    Investments,
}

impl fmt::Display for InputSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputSection::Profile => "profile",
            InputSection::Income => "income",
            InputSection::Expenses => "expenses",
            InputSection::Investments => "investments",
        })
    }
}

fn join_sections(sections: &[InputSection]) -> String {
    sections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("missing required input: {}", join_sections(.sections))]
    MissingInputs { sections: Vec<InputSection> },
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },
    #[error("{series} series has {actual} months, expected at least {expected}")]
    SeriesTooShort {
        series: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl SimulationError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SimulationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BracketDataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid bracket document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ladder {ladder}: {reason}")]
    InvalidLadder { ladder: String, reason: String },
}
