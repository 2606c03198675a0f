use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Country, FilingStatus, StatusKey, TaxType};
use crate::core::error::BracketDataError;

const BUILTIN_BRACKETS: &str = include_str!("../../../data/brackets.json");

/// One marginal band. `max` is `None` for the unbounded top bracket; `rate`
/// is in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub rate: f64,
}

impl Bracket {
    pub fn new(min: f64, max: Option<f64>, rate: f64) -> Self {
        Self { min, max, rate }
    }

    /// Bracket edges multiplied by `factor`; the rate is untouched.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            min: self.min * factor,
            max: self.max.map(|max| max * factor),
            rate: self.rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LadderKey {
    pub country: Country,
    pub jurisdiction: String,
    pub tax_type: TaxType,
    pub filing_status: StatusKey,
}

impl LadderKey {
    pub fn new(
        country: Country,
        jurisdiction: &str,
        tax_type: TaxType,
        filing_status: impl Into<StatusKey>,
    ) -> Self {
        Self {
            country,
            jurisdiction: jurisdiction.trim().to_ascii_uppercase(),
            tax_type,
            filing_status: filing_status.into(),
        }
    }

    fn label(&self) -> String {
        format!(
            "{}/{}/{:?}/{}",
            self.country.code(),
            self.jurisdiction,
            self.tax_type,
            self.filing_status
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BracketDocument {
    base_year: i32,
    #[serde(default)]
    fallback_chains: Vec<ChainEntry>,
    ladders: Vec<LadderEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainEntry {
    country: Country,
    from: FilingStatus,
    to: Vec<FilingStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LadderEntry {
    country: Country,
    jurisdiction: String,
    tax_type: TaxType,
    filing_status: StatusKey,
    brackets: Vec<Bracket>,
}

/// Read-only lookup of bracket ladders keyed by country, jurisdiction, tax
/// type and filing status, plus the per-country filing-status fallback chains.
/// Bracket edges are stated in `base_year` dollars.
#[derive(Debug, Clone)]
pub struct BracketIndex {
    base_year: i32,
    ladders: HashMap<LadderKey, Vec<Bracket>>,
    fallback_chains: HashMap<(Country, FilingStatus), Vec<FilingStatus>>,
}

impl BracketIndex {
    pub fn new(base_year: i32) -> Self {
        Self {
            base_year,
            ladders: HashMap::new(),
            fallback_chains: HashMap::new(),
        }
    }

    /// The approximate ladders shipped in `data/brackets.json`.
    pub fn builtin() -> Result<Self, BracketDataError> {
        Self::from_json(BUILTIN_BRACKETS)
    }

    pub fn from_path(path: &Path) -> Result<Self, BracketDataError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BracketDataError> {
        let doc: BracketDocument = serde_json::from_str(raw)?;
        let mut index = Self::new(doc.base_year);
        for chain in doc.fallback_chains {
            index.set_fallback_chain(chain.country, chain.from, chain.to);
        }
        for entry in doc.ladders {
            let key = LadderKey::new(
                entry.country,
                &entry.jurisdiction,
                entry.tax_type,
                entry.filing_status,
            );
            index.insert_ladder(key, entry.brackets)?;
        }
        Ok(index)
    }

    pub fn base_year(&self) -> i32 {
        self.base_year
    }

    /// Adds or replaces a ladder after checking that its brackets are
    /// ascending, non-overlapping and only unbounded at the top.
    pub fn insert_ladder(
        &mut self,
        key: LadderKey,
        brackets: Vec<Bracket>,
    ) -> Result<(), BracketDataError> {
        validate_ladder(&key, &brackets)?;
        self.ladders.insert(key, brackets);
        Ok(())
    }

    /// Ordered statuses to try when `from` has no ladder of its own.
    pub fn set_fallback_chain(&mut self, country: Country, from: FilingStatus, to: Vec<FilingStatus>) {
        self.fallback_chains.insert((country, from), to);
    }

    pub fn ladder(&self, key: &LadderKey) -> Option<&[Bracket]> {
        self.ladders.get(key).map(Vec::as_slice)
    }

    pub fn fallback_chain(&self, country: Country, from: FilingStatus) -> &[FilingStatus] {
        self.fallback_chains
            .get(&(country, from))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every ladder key, sorted for stable output.
    pub fn keys(&self) -> Vec<&LadderKey> {
        let mut keys = self.ladders.keys().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.ladders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladders.is_empty()
    }
}

fn validate_ladder(key: &LadderKey, brackets: &[Bracket]) -> Result<(), BracketDataError> {
    let fail = |reason: String| BracketDataError::InvalidLadder {
        ladder: key.label(),
        reason,
    };

    if brackets.is_empty() {
        return Err(fail("no brackets".to_string()));
    }

    let mut previous_max = 0.0;
    for (idx, bracket) in brackets.iter().enumerate() {
        if !bracket.min.is_finite() || bracket.min < 0.0 {
            return Err(fail(format!("bracket {idx} has invalid min {}", bracket.min)));
        }
        if !bracket.rate.is_finite() || !(0.0..=100.0).contains(&bracket.rate) {
            return Err(fail(format!("bracket {idx} has invalid rate {}", bracket.rate)));
        }
        if bracket.min + 1e-9 < previous_max {
            return Err(fail(format!("bracket {idx} overlaps the previous bracket")));
        }
        match bracket.max {
            Some(max) if !max.is_finite() || max <= bracket.min => {
                return Err(fail(format!("bracket {idx} has max {max} <= min {}", bracket.min)));
            }
            Some(max) => previous_max = max,
            None if idx + 1 != brackets.len() => {
                return Err(fail(format!("unbounded bracket {idx} is not the last bracket")));
            }
            None => {}
        }
    }
    Ok(())
}
