mod calculator;
mod index;
mod resolve;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use calculator::{
    BracketCharge, Resolution, TaxCalculator, TaxComponent, TaxNotice, TaxQuery, TaxResult,
    progressive_tax,
};
pub use index::{Bracket, BracketIndex, LadderKey};
pub use resolve::{FallbackOverride, FallbackSource, LadderLookup, resolve_ladder};

/// Jurisdiction code used for country-level ladders.
pub const FEDERAL: &str = "FEDERAL";

/// Country of residence; each country is also a fallback family.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "US", alias = "us")]
    Us,
    #[serde(rename = "CA", alias = "ca")]
    Ca,
}

impl Country {
    pub fn code(self) -> &'static str {
        match self {
            Country::Us => "US",
            Country::Ca => "CA",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilingStatus {
    Single,
    #[serde(alias = "married", alias = "married_jointly")]
    MarriedJointly,
    #[serde(alias = "separate", alias = "married_separately")]
    MarriedSeparately,
    #[serde(alias = "head_of_household")]
    HeadOfHousehold,
}

impl FilingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FilingStatus::Single => "single",
            FilingStatus::MarriedJointly => "marriedJointly",
            FilingStatus::MarriedSeparately => "marriedSeparately",
            FilingStatus::HeadOfHousehold => "headOfHousehold",
        }
    }
}

/// Filing-status dimension of a ladder key. `All` is the catch-all ladder that
/// applies regardless of the filer's status.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum StatusKey {
    Filing(FilingStatus),
    All,
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKey::Filing(status) => f.write_str(status.as_str()),
            StatusKey::All => f.write_str("all"),
        }
    }
}

impl FromStr for StatusKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusKey::All),
            "single" => Ok(StatusKey::Filing(FilingStatus::Single)),
            "marriedJointly" | "married" => Ok(StatusKey::Filing(FilingStatus::MarriedJointly)),
            "marriedSeparately" | "separate" => {
                Ok(StatusKey::Filing(FilingStatus::MarriedSeparately))
            }
            "headOfHousehold" => Ok(StatusKey::Filing(FilingStatus::HeadOfHousehold)),
            other => Err(format!("unknown filing status `{other}`")),
        }
    }
}

impl Serialize for StatusKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<FilingStatus> for StatusKey {
    fn from(value: FilingStatus) -> Self {
        StatusKey::Filing(value)
    }
}

/// Source of a bracket ladder. Each variant has its own bracket table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxType {
    Income,
    CapitalGains,
    Payroll,
}

/// Character of the amount being taxed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomeKind {
    Ordinary,
    CapitalGains,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxLevel {
    Jurisdiction,
    Federal,
    Payroll,
}

/// Where the household files. `jurisdiction` is a state or province code; a
/// missing jurisdiction means only country-level taxes apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub country: Country,
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

impl Location {
    pub fn new(country: Country, jurisdiction: &str) -> Self {
        Self {
            country,
            jurisdiction: Some(jurisdiction.to_string()),
        }
    }

    pub fn federal_only(country: Country) -> Self {
        Self {
            country,
            jurisdiction: None,
        }
    }

    pub(crate) fn jurisdiction_code(&self) -> Option<String> {
        self.jurisdiction
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_ascii_uppercase)
    }
}
