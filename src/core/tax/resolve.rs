use serde::{Deserialize, Serialize};

use super::{Bracket, BracketIndex, Country, FilingStatus, LadderKey, StatusKey, TaxType};

/// A user-pinned fallback: when `jurisdiction` has no ladder for `from`, use
/// the ladder for `to` before consulting the automatic chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackOverride {
    pub country: Country,
    pub jurisdiction: String,
    pub from: FilingStatus,
    pub to: FilingStatus,
}

impl FallbackOverride {
    fn matches(&self, country: Country, jurisdiction: &str, from: FilingStatus) -> bool {
        self.country == country
            && self.from == from
            && self.jurisdiction.trim().eq_ignore_ascii_case(jurisdiction)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackSource {
    Override,
    Chain,
    AllFilers,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LadderLookup<'a> {
    Exact(&'a [Bracket]),
    Fallback {
        brackets: &'a [Bracket],
        resolved: StatusKey,
        source: FallbackSource,
    },
    NotFound,
}

impl<'a> LadderLookup<'a> {
    pub fn brackets(&self) -> Option<&'a [Bracket]> {
        match *self {
            LadderLookup::Exact(brackets) | LadderLookup::Fallback { brackets, .. } => {
                Some(brackets)
            }
            LadderLookup::NotFound => None,
        }
    }
}

/// Resolves the ladder for one jurisdiction, tax type and filing status.
///
/// Order: exact key, user overrides, the country's fallback chain, then the
/// catch-all `all` ladder. Overrides only apply when the exact key is absent.
pub fn resolve_ladder<'a>(
    index: &'a BracketIndex,
    overrides: &[FallbackOverride],
    country: Country,
    jurisdiction: &str,
    tax_type: TaxType,
    filing_status: FilingStatus,
) -> LadderLookup<'a> {
    let key = |status: StatusKey| LadderKey::new(country, jurisdiction, tax_type, status);

    if let Some(brackets) = index.ladder(&key(filing_status.into())) {
        return LadderLookup::Exact(brackets);
    }

    let jurisdiction = jurisdiction.trim();
    let pinned = overrides
        .iter()
        .filter(|o| o.matches(country, jurisdiction, filing_status))
        .map(|o| (o.to, FallbackSource::Override));
    let chained = index
        .fallback_chain(country, filing_status)
        .iter()
        .map(|status| (*status, FallbackSource::Chain));

    for (status, source) in pinned.chain(chained) {
        let resolved = StatusKey::Filing(status);
        if let Some(brackets) = index.ladder(&key(resolved)) {
            return LadderLookup::Fallback {
                brackets,
                resolved,
                source,
            };
        }
    }

    match index.ladder(&key(StatusKey::All)) {
        Some(brackets) => LadderLookup::Fallback {
            brackets,
            resolved: StatusKey::All,
            source: FallbackSource::AllFilers,
        },
        None => LadderLookup::NotFound,
    }
}
