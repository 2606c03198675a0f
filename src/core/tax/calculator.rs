use serde::Serialize;
use tracing::debug;

use super::{
    Bracket, BracketIndex, FEDERAL, FallbackOverride, FallbackSource, FilingStatus, IncomeKind,
    LadderLookup, Location, StatusKey, TaxLevel, TaxType, resolve_ladder,
};

#[derive(Debug, Clone, Copy)]
pub struct TaxQuery<'a> {
    pub amount: f64,
    pub kind: IncomeKind,
    pub filing_status: FilingStatus,
    pub location: &'a Location,
    pub tax_year: i32,
    /// Annual inflation in percent, used to index bracket edges from the
    /// index base year to `tax_year`.
    pub inflation_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketCharge {
    pub min: f64,
    pub max: Option<f64>,
    pub rate: f64,
    pub taxable: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Resolution {
    Exact,
    Fallback {
        resolved: StatusKey,
        source: FallbackSource,
    },
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxComponent {
    pub level: TaxLevel,
    pub tax_type: TaxType,
    pub jurisdiction: String,
    pub resolution: Resolution,
    pub amount: f64,
    pub brackets: Vec<BracketCharge>,
}

/// A component that did not resolve to an exact ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxNotice {
    pub level: TaxLevel,
    pub tax_type: TaxType,
    pub jurisdiction: String,
    pub filing_status: FilingStatus,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub taxable_amount: f64,
    pub total_tax: f64,
    pub effective_rate: f64,
    pub jurisdiction_tax: f64,
    pub federal_tax: f64,
    pub payroll_tax: f64,
    pub inflation_factor: f64,
    pub fallback_used: bool,
    /// Some required ladder was missing even after fallback; the figure
    /// understates the real tax.
    pub not_available: bool,
    pub components: Vec<TaxComponent>,
}

impl TaxResult {
    pub fn notices(&self, filing_status: FilingStatus) -> Vec<TaxNotice> {
        self.components
            .iter()
            .filter(|c| c.resolution != Resolution::Exact)
            .map(|c| TaxNotice {
                level: c.level,
                tax_type: c.tax_type,
                jurisdiction: c.jurisdiction.clone(),
                filing_status,
                resolution: c.resolution,
            })
            .collect()
    }
}

/// Progressive tax over an index of bracket ladders.
#[derive(Debug, Clone, Copy)]
pub struct TaxCalculator<'a> {
    index: &'a BracketIndex,
    overrides: &'a [FallbackOverride],
}

impl<'a> TaxCalculator<'a> {
    pub fn new(index: &'a BracketIndex) -> Self {
        Self {
            index,
            overrides: &[],
        }
    }

    pub fn with_overrides(mut self, overrides: &'a [FallbackOverride]) -> Self {
        self.overrides = overrides;
        self
    }

    /// Multiplier applied to bracket edges for `tax_year`.
    pub fn inflation_factor(&self, tax_year: i32, inflation_rate: f64) -> f64 {
        (1.0 + inflation_rate / 100.0).powi(tax_year.saturating_sub(self.index.base_year()))
    }

    pub fn compute(&self, query: &TaxQuery<'_>) -> TaxResult {
        let factor = self.inflation_factor(query.tax_year, query.inflation_rate);
        let mut components = Vec::with_capacity(3);

        if let Some(code) = query.location.jurisdiction_code() {
            let candidates: &[TaxType] = match query.kind {
                IncomeKind::Ordinary => &[TaxType::Income],
                // Jurisdictions without a dedicated ladder tax gains as income.
                IncomeKind::CapitalGains => &[TaxType::CapitalGains, TaxType::Income],
            };
            components.push(self.component(query, TaxLevel::Jurisdiction, &code, candidates, factor));
        }

        let federal_type = match query.kind {
            IncomeKind::Ordinary => TaxType::Income,
            IncomeKind::CapitalGains => TaxType::CapitalGains,
        };
        components.push(self.component(query, TaxLevel::Federal, FEDERAL, &[federal_type], factor));

        if query.kind == IncomeKind::Ordinary {
            components.push(self.component(
                query,
                TaxLevel::Payroll,
                FEDERAL,
                &[TaxType::Payroll],
                factor,
            ));
        }

        let level_total = |level: TaxLevel| -> f64 {
            components
                .iter()
                .filter(|c| c.level == level)
                .map(|c| c.amount)
                .sum()
        };
        let jurisdiction_tax = level_total(TaxLevel::Jurisdiction);
        let federal_tax = level_total(TaxLevel::Federal);
        let payroll_tax = level_total(TaxLevel::Payroll);
        let total_tax = jurisdiction_tax + federal_tax + payroll_tax;

        TaxResult {
            taxable_amount: query.amount,
            total_tax,
            effective_rate: if query.amount > 0.0 {
                total_tax / query.amount
            } else {
                0.0
            },
            jurisdiction_tax,
            federal_tax,
            payroll_tax,
            inflation_factor: factor,
            fallback_used: components
                .iter()
                .any(|c| matches!(c.resolution, Resolution::Fallback { .. })),
            not_available: components
                .iter()
                .any(|c| c.resolution == Resolution::NotAvailable),
            components,
        }
    }

    fn component(
        &self,
        query: &TaxQuery<'_>,
        level: TaxLevel,
        jurisdiction: &str,
        candidates: &[TaxType],
        factor: f64,
    ) -> TaxComponent {
        for &tax_type in candidates {
            let lookup = resolve_ladder(
                self.index,
                self.overrides,
                query.location.country,
                jurisdiction,
                tax_type,
                query.filing_status,
            );
            let (brackets, resolution) = match lookup {
                LadderLookup::Exact(brackets) => (brackets, Resolution::Exact),
                LadderLookup::Fallback {
                    brackets,
                    resolved,
                    source,
                } => (brackets, Resolution::Fallback { resolved, source }),
                LadderLookup::NotFound => continue,
            };
            let (amount, charges) = progressive_tax(query.amount, brackets, factor);
            return TaxComponent {
                level,
                tax_type,
                jurisdiction: jurisdiction.to_string(),
                resolution,
                amount,
                brackets: charges,
            };
        }

        debug!(
            ?level,
            jurisdiction,
            filing_status = query.filing_status.as_str(),
            "no bracket ladder available after fallback"
        );
        TaxComponent {
            level,
            tax_type: candidates.first().copied().unwrap_or(TaxType::Income),
            jurisdiction: jurisdiction.to_string(),
            resolution: Resolution::NotAvailable,
            amount: 0.0,
            brackets: Vec::new(),
        }
    }
}

/// Marginal-bracket tax on `amount` with every edge multiplied by `factor`.
/// Brackets must be ascending; the walk stops at the first bracket whose max
/// covers the amount or at the unbounded top bracket.
pub fn progressive_tax(amount: f64, brackets: &[Bracket], factor: f64) -> (f64, Vec<BracketCharge>) {
    let mut charges = Vec::new();
    if amount <= 0.0 {
        return (0.0, charges);
    }

    let mut total = 0.0;
    for bracket in brackets {
        let scaled = bracket.scaled(factor);
        if amount <= scaled.min {
            break;
        }
        let upper = match scaled.max {
            Some(max) => amount.min(max),
            None => amount,
        };
        let taxable = (upper - scaled.min).max(0.0);
        let tax = taxable * scaled.rate / 100.0;
        total += tax;
        charges.push(BracketCharge {
            min: scaled.min,
            max: scaled.max,
            rate: scaled.rate,
            taxable,
            tax,
        });
        match scaled.max {
            Some(max) if amount > max => continue,
            _ => break,
        }
    }
    (total, charges)
}
