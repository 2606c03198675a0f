use std::collections::HashSet;

use serde::Deserialize;

use super::error::{InputSection, SimulationError};
use super::tax::FallbackOverride;
use super::types::{
    DownPayment, ExpenseMonth, IncomeInput, IncomeMonth, InvestmentInput, Profile,
    PropertyConfig, PropertyMode, SimulationInputs,
};

/// A projection request as it arrives over the wire. Every section is
/// optional here so that all missing sections can be reported at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationRequest {
    pub profile: Option<Profile>,
    pub income: Option<IncomeInput>,
    pub expenses: Option<Vec<ExpenseMonth>>,
    pub investments: Option<InvestmentInput>,
    pub property: Option<PropertyConfig>,
    pub tax_overrides: Vec<FallbackOverride>,
    pub start_year: Option<i32>,
}

impl SimulationRequest {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn into_inputs(self) -> Result<SimulationInputs, SimulationError> {
        let mut missing = Vec::new();
        if self.profile.is_none() {
            missing.push(InputSection::Profile);
        }
        if self.income.as_ref().is_none_or(|i| i.months.is_empty()) {
            missing.push(InputSection::Income);
        }
        if self.expenses.as_ref().is_none_or(Vec::is_empty) {
            missing.push(InputSection::Expenses);
        }
        if self.investments.is_none() {
            missing.push(InputSection::Investments);
        }

        match (self.profile, self.income, self.expenses, self.investments) {
            (Some(profile), Some(income), Some(expenses), Some(investments))
                if missing.is_empty() =>
            {
                Ok(SimulationInputs {
                    profile,
                    income,
                    expenses,
                    investments,
                    property: self.property.unwrap_or_default(),
                    tax_overrides: self.tax_overrides,
                    start_year: self.start_year,
                })
            }
            _ => Err(SimulationError::MissingInputs { sections: missing }),
        }
    }
}

/// Furthest a tax year may sit from the bracket base year.
pub const MAX_YEARS_FROM_BASE: i64 = 200;

/// Whether bracket data for `base_year` can be indexed forward or back to
/// `year`.
pub fn tax_year_in_range(year: i64, base_year: i32) -> bool {
    (year - i64::from(base_year)).abs() <= MAX_YEARS_FROM_BASE
}

/// Checks that every calendar year of the run stays in indexable range.
pub fn validate_horizon(inputs: &SimulationInputs, base_year: i32) -> Result<(), SimulationError> {
    let first = i64::from(inputs.start_year.unwrap_or(base_year));
    let last = first + i64::from(inputs.profile.years_to_retirement()) - 1;
    if !tax_year_in_range(first, base_year) || !tax_year_in_range(last, base_year) {
        return Err(SimulationError::invalid(
            "startYear",
            format!("simulated years must stay within {MAX_YEARS_FROM_BASE} years of {base_year}"),
        ));
    }
    Ok(())
}

fn finite(field: &str, value: f64) -> Result<(), SimulationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimulationError::invalid(field, "must be a finite number"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), SimulationError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(SimulationError::invalid(field, "must be non-negative"));
    }
    Ok(())
}

fn growth_rate(field: &str, value: f64) -> Result<(), SimulationError> {
    finite(field, value)?;
    if value <= -100.0 || value > 100.0 {
        return Err(SimulationError::invalid(
            field,
            "must be greater than -100 and at most 100 percent",
        ));
    }
    Ok(())
}

fn percent(field: &str, value: f64) -> Result<(), SimulationError> {
    finite(field, value)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(SimulationError::invalid(field, "must be between 0 and 100"));
    }
    Ok(())
}

fn series_len(series: &'static str, actual: usize, expected: usize) -> Result<(), SimulationError> {
    if actual < expected {
        return Err(SimulationError::SeriesTooShort {
            series,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Checks everything the yearly loop relies on, so that a run either fails
/// up front or completes.
pub fn validate_inputs(inputs: &SimulationInputs) -> Result<(), SimulationError> {
    let profile = &inputs.profile;
    if profile.retirement_age <= profile.age {
        return Err(SimulationError::invalid(
            "profile.retirementAge",
            "must be greater than current age",
        ));
    }
    growth_rate("profile.inflationRate", profile.inflation_rate)?;
    let years = profile.years_to_retirement();
    let months = years as usize * 12;

    series_len("income", inputs.income.months.len(), months)?;
    series_len("expenses", inputs.expenses.len(), months)?;
    validate_income(&inputs.income.months[..months])?;
    for (i, stream) in inputs.income.streams.iter().enumerate() {
        non_negative(&format!("income.streams[{i}].individual401k"), stream.individual_401k)?;
        finite(&format!("income.streams[{i}].annualIncome"), stream.annual_income)?;
    }
    for (i, month) in inputs.expenses[..months].iter().enumerate() {
        finite(&format!("expenses[{i}].totalNominal"), month.total_nominal)?;
        finite(&format!("expenses[{i}].totalPV"), month.total_pv)?;
    }

    validate_investments(&inputs.investments)?;
    validate_property(&inputs.property, years)
}

fn validate_income(months: &[IncomeMonth]) -> Result<(), SimulationError> {
    for (i, month) in months.iter().enumerate() {
        finite(&format!("income.months[{i}].salary"), month.salary)?;
        finite(&format!("income.months[{i}].equity"), month.equity)?;
        non_negative(&format!("income.months[{i}].company401k"), month.company_401k)?;
    }
    Ok(())
}

fn validate_investments(investments: &InvestmentInput) -> Result<(), SimulationError> {
    finite("investments.cash", investments.cash)?;
    non_negative("investments.targetCash", investments.target_cash)?;

    let plan = &investments.retirement_401k;
    non_negative("investments.retirement401k.value", plan.value)?;
    growth_rate("investments.retirement401k.growthRate", plan.growth_rate)?;
    non_negative(
        "investments.retirement401k.contributionLimit",
        plan.contribution_limit,
    )?;
    growth_rate(
        "investments.retirement401k.limitGrowthRate",
        plan.limit_growth_rate,
    )?;

    let mut ids = HashSet::new();
    for (i, account) in investments.accounts.iter().enumerate() {
        if !ids.insert(account.id.as_str()) {
            return Err(SimulationError::invalid(
                format!("investments.accounts[{i}].id"),
                format!("duplicate id {:?}", account.id),
            ));
        }
        non_negative(&format!("investments.accounts[{i}].costBasis"), account.cost_basis)?;
        non_negative(
            &format!("investments.accounts[{i}].marketValue"),
            account.market_value,
        )?;
        growth_rate(&format!("investments.accounts[{i}].growthRate"), account.growth_rate)?;
        percent(
            &format!("investments.accounts[{i}].portfolioPct"),
            account.portfolio_pct,
        )?;
    }
    Ok(())
}

fn validate_property(property: &PropertyConfig, years: u32) -> Result<(), SimulationError> {
    growth_rate("property.homeGrowthRate", property.home_growth_rate)?;
    let costs = &property.costs;
    percent("property.costs.propertyTaxRate", costs.property_tax_rate)?;
    percent("property.costs.maintenanceRate", costs.maintenance_rate)?;
    non_negative("property.costs.annualInsurance", costs.annual_insurance)?;

    match &property.mode {
        PropertyMode::None => {}
        PropertyMode::Own(home) => {
            non_negative("property.homeValue", home.home_value)?;
            non_negative("property.mortgageBalance", home.mortgage_balance)?;
            non_negative("property.monthlyPayment", home.monthly_payment)?;
            if let Some(rate) = home.interest_rate {
                percent("property.interestRate", rate)?;
            }
            if home.interest_rate.is_none()
                && home.mortgage_balance > 0.0
                && home.remaining_term_years == Some(0)
            {
                return Err(SimulationError::invalid(
                    "property.remainingTermYears",
                    "must be at least one year while a balance remains",
                ));
            }
        }
        PropertyMode::Buy(plan) => {
            if plan.purchase_year == 0 || plan.purchase_year > years {
                return Err(SimulationError::invalid(
                    "property.purchaseYear",
                    format!("must be between 1 and {years}"),
                ));
            }
            non_negative("property.price", plan.price)?;
            percent("property.mortgageRate", plan.mortgage_rate)?;
            if plan.term_years == 0 {
                return Err(SimulationError::invalid(
                    "property.termYears",
                    "must be at least one year",
                ));
            }
            match plan.down_payment {
                DownPayment::Amount(amount) => non_negative("property.downPayment", amount)?,
                DownPayment::Percent(pct) => percent("property.downPayment", pct)?,
            }
        }
    }
    Ok(())
}
