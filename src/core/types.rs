use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::tax::{FallbackOverride, FilingStatus, Location, TaxNotice};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub age: u32,
    pub retirement_age: u32,
    /// Annual inflation in percent.
    pub inflation_rate: f64,
    pub filing_status: FilingStatus,
    pub location: Location,
}

impl Profile {
    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age.saturating_sub(self.age)
    }
}

/// One month of projected income across all streams, nominal dollars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomeMonth {
    pub salary: f64,
    pub equity: f64,
    #[serde(rename = "company401k")]
    pub company_401k: f64,
    pub active_stream_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStream {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Annual pay in today's dollars; caps the elected deferral when
    /// positive.
    #[serde(default)]
    pub annual_income: f64,
    /// Elected individual 401(k) contribution in today's dollars.
    #[serde(default, rename = "individual401k")]
    pub individual_401k: f64,
    /// Simulation years this stream keeps working; `None` means until
    /// retirement.
    #[serde(default)]
    pub years_working: Option<u32>,
}

impl IncomeStream {
    pub fn is_working(&self, year: u32) -> bool {
        self.years_working.is_none_or(|years| year <= years)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomeInput {
    pub months: Vec<IncomeMonth>,
    pub streams: Vec<IncomeStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpenseMonth {
    pub total_nominal: f64,
    #[serde(rename = "totalPV")]
    pub total_pv: f64,
    pub categories_nominal: BTreeMap<String, f64>,
    #[serde(rename = "categoriesPV")]
    pub categories_pv: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost_basis: f64,
    #[serde(default)]
    pub market_value: f64,
    /// Annual growth in percent.
    #[serde(default)]
    pub growth_rate: f64,
    /// Share of each year's surplus, in percent. Shares across accounts may
    /// sum to less than 100.
    #[serde(default)]
    pub portfolio_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Retirement401k {
    pub value: f64,
    pub growth_rate: f64,
    /// Individual contribution limit in today's dollars.
    pub contribution_limit: f64,
    /// Annual growth of the limit, independent of salary growth.
    pub limit_growth_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvestmentInput {
    pub cash: f64,
    /// Cash buffer in today's dollars; indexed by inflation every year.
    pub target_cash: f64,
    #[serde(rename = "retirement401k")]
    pub retirement_401k: Retirement401k,
    pub accounts: Vec<InvestmentAccount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownPayment {
    Amount(f64),
    Percent(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedHome {
    pub home_value: f64,
    pub mortgage_balance: f64,
    pub monthly_payment: f64,
    /// Annual rate in percent; inferred from the payment when absent.
    #[serde(default)]
    pub interest_rate: Option<f64>,
    #[serde(default)]
    pub remaining_term_years: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePurchase {
    /// Simulation year (1-based) in which the purchase happens.
    pub purchase_year: u32,
    /// Price in today's dollars; grown by the home growth rate until purchase.
    pub price: f64,
    pub down_payment: DownPayment,
    pub mortgage_rate: f64,
    pub term_years: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PropertyMode {
    #[default]
    None,
    Own(OwnedHome),
    Buy(HomePurchase),
}

/// Carrying costs used when the expense series does not already include
/// housing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyCosts {
    /// Percent of home value per year.
    pub property_tax_rate: f64,
    /// Percent of home value per year.
    pub maintenance_rate: f64,
    /// Today's dollars; indexed by inflation.
    pub annual_insurance: f64,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyExpenseMode {
    /// Housing costs are already part of the expense series.
    #[default]
    Itemized,
    /// Mortgage payments and carrying costs are added to outflows.
    Simplified,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfig {
    #[serde(flatten)]
    pub mode: PropertyMode,
    #[serde(default)]
    pub home_growth_rate: f64,
    #[serde(default)]
    pub costs: PropertyCosts,
    #[serde(default)]
    pub expense_mode: PropertyExpenseMode,
}

/// Validated inputs for one projection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInputs {
    pub profile: Profile,
    pub income: IncomeInput,
    pub expenses: Vec<ExpenseMonth>,
    pub investments: InvestmentInput,
    pub property: PropertyConfig,
    pub tax_overrides: Vec<FallbackOverride>,
    /// Calendar year of simulation year 1; defaults to the bracket base year.
    pub start_year: Option<i32>,
}

/// Cash-flow and balance fields for one year, either nominal or deflated to
/// present value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearFlows {
    pub gross_income: f64,
    pub salary: f64,
    pub equity: f64,
    #[serde(rename = "employer401k")]
    pub employer_401k: f64,
    #[serde(rename = "individual401k")]
    pub individual_401k: f64,
    pub taxable_income: f64,
    pub jurisdiction_tax: f64,
    pub federal_tax: f64,
    pub payroll_tax: f64,
    pub total_tax: f64,
    pub expenses: f64,
    pub mortgage_payment: f64,
    pub mortgage_interest: f64,
    pub mortgage_principal: f64,
    pub property_costs: f64,
    pub down_payment: f64,
    pub total_outflows: f64,
    pub gap: f64,
    pub cash_contribution: f64,
    pub cash_drawdown: f64,
    pub invested_this_year: f64,
    pub cash: f64,
    pub cash_target: f64,
    #[serde(rename = "retirement401k")]
    pub retirement_401k: f64,
    pub investment_cost_basis: f64,
    pub investment_market_value: f64,
    pub home_value: f64,
    pub mortgage_balance: f64,
    pub home_equity: f64,
    pub home_appreciation: f64,
    pub net_worth: f64,
}

impl YearFlows {
    pub fn deflated(&self, divisor: f64) -> Self {
        let d = divisor.max(1e-9);
        Self {
            gross_income: self.gross_income / d,
            salary: self.salary / d,
            equity: self.equity / d,
            employer_401k: self.employer_401k / d,
            individual_401k: self.individual_401k / d,
            taxable_income: self.taxable_income / d,
            jurisdiction_tax: self.jurisdiction_tax / d,
            federal_tax: self.federal_tax / d,
            payroll_tax: self.payroll_tax / d,
            total_tax: self.total_tax / d,
            expenses: self.expenses / d,
            mortgage_payment: self.mortgage_payment / d,
            mortgage_interest: self.mortgage_interest / d,
            mortgage_principal: self.mortgage_principal / d,
            property_costs: self.property_costs / d,
            down_payment: self.down_payment / d,
            total_outflows: self.total_outflows / d,
            gap: self.gap / d,
            cash_contribution: self.cash_contribution / d,
            cash_drawdown: self.cash_drawdown / d,
            invested_this_year: self.invested_this_year / d,
            cash: self.cash / d,
            cash_target: self.cash_target / d,
            retirement_401k: self.retirement_401k / d,
            investment_cost_basis: self.investment_cost_basis / d,
            investment_market_value: self.investment_market_value / d,
            home_value: self.home_value / d,
            mortgage_balance: self.mortgage_balance / d,
            home_equity: self.home_equity / d,
            home_appreciation: self.home_appreciation / d,
            net_worth: self.net_worth / d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentYear {
    pub id: String,
    pub allocation: f64,
    pub cost_basis: f64,
    pub market_value: f64,
    #[serde(rename = "marketValuePV")]
    pub market_value_pv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamContribution {
    pub stream_id: String,
    #[serde(rename = "individual401k")]
    pub individual_401k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTax {
    pub effective_rate: f64,
    pub fallback_used: bool,
    pub not_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: u32,
    pub age: u32,
    pub calendar_year: i32,
    pub inflation_multiplier: f64,
    pub purchase_event: bool,
    pub nominal: YearFlows,
    pub present_value: YearFlows,
    pub tax: YearTax,
    pub investments: Vec<InvestmentYear>,
    #[serde(rename = "stream401k")]
    pub stream_401k: Vec<StreamContribution>,
    pub expense_categories_nominal: BTreeMap<String, f64>,
    #[serde(rename = "expenseCategoriesPV")]
    pub expense_categories_pv: BTreeMap<String, f64>,
    /// Sum of the expense series' own present-value totals for the year.
    #[serde(rename = "expenseTotalPV")]
    pub expense_total_pv: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeTotals {
    pub gross_income: f64,
    pub taxes: f64,
    pub expenses: f64,
    pub invested: f64,
    #[serde(rename = "retirement401kContributions")]
    pub retirement_401k_contributions: f64,
    pub mortgage_interest: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub current_net_worth: f64,
    pub year_10_net_worth: Option<f64>,
    #[serde(rename = "year10NetWorthPV")]
    pub year_10_net_worth_pv: Option<f64>,
    pub retirement_net_worth: f64,
    #[serde(rename = "retirementNetWorthPV")]
    pub retirement_net_worth_pv: f64,
    /// Percent change from current to retirement net worth; `None` when the
    /// starting net worth is not positive.
    pub growth_pct: Option<f64>,
    pub lifetime: LifetimeTotals,
    #[serde(rename = "lifetimePV")]
    pub lifetime_pv: LifetimeTotals,
    pub deficit_years: u32,
    pub first_negative_cash_year: Option<u32>,
    pub tax_data_incomplete: bool,
}

/// A tax notice together with the first simulation year it applied to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTaxNotice {
    pub first_year: u32,
    #[serde(flatten)]
    pub notice: TaxNotice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub snapshots: Vec<YearSnapshot>,
    pub summary: ProjectionSummary,
    pub tax_notices: Vec<YearTaxNotice>,
}
