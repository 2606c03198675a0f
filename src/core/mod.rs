mod allocation;
mod engine;
mod error;
mod property;
mod summary;
pub mod tax;
mod types;
mod validate;

pub use allocation::{Allocation, allocate_gap};
pub use engine::run_projection;
pub use error::{BracketDataError, InputSection, SimulationError};
pub use property::{
    DEFAULT_MORTGAGE_RATE, MortgageMonth, MortgageYear, PropertyPosition, amortize_month,
    infer_annual_rate, monthly_payment,
};
pub use summary::summarize;
pub use types::{
    DownPayment, ExpenseMonth, HomePurchase, IncomeInput, IncomeMonth, IncomeStream,
    InvestmentAccount, InvestmentInput, InvestmentYear, LifetimeTotals, OwnedHome, Profile,
    ProjectionResult, ProjectionSummary, PropertyConfig, PropertyCosts, PropertyExpenseMode,
    PropertyMode, Retirement401k, SimulationInputs, StreamContribution, YearFlows, YearSnapshot,
    YearTax, YearTaxNotice,
};
pub use validate::{
    MAX_YEARS_FROM_BASE, SimulationRequest, tax_year_in_range, validate_horizon, validate_inputs,
};
