use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::allocation::allocate_gap;
use super::error::SimulationError;
use super::property::{MortgageYear, PropertyPosition};
use super::summary::summarize;
use super::tax::{BracketIndex, IncomeKind, Resolution, TaxCalculator, TaxQuery};
use super::types::{
    ExpenseMonth, IncomeMonth, InvestmentYear, ProjectionResult, PropertyExpenseMode,
    PropertyMode, SimulationInputs, StreamContribution, YearFlows, YearSnapshot, YearTax,
    YearTaxNotice,
};
use super::validate::{validate_horizon, validate_inputs};

#[derive(Debug, Clone)]
struct InvestmentPosition {
    id: String,
    cost_basis: f64,
    market_value: f64,
    growth_rate: f64,
    portfolio_pct: f64,
}

/// Balances carried from one simulated year to the next. Each run owns its
/// own state.
#[derive(Debug, Clone)]
struct SimulationState {
    cash: f64,
    retirement_401k: f64,
    investments: Vec<InvestmentPosition>,
    property: Option<PropertyPosition>,
}

impl SimulationState {
    fn from_inputs(inputs: &SimulationInputs) -> Result<Self, SimulationError> {
        let investments = inputs
            .investments
            .accounts
            .iter()
            .map(|account| InvestmentPosition {
                id: account.id.clone(),
                cost_basis: account.cost_basis,
                market_value: account.market_value,
                growth_rate: account.growth_rate,
                portfolio_pct: account.portfolio_pct,
            })
            .collect();

        let property = match &inputs.property.mode {
            PropertyMode::Own(home) => Some(PropertyPosition::owned(
                home,
                inputs.property.home_growth_rate,
            )?),
            PropertyMode::None | PropertyMode::Buy(_) => None,
        };

        Ok(Self {
            cash: inputs.investments.cash,
            retirement_401k: inputs.investments.retirement_401k.value,
            investments,
            property,
        })
    }

    fn investment_cost_basis(&self) -> f64 {
        self.investments.iter().map(|i| i.cost_basis).sum()
    }

    fn investment_market_value(&self) -> f64 {
        self.investments.iter().map(|i| i.market_value).sum()
    }

    fn home_value(&self) -> f64 {
        self.property.as_ref().map_or(0.0, |p| p.home_value)
    }

    fn mortgage_balance(&self) -> f64 {
        self.property.as_ref().map_or(0.0, |p| p.mortgage_balance)
    }

    fn home_equity(&self) -> f64 {
        self.property.as_ref().map_or(0.0, PropertyPosition::equity)
    }

    fn net_worth(&self) -> f64 {
        self.cash + self.retirement_401k + self.investment_market_value() + self.home_equity()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct IncomeYear {
    salary: f64,
    equity: f64,
    company_401k: f64,
}

/// Projects the household year by year from now to retirement.
///
/// Inputs are validated before the first year is simulated, so an error
/// never comes with a partial series.
pub fn run_projection(
    inputs: &SimulationInputs,
    index: &BracketIndex,
) -> Result<ProjectionResult, SimulationError> {
    validate_inputs(inputs)?;
    validate_horizon(inputs, index.base_year())?;

    let calculator = TaxCalculator::new(index).with_overrides(&inputs.tax_overrides);
    let mut state = SimulationState::from_inputs(inputs)?;
    let starting_net_worth = state.net_worth();
    let start_year = inputs.start_year.unwrap_or(index.base_year());
    let years = inputs.profile.years_to_retirement();

    let mut snapshots = Vec::with_capacity(years as usize);
    let mut tax_notices = Vec::new();
    for year in 1..=years {
        let snapshot = simulate_year(
            inputs,
            &calculator,
            &mut state,
            year,
            start_year,
            &mut tax_notices,
        );
        debug!(
            year,
            gap = snapshot.nominal.gap,
            net_worth = snapshot.nominal.net_worth,
            "simulated year"
        );
        snapshots.push(snapshot);
    }

    let tax_data_incomplete = tax_notices
        .iter()
        .any(|n: &YearTaxNotice| n.notice.resolution == Resolution::NotAvailable);
    let summary = summarize(starting_net_worth, &snapshots, tax_data_incomplete);
    info!(
        years,
        retirement_net_worth = summary.retirement_net_worth,
        notices = tax_notices.len(),
        "projection complete"
    );

    Ok(ProjectionResult {
        snapshots,
        summary,
        tax_notices,
    })
}

fn simulate_year(
    inputs: &SimulationInputs,
    calculator: &TaxCalculator<'_>,
    state: &mut SimulationState,
    year: u32,
    start_year: i32,
    tax_notices: &mut Vec<YearTaxNotice>,
) -> YearSnapshot {
    let profile = &inputs.profile;
    let inflation_multiplier = (1.0 + profile.inflation_rate / 100.0).powi(year as i32 - 1);
    let cash_target = inputs.investments.target_cash * inflation_multiplier;
    let calendar_year = start_year + year as i32 - 1;

    let mut down_payment = 0.0;
    let mut purchase_event = false;
    if let PropertyMode::Buy(plan) = &inputs.property.mode {
        if plan.purchase_year == year {
            let (position, down) =
                PropertyPosition::purchased(plan, year, inputs.property.home_growth_rate);
            info!(
                year,
                price = position.home_value,
                down_payment = down,
                "home purchase"
            );
            // Balance-sheet transfer: not an expense and not part of the gap.
            state.cash -= down;
            state.property = Some(position);
            down_payment = down;
            purchase_event = true;
        }
    }

    let months = year_months(&inputs.income.months, year);
    let income = sum_income(months);

    let (home_value_before, mortgage) = match state.property.as_mut() {
        Some(position) => {
            let value = position.home_value;
            (value, position.advance_year())
        }
        None => (0.0, MortgageYear::default()),
    };

    let stream_401k = individual_contributions(inputs, months, year);
    let individual_401k: f64 = stream_401k.iter().map(|s| s.individual_401k).sum();

    let taxable_income = income.salary + income.equity + income.company_401k - individual_401k;
    let tax = calculator.compute(&TaxQuery {
        amount: taxable_income,
        kind: IncomeKind::Ordinary,
        filing_status: profile.filing_status,
        location: &profile.location,
        tax_year: calendar_year,
        inflation_rate: profile.inflation_rate,
    });
    for notice in tax.notices(profile.filing_status) {
        if tax_notices.iter().any(|seen| seen.notice == notice) {
            continue;
        }
        if notice.resolution == Resolution::NotAvailable {
            warn!(
                year,
                level = ?notice.level,
                jurisdiction = %notice.jurisdiction,
                "tax brackets not available; this component is reported as zero"
            );
        }
        tax_notices.push(YearTaxNotice {
            first_year: year,
            notice,
        });
    }

    let expense_months = year_months(&inputs.expenses, year);
    let expenses: f64 = expense_months.iter().map(|m| m.total_nominal).sum();
    let expense_total_pv: f64 = expense_months.iter().map(|m| m.total_pv).sum();
    let (expense_categories_nominal, expense_categories_pv) = sum_categories(expense_months);

    let mortgage_payment = mortgage.payments();
    let simplified = inputs.property.expense_mode == PropertyExpenseMode::Simplified
        && state.property.is_some();
    let property_costs = if simplified {
        let costs = &inputs.property.costs;
        home_value_before * (costs.property_tax_rate + costs.maintenance_rate) / 100.0
            + costs.annual_insurance * inflation_multiplier
    } else {
        0.0
    };
    let housing_outflows = if simplified {
        mortgage_payment + property_costs
    } else {
        0.0
    };
    let total_outflows = tax.total_tax + expenses + housing_outflows;

    let gross_income = income.salary + income.equity;
    let gap = gross_income - individual_401k - total_outflows;

    let pcts = state
        .investments
        .iter()
        .map(|i| i.portfolio_pct)
        .collect::<Vec<_>>();
    let allocation = allocate_gap(gap, state.cash, cash_target, &pcts);
    state.cash = allocation.cash;

    let mut investments = Vec::with_capacity(state.investments.len());
    for (position, new_money) in state.investments.iter_mut().zip(&allocation.allocations) {
        let growth = 1.0 + position.growth_rate / 100.0;
        // Prior balance earns a full year, new money roughly half a year.
        position.market_value = position.market_value * growth + new_money * growth.sqrt();
        position.cost_basis += new_money;
        investments.push(InvestmentYear {
            id: position.id.clone(),
            allocation: *new_money,
            cost_basis: position.cost_basis,
            market_value: position.market_value,
            market_value_pv: position.market_value / inflation_multiplier,
        });
    }

    let plan_401k = &inputs.investments.retirement_401k;
    state.retirement_401k = state.retirement_401k * (1.0 + plan_401k.growth_rate / 100.0)
        + individual_401k
        + income.company_401k;

    let nominal = YearFlows {
        gross_income,
        salary: income.salary,
        equity: income.equity,
        employer_401k: income.company_401k,
        individual_401k,
        taxable_income,
        jurisdiction_tax: tax.jurisdiction_tax,
        federal_tax: tax.federal_tax,
        payroll_tax: tax.payroll_tax,
        total_tax: tax.total_tax,
        expenses,
        mortgage_payment,
        mortgage_interest: mortgage.interest,
        mortgage_principal: mortgage.principal,
        property_costs,
        down_payment,
        total_outflows,
        gap,
        cash_contribution: allocation.cash_contribution,
        cash_drawdown: allocation.cash_drawdown,
        invested_this_year: allocation.total_invested,
        cash: state.cash,
        cash_target,
        retirement_401k: state.retirement_401k,
        investment_cost_basis: state.investment_cost_basis(),
        investment_market_value: state.investment_market_value(),
        home_value: state.home_value(),
        mortgage_balance: state.mortgage_balance(),
        home_equity: state.home_equity(),
        home_appreciation: mortgage.appreciation,
        net_worth: state.net_worth(),
    };

    YearSnapshot {
        year,
        age: profile.age + year,
        calendar_year,
        inflation_multiplier,
        purchase_event,
        nominal,
        present_value: nominal.deflated(inflation_multiplier),
        tax: YearTax {
            effective_rate: tax.effective_rate,
            fallback_used: tax.fallback_used,
            not_available: tax.not_available,
        },
        investments,
        stream_401k,
        expense_categories_nominal,
        expense_categories_pv,
        expense_total_pv,
    }
}

fn year_months<T>(series: &[T], year: u32) -> &[T] {
    let start = (year as usize - 1) * 12;
    &series[start..start + 12]
}

// Summed month by month: monthly values vary with breaks and mid-year raises.
fn sum_income(months: &[IncomeMonth]) -> IncomeYear {
    months.iter().fold(IncomeYear::default(), |acc, month| IncomeYear {
        salary: acc.salary + month.salary,
        equity: acc.equity + month.equity,
        company_401k: acc.company_401k + month.company_401k,
    })
}

fn sum_categories(months: &[ExpenseMonth]) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    let mut nominal = BTreeMap::new();
    let mut pv = BTreeMap::new();
    for month in months {
        for (category, amount) in &month.categories_nominal {
            *nominal.entry(category.clone()).or_insert(0.0) += amount;
        }
        for (category, amount) in &month.categories_pv {
            *pv.entry(category.clone()).or_insert(0.0) += amount;
        }
    }
    (nominal, pv)
}

/// Individual 401(k) contribution per stream for `year`.
///
/// The elected amount and the plan limit are both indexed by the limit growth
/// rate, not by salary growth. A stream contributes while it is still working
/// and, when the series tracks active streams, while it is active in at least
/// one month of the year. A non-positive limit means uncapped. A stream with a
/// known annual income never defers more than that income.
fn individual_contributions(
    inputs: &SimulationInputs,
    months: &[IncomeMonth],
    year: u32,
) -> Vec<StreamContribution> {
    let plan = &inputs.investments.retirement_401k;
    let limit_growth = (1.0 + plan.limit_growth_rate / 100.0).powi(year as i32 - 1);
    let tracks_activity = months.iter().any(|m| !m.active_stream_ids.is_empty());

    inputs
        .income
        .streams
        .iter()
        .map(|stream| {
            let active = !tracks_activity
                || months
                    .iter()
                    .any(|m| m.active_stream_ids.iter().any(|id| id == &stream.id));
            let elected = if stream.is_working(year) && active {
                let mut capped = stream.individual_401k;
                if plan.contribution_limit > 0.0 {
                    capped = capped.min(plan.contribution_limit);
                }
                if stream.annual_income > 0.0 {
                    capped = capped.min(stream.annual_income);
                }
                capped.max(0.0) * limit_growth
            } else {
                0.0
            };
            StreamContribution {
                stream_id: stream.id.clone(),
                individual_401k: elected,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::{Country, FilingStatus, Location};
    use crate::core::types::{
        DownPayment, HomePurchase, IncomeInput, IncomeStream, InvestmentAccount,
        InvestmentInput, OwnedHome, Profile, PropertyConfig, PropertyCosts, Retirement401k,
    };
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn index() -> BracketIndex {
        BracketIndex::builtin().expect("builtin brackets parse")
    }

    fn flat_income(annual_salary: f64, years: u32, stream_id: &str) -> Vec<IncomeMonth> {
        (0..years * 12)
            .map(|_| IncomeMonth {
                salary: annual_salary / 12.0,
                equity: 0.0,
                company_401k: 0.0,
                active_stream_ids: vec![stream_id.to_string()],
            })
            .collect()
    }

    fn flat_expenses(annual: f64, years: u32, inflation_rate: f64) -> Vec<ExpenseMonth> {
        (0..years * 12)
            .map(|month| {
                let pv = annual / 12.0;
                let nominal = pv * (1.0 + inflation_rate / 100.0).powi((month / 12) as i32);
                ExpenseMonth {
                    total_nominal: nominal,
                    total_pv: pv,
                    categories_nominal: BTreeMap::from([("living".to_string(), nominal)]),
                    categories_pv: BTreeMap::from([("living".to_string(), pv)]),
                }
            })
            .collect()
    }

    /// The reference household: 30 to 65, $100k salary, $40k expenses,
    /// $10k cash at target, one account taking 100% at 7%.
    fn sample_inputs() -> SimulationInputs {
        let years = 35;
        SimulationInputs {
            profile: Profile {
                age: 30,
                retirement_age: 65,
                inflation_rate: 2.7,
                filing_status: FilingStatus::Single,
                location: Location::new(Country::Us, "TX"),
            },
            income: IncomeInput {
                months: flat_income(100_000.0, years, "job"),
                streams: vec![IncomeStream {
                    id: "job".to_string(),
                    name: "Job".to_string(),
                    annual_income: 100_000.0,
                    individual_401k: 0.0,
                    years_working: None,
                }],
            },
            expenses: flat_expenses(40_000.0, years, 2.7),
            investments: InvestmentInput {
                cash: 10_000.0,
                target_cash: 10_000.0,
                retirement_401k: Retirement401k::default(),
                accounts: vec![InvestmentAccount {
                    id: "index".to_string(),
                    name: "Index fund".to_string(),
                    cost_basis: 0.0,
                    market_value: 0.0,
                    growth_rate: 7.0,
                    portfolio_pct: 100.0,
                }],
            },
            property: PropertyConfig::default(),
            tax_overrides: Vec::new(),
            start_year: Some(2024),
        }
    }

    #[test]
    fn reference_household_first_two_years() {
        let result = run_projection(&sample_inputs(), &index()).expect("valid inputs");
        assert_eq!(result.snapshots.len(), 35);

        let y1 = &result.snapshots[0];
        assert!(y1.nominal.gap > 0.0);
        assert_approx(y1.nominal.cash_contribution, 0.0);
        assert!(y1.nominal.invested_this_year > 0.0);
        assert_approx(y1.nominal.invested_this_year, y1.nominal.gap);
        assert_approx(
            y1.nominal.investment_market_value,
            y1.nominal.invested_this_year * 1.07_f64.sqrt(),
        );

        let y2 = &result.snapshots[1];
        let expected = y1.nominal.investment_market_value * 1.07
            + y2.nominal.invested_this_year * 1.07_f64.sqrt();
        assert_approx(y2.nominal.investment_market_value, expected);
        assert_approx(y2.nominal.cash_target, 10_000.0 * 1.027);
        // Cash tops up to the indexed target before anything is invested.
        assert_approx(y2.nominal.cash_contribution, 270.0);
    }

    #[test]
    fn full_year_growth_on_new_money_would_overstate_balance() {
        let result = run_projection(&sample_inputs(), &index()).expect("valid inputs");
        let y1 = &result.snapshots[0];
        let full_year = y1.nominal.invested_this_year * 1.07;
        assert!(y1.nominal.investment_market_value < full_year - 1.0);
    }

    #[test]
    fn gap_identity_holds_every_year() {
        let mut inputs = sample_inputs();
        inputs.income.streams[0].individual_401k = 15_000.0;
        inputs.investments.retirement_401k.contribution_limit = 23_000.0;
        inputs.investments.retirement_401k.limit_growth_rate = 2.0;
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        for snap in &result.snapshots {
            let n = &snap.nominal;
            assert_approx(
                n.gap,
                n.gross_income - n.individual_401k - n.total_tax - n.expenses,
            );
        }
    }

    #[test]
    fn present_value_divides_by_inflation_multiplier() {
        let result = run_projection(&sample_inputs(), &index()).expect("valid inputs");
        let y1 = &result.snapshots[0];
        assert_approx(y1.inflation_multiplier, 1.0);
        assert_approx(y1.present_value.net_worth, y1.nominal.net_worth);

        let y10 = &result.snapshots[9];
        assert_approx(y10.inflation_multiplier, 1.027_f64.powi(9));
        assert_approx(
            y10.present_value.net_worth,
            y10.nominal.net_worth / 1.027_f64.powi(9),
        );
        assert_approx(y10.present_value.expenses, 40_000.0);
    }

    #[test]
    fn individual_401k_follows_limit_growth_and_working_years() {
        let mut inputs = sample_inputs();
        inputs.income.streams[0].individual_401k = 30_000.0;
        inputs.income.streams[0].years_working = Some(3);
        inputs.investments.retirement_401k = Retirement401k {
            value: 50_000.0,
            growth_rate: 5.0,
            contribution_limit: 23_000.0,
            limit_growth_rate: 3.0,
        };
        let result = run_projection(&inputs, &index()).expect("valid inputs");

        assert_approx(result.snapshots[0].nominal.individual_401k, 23_000.0);
        assert_approx(result.snapshots[2].nominal.individual_401k, 23_000.0 * 1.03_f64.powi(2));
        assert_approx(result.snapshots[3].nominal.individual_401k, 0.0);
        assert_approx(
            result.snapshots[0].nominal.retirement_401k,
            50_000.0 * 1.05 + 23_000.0,
        );
        assert_approx(
            result.snapshots[0].nominal.taxable_income,
            100_000.0 - 23_000.0,
        );
    }

    #[test]
    fn inactive_stream_does_not_contribute() {
        let mut inputs = sample_inputs();
        inputs.income.streams.push(IncomeStream {
            id: "side".to_string(),
            name: "Side gig".to_string(),
            annual_income: 0.0,
            individual_401k: 5_000.0,
            years_working: None,
        });
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        let y1 = &result.snapshots[0];
        assert_eq!(y1.stream_401k.len(), 2);
        assert_approx(y1.stream_401k[1].individual_401k, 0.0);
    }

    #[test]
    fn employer_match_lands_in_401k_and_is_taxed_but_not_cash() {
        let mut inputs = sample_inputs();
        for month in &mut inputs.income.months {
            month.company_401k = 500.0;
        }
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        let y1 = &result.snapshots[0].nominal;
        assert_approx(y1.employer_401k, 6_000.0);
        assert_approx(y1.gross_income, 100_000.0);
        assert_approx(y1.taxable_income, 106_000.0);
        assert_approx(y1.retirement_401k, 6_000.0);
    }

    #[test]
    fn monthly_income_is_summed_not_extrapolated() {
        let mut inputs = sample_inputs();
        // Career break: no salary for the first half of year 1.
        for month in inputs.income.months.iter_mut().take(6) {
            month.salary = 0.0;
        }
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        assert_approx(result.snapshots[0].nominal.salary, 50_000.0);
        assert_approx(result.snapshots[1].nominal.salary, 100_000.0);
    }

    #[test]
    fn deficit_draws_cash_and_leaves_investments_alone() {
        let mut inputs = sample_inputs();
        inputs.expenses = flat_expenses(150_000.0, 35, 0.0);
        inputs.investments.accounts[0].market_value = 100_000.0;
        inputs.investments.accounts[0].cost_basis = 80_000.0;
        let result = run_projection(&inputs, &index()).expect("valid inputs");

        let y1 = &result.snapshots[0];
        assert!(y1.nominal.gap < 0.0);
        assert_approx(y1.nominal.cash, 10_000.0 + y1.nominal.gap);
        assert_approx(y1.nominal.cash_drawdown, -y1.nominal.gap);
        assert_approx(y1.nominal.investment_cost_basis, 80_000.0);
        assert_approx(y1.nominal.investment_market_value, 107_000.0);
        assert_eq!(result.summary.first_negative_cash_year, Some(1));
        assert_eq!(result.summary.deficit_years, 35);
    }

    #[test]
    fn purchase_event_moves_down_payment_out_of_cash_without_touching_gap() {
        let mut inputs = sample_inputs();
        inputs.investments.cash = 120_000.0;
        inputs.property = PropertyConfig {
            mode: PropertyMode::Buy(HomePurchase {
                purchase_year: 2,
                price: 400_000.0,
                down_payment: DownPayment::Percent(20.0),
                mortgage_rate: 6.0,
                term_years: 30,
            }),
            home_growth_rate: 3.0,
            costs: PropertyCosts::default(),
            expense_mode: PropertyExpenseMode::Itemized,
        };
        let result = run_projection(&inputs, &index()).expect("valid inputs");

        let y1 = &result.snapshots[0];
        assert!(!y1.purchase_event);
        assert_approx(y1.nominal.home_value, 0.0);

        let y2 = &result.snapshots[1];
        let price = 400_000.0 * 1.03;
        assert!(y2.purchase_event);
        assert_approx(y2.nominal.down_payment, price * 0.2);
        assert_approx(y2.nominal.home_value, price * 1.03);
        assert!(y2.nominal.mortgage_balance < price * 0.8);
        assert_approx(
            y2.nominal.mortgage_payment,
            y2.nominal.mortgage_interest + y2.nominal.mortgage_principal,
        );
        // Itemized mode keeps housing out of outflows.
        assert_approx(y2.nominal.total_outflows, y2.nominal.total_tax + y2.nominal.expenses);
        assert_approx(
            y2.nominal.cash,
            y1.nominal.cash - price * 0.2 + y2.nominal.cash_contribution,
        );
    }

    #[test]
    fn simplified_mode_adds_mortgage_and_carrying_costs_to_outflows() {
        let mut inputs = sample_inputs();
        inputs.property = PropertyConfig {
            mode: PropertyMode::Own(OwnedHome {
                home_value: 500_000.0,
                mortgage_balance: 300_000.0,
                monthly_payment: 2_000.0,
                interest_rate: Some(5.0),
                remaining_term_years: None,
            }),
            home_growth_rate: 2.0,
            costs: PropertyCosts {
                property_tax_rate: 1.0,
                maintenance_rate: 0.5,
                annual_insurance: 1_200.0,
            },
            expense_mode: PropertyExpenseMode::Simplified,
        };
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        let y1 = &result.snapshots[0].nominal;

        assert_approx(y1.mortgage_payment, 24_000.0);
        assert_approx(y1.property_costs, 500_000.0 * 0.015 + 1_200.0);
        assert_approx(
            y1.total_outflows,
            y1.total_tax + y1.expenses + y1.mortgage_payment + y1.property_costs,
        );
        assert_approx(
            y1.gap,
            y1.gross_income - y1.individual_401k - y1.total_outflows,
        );
        assert_approx(y1.home_value, 510_000.0);
        assert_approx(y1.home_equity, 510_000.0 - y1.mortgage_balance);
    }

    #[test]
    fn mortgage_payoff_mid_horizon_stops_payments() {
        let mut inputs = sample_inputs();
        inputs.property = PropertyConfig {
            mode: PropertyMode::Own(OwnedHome {
                home_value: 300_000.0,
                mortgage_balance: 30_000.0,
                monthly_payment: 1_000.0,
                interest_rate: Some(0.0),
                remaining_term_years: None,
            }),
            home_growth_rate: 0.0,
            costs: PropertyCosts::default(),
            expense_mode: PropertyExpenseMode::Simplified,
        };
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        assert_approx(result.snapshots[1].nominal.mortgage_balance, 6_000.0);
        assert_approx(result.snapshots[2].nominal.mortgage_payment, 6_000.0);
        assert_approx(result.snapshots[2].nominal.mortgage_balance, 0.0);
        assert_approx(result.snapshots[3].nominal.mortgage_payment, 0.0);
        assert_approx(result.snapshots[3].nominal.home_equity, 300_000.0);
    }

    #[test]
    fn unknown_jurisdiction_is_reported_once() {
        let mut inputs = sample_inputs();
        inputs.profile.location = Location::new(Country::Us, "ZZ");
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        assert!(result.summary.tax_data_incomplete);
        assert_eq!(result.tax_notices.len(), 1);
        assert_eq!(result.tax_notices[0].first_year, 1);
        assert!(result.snapshots.iter().all(|s| s.tax.not_available));
    }

    #[test]
    fn invalid_input_fails_without_partial_output() {
        let mut inputs = sample_inputs();
        inputs.expenses.truncate(100);
        let err = run_projection(&inputs, &index()).expect_err("short series");
        assert!(matches!(err, SimulationError::SeriesTooShort { series: "expenses", .. }));
    }

    #[test]
    fn appreciation_and_series_pv_reach_the_snapshot() {
        let mut inputs = sample_inputs();
        inputs.property = PropertyConfig {
            mode: PropertyMode::Own(OwnedHome {
                home_value: 400_000.0,
                mortgage_balance: 0.0,
                monthly_payment: 0.0,
                interest_rate: None,
                remaining_term_years: None,
            }),
            home_growth_rate: 4.0,
            ..PropertyConfig::default()
        };
        let result = run_projection(&inputs, &index()).expect("valid inputs");

        assert_approx(result.snapshots[0].nominal.home_appreciation, 16_000.0);
        assert_approx(result.snapshots[1].nominal.home_appreciation, 16_640.0);
        assert_approx(result.snapshots[0].expense_total_pv, 40_000.0);
        assert_approx(result.snapshots[9].expense_total_pv, 40_000.0);
    }

    #[test]
    fn deferral_is_capped_by_stream_income() {
        let mut inputs = sample_inputs();
        inputs.income.streams[0].annual_income = 12_000.0;
        inputs.income.streams[0].individual_401k = 20_000.0;
        inputs.investments.retirement_401k.contribution_limit = 23_000.0;
        let result = run_projection(&inputs, &index()).expect("valid inputs");
        assert_approx(result.snapshots[0].nominal.individual_401k, 12_000.0);
    }

    #[test]
    fn extreme_start_year_is_an_error_not_a_panic() {
        let mut inputs = sample_inputs();
        inputs.profile.retirement_age = 31;
        inputs.start_year = Some(i32::MIN);
        let err = run_projection(&inputs, &index()).expect_err("start year out of range");
        assert!(matches!(err, SimulationError::InvalidInput { ref field, .. } if field == "startYear"));

        inputs.start_year = Some(i32::MAX);
        assert!(run_projection(&inputs, &index()).is_err());
    }

    #[test]
    fn calendar_year_indexes_tax_brackets() {
        let mut inputs = sample_inputs();
        inputs.start_year = Some(2034);
        let later = run_projection(&inputs, &index()).expect("valid inputs");
        let base = run_projection(&sample_inputs(), &index()).expect("valid inputs");
        assert_eq!(later.snapshots[0].calendar_year, 2034);
        // Same nominal income against brackets indexed ten years forward.
        assert!(later.snapshots[0].nominal.total_tax < base.snapshots[0].nominal.total_tax);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_zero_growth_zero_contribution_keeps_investments_flat(
            start_value in 0u32..1_000_000,
            salary in 10_000u32..200_000,
            extra_expense in 0u32..50_000,
            years in 1u32..15
        ) {
            let mut inputs = sample_inputs();
            inputs.profile.retirement_age = inputs.profile.age + years;
            inputs.income.months = flat_income(salary as f64, years, "job");
            // Expenses at least as large as salary keep the gap negative.
            inputs.expenses = flat_expenses(salary as f64 + extra_expense as f64, years, 0.0);
            inputs.investments.accounts[0].growth_rate = 0.0;
            inputs.investments.accounts[0].market_value = start_value as f64;
            inputs.investments.accounts[0].cost_basis = start_value as f64;

            let result = run_projection(&inputs, &index()).expect("valid inputs");
            let mut previous = start_value as f64;
            for snap in &result.snapshots {
                prop_assert!(snap.nominal.invested_this_year == 0.0);
                prop_assert!((snap.nominal.investment_market_value - previous).abs() <= 1e-9);
                previous = snap.nominal.investment_market_value;
            }
        }

        #[test]
        fn prop_gap_identity_and_conservation(
            salary in 0u32..400_000,
            expense in 0u32..200_000,
            cash in 0u32..50_000,
            target in 0u32..50_000,
            pct in 0u32..=100,
            elected in 0u32..30_000
        ) {
            let years = 3;
            let mut inputs = sample_inputs();
            inputs.profile.retirement_age = inputs.profile.age + years;
            inputs.income.months = flat_income(salary as f64, years, "job");
            inputs.income.streams[0].individual_401k = elected as f64;
            inputs.expenses = flat_expenses(expense as f64, years, 2.7);
            inputs.investments.cash = cash as f64;
            inputs.investments.target_cash = target as f64;
            inputs.investments.accounts[0].portfolio_pct = pct as f64;

            let result = run_projection(&inputs, &index()).expect("valid inputs");
            let mut previous_cash = cash as f64;
            for snap in &result.snapshots {
                let n = &snap.nominal;
                let identity = n.gross_income - n.individual_401k - n.total_tax - n.expenses;
                prop_assert!((n.gap - identity).abs() <= 1e-6);
                if n.gap >= 0.0 {
                    let routed = n.cash_contribution + n.invested_this_year;
                    prop_assert!((routed - n.gap).abs() <= 1e-6);
                } else {
                    prop_assert!(n.invested_this_year == 0.0);
                    prop_assert!((n.cash - (previous_cash + n.gap)).abs() <= 1e-6);
                }
                previous_cash = n.cash;
            }
        }
    }

    #[test]
    fn snapshots_serialize_with_camel_case_keys() {
        let result = run_projection(&sample_inputs(), &index()).expect("valid inputs");
        let json = serde_json::to_value(&result.snapshots[0]).expect("serialize");
        assert!(json["nominal"]["netWorth"].is_number());
        assert!(json["presentValue"]["individual401k"].is_number());
        assert!(json["expenseCategoriesPV"]["living"].is_number());
        assert_approx_tol(
            json["nominal"]["salary"].as_f64().unwrap_or_default(),
            100_000.0,
            1e-6,
        );
    }
}
