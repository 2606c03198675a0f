use tracing::warn;

use super::error::SimulationError;
use super::types::{DownPayment, HomePurchase, OwnedHome};

/// Rate assumed for an owned home when neither a rate nor a remaining term is
/// known.
pub const DEFAULT_MORTGAGE_RATE: f64 = 6.5;

// Balances below this are treated as paid off.
const PAYOFF_EPSILON: f64 = 1e-6;

/// Fixed monthly payment for a fully amortizing loan. `annual_rate` is in
/// percent. A zero rate amortizes linearly.
pub fn monthly_payment(balance: f64, annual_rate: f64, term_years: u32) -> f64 {
    let n = (term_years.max(1) * 12) as f64;
    if balance <= 0.0 {
        return 0.0;
    }
    let r = annual_rate / 100.0 / 12.0;
    if r.abs() < 1e-12 {
        return balance / n;
    }
    let growth = (1.0 + r).powf(n);
    balance * (r * growth) / (growth - 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MortgageMonth {
    pub interest: f64,
    pub principal: f64,
}

impl MortgageMonth {
    pub fn payment(&self) -> f64 {
        self.interest + self.principal
    }
}

/// One month of amortization. Principal never goes negative and never exceeds
/// the remaining balance; nothing is charged once the balance is zero.
///
/// A payment below the month's interest pays interest only: the reported
/// interest is what was paid, and the unpaid part is not added to the balance.
pub fn amortize_month(balance: &mut f64, annual_rate: f64, payment: f64) -> MortgageMonth {
    if *balance <= PAYOFF_EPSILON {
        *balance = 0.0;
        return MortgageMonth::default();
    }
    let accrued = *balance * (annual_rate / 100.0 / 12.0);
    let interest = accrued.min(payment.max(0.0));
    let mut principal = (payment - accrued).max(0.0).min(*balance);
    if *balance - principal <= PAYOFF_EPSILON {
        principal = *balance;
    }
    *balance -= principal;
    MortgageMonth {
        interest,
        principal,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MortgageYear {
    pub interest: f64,
    pub principal: f64,
    pub appreciation: f64,
}

impl MortgageYear {
    pub fn payments(&self) -> f64 {
        self.interest + self.principal
    }
}

/// Annual rate (percent) that amortizes `balance` over `months` with the
/// given payment, found by bisection. `None` when the payment cannot repay
/// the balance even at a zero rate.
pub fn infer_annual_rate(balance: f64, payment: f64, months: u32) -> Option<f64> {
    if balance <= 0.0 || payment <= 0.0 || months == 0 {
        return None;
    }
    let n = months as f64;
    if payment * n < balance - 1e-6 {
        return None;
    }
    let payment_at = |annual_rate: f64| {
        let r = annual_rate / 100.0 / 12.0;
        if r.abs() < 1e-12 {
            return balance / n;
        }
        let growth = (1.0 + r).powf(n);
        balance * (r * growth) / (growth - 1.0)
    };

    let (mut low, mut high) = (0.0_f64, 100.0_f64);
    if payment_at(high) < payment {
        return Some(high);
    }
    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if payment_at(mid) < payment {
            low = mid;
        } else {
            high = mid;
        }
        if high - low < 1e-10 {
            break;
        }
    }
    Some(0.5 * (low + high))
}

/// Running state of the household's home and its mortgage.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPosition {
    pub home_value: f64,
    pub mortgage_balance: f64,
    pub monthly_payment: f64,
    pub annual_rate: f64,
    pub growth_rate: f64,
}

impl PropertyPosition {
    pub fn owned(home: &OwnedHome, growth_rate: f64) -> Result<Self, SimulationError> {
        if home.home_value < 0.0 || home.mortgage_balance < 0.0 || home.monthly_payment < 0.0 {
            return Err(SimulationError::invalid(
                "property",
                "home value, mortgage balance and payment must be non-negative",
            ));
        }

        let annual_rate = match (home.interest_rate, home.remaining_term_years) {
            (Some(rate), _) => rate,
            (None, _) if home.mortgage_balance <= 0.0 => 0.0,
            (None, Some(years)) => {
                infer_annual_rate(home.mortgage_balance, home.monthly_payment, years * 12)
                    .ok_or_else(|| {
                        SimulationError::invalid(
                            "property.monthlyPayment",
                            "payment cannot repay the balance within the remaining term",
                        )
                    })?
            }
            (None, None) => {
                warn!(
                    rate = DEFAULT_MORTGAGE_RATE,
                    "no mortgage rate or remaining term given, assuming default rate"
                );
                DEFAULT_MORTGAGE_RATE
            }
        };

        Ok(Self {
            home_value: home.home_value,
            mortgage_balance: home.mortgage_balance,
            monthly_payment: home.monthly_payment,
            annual_rate,
            growth_rate,
        })
    }

    /// Position right after a purchase in simulation year `year`, together
    /// with the down payment due in cash.
    pub fn purchased(plan: &HomePurchase, year: u32, growth_rate: f64) -> (Self, f64) {
        let elapsed = year.saturating_sub(1) as i32;
        let price = plan.price * (1.0 + growth_rate / 100.0).powi(elapsed);
        let down_payment = match plan.down_payment {
            DownPayment::Amount(amount) => amount,
            DownPayment::Percent(pct) => price * pct / 100.0,
        }
        .clamp(0.0, price);
        let balance = price - down_payment;

        let position = Self {
            home_value: price,
            mortgage_balance: balance,
            monthly_payment: monthly_payment(balance, plan.mortgage_rate, plan.term_years),
            annual_rate: plan.mortgage_rate,
            growth_rate,
        };
        (position, down_payment)
    }

    /// Twelve months of amortization followed by one year of appreciation.
    pub fn advance_year(&mut self) -> MortgageYear {
        let mut year = MortgageYear::default();
        for _ in 0..12 {
            let month = amortize_month(
                &mut self.mortgage_balance,
                self.annual_rate,
                self.monthly_payment,
            );
            year.interest += month.interest;
            year.principal += month.principal;
        }
        let appreciated = self.home_value * (1.0 + self.growth_rate / 100.0);
        year.appreciation = appreciated - self.home_value;
        self.home_value = appreciated;
        year
    }

    pub fn equity(&self) -> f64 {
        (self.home_value - self.mortgage_balance).max(0.0)
    }
}
