use super::types::{LifetimeTotals, ProjectionSummary, YearFlows, YearSnapshot};

fn accumulate(totals: &mut LifetimeTotals, flows: &YearFlows) {
    totals.gross_income += flows.gross_income;
    totals.taxes += flows.total_tax;
    totals.expenses += flows.expenses;
    totals.invested += flows.invested_this_year;
    totals.retirement_401k_contributions += flows.individual_401k + flows.employer_401k;
    totals.mortgage_interest += flows.mortgage_interest;
}

/// Headline figures for a finished run.
pub fn summarize(
    starting_net_worth: f64,
    snapshots: &[YearSnapshot],
    tax_data_incomplete: bool,
) -> ProjectionSummary {
    let mut lifetime = LifetimeTotals::default();
    let mut lifetime_pv = LifetimeTotals::default();
    let mut deficit_years = 0;
    let mut first_negative_cash_year = None;

    for snap in snapshots {
        accumulate(&mut lifetime, &snap.nominal);
        accumulate(&mut lifetime_pv, &snap.present_value);
        if snap.nominal.gap < 0.0 {
            deficit_years += 1;
        }
        if first_negative_cash_year.is_none() && snap.nominal.cash < 0.0 {
            first_negative_cash_year = Some(snap.year);
        }
    }

    let (retirement_net_worth, retirement_net_worth_pv) = snapshots
        .last()
        .map_or((starting_net_worth, starting_net_worth), |s| {
            (s.nominal.net_worth, s.present_value.net_worth)
        });
    let year_10 = snapshots.get(9);
    let growth_pct = (starting_net_worth > 0.0)
        .then(|| (retirement_net_worth - starting_net_worth) / starting_net_worth * 100.0);

    ProjectionSummary {
        current_net_worth: starting_net_worth,
        year_10_net_worth: year_10.map(|s| s.nominal.net_worth),
        year_10_net_worth_pv: year_10.map(|s| s.present_value.net_worth),
        retirement_net_worth,
        retirement_net_worth_pv,
        growth_pct,
        lifetime,
        lifetime_pv,
        deficit_years,
        first_negative_cash_year,
        tax_data_incomplete,
    }
}
