// Amounts below this are floating-point noise, not money to route.
const LEFTOVER_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Cash balance after routing the gap.
    pub cash: f64,
    pub cash_contribution: f64,
    pub cash_drawdown: f64,
    /// New money per investment, in input order.
    pub allocations: Vec<f64>,
    pub total_invested: f64,
}

/// Routes one year's gap between cash and investments.
///
/// A surplus tops cash up to `target_cash`, then goes to each investment by
/// its percentage. Whatever the percentages leave over tops cash up again,
/// is spread across investments in proportion to their percentages, and any
/// final remainder lands in cash even above target. A deficit comes out of
/// cash alone and may take it negative; investments are never sold.
pub fn allocate_gap(gap: f64, cash: f64, target_cash: f64, portfolio_pcts: &[f64]) -> Allocation {
    let mut allocations = vec![0.0; portfolio_pcts.len()];

    if gap < 0.0 {
        return Allocation {
            cash: cash + gap,
            cash_contribution: 0.0,
            cash_drawdown: -gap,
            allocations,
            total_invested: 0.0,
        };
    }

    let mut cash = cash;
    let mut cash_contribution = 0.0;
    let mut top_up_cash = |cash: &mut f64, available: f64| -> f64 {
        let fill = (target_cash - *cash).max(0.0).min(available);
        *cash += fill;
        cash_contribution += fill;
        fill
    };

    let mut remaining = gap;
    remaining -= top_up_cash(&mut cash, remaining);

    let pcts = portfolio_pcts.iter().map(|p| p.max(0.0)).collect::<Vec<_>>();
    let total_pct: f64 = pcts.iter().sum();
    // Percentages summing past 100 are scaled down so the surplus is not
    // over-allocated.
    let scale = total_pct.max(100.0);
    for (slot, pct) in allocations.iter_mut().zip(&pcts) {
        *slot = remaining * pct / scale;
    }

    let mut leftover = remaining - allocations.iter().sum::<f64>();
    if leftover > LEFTOVER_EPSILON {
        leftover -= top_up_cash(&mut cash, leftover);

        if total_pct > 0.0 && leftover > LEFTOVER_EPSILON {
            let mut spread = 0.0;
            for (slot, pct) in allocations.iter_mut().zip(&pcts) {
                let extra = leftover * pct / total_pct;
                *slot += extra;
                spread += extra;
            }
            leftover -= spread;
        }

        if leftover > LEFTOVER_EPSILON {
            cash += leftover;
            cash_contribution += leftover;
        }
    }

    let total_invested = allocations.iter().sum();
    Allocation {
        cash,
        cash_contribution,
        cash_drawdown: 0.0,
        allocations,
        total_invested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn surplus_fills_cash_target_first() {
        let out = allocate_gap(5_000.0, 2_000.0, 10_000.0, &[100.0]);
        assert_approx(out.cash, 7_000.0);
        assert_approx(out.cash_contribution, 5_000.0);
        assert_approx(out.total_invested, 0.0);
    }

    #[test]
    fn surplus_beyond_target_goes_to_investments_by_percentage() {
        let out = allocate_gap(30_000.0, 10_000.0, 10_000.0, &[60.0, 40.0]);
        assert_approx(out.cash_contribution, 0.0);
        assert_approx(out.allocations[0], 18_000.0);
        assert_approx(out.allocations[1], 12_000.0);
        assert_approx(out.total_invested, 30_000.0);
    }

    #[test]
    fn unallocated_share_is_spread_proportionally() {
        // 50 + 25 leaves 25% unallocated; the remainder follows the 2:1 ratio.
        let out = allocate_gap(12_000.0, 10_000.0, 10_000.0, &[50.0, 25.0]);
        assert_approx(out.allocations[0], 8_000.0);
        assert_approx(out.allocations[1], 4_000.0);
        assert_approx(out.cash_contribution, 0.0);
    }

    #[test]
    fn no_investments_means_everything_lands_in_cash_even_above_target() {
        let out = allocate_gap(20_000.0, 9_000.0, 10_000.0, &[]);
        assert_approx(out.cash, 29_000.0);
        assert_approx(out.cash_contribution, 20_000.0);
        assert!(out.allocations.is_empty());
    }

    #[test]
    fn zero_percent_investments_leave_surplus_in_cash() {
        let out = allocate_gap(1_000.0, 10_000.0, 10_000.0, &[0.0, 0.0]);
        assert_approx(out.cash, 11_000.0);
        assert_approx(out.total_invested, 0.0);
    }

    #[test]
    fn percentages_over_100_are_normalized() {
        let out = allocate_gap(10_000.0, 0.0, 0.0, &[100.0, 100.0]);
        assert_approx(out.allocations[0], 5_000.0);
        assert_approx(out.allocations[1], 5_000.0);
    }

    #[test]
    fn deficit_draws_cash_negative_without_touching_investments() {
        let out = allocate_gap(-15_000.0, 10_000.0, 10_000.0, &[70.0, 30.0]);
        assert_approx(out.cash, -5_000.0);
        assert_approx(out.cash_drawdown, 15_000.0);
        assert_eq!(out.allocations, vec![0.0, 0.0]);
        assert_approx(out.total_invested, 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(128))]

        #[test]
        fn prop_surplus_is_fully_routed(
            gap in 0u32..500_000,
            cash in -50_000i32..100_000,
            target in 0u32..100_000,
            pcts in vec(0u32..=100, 0..5)
        ) {
            let pcts = pcts.into_iter().map(f64::from).collect::<Vec<_>>();
            let out = allocate_gap(gap as f64, cash as f64, target as f64, &pcts);
            let routed = out.cash_contribution + out.allocations.iter().sum::<f64>();
            prop_assert!((routed - gap as f64).abs() <= 1e-6, "routed {routed} of {gap}");
            prop_assert!((out.cash - (cash as f64 + out.cash_contribution)).abs() <= 1e-6);
            prop_assert!(out.allocations.iter().all(|a| *a >= 0.0));
        }

        #[test]
        fn prop_deficit_only_moves_cash(
            deficit in 1u32..500_000,
            cash in -50_000i32..100_000,
            pcts in vec(0u32..=100, 0..5)
        ) {
            let pcts = pcts.into_iter().map(f64::from).collect::<Vec<_>>();
            let out = allocate_gap(-(deficit as f64), cash as f64, 20_000.0, &pcts);
            prop_assert!(out.allocations.iter().all(|a| *a == 0.0));
            prop_assert!(out.total_invested == 0.0);
            prop_assert!((out.cash - (cash as f64 - deficit as f64)).abs() <= 1e-9);
        }
    }
}
