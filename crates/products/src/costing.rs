//! Weighted average cost.
//!
//! Costs are in the smallest currency unit and rounded half-up. A negative
//! on-hand basis counts as empty.

/// Cost after receiving `quantity` units at `unit_cost` onto `on_hand` units
/// valued at `current_cost`.
///
/// `quantity <= 0` leaves the cost unchanged; an empty basis takes the
/// receipt cost.
pub fn weighted_average_cost(on_hand: i64, current_cost: u64, quantity: i64, unit_cost: u64) -> u64 {
    if quantity <= 0 {
        return current_cost;
    }
    let basis = on_hand.max(0) as u128;
    let quantity = quantity as u128;

    let value = basis * current_cost as u128 + quantity * unit_cost as u128;
    let units = basis + quantity;

    narrow(div_round_half_up(value, units), current_cost)
}

/// Undo a receipt of `quantity` units at `unit_cost`, where `on_hand` is the
/// stock before the units are taken back out.
///
/// When nothing would remain, or the remaining value would be negative, the
/// current cost is kept.
pub fn reverse_weighted_average_cost(on_hand: i64, current_cost: u64, quantity: i64, unit_cost: u64) -> u64 {
    if quantity <= 0 || on_hand <= quantity {
        return current_cost;
    }
    let remaining = (on_hand - quantity) as i128;
    let value = on_hand as i128 * current_cost as i128 - quantity as i128 * unit_cost as i128;
    if value < 0 {
        return current_cost;
    }

    narrow(div_round_half_up(value as u128, remaining as u128), current_cost)
}

fn div_round_half_up(n: u128, d: u128) -> u128 {
    (2 * n + d) / (2 * d)
}

fn narrow(v: u128, fallback: u64) -> u64 {
    u64::try_from(v).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blends_existing_and_received_units() {
        assert_eq!(weighted_average_cost(10, 100, 10, 200), 150);
        assert_eq!(weighted_average_cost(3, 100, 1, 101), 100);
        // 250 / 3 = 83.33
        assert_eq!(weighted_average_cost(2, 100, 1, 50), 83);
        // 5 / 2 = 2.5 rounds up
        assert_eq!(weighted_average_cost(1, 2, 1, 3), 3);
    }

    #[test]
    fn empty_or_negative_basis_takes_receipt_cost() {
        assert_eq!(weighted_average_cost(0, 999, 5, 120), 120);
        assert_eq!(weighted_average_cost(-4, 999, 5, 120), 120);
    }

    #[test]
    fn non_positive_quantity_keeps_cost() {
        assert_eq!(weighted_average_cost(10, 100, 0, 500), 100);
        assert_eq!(weighted_average_cost(10, 100, -3, 500), 100);
    }

    #[test]
    fn reverse_restores_previous_cost() {
        let after = weighted_average_cost(10, 100, 10, 200);
        assert_eq!(reverse_weighted_average_cost(20, after, 10, 200), 100);
    }

    #[test]
    fn reverse_keeps_cost_when_nothing_remains() {
        assert_eq!(reverse_weighted_average_cost(10, 150, 10, 200), 150);
        assert_eq!(reverse_weighted_average_cost(4, 150, 10, 200), 150);
    }

    #[test]
    fn reverse_keeps_cost_when_value_would_go_negative() {
        // Stock was sold down at a low average; taking back expensive units
        // would leave negative value.
        assert_eq!(reverse_weighted_average_cost(11, 10, 10, 500), 10);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: the blended cost lies between the two input costs.
            #[test]
            fn average_is_bounded(
                on_hand in 1i64..100_000,
                current in 0u64..1_000_000,
                qty in 1i64..100_000,
                unit in 0u64..1_000_000,
            ) {
                let avg = weighted_average_cost(on_hand, current, qty, unit);
                prop_assert!(avg >= current.min(unit));
                prop_assert!(avg <= current.max(unit));
            }

            /// Property: receiving at the current cost never moves it.
            #[test]
            fn same_cost_receipt_is_neutral(
                on_hand in 0i64..100_000,
                cost in 0u64..1_000_000,
                qty in 1i64..100_000,
            ) {
                prop_assert_eq!(weighted_average_cost(on_hand, cost, qty, cost), cost);
            }

            /// Property: reversing a receipt that did not exceed the basis
            /// comes back within one unit of rounding.
            #[test]
            fn reverse_undoes_receipt(
                basis in 1i64..10_000,
                current in 1u64..100_000,
                qty_frac in 1u32..=100,
                unit in 0u64..100_000,
            ) {
                let qty = ((basis as i128 * qty_frac as i128) / 100).max(1) as i64;
                let after = weighted_average_cost(basis, current, qty, unit);
                let back = reverse_weighted_average_cost(basis + qty, after, qty, unit);
                prop_assert!(back.abs_diff(current) <= 1, "current={current} back={back}");
            }
        }
    }
}
