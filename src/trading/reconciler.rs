//! Position reconciliation: DCA sizing, weighted-average merge, take-profit target.
//!
//! Everything here is pure arithmetic on [`PositionState`]. The processor
//! feeds it the last traded price at signal time, which stands in for the
//! real fill price of the market order.

use rust_decimal::Decimal;

use crate::error::SignalError;
use crate::models::{PositionSide, PositionState};

use super::TradingConfig;

/// Capital fraction for a 1-based DCA step.
pub fn step_ratio(config: &TradingConfig, step: i64) -> Result<Decimal, SignalError> {
    let ratio = usize::try_from(step)
        .ok()
        .and_then(|s| s.checked_sub(1))
        .and_then(|i| config.dca_ratios.get(i))
        .copied()
        .unwrap_or(Decimal::ZERO);

    if ratio <= Decimal::ZERO {
        return Err(SignalError::InvalidStep(step));
    }
    Ok(ratio)
}

/// Leveraged USDT exposure for one tranche: capital * ratio * leverage.
pub fn entry_notional(config: &TradingConfig, ratio: Decimal) -> Decimal {
    config.capital * ratio * Decimal::from(config.leverage)
}

/// Base-asset quantity for one tranche before exchange rounding.
pub fn entry_quantity(
    config: &TradingConfig,
    ratio: Decimal,
    last_price: Decimal,
) -> Result<Decimal, SignalError> {
    if last_price <= Decimal::ZERO {
        return Err(SignalError::MarketData(format!(
            "non-positive last price {}",
            last_price
        )));
    }
    Ok(entry_notional(config, ratio) / last_price)
}

/// Reject a signal that would open the other direction on top of an open position.
pub fn check_side(current: &PositionState, intended: PositionSide) -> Result<(), SignalError> {
    match current.open_side() {
        Some(existing) if existing != intended => Err(SignalError::ConflictingSide {
            existing,
            requested: intended,
        }),
        _ => Ok(()),
    }
}

/// Merge a new fill into the running position.
///
/// The returned state has its take-profit id cleared; the caller places the
/// replacement order and fills it in.
pub fn merge_entry(
    current: &PositionState,
    incoming_qty: Decimal,
    incoming_price: Decimal,
    intended: PositionSide,
) -> Result<PositionState, SignalError> {
    if incoming_qty <= Decimal::ZERO {
        return Err(SignalError::Order(format!(
            "fill quantity must be positive, got {}",
            incoming_qty
        )));
    }
    check_side(current, intended)?;

    let new_qty = current.quantity + incoming_qty;
    let new_avg = match current.average_price {
        Some(avg) if !current.is_flat() => {
            (avg * current.quantity + incoming_price * incoming_qty) / new_qty
        }
        _ => incoming_price,
    };

    Ok(PositionState {
        side: Some(intended),
        quantity: new_qty,
        average_price: Some(new_avg),
        take_profit_order_id: None,
    })
}

/// Take-profit price before exchange tick rounding.
pub fn take_profit_price(average_price: Decimal, side: PositionSide, tp_pct: Decimal) -> Decimal {
    match side {
        PositionSide::Long => average_price * (Decimal::ONE + tp_pct),
        PositionSide::Short => average_price * (Decimal::ONE - tp_pct),
    }
}

pub fn reset_to_flat() -> PositionState {
    PositionState::flat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open(side: PositionSide, qty: Decimal, avg: Decimal) -> PositionState {
        PositionState {
            side: Some(side),
            quantity: qty,
            average_price: Some(avg),
            take_profit_order_id: Some("tp-1".to_string()),
        }
    }

    #[test]
    fn test_step_ratio() {
        let config = TradingConfig::default();
        assert_eq!(step_ratio(&config, 1).unwrap(), dec!(0.167));
        assert_eq!(step_ratio(&config, 3).unwrap(), dec!(0.333));
        assert!(matches!(step_ratio(&config, 0), Err(SignalError::InvalidStep(0))));
        assert!(matches!(step_ratio(&config, 5), Err(SignalError::InvalidStep(5))));
        assert!(matches!(step_ratio(&config, -1), Err(SignalError::InvalidStep(-1))));
        assert!(matches!(
            step_ratio(&config, i64::MAX),
            Err(SignalError::InvalidStep(i64::MAX))
        ));
    }

    #[test]
    fn test_zero_ratio_is_invalid_step() {
        let mut config = TradingConfig::default();
        config.dca_ratios[1] = Decimal::ZERO;
        assert!(matches!(step_ratio(&config, 2), Err(SignalError::InvalidStep(2))));
    }

    #[test]
    fn test_first_tranche_sizing() {
        // capital 100, leverage 3, step 1 at 50k
        let config = TradingConfig::default();
        let ratio = step_ratio(&config, 1).unwrap();

        assert_eq!(entry_notional(&config, ratio), dec!(50.1));
        assert_eq!(
            entry_quantity(&config, ratio, dec!(50000)).unwrap(),
            dec!(0.001002)
        );
    }

    #[test]
    fn test_sizing_rejects_zero_price() {
        let config = TradingConfig::default();
        assert!(matches!(
            entry_quantity(&config, dec!(0.167), Decimal::ZERO),
            Err(SignalError::MarketData(_))
        ));
    }

    #[test]
    fn test_merge_from_flat_uses_incoming_price() {
        let state = merge_entry(
            &PositionState::flat(),
            dec!(0.001),
            dec!(50000),
            PositionSide::Long,
        )
        .unwrap();

        assert_eq!(state.side, Some(PositionSide::Long));
        assert_eq!(state.quantity, dec!(0.001));
        assert_eq!(state.average_price, Some(dec!(50000)));
        assert_eq!(state.take_profit_order_id, None);
    }

    #[test]
    fn test_merge_add_weighted_average() {
        let current = open(PositionSide::Long, dec!(0.001), dec!(50000));
        let state = merge_entry(&current, dec!(0.001), dec!(51000), PositionSide::Long).unwrap();

        assert_eq!(state.quantity, dec!(0.002));
        assert_eq!(state.average_price, Some(dec!(50500)));
        assert_eq!(state.take_profit_order_id, None);
    }

    #[test]
    fn test_merge_second_add_between_prices() {
        // step 3 at 51k on top of 0.001 @ 50k
        let config = TradingConfig::default();
        let ratio = step_ratio(&config, 3).unwrap();
        let increment = entry_quantity(&config, ratio, dec!(51000))
            .unwrap()
            .round_dp_with_strategy(4, rust_decimal::RoundingStrategy::ToZero);

        let current = open(PositionSide::Long, dec!(0.001), dec!(50000));
        let state = merge_entry(&current, increment, dec!(51000), PositionSide::Long).unwrap();

        assert_eq!(state.quantity, dec!(0.001) + increment);
        let avg = state.average_price.unwrap();
        assert!(avg > dec!(50000) && avg < dec!(51000));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let fills = [
            (dec!(0.002), dec!(40000)),
            (dec!(0.001), dec!(42000)),
            (dec!(0.004), dec!(38000)),
        ];

        let apply = |order: &[usize]| {
            order.iter().fold(PositionState::flat(), |state, &i| {
                let (qty, price) = fills[i];
                merge_entry(&state, qty, price, PositionSide::Long).unwrap()
            })
        };

        let forward = apply(&[0, 1, 2]);
        let reverse = apply(&[2, 1, 0]);
        let shuffled = apply(&[1, 2, 0]);

        // (80 + 42 + 152) / 0.007
        let expected = dec!(274) / dec!(0.007);
        for state in [&forward, &reverse, &shuffled] {
            assert_eq!(state.quantity, dec!(0.007));
            let diff = (state.average_price.unwrap() - expected).abs();
            assert!(diff < dec!(0.000001), "avg drifted by {}", diff);
        }
    }

    #[test]
    fn test_merge_rejects_opposite_side() {
        let current = open(PositionSide::Long, dec!(0.001), dec!(50000));
        let result = merge_entry(&current, dec!(0.001), dec!(49000), PositionSide::Short);

        assert!(matches!(
            result,
            Err(SignalError::ConflictingSide {
                existing: PositionSide::Long,
                requested: PositionSide::Short,
            })
        ));
    }

    #[test]
    fn test_merge_ignores_stale_side_when_flat() {
        // A zero-quantity record with a leftover side does not block a new direction
        let stale = PositionState {
            side: Some(PositionSide::Long),
            ..PositionState::flat()
        };
        let state = merge_entry(&stale, dec!(1), dec!(100), PositionSide::Short).unwrap();
        assert_eq!(state.side, Some(PositionSide::Short));
        assert_eq!(state.average_price, Some(dec!(100)));
    }

    #[test]
    fn test_merge_rejects_non_positive_quantity() {
        let result = merge_entry(&PositionState::flat(), Decimal::ZERO, dec!(100), PositionSide::Long);
        assert!(matches!(result, Err(SignalError::Order(_))));
    }

    #[test]
    fn test_take_profit_price() {
        let tp = dec!(0.031);
        assert_eq!(take_profit_price(dec!(50000), PositionSide::Long, tp), dec!(51550));
        assert_eq!(take_profit_price(dec!(50000), PositionSide::Short, tp), dec!(48450));

        for avg in [dec!(0.0123), dec!(1), dec!(2650.75), dec!(98000)] {
            assert!(take_profit_price(avg, PositionSide::Long, tp) > avg);
            assert!(take_profit_price(avg, PositionSide::Short, tp) < avg);
        }
    }

    #[test]
    fn test_reset_to_flat() {
        let state = reset_to_flat();
        assert!(state.is_flat());
        assert_eq!(state, PositionState::flat());
    }
}
