//! Stock-change planning.
//!
//! Pure decision logic for the stock mutation engine: given the stock on hand
//! and a requested change, decide the resulting stock or reject the change.
//! Nothing here touches storage; the engine persists the returned
//! [`StockChange`].

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

/// A non-zero signed stock change. Positive = receipt, negative = issue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct StockDelta(i64);

impl StockDelta {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::ZeroDelta);
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for StockDelta {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StockDelta> for i64 {
    fn from(value: StockDelta) -> Self {
        value.0
    }
}

impl core::fmt::Display for StockDelta {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// An accepted stock change: the counter moves from `previous` to `new_stock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous: i64,
    pub delta: StockDelta,
    pub new_stock: i64,
}

/// Decide whether `delta` may be applied to `on_hand`.
///
/// Fails with [`DomainError::InsufficientStock`] when the result would be
/// negative.
pub fn plan_delta(on_hand: i64, delta: StockDelta) -> DomainResult<StockChange> {
    let new_stock = on_hand
        .checked_add(delta.get())
        .ok_or_else(|| DomainError::validation("stock counter overflow"))?;

    if new_stock < 0 {
        return Err(DomainError::insufficient_stock(on_hand, delta.get()));
    }

    Ok(StockChange {
        previous: on_hand,
        delta,
        new_stock,
    })
}

/// Derive the delta that moves `on_hand` to `target`.
///
/// Returns `Ok(None)` when the target equals the stock on hand. The returned
/// delta is not validated against the non-negative rule; that is
/// [`plan_delta`]'s job.
pub fn plan_target(on_hand: i64, target: i64) -> DomainResult<Option<StockDelta>> {
    let delta = target
        .checked_sub(on_hand)
        .ok_or_else(|| DomainError::validation("stock target out of range"))?;

    if delta == 0 {
        return Ok(None);
    }
    StockDelta::new(delta).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(v: i64) -> StockDelta {
        StockDelta::new(v).unwrap()
    }

    #[test]
    fn zero_delta_is_rejected() {
        assert_eq!(StockDelta::new(0), Err(DomainError::ZeroDelta));
    }

    #[test]
    fn issue_beyond_stock_is_rejected() {
        let err = plan_delta(10, delta(-15)).unwrap_err();
        assert_eq!(err, DomainError::InsufficientStock { on_hand: 10, delta: -15 });
    }

    #[test]
    fn issue_down_to_zero_is_allowed() {
        let change = plan_delta(10, delta(-10)).unwrap();
        assert_eq!(change.previous, 10);
        assert_eq!(change.new_stock, 0);
        assert_eq!(change.delta.get(), -10);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let err = plan_delta(i64::MAX, delta(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn target_equal_to_stock_is_a_no_op() {
        assert_eq!(plan_target(7, 7).unwrap(), None);
    }

    #[test]
    fn target_derives_signed_delta() {
        assert_eq!(plan_target(7, 12).unwrap(), Some(delta(5)));
        assert_eq!(plan_target(7, 2).unwrap(), Some(delta(-5)));
        // Negative targets still derive a delta; plan_delta rejects it.
        assert_eq!(plan_target(7, -1).unwrap(), Some(delta(-8)));
    }

    #[test]
    fn delta_deserialization_rejects_zero() {
        assert!(StockDelta::try_from(0).is_err());
        assert_eq!(i64::from(delta(-3)), -3);
        assert_eq!(delta(4).to_string(), "+4");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: an accepted change never produces negative stock and
            /// always lands on `on_hand + delta`.
            #[test]
            fn accepted_changes_stay_non_negative(
                on_hand in 0i64..1_000_000,
                raw in -2_000_000i64..2_000_000
            ) {
                prop_assume!(raw != 0);
                match plan_delta(on_hand, StockDelta::new(raw).unwrap()) {
                    Ok(change) => {
                        prop_assert!(change.new_stock >= 0);
                        prop_assert_eq!(change.new_stock, on_hand + raw);
                        prop_assert_eq!(change.previous, on_hand);
                    }
                    Err(DomainError::InsufficientStock { on_hand: s, delta: d }) => {
                        prop_assert!(on_hand + raw < 0);
                        prop_assert_eq!(s, on_hand);
                        prop_assert_eq!(d, raw);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
            }

            /// Property: a sequence of planned changes keeps the counter equal
            /// to the sum of the accepted deltas.
            #[test]
            fn accepted_deltas_sum_to_stock(
                raws in proptest::collection::vec(-50i64..50, 0..64)
            ) {
                let mut stock = 0i64;
                let mut accepted = Vec::new();
                for raw in raws.into_iter().filter(|r| *r != 0) {
                    if let Ok(change) = plan_delta(stock, StockDelta::new(raw).unwrap()) {
                        stock = change.new_stock;
                        accepted.push(raw);
                    }
                    prop_assert!(stock >= 0);
                }
                prop_assert_eq!(stock, accepted.iter().sum::<i64>());
            }

            /// Property: a non-negative target is always reachable.
            #[test]
            fn non_negative_targets_are_reachable(
                on_hand in 0i64..1_000_000,
                target in 0i64..1_000_000
            ) {
                match plan_target(on_hand, target).unwrap() {
                    None => prop_assert_eq!(on_hand, target),
                    Some(d) => {
                        let change = plan_delta(on_hand, d).unwrap();
                        prop_assert_eq!(change.new_stock, target);
                    }
                }
            }
        }
    }
}
