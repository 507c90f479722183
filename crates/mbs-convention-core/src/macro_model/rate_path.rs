use serde::{Deserialize, Serialize};

use crate::types::Rate;

/// One projected period of the macro scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePathPoint {
    /// 1-based period index
    pub period: u32,
    /// Projected reference (key) rate
    pub reference_rate: Rate,
    /// Market mortgage rate: reference rate plus the refinancing spread
    pub refinancing_rate: Rate,
}

/// Deterministic rate trajectory, one point per period, ordered by period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePath {
    pub points: Vec<RatePathPoint>,
    /// Reference rate observed at projection start (period 0)
    pub last_known_rate: Rate,
    pub refinancing_spread: Rate,
    pub warnings: Vec<String>,
}

impl RatePath {
    /// Rate point for `period`. Period 0 (and anything before the path) is the
    /// last known rate; periods past the end repeat the last projected point.
    pub fn rate_at(&self, period: u32) -> RatePathPoint {
        if period == 0 {
            return self.known_point();
        }
        match self.points.get(period as usize - 1) {
            Some(point) => *point,
            None => match self.points.last() {
                Some(last) => RatePathPoint {
                    period,
                    ..*last
                },
                None => RatePathPoint {
                    period,
                    ..self.known_point()
                },
            },
        }
    }

    /// Rate point `lag` periods before `period`, floored at period 0.
    pub fn lagged_rate_at(&self, period: u32, lag: u32) -> RatePathPoint {
        self.rate_at(period.saturating_sub(lag))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn known_point(&self) -> RatePathPoint {
        RatePathPoint {
            period: 0,
            reference_rate: self.last_known_rate,
            refinancing_rate: self.last_known_rate + self.refinancing_spread,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn path(rates: &[Decimal]) -> RatePath {
        RatePath {
            points: rates
                .iter()
                .enumerate()
                .map(|(i, r)| RatePathPoint {
                    period: i as u32 + 1,
                    reference_rate: *r,
                    refinancing_rate: *r + dec!(0.02),
                })
                .collect(),
            last_known_rate: dec!(0.16),
            refinancing_spread: dec!(0.02),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_empty_path_falls_back_to_last_known_rate() {
        let empty = path(&[]);
        let point = empty.rate_at(7);
        assert_eq!(point.period, 7);
        assert_eq!(point.reference_rate, dec!(0.16));
        assert_eq!(point.refinancing_rate, dec!(0.18));
    }

    #[test]
    fn test_rate_beyond_horizon_repeats_last_point() {
        let p = path(&[dec!(0.15), dec!(0.14)]);
        assert_eq!(p.rate_at(1).reference_rate, dec!(0.15));
        assert_eq!(p.rate_at(2).reference_rate, dec!(0.14));
        assert_eq!(p.rate_at(40).reference_rate, dec!(0.14));
        assert_eq!(p.rate_at(40).period, 40);
    }

    #[test]
    fn test_lag_reaches_back_to_known_rate() {
        let p = path(&[dec!(0.15), dec!(0.14)]);
        assert_eq!(p.lagged_rate_at(2, 1).reference_rate, dec!(0.15));
        assert_eq!(p.lagged_rate_at(1, 1).reference_rate, dec!(0.16));
        assert_eq!(p.lagged_rate_at(1, 5).reference_rate, dec!(0.16));
    }
}
