//! Deterministic reference-rate projection.
//!
//! The path rule is configuration: a flat rate, exponential reversion toward a
//! long-run anchor, or a piecewise-constant schedule taken from an external
//! forecast. Rates outside a plausible band are accepted and flagged.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rate_path::{RatePath, RatePathPoint};
use crate::error::MbsError;
use crate::math::decimal_exp;
use crate::types::Rate;
use crate::MbsResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Projected rates above this level are flagged as implausible.
const IMPLAUSIBLE_RATE: Decimal = dec!(0.50);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One step of an external forecast: from `period` onwards the reference rate
/// is `rate` until the next step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: u32,
    pub rate: Rate,
}

/// Path-generation rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum RateRule {
    /// Every period equals the current rate
    #[default]
    Flat,
    /// r_k = anchor + (r0 - anchor) * exp(-speed * k / f)
    MeanReversion {
        anchor_rate: Rate,
        /// Annual speed of reversion
        speed: Decimal,
    },
    /// Piecewise-constant schedule; current rate before the first step
    Forecast { points: Vec<ForecastPoint> },
}

/// Macro scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroModelConfig {
    /// Reference rate observed at projection start
    pub current_rate: Rate,
    /// Spread of the market mortgage rate over the reference rate
    #[serde(default)]
    pub refinancing_spread: Rate,
    #[serde(default)]
    pub rule: RateRule,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Project the reference-rate path over `horizon` periods of
/// `periods_per_year` periods each.
pub fn project_rate_path(
    config: &MacroModelConfig,
    horizon: i64,
    periods_per_year: u32,
) -> MbsResult<RatePath> {
    if horizon < 0 {
        return Err(MbsError::InvalidHorizon { horizon });
    }
    validate_macro_config(config, periods_per_year)?;

    let horizon = u32::try_from(horizon)
        .map_err(|_| MbsError::config("horizon", "projection horizon exceeds u32 range"))?;
    let _span = tracing::debug_span!("macro_model", horizon, periods_per_year).entered();

    let mut points = Vec::with_capacity(horizon as usize);
    for period in 1..=horizon {
        let reference_rate = rate_for_period(config, period, periods_per_year);
        points.push(RatePathPoint {
            period,
            reference_rate,
            refinancing_rate: reference_rate + config.refinancing_spread,
        });
    }

    let warnings = plausibility_warnings(config.current_rate, &points);
    for w in &warnings {
        warn!(target: "mbs_convention::macro_model", "{w}");
    }
    debug!(points = points.len(), "rate path projected");

    Ok(RatePath {
        points,
        last_known_rate: config.current_rate,
        refinancing_spread: config.refinancing_spread,
        warnings,
    })
}

fn rate_for_period(config: &MacroModelConfig, period: u32, periods_per_year: u32) -> Rate {
    match &config.rule {
        RateRule::Flat => config.current_rate,
        RateRule::MeanReversion { anchor_rate, speed } => {
            let t = Decimal::from(period) / Decimal::from(periods_per_year);
            *anchor_rate + (config.current_rate - *anchor_rate) * decimal_exp(-*speed * t)
        }
        RateRule::Forecast { points } => points
            .iter()
            .take_while(|p| p.period <= period)
            .last()
            .map(|p| p.rate)
            .unwrap_or(config.current_rate),
    }
}

fn plausibility_warnings(current_rate: Rate, points: &[RatePathPoint]) -> Vec<String> {
    let mut warnings = Vec::new();
    if current_rate < Decimal::ZERO || current_rate > IMPLAUSIBLE_RATE {
        warnings.push(format!(
            "Current reference rate {current_rate} is outside the plausible range [0, {IMPLAUSIBLE_RATE}]"
        ));
    }

    let negative: Vec<u32> = points
        .iter()
        .filter(|p| p.reference_rate < Decimal::ZERO)
        .map(|p| p.period)
        .collect();
    if let Some(first) = negative.first() {
        warnings.push(format!(
            "Projected reference rate is negative in {} period(s), first at period {}",
            negative.len(),
            first
        ));
    }

    let high: Vec<u32> = points
        .iter()
        .filter(|p| p.reference_rate > IMPLAUSIBLE_RATE)
        .map(|p| p.period)
        .collect();
    if let Some(first) = high.first() {
        warnings.push(format!(
            "Projected reference rate exceeds {} in {} period(s), first at period {}",
            IMPLAUSIBLE_RATE,
            high.len(),
            first
        ));
    }
    warnings
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_macro_config(config: &MacroModelConfig, periods_per_year: u32) -> MbsResult<()> {
    if periods_per_year == 0 || 12 % periods_per_year != 0 {
        return Err(MbsError::config(
            "payment_frequency",
            "Periods per year must divide 12",
        ));
    }
    match &config.rule {
        RateRule::Flat => {}
        RateRule::MeanReversion { speed, .. } => {
            if *speed < Decimal::ZERO {
                return Err(MbsError::config(
                    "macro_model.rule.speed",
                    "Mean-reversion speed must be non-negative",
                ));
            }
        }
        RateRule::Forecast { points } => {
            for pair in points.windows(2) {
                if pair[1].period <= pair[0].period {
                    return Err(MbsError::config(
                        "macro_model.rule.points",
                        format!(
                            "Forecast periods must be strictly increasing ({} follows {})",
                            pair[1].period, pair[0].period
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Decimal, expected: Decimal, tol: Decimal, msg: &str) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "{}: expected ~{}, got {} (diff = {})",
            msg,
            expected,
            actual,
            diff
        );
    }

    fn flat(rate: Rate) -> MacroModelConfig {
        MacroModelConfig {
            current_rate: rate,
            refinancing_spread: dec!(0.015),
            rule: RateRule::Flat,
        }
    }

    #[test]
    fn test_negative_horizon_fails() {
        let err = project_rate_path(&flat(dec!(0.05)), -1, 12).unwrap_err();
        assert!(matches!(err, MbsError::InvalidHorizon { horizon: -1 }));
    }

    #[test]
    fn test_zero_horizon_gives_empty_path() {
        let path = project_rate_path(&flat(dec!(0.05)), 0, 12).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.last_known_rate, dec!(0.05));
        assert_eq!(path.rate_at(3).refinancing_rate, dec!(0.065));
    }

    #[test]
    fn test_flat_rule() {
        let path = project_rate_path(&flat(dec!(0.05)), 24, 12).unwrap();
        assert_eq!(path.len(), 24);
        assert!(path.points.iter().all(|p| p.reference_rate == dec!(0.05)));
        assert_eq!(path.points[23].period, 24);
        assert!(path.warnings.is_empty());
    }

    #[test]
    fn test_mean_reversion_approaches_anchor() {
        let config = MacroModelConfig {
            current_rate: dec!(0.16),
            refinancing_spread: Decimal::ZERO,
            rule: RateRule::MeanReversion {
                anchor_rate: dec!(0.08),
                speed: dec!(0.5),
            },
        };
        let path = project_rate_path(&config, 120, 12).unwrap();

        // after one year: 0.08 + 0.08 * e^-0.5
        assert_close(
            path.points[11].reference_rate,
            dec!(0.08) + dec!(0.08) * dec!(0.6065306597126334),
            dec!(0.0000000001),
            "rate after 12 months",
        );
        for pair in path.points.windows(2) {
            assert!(pair[1].reference_rate < pair[0].reference_rate);
            assert!(pair[1].reference_rate > dec!(0.08));
        }
    }

    #[test]
    fn test_forecast_is_piecewise_constant() {
        let config = MacroModelConfig {
            current_rate: dec!(0.16),
            refinancing_spread: dec!(0.02),
            rule: RateRule::Forecast {
                points: vec![
                    ForecastPoint { period: 3, rate: dec!(0.14) },
                    ForecastPoint { period: 6, rate: dec!(0.12) },
                ],
            },
        };
        let path = project_rate_path(&config, 8, 12).unwrap();
        let rates: Vec<Rate> = path.points.iter().map(|p| p.reference_rate).collect();
        assert_eq!(
            rates,
            vec![
                dec!(0.16),
                dec!(0.16),
                dec!(0.14),
                dec!(0.14),
                dec!(0.14),
                dec!(0.12),
                dec!(0.12),
                dec!(0.12)
            ]
        );
        assert_eq!(path.points[5].refinancing_rate, dec!(0.14));
    }

    #[test]
    fn test_forecast_must_be_increasing() {
        let config = MacroModelConfig {
            current_rate: dec!(0.10),
            refinancing_spread: Decimal::ZERO,
            rule: RateRule::Forecast {
                points: vec![
                    ForecastPoint { period: 4, rate: dec!(0.09) },
                    ForecastPoint { period: 4, rate: dec!(0.08) },
                ],
            },
        };
        let err = project_rate_path(&config, 12, 12).unwrap_err();
        assert!(matches!(err, MbsError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_implausible_rates_are_flagged_not_rejected() {
        let config = MacroModelConfig {
            current_rate: dec!(0.01),
            refinancing_spread: Decimal::ZERO,
            rule: RateRule::Forecast {
                points: vec![
                    ForecastPoint { period: 2, rate: dec!(-0.005) },
                    ForecastPoint { period: 5, rate: dec!(0.75) },
                ],
            },
        };
        let path = project_rate_path(&config, 6, 12).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path.warnings.len(), 2);
        assert!(path.warnings[0].contains("negative in 3 period(s), first at period 2"));
        assert!(path.warnings[1].contains("first at period 5"));
    }
}
