//! Decimal math helpers shared by the pool, bond and pricing stages.
//!
//! Everything stays in `rust_decimal::Decimal`; integer powers use iterative
//! multiplication, fractional powers go through `exp`/`ln`.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::types::Rate;

const SERIES_EPSILON: Decimal = dec!(0.00000000000000000001);

/// pi / 2 to 28 significant digits.
pub const HALF_PI: Decimal = dec!(1.5707963267948966192313216916);

/// Compute base^n for a non-negative integer exponent via iterative multiplication.
pub fn iterative_pow(base: Decimal, n: u32) -> Decimal {
    let mut result = Decimal::ONE;
    for _ in 0..n {
        result *= base;
    }
    result
}

/// Compute 1 / base^n via iterative multiplication.
pub fn iterative_pow_recip(base: Decimal, n: u32) -> Decimal {
    let pow = iterative_pow(base, n);
    if pow.is_zero() {
        Decimal::ZERO
    } else {
        Decimal::ONE / pow
    }
}

/// Compute the nth root of x using Newton's method (40 iterations).
pub fn nth_root(x: Decimal, n: u32) -> Decimal {
    if x == Decimal::ONE || n == 1 {
        return x;
    }
    if x.is_zero() {
        return Decimal::ZERO;
    }
    if n == 0 {
        return Decimal::ONE;
    }

    let n_dec = Decimal::from(n);
    let mut guess = Decimal::ONE;

    for _ in 0..40 {
        let g_n_minus_1 = iterative_pow(guess, n - 1);
        if g_n_minus_1.is_zero() {
            break;
        }
        let delta = (g_n_minus_1 * guess - x) / (n_dec * g_n_minus_1);
        guess -= delta;
        if delta.abs() < dec!(0.0000000000001) {
            break;
        }
    }

    guess
}

/// e^x. Negative arguments are inverted and large ones halved so the Taylor
/// series only ever sees |x| <= 1. Saturates at `Decimal::MAX` above 60 and
/// at zero below -60; callers scaling the result must use checked or
/// saturating arithmetic.
pub fn decimal_exp(x: Decimal) -> Decimal {
    if x.is_zero() {
        return Decimal::ONE;
    }
    // e^60 is ~1.1e26, close to the top of the Decimal range
    if x > dec!(60) {
        return Decimal::MAX;
    }
    if x < dec!(-60) {
        return Decimal::ZERO;
    }
    if x < Decimal::ZERO {
        let positive = decimal_exp(-x);
        return if positive.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE / positive
        };
    }

    let mut reduced = x;
    let mut halvings = 0u32;
    while reduced > Decimal::ONE {
        reduced /= dec!(2);
        halvings += 1;
    }

    let mut sum = Decimal::ONE;
    let mut term = Decimal::ONE;
    for n in 1..=40u32 {
        term *= reduced / Decimal::from(n);
        sum += term;
        if term.abs() < SERIES_EPSILON {
            break;
        }
    }

    for _ in 0..halvings {
        sum *= sum;
    }
    sum
}

/// Natural logarithm via Newton's method on e^y - x = 0.
pub fn decimal_ln(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO || x == Decimal::ONE {
        return Decimal::ZERO;
    }

    let mut guess = x - Decimal::ONE;
    if guess.abs() > dec!(2) {
        guess = Decimal::ZERO;
        let mut temp = x;
        let e_approx = dec!(2.718281828);
        if temp > Decimal::ONE {
            while temp > e_approx {
                temp /= e_approx;
                guess += Decimal::ONE;
            }
        } else {
            while temp < Decimal::ONE / e_approx {
                temp *= e_approx;
                guess -= Decimal::ONE;
            }
        }
        guess += temp - Decimal::ONE;
    }

    for _ in 0..30 {
        let exp_guess = decimal_exp(guess);
        if exp_guess.is_zero() {
            break;
        }
        let delta = (exp_guess - x) / exp_guess;
        guess -= delta;
        if delta.abs() < dec!(0.0000000000000001) {
            break;
        }
    }

    guess
}

/// base^exp for arbitrary Decimal exponent via exp(exp * ln(base)).
pub fn power_decimal(base: Decimal, exp: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    if exp.is_zero() || base == Decimal::ONE {
        return Decimal::ONE;
    }
    decimal_exp(exp * decimal_ln(base))
}

/// Arctangent. Arguments outside [-1, 1] use atan(x) = ±pi/2 - atan(1/x);
/// two half-angle reductions bring the series argument below tan(pi/16).
pub fn decimal_atan(x: Decimal) -> Decimal {
    if x.is_zero() {
        return Decimal::ZERO;
    }
    if x < Decimal::ZERO {
        return -decimal_atan(-x);
    }
    if x > Decimal::ONE {
        return HALF_PI - decimal_atan(Decimal::ONE / x);
    }

    // atan(x) = 2 * atan(x / (1 + sqrt(1 + x^2)))
    let mut reduced = x;
    for _ in 0..2 {
        let root = (Decimal::ONE + reduced * reduced)
            .sqrt()
            .unwrap_or(Decimal::ONE);
        reduced /= Decimal::ONE + root;
    }

    let x_sq = reduced * reduced;
    let mut power = reduced;
    let mut sum = Decimal::ZERO;
    for n in 0..60u32 {
        let term = power / Decimal::from(2 * n + 1);
        if n % 2 == 0 {
            sum += term;
        } else {
            sum -= term;
        }
        if term < SERIES_EPSILON {
            break;
        }
        power *= x_sq;
    }

    sum * dec!(4)
}

/// Convert an annual rate of decrement (CPR, CDR) into the per-period rate
/// for `periods_per_year` periods: 1 - (1 - annual)^(1/f).
pub fn annual_to_period_rate(annual: Rate, periods_per_year: u32) -> Rate {
    if annual <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if annual >= Decimal::ONE {
        return Decimal::ONE;
    }
    Decimal::ONE - nth_root(Decimal::ONE - annual, periods_per_year)
}
