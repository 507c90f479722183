//! Day-count conventions and month arithmetic for payment schedules.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Years;

/// Day count convention for interest accrual and period fractions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// 30/360 US convention
    #[default]
    Thirty360,
    /// ACT/360 money market convention
    Actual360,
    /// ACT/365 fixed
    Actual365,
    /// ACT/ACT ISDA: days in each calendar year over that year's length
    ActualActual,
}

impl DayCountConvention {
    /// Year fraction between two dates. Returns zero when `end <= start`.
    pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> Years {
        if end <= start {
            return Decimal::ZERO;
        }
        match self {
            DayCountConvention::Thirty360 => {
                Decimal::from(thirty_360_days(start, end)) / dec!(360)
            }
            DayCountConvention::Actual360 => {
                Decimal::from((end - start).num_days()) / dec!(360)
            }
            DayCountConvention::Actual365 => {
                Decimal::from((end - start).num_days()) / dec!(365)
            }
            DayCountConvention::ActualActual => actual_actual_isda(start, end),
        }
    }
}

/// Payment date of period `period` (1-based): the first payment date rolled
/// forward by whole periods. Rolling always starts from the first date so a
/// month-end anchor is not lost after a short month.
pub fn payment_date(first_payment_date: NaiveDate, periods_per_year: u32, period: u32) -> NaiveDate {
    if period <= 1 {
        return first_payment_date;
    }
    let months_per_period = (12 / periods_per_year.max(1)) as i32;
    add_months(first_payment_date, months_per_period * (period as i32 - 1))
}

/// Add a number of months to a date, clamping the day to the month's max.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total_months = date.year() * 12 + date.month() as i32 - 1 + months;
    let new_year = total_months.div_euclid(12);
    let new_month = (total_months.rem_euclid(12) + 1) as u32;
    let max_day = days_in_month(new_year, new_month);
    let day = date.day().min(max_day);
    NaiveDate::from_ymd_opt(new_year, new_month, day).unwrap_or(date)
}

/// Number of days in a given month/year.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// 30/360 day count (raw days, not fraction).
pub fn thirty_360_days(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut d1 = start.day() as i32;
    let mut d2 = end.day() as i32;

    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && d1 >= 30 {
        d2 = 30;
    }

    (end.year() - start.year()) * 360
        + (end.month() as i32 - start.month() as i32) * 30
        + (d2 - d1)
}

fn actual_actual_isda(start: NaiveDate, end: NaiveDate) -> Years {
    let mut total = Decimal::ZERO;
    let mut cursor = start;
    while cursor < end {
        let year = cursor.year();
        let next_year = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap_or(end);
        let segment_end = next_year.min(end);
        let year_days = if is_leap_year(year) { dec!(366) } else { dec!(365) };
        total += Decimal::from((segment_end - cursor).num_days()) / year_days;
        if segment_end <= cursor {
            break;
        }
        cursor = segment_end;
    }
    total
}
