//! Derived figures: totals, margins, vault balance, weekly bonuses.

use crate::{clock::calendar_day, Snapshot};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bonus paid per attended day.
pub const BONUS_PER_DAY: i64 = 300_000;

/// Sum of all sales and other revenue.
///
/// Each sale contributes its [`income`](crate::record::RegularSale::income),
/// so entries written without a total still count. Fractions are summed
/// before rounding.
pub fn total_income(snapshot: &Snapshot) -> i64 {
    let sales = snapshot.daily_menu.iter().map(|s| s.income()).sum::<f64>()
        + snapshot.regular_menu.iter().map(|s| s.income()).sum::<f64>();
    let other = snapshot.other_revenue.iter().map(|r| r.amount.value()).sum::<f64>();
    rounded(sales + other)
}

pub fn total_expenses(snapshot: &Snapshot) -> i64 {
    rounded(snapshot.expenses.iter().map(|e| e.amount.value()).sum())
}

/// Deposits minus withdrawals.
pub fn vault_balance(snapshot: &Snapshot) -> i64 {
    rounded(
        snapshot
            .vault_transactions
            .iter()
            .map(|tx| tx.signed_amount())
            .sum(),
    )
}

fn rounded(sum: f64) -> i64 {
    // `as` saturates at the i64 bounds.
    sum.round() as i64
}

/// Headline financial figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_income: i64,
    pub total_expenses: i64,
    pub net_profit: i64,
    /// Net profit as a percentage of income (0 when there is no income).
    pub profit_margin: f64,
    pub vault_balance: i64,
    pub pending_savings: i64,
}

impl FinancialSummary {
    pub fn of(snapshot: &Snapshot) -> Self {
        let total_income = total_income(snapshot);
        let total_expenses = total_expenses(snapshot);
        let net_profit = total_income - total_expenses;
        let profit_margin = if total_income > 0 {
            net_profit as f64 / total_income as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_income,
            total_expenses,
            net_profit,
            profit_margin,
            vault_balance: vault_balance(snapshot),
            pending_savings: snapshot.pending_savings(),
        }
    }
}

/// One employee's attendance within a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAttendance {
    pub employee_name: String,
    pub days: usize,
    pub bonus: i64,
}

/// Attendance for a Monday-to-Sunday week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// The Monday after the week, when bonuses are paid.
    pub payday: NaiveDate,
    pub employees: Vec<WeeklyAttendance>,
    pub total_bonus: i64,
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Count attendance per employee for the week containing `date`.
pub fn weekly_attendance(snapshot: &Snapshot, date: NaiveDate) -> WeekSummary {
    let start = week_start(date);
    let end = start + Duration::days(6);

    let mut days: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &snapshot.attendance {
        let Ok(day) = NaiveDate::parse_from_str(calendar_day(&record.date), "%Y-%m-%d") else {
            continue;
        };
        if day >= start && day <= end {
            *days.entry(record.employee_name.as_str()).or_default() += 1;
        }
    }

    let employees: Vec<WeeklyAttendance> = days
        .into_iter()
        .map(|(name, days)| WeeklyAttendance {
            employee_name: name.to_string(),
            days,
            bonus: days as i64 * BONUS_PER_DAY,
        })
        .collect();
    let total_bonus = employees.iter().map(|e| e.bonus).sum();

    WeekSummary {
        week_start: start,
        week_end: end,
        payday: end + Duration::days(1),
        employees,
        total_bonus,
    }
}
