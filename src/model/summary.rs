//! Pure dashboard derivations over a period's expense collection.
//!
//! The rendering layer draws cards, a pie chart and a trend line from these
//! values; nothing here holds state or mutates the collection.

use crate::model::{Amount, Category, Expense};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;

/// Totals for the summary cards.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    /// Configured monthly income the spend is measured against.
    pub income: Amount,
    /// Sum of all expense amounts in the collection.
    pub spent: Amount,
    /// `max(income - spent, 0)`.
    pub saved: Amount,
    /// Spend as a share of income, clamped to 100.
    pub percent_of_income: f64,
    pub count: usize,
}

impl MonthSummary {
    pub fn for_expenses(expenses: &[Expense], income: Amount) -> Self {
        let spent: Amount = expenses.iter().map(|e| e.amount).sum();
        let saved = if income > spent {
            income - spent
        } else {
            Amount::default()
        };
        let percent_of_income = if income.is_positive() {
            let ratio = (spent.value() / income.value()).to_f64().unwrap_or_default();
            (ratio * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            income,
            spent,
            saved,
            percent_of_income,
            count: expenses.len(),
        }
    }
}

/// One slice of the category breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySlice {
    pub category: Category,
    pub total: Amount,
    /// Rounded share of the period's total spend.
    pub share_percent: u32,
}

/// Per-category totals, largest first. Categories with no expenses are
/// omitted, matching the pie chart.
pub fn category_breakdown(expenses: &[Expense]) -> Vec<CategorySlice> {
    let mut totals: BTreeMap<Category, Amount> = BTreeMap::new();
    for e in expenses {
        *totals.entry(e.category).or_default() += e.amount;
    }
    let grand: Amount = totals.values().copied().sum();
    let mut slices: Vec<CategorySlice> = totals
        .into_iter()
        .map(|(category, total)| {
            let share = if grand.is_positive() {
                let ratio = (total.value() / grand.value()).to_f64().unwrap_or_default();
                (ratio * 100.0).round() as u32
            } else {
                0
            };
            CategorySlice {
                category,
                total,
                share_percent: share,
            }
        })
        .collect();
    slices.sort_by(|a, b| b.total.cmp(&a.total));
    slices
}

/// One point of the daily spend trend.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub day: NaiveDate,
    pub total: Amount,
}

/// Per-day totals in chronological order. Days with no expenses are omitted,
/// matching the trend chart.
pub fn daily_totals(expenses: &[Expense]) -> Vec<DailyTotal> {
    let mut totals: BTreeMap<NaiveDate, Amount> = BTreeMap::new();
    for e in expenses {
        *totals.entry(e.date.date_naive()).or_default() += e.amount;
    }
    totals
        .into_iter()
        .map(|(day, total)| DailyTotal { day, total })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payment;

    fn expense(date: &str, category: Category, amount: i64) -> Expense {
        Expense::new(
            Some(date.parse().unwrap()),
            category,
            Amount::from(amount),
            Payment::Upi,
            "",
        )
        .unwrap()
    }

    #[test]
    fn test_summary_of_empty_collection() {
        let s = MonthSummary::for_expenses(&[], Amount::from(15_000));
        assert!(s.spent.is_zero());
        assert_eq!(s.saved, Amount::from(15_000));
        assert_eq!(s.percent_of_income, 0.0);
        assert_eq!(s.count, 0);
    }

    #[test]
    fn test_summary_totals() {
        let expenses = vec![
            expense("2024-03-05T00:00:00Z", Category::Food, 250),
            expense("2024-03-06T00:00:00Z", Category::Gym, 1_000),
        ];
        let s = MonthSummary::for_expenses(&expenses, Amount::from(15_000));
        assert_eq!(s.spent, Amount::from(1_250));
        assert_eq!(s.saved, Amount::from(13_750));
        assert_eq!(s.count, 2);
        assert!((s.percent_of_income - 8.333).abs() < 0.01);
    }

    #[test]
    fn test_summary_overspend_clamps() {
        let expenses = vec![expense("2024-03-05T00:00:00Z", Category::Fun, 20_000)];
        let s = MonthSummary::for_expenses(&expenses, Amount::from(15_000));
        assert!(s.saved.is_zero());
        assert_eq!(s.percent_of_income, 100.0);
    }

    #[test]
    fn test_category_breakdown_largest_first() {
        let expenses = vec![
            expense("2024-03-05T00:00:00Z", Category::Food, 250),
            expense("2024-03-06T00:00:00Z", Category::Food, 250),
            expense("2024-03-07T00:00:00Z", Category::Commute, 1_500),
        ];
        let slices = category_breakdown(&expenses);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].category, Category::Commute);
        assert_eq!(slices[0].total, Amount::from(1_500));
        assert_eq!(slices[0].share_percent, 75);
        assert_eq!(slices[1].category, Category::Food);
        assert_eq!(slices[1].share_percent, 25);
    }

    #[test]
    fn test_daily_totals_chronological() {
        let expenses = vec![
            expense("2024-03-09T18:00:00Z", Category::Fun, 300),
            expense("2024-03-05T08:00:00Z", Category::Food, 100),
            expense("2024-03-05T20:00:00Z", Category::Food, 150),
        ];
        let days = daily_totals(&expenses);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(days[0].total, Amount::from(250));
        assert_eq!(days[1].total, Amount::from(300));
    }
}
