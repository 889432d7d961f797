use serde::Serialize;

use super::types::ShareBasis;

/// A statement line item, read as one value per historical year.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineItem {
    Revenue,
    GrossProfit,
    FinancialCost,
    InterestExpense,
    ProfitBeforeTax,
    NetIncome,
    BasicEps,
    CurrentAssets,
    Cash,
    ShortTermInvestments,
    CurrentLiabilities,
    LongTermLiabilities,
    TotalLiabilities,
    Equity,
    TotalAssets,
    Depreciation,
    Capex,
    DividendsPaid,
    BorrowingProceeds,
    DebtRepaid,
}

impl LineItem {
    pub const ALL: [LineItem; 20] = [
        LineItem::Revenue,
        LineItem::GrossProfit,
        LineItem::FinancialCost,
        LineItem::InterestExpense,
        LineItem::ProfitBeforeTax,
        LineItem::NetIncome,
        LineItem::BasicEps,
        LineItem::CurrentAssets,
        LineItem::Cash,
        LineItem::ShortTermInvestments,
        LineItem::CurrentLiabilities,
        LineItem::LongTermLiabilities,
        LineItem::TotalLiabilities,
        LineItem::Equity,
        LineItem::TotalAssets,
        LineItem::Depreciation,
        LineItem::Capex,
        LineItem::DividendsPaid,
        LineItem::BorrowingProceeds,
        LineItem::DebtRepaid,
    ];

    /// Cash outflows are reported with mixed signs; these are stored as magnitudes.
    pub fn is_outflow(self) -> bool {
        matches!(
            self,
            LineItem::Capex | LineItem::DividendsPaid | LineItem::DebtRepaid
        )
    }
}

/// Line items by year. Every series has one value per entry in `years`;
/// items that were never found read as zeros.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialStatements {
    pub years: Vec<i32>,
    items: Vec<(LineItem, Vec<f64>)>,
}

impl FinancialStatements {
    pub fn new(years: Vec<i32>) -> Self {
        Self {
            years,
            items: Vec::new(),
        }
    }

    /// Stores a series, padding with zeros or truncating to the year count.
    pub fn set(&mut self, item: LineItem, mut values: Vec<f64>) {
        values.resize(self.years.len(), 0.0);
        if item.is_outflow() {
            values.iter_mut().for_each(|v| *v = v.abs());
        }
        match self.items.iter_mut().find(|(i, _)| *i == item) {
            Some((_, existing)) => *existing = values,
            None => self.items.push((item, values)),
        }
    }

    pub fn with(mut self, item: LineItem, values: Vec<f64>) -> Self {
        self.set(item, values);
        self
    }

    pub fn contains(&self, item: LineItem) -> bool {
        self.items.iter().any(|(i, _)| *i == item)
    }

    pub fn series(&self, item: LineItem) -> Vec<f64> {
        self.items
            .iter()
            .find(|(i, _)| *i == item)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| vec![0.0; self.years.len()])
    }

    pub fn latest(&self, item: LineItem) -> f64 {
        self.series(item).last().copied().unwrap_or(0.0)
    }

    fn combine<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(usize) -> f64,
    {
        (0..self.years.len()).map(f).collect()
    }

    /// EBT + interest expense + depreciation.
    pub fn ebitda(&self) -> Vec<f64> {
        let ebt = self.series(LineItem::ProfitBeforeTax);
        let interest = self.series(LineItem::InterestExpense);
        let depreciation = self.series(LineItem::Depreciation);
        self.combine(|i| ebt[i] + interest[i] + depreciation[i])
    }

    /// Operating working capital: current assets net of cash and short-term
    /// investments, less current liabilities.
    pub fn nwc(&self) -> Vec<f64> {
        let ca = self.series(LineItem::CurrentAssets);
        let cash = self.series(LineItem::Cash);
        let st = self.series(LineItem::ShortTermInvestments);
        let cl = self.series(LineItem::CurrentLiabilities);
        self.combine(|i| (ca[i] - cash[i] - st[i]) - cl[i])
    }

    pub fn net_borrowing(&self) -> Vec<f64> {
        let borrowed = self.series(LineItem::BorrowingProceeds);
        let repaid = self.series(LineItem::DebtRepaid);
        self.combine(|i| borrowed[i] - repaid[i])
    }

    pub fn total_cash(&self) -> f64 {
        self.latest(LineItem::Cash) + self.latest(LineItem::ShortTermInvestments)
    }

    /// Total liabilities less cash and short-term investments, latest year.
    pub fn net_debt(&self) -> f64 {
        self.latest(LineItem::TotalLiabilities) - self.total_cash()
    }

    pub fn book_value_per_share(&self, basis: ShareBasis) -> f64 {
        basis.per_share(self.latest(LineItem::Equity))
    }
}
