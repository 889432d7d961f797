use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::error::{AppError, AppResult};
use crate::core::{FinancialStatements, LineItem};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Statement {
    Income,
    Balance,
    CashFlow,
}

/// A line item is matched when its row label contains every fragment.
#[derive(Copy, Clone, Debug)]
pub struct LabelRule {
    pub statement: Statement,
    pub item: LineItem,
    pub fragments: &'static [&'static str],
}

const fn rule(
    statement: Statement,
    item: LineItem,
    fragments: &'static [&'static str],
) -> LabelRule {
    LabelRule {
        statement,
        item,
        fragments,
    }
}

/// Row labels used by Vietnamese statutory statements.
pub const DEFAULT_RULES: [LabelRule; 20] = [
    rule(Statement::Income, LineItem::Revenue, &["3. Doanh thu thuần"]),
    rule(Statement::Income, LineItem::GrossProfit, &["5. Lợi nhuận gộp"]),
    rule(Statement::Income, LineItem::FinancialCost, &["7. Chi phí tài chính"]),
    rule(
        Statement::Income,
        LineItem::InterestExpense,
        &["Chi phí lãi vay", "Trong đó"],
    ),
    rule(
        Statement::Income,
        LineItem::ProfitBeforeTax,
        &["15. Tổng lợi nhuận kế toán trước thuế"],
    ),
    rule(Statement::Income, LineItem::NetIncome, &["18. Lợi nhuận sau thuế"]),
    rule(Statement::Income, LineItem::BasicEps, &["19. Lãi cơ bản trên cổ phiếu"]),
    rule(Statement::Balance, LineItem::CurrentAssets, &["A. TÀI SẢN NGẮN HẠN"]),
    rule(
        Statement::Balance,
        LineItem::Cash,
        &["I. Tiền và các khoản tương đương tiền"],
    ),
    rule(
        Statement::Balance,
        LineItem::ShortTermInvestments,
        &["II. Đầu tư tài chính ngắn hạn"],
    ),
    rule(Statement::Balance, LineItem::CurrentLiabilities, &["I. Nợ ngắn hạn"]),
    rule(Statement::Balance, LineItem::LongTermLiabilities, &["II. Nợ dài hạn"]),
    rule(Statement::Balance, LineItem::TotalLiabilities, &["A. NỢ PHẢI TRẢ"]),
    rule(Statement::Balance, LineItem::Equity, &["B. VỐN CHỦ SỞ HỮU"]),
    rule(Statement::Balance, LineItem::TotalAssets, &["TỔNG CỘNG TÀI SẢN"]),
    rule(Statement::CashFlow, LineItem::Depreciation, &["Khấu hao TSCĐ"]),
    rule(Statement::CashFlow, LineItem::Capex, &["1. Tiền chi để mua sắm"]),
    rule(
        Statement::CashFlow,
        LineItem::DividendsPaid,
        &["Cổ tức, lợi nhuận đã trả"],
    ),
    rule(Statement::CashFlow, LineItem::BorrowingProceeds, &["3. Tiền thu từ đi vay"]),
    rule(Statement::CashFlow, LineItem::DebtRepaid, &["4. Tiền trả nợ gốc vay"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub income_file: String,
    pub balance_file: String,
    pub cash_flow_file: String,
    pub years: Vec<i32>,
    /// Zero-based column of the first year's value.
    pub first_year_column: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            income_file: "kqkd.csv".to_string(),
            balance_file: "cdkt.csv".to_string(),
            cash_flow_file: "lctt.csv".to_string(),
            years: (2021..=2025).collect(),
            first_year_column: 3,
        }
    }
}

impl IngestConfig {
    fn path(&self, statement: Statement) -> PathBuf {
        let name = match statement {
            Statement::Income => &self.income_file,
            Statement::Balance => &self.balance_file,
            Statement::CashFlow => &self.cash_flow_file,
        };
        self.data_dir.join(name)
    }
}

/// Parses a statement cell. Thousands separators and quotes are stripped;
/// anything unparseable reads as zero.
pub fn parse_num(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != '"').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn label_matches(label: &str, fragments: &[&str]) -> bool {
    fragments.iter().all(|f| label.contains(f))
}

/// Reads one statement and returns the rows matched by `rules`.
///
/// Later matching rows replace earlier ones.
pub fn read_statement<R: Read>(
    reader: R,
    rules: &[LabelRule],
    first_year_column: usize,
    year_count: usize,
) -> Result<Vec<(LineItem, Vec<f64>)>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut found: Vec<(LineItem, Vec<f64>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(label) = record.get(0) else {
            continue;
        };
        let label = label.trim_start_matches('\u{feff}').trim();
        if label.is_empty() {
            continue;
        }

        for rule in rules.iter().filter(|r| label_matches(label, r.fragments)) {
            let values: Vec<f64> = (0..year_count)
                .map(|i| record.get(first_year_column + i).map_or(0.0, parse_num))
                .collect();
            match found.iter_mut().find(|(item, _)| *item == rule.item) {
                Some((_, existing)) => *existing = values,
                None => found.push((rule.item, values)),
            }
        }
    }
    Ok(found)
}

fn load_one(
    config: &IngestConfig,
    statement: Statement,
    rules: &[LabelRule],
    statements: &mut FinancialStatements,
) -> AppResult<()> {
    let path = config.path(statement);
    let file = File::open(&path).map_err(|source| AppError::Io {
        path: path.clone(),
        source,
    })?;
    let rules: Vec<LabelRule> = rules
        .iter()
        .copied()
        .filter(|r| r.statement == statement)
        .collect();
    let rows = read_statement(file, &rules, config.first_year_column, config.years.len())
        .map_err(|source| AppError::Csv {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), matched = rows.len(), "statement loaded");

    for (item, values) in rows {
        statements.set(item, values);
    }
    for rule in &rules {
        if !statements.contains(rule.item) {
            warn!(item = ?rule.item, path = %path.display(), "line item not found, using zeros");
        }
    }
    Ok(())
}

/// Loads the income statement, balance sheet and cash-flow statement.
pub fn load_statements(config: &IngestConfig, rules: &[LabelRule]) -> AppResult<FinancialStatements> {
    if config.years.is_empty() {
        return Err(AppError::InvalidInput("at least one year is required".to_string()));
    }
    let mut statements = FinancialStatements::new(config.years.clone());
    for statement in [Statement::Income, Statement::Balance, Statement::CashFlow] {
        load_one(config, statement, rules, &mut statements)?;
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const KQKD: &str = "\u{feff}Chỉ tiêu,Mã,TM,2021,2022\n\
        \"3. Doanh thu thuần về bán hàng\",10,,\"4,000.5\",\"4,500\"\n\
        \"18. Lợi nhuận sau thuế TNDN\",60,,480,560\n\
        \"Trong đó: Chi phí lãi vay\",23,,5,4\n\
        \"19. Lãi cơ bản trên cổ phiếu\",70,,\"5,800\",n/a\n";

    const CDKT: &str = "Chỉ tiêu,Mã,TM,2021,2022\n\
        A. TÀI SẢN NGẮN HẠN,100,,2500,2700\n\
        I. Tiền và các khoản tương đương tiền,110,,300,350\n\
        B. VỐN CHỦ SỞ HỮU,400,,2800,3000\n\
        B. VỐN CHỦ SỞ HỮU (restated),400,,2900,3100\n";

    const LCTT: &str = "Chỉ tiêu,Mã,TM,2021,2022\n\
        Khấu hao TSCĐ,02,,150,160\n\
        \"1. Tiền chi để mua sắm, xây dựng TSCĐ\",21,,-200,-210\n\
        \"Cổ tức, lợi nhuận đã trả cho chủ sở hữu\",36,,-300,-330\n";

    fn write_fixture(dir: &Path) -> IngestConfig {
        fs::write(dir.join("kqkd.csv"), KQKD).expect("write kqkd");
        fs::write(dir.join("cdkt.csv"), CDKT).expect("write cdkt");
        fs::write(dir.join("lctt.csv"), LCTT).expect("write lctt");
        IngestConfig {
            data_dir: dir.to_path_buf(),
            years: vec![2021, 2022],
            ..IngestConfig::default()
        }
    }

    #[test]
    fn parse_num_strips_separators_and_defaults_to_zero() {
        assert_eq!(parse_num("\"1,234.5\""), 1234.5);
        assert_eq!(parse_num(" -42 "), -42.0);
        assert_eq!(parse_num(""), 0.0);
        assert_eq!(parse_num("n/a"), 0.0);
        assert_eq!(parse_num("NaN"), 0.0);
    }

    #[test]
    fn label_match_requires_every_fragment() {
        assert!(label_matches("Trong đó: Chi phí lãi vay", &["Chi phí lãi vay", "Trong đó"]));
        assert!(!label_matches("Chi phí lãi vay", &["Chi phí lãi vay", "Trong đó"]));
    }

    #[test]
    fn load_statements_reads_all_three_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write_fixture(dir.path());
        let s = load_statements(&config, &DEFAULT_RULES).expect("statements");

        assert_eq!(s.years, vec![2021, 2022]);
        assert_eq!(s.series(LineItem::Revenue), vec![4000.5, 4500.0]);
        assert_eq!(s.series(LineItem::InterestExpense), vec![5.0, 4.0]);
        assert_eq!(s.series(LineItem::BasicEps), vec![5800.0, 0.0]);
        assert_eq!(s.series(LineItem::Capex), vec![200.0, 210.0]);
        assert_eq!(s.series(LineItem::DividendsPaid), vec![300.0, 330.0]);
        assert_eq!(s.series(LineItem::Depreciation), vec![150.0, 160.0]);
    }

    #[test]
    fn last_matching_row_wins_and_missing_items_are_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write_fixture(dir.path());
        let s = load_statements(&config, &DEFAULT_RULES).expect("statements");

        assert_eq!(s.series(LineItem::Equity), vec![2900.0, 3100.0]);
        assert!(!s.contains(LineItem::TotalAssets));
        assert_eq!(s.series(LineItem::TotalAssets), vec![0.0, 0.0]);
    }

    #[test]
    fn short_rows_pad_missing_year_columns() {
        let csv = "Khấu hao TSCĐ,02,,150\n";
        let rows = read_statement(csv.as_bytes(), &DEFAULT_RULES, 3, 3).expect("rows");
        assert_eq!(rows, vec![(LineItem::Depreciation, vec![150.0, 0.0, 0.0])]);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IngestConfig {
            data_dir: dir.path().to_path_buf(),
            ..IngestConfig::default()
        };
        let err = load_statements(&config, &DEFAULT_RULES).expect_err("missing file");
        assert!(matches!(err, AppError::Io { .. }));
        assert!(err.to_string().contains("kqkd.csv"));
    }
}
