mod error;
mod export;
mod ingest;
mod report;

pub use error::{AppError, AppResult};
pub use export::{ValuationExport, render_json};
pub use ingest::{
    DEFAULT_RULES, IngestConfig, LabelRule, Statement, load_statements, parse_num, read_statement,
};
pub use report::{grouped, render_text, unavailable_methods};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::{error, info};

use crate::core::{
    Benchmark, CapmInputs, DdmAssumptions, DepreciationPolicy, FcfePlan, FcffPlan,
    FinancialStatements, MAX_HORIZON_YEARS, Peer, PeerSet, RelativeTargets, SensitivityPlan,
    ShareBasis, TargetMultiple, ValuationPlan, WaccInputs, run_all,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliBenchmark {
    Mean,
    Median,
}

impl From<CliBenchmark> for Benchmark {
    fn from(value: CliBenchmark) -> Self {
        match value {
            CliBenchmark::Mean => Benchmark::Mean,
            CliBenchmark::Median => Benchmark::Median,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PlanBenchmark {
    #[serde(alias = "average", alias = "avg")]
    Mean,
    Median,
}

impl From<PlanBenchmark> for CliBenchmark {
    fn from(value: PlanBenchmark) -> Self {
        match value {
            PlanBenchmark::Mean => CliBenchmark::Mean,
            PlanBenchmark::Median => CliBenchmark::Median,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PlanFormat {
    Text,
    Json,
}

impl From<PlanFormat> for OutputFormat {
    fn from(value: PlanFormat) -> Self {
        match value {
            PlanFormat::Text => OutputFormat::Text,
            PlanFormat::Json => OutputFormat::Json,
        }
    }
}

/// JSON plan file. Every field is optional and overrides the matching flag;
/// rates use the same percent units as the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    company: Option<String>,
    currency: Option<String>,
    shares: Option<f64>,
    unit_scale: Option<f64>,
    current_price: Option<f64>,

    data_dir: Option<PathBuf>,
    income_file: Option<String>,
    balance_file: Option<String>,
    cash_flow_file: Option<String>,
    first_year: Option<i32>,
    last_year: Option<i32>,
    first_year_column: Option<usize>,

    #[serde(alias = "rf")]
    risk_free_rate: Option<f64>,
    beta: Option<f64>,
    market_premium: Option<f64>,
    #[serde(alias = "kd")]
    cost_of_debt: Option<f64>,
    #[serde(alias = "deRatio")]
    debt_to_equity: Option<f64>,
    tax_rate: Option<f64>,

    projection_years: Option<usize>,
    revenue_growth: Option<f64>,
    net_income_growth: Option<f64>,
    terminal_growth: Option<f64>,
    fcfe_net_borrowing: Option<f64>,
    debt: Option<f64>,
    depreciation_pct: Option<f64>,

    #[serde(alias = "d0")]
    ddm_dividend: Option<f64>,
    ddm_stable_growth: Option<f64>,
    ddm_high_growth: Option<f64>,
    ddm_high_growth_years: Option<usize>,
    ddm_half_life: Option<f64>,

    peers: Option<Vec<Peer>>,
    benchmark: Option<PlanBenchmark>,
    target_pe: Option<f64>,
    target_pb: Option<f64>,
    target_ev_ebitda: Option<f64>,

    ke_range: Option<Vec<f64>>,
    g_range: Option<Vec<f64>>,
    wacc_range: Option<Vec<f64>>,
    wacc_step: Option<f64>,

    format: Option<PlanFormat>,
    output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fairvalue",
    about = "Equity valuation from statement CSVs (FCFF, FCFE, P/E, P/B, EV/EBITDA, DDM)"
)]
struct Cli {
    #[arg(long, help = "JSON plan file; its values override the flags")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "kqkd.csv", help = "Income statement file")]
    income_file: String,
    #[arg(long, default_value = "cdkt.csv", help = "Balance sheet file")]
    balance_file: String,
    #[arg(long, default_value = "lctt.csv", help = "Cash-flow statement file")]
    cash_flow_file: String,
    #[arg(long, default_value_t = 2021)]
    first_year: i32,
    #[arg(long, default_value_t = 2025)]
    last_year: i32,
    #[arg(
        long,
        default_value_t = 3,
        help = "Zero-based CSV column holding the first year's value"
    )]
    first_year_column: usize,

    #[arg(long, default_value = "BMP")]
    company: String,
    #[arg(long, default_value = "VND")]
    currency: String,
    #[arg(long, default_value_t = 81.86, help = "Shares outstanding in millions")]
    shares: f64,
    #[arg(
        long,
        default_value_t = 1000.0,
        help = "Converts aggregate units per share into currency per share"
    )]
    unit_scale: f64,
    #[arg(long, help = "Market price per share, enables upside and current multiples")]
    current_price: Option<f64>,

    #[arg(long, default_value_t = 3.0, help = "Risk-free rate in percent")]
    risk_free_rate: f64,
    #[arg(long, default_value_t = 0.8)]
    beta: f64,
    #[arg(long, default_value_t = 10.0, help = "Market risk premium in percent")]
    market_premium: f64,
    #[arg(long, default_value_t = 6.0, help = "Pre-tax cost of debt in percent")]
    cost_of_debt: f64,
    #[arg(long, default_value_t = 0.0)]
    debt_to_equity: f64,
    #[arg(long, default_value_t = 20.0, help = "Corporate tax rate in percent")]
    tax_rate: f64,

    #[arg(long, default_value_t = 5)]
    projection_years: usize,
    #[arg(long, default_value_t = 5.0, help = "Projected revenue growth in percent")]
    revenue_growth: f64,
    #[arg(long, default_value_t = 5.0, help = "Projected net income growth in percent")]
    net_income_growth: f64,
    #[arg(long, default_value_t = 3.0, help = "Terminal growth in percent")]
    terminal_growth: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Net borrowing per projected year for FCFE, in aggregate units"
    )]
    fcfe_net_borrowing: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Debt deducted from FCFF enterprise value, in aggregate units"
    )]
    debt: f64,
    #[arg(
        long,
        help = "FCFF depreciation in percent of revenue; defaults to matching capex"
    )]
    depreciation_pct: Option<f64>,

    #[arg(long, help = "Current dividend per share; defaults to the last historical DPS")]
    ddm_dividend: Option<f64>,
    #[arg(long, default_value_t = 3.0, help = "Stable dividend growth in percent")]
    ddm_stable_growth: f64,
    #[arg(long, default_value_t = 8.0, help = "High-phase dividend growth in percent")]
    ddm_high_growth: f64,
    #[arg(long, default_value_t = 5)]
    ddm_high_growth_years: usize,
    #[arg(long, default_value_t = 6.0, help = "H-Model half-life of the high-growth phase in years")]
    ddm_half_life: f64,

    #[arg(long, value_enum, default_value_t = CliBenchmark::Mean)]
    benchmark: CliBenchmark,
    #[arg(long, help = "Fixed target P/E instead of the peer benchmark")]
    target_pe: Option<f64>,
    #[arg(long, help = "Fixed target P/B instead of the peer benchmark")]
    target_pb: Option<f64>,
    #[arg(long, help = "Fixed target EV/EBITDA instead of the peer benchmark")]
    target_ev_ebitda: Option<f64>,

    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = vec![9.0, 10.0, 11.0, 12.0, 13.0],
        help = "Ke rows of the sensitivity tables in percent"
    )]
    ke_range: Vec<f64>,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = vec![2.0, 3.0, 4.0],
        help = "Growth columns of the sensitivity tables in percent"
    )]
    g_range: Vec<f64>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "WACC rows of the DCF table in percent; centred on the computed WACC when omitted"
    )]
    wacc_range: Vec<f64>,
    #[arg(long, default_value_t = 1.0, help = "Spacing of the centred WACC rows in percent")]
    wacc_step: f64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[arg(long, help = "Write the report to this file instead of stdout")]
    output: Option<PathBuf>,
}

fn default_peers() -> Vec<Peer> {
    let peer = |name: &str, pe: f64, pb: f64, ev_ebitda: f64| Peer {
        name: name.to_string(),
        pe: Some(pe),
        pb: Some(pb),
        ev_ebitda: Some(ev_ebitda),
    };
    vec![
        peer("NTP", 10.0, 1.8, 6.5),
        peer("BMP (Historical Avg)", 12.0, 2.5, 7.0),
        peer("Industry Avg", 11.0, 2.0, 7.5),
    ]
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn set_some<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Overlays a plan file on the parsed flags. Returns the peer list when the
/// plan supplies one.
fn apply_payload(cli: &mut Cli, payload: PlanPayload) -> Option<Vec<Peer>> {
    set(&mut cli.company, payload.company);
    set(&mut cli.currency, payload.currency);
    set(&mut cli.shares, payload.shares);
    set(&mut cli.unit_scale, payload.unit_scale);
    set_some(&mut cli.current_price, payload.current_price);

    set(&mut cli.data_dir, payload.data_dir);
    set(&mut cli.income_file, payload.income_file);
    set(&mut cli.balance_file, payload.balance_file);
    set(&mut cli.cash_flow_file, payload.cash_flow_file);
    set(&mut cli.first_year, payload.first_year);
    set(&mut cli.last_year, payload.last_year);
    set(&mut cli.first_year_column, payload.first_year_column);

    set(&mut cli.risk_free_rate, payload.risk_free_rate);
    set(&mut cli.beta, payload.beta);
    set(&mut cli.market_premium, payload.market_premium);
    set(&mut cli.cost_of_debt, payload.cost_of_debt);
    set(&mut cli.debt_to_equity, payload.debt_to_equity);
    set(&mut cli.tax_rate, payload.tax_rate);

    set(&mut cli.projection_years, payload.projection_years);
    set(&mut cli.revenue_growth, payload.revenue_growth);
    set(&mut cli.net_income_growth, payload.net_income_growth);
    set(&mut cli.terminal_growth, payload.terminal_growth);
    set(&mut cli.fcfe_net_borrowing, payload.fcfe_net_borrowing);
    set(&mut cli.debt, payload.debt);
    set_some(&mut cli.depreciation_pct, payload.depreciation_pct);

    set_some(&mut cli.ddm_dividend, payload.ddm_dividend);
    set(&mut cli.ddm_stable_growth, payload.ddm_stable_growth);
    set(&mut cli.ddm_high_growth, payload.ddm_high_growth);
    set(&mut cli.ddm_high_growth_years, payload.ddm_high_growth_years);
    set(&mut cli.ddm_half_life, payload.ddm_half_life);

    set(&mut cli.benchmark, payload.benchmark.map(Into::into));
    set_some(&mut cli.target_pe, payload.target_pe);
    set_some(&mut cli.target_pb, payload.target_pb);
    set_some(&mut cli.target_ev_ebitda, payload.target_ev_ebitda);

    set(&mut cli.ke_range, payload.ke_range);
    set(&mut cli.g_range, payload.g_range);
    set(&mut cli.wacc_range, payload.wacc_range);
    set(&mut cli.wacc_step, payload.wacc_step);

    set(&mut cli.format, payload.format.map(Into::into));
    set_some(&mut cli.output, payload.output);

    payload.peers
}

fn read_plan_file(path: &Path) -> AppResult<PlanPayload> {
    let raw = fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AppError::Plan {
        path: path.to_path_buf(),
        source,
    })
}

fn ingest_config(cli: &Cli) -> Result<IngestConfig, String> {
    if cli.last_year < cli.first_year {
        return Err("--last-year must be >= --first-year".to_string());
    }
    Ok(IngestConfig {
        data_dir: cli.data_dir.clone(),
        income_file: cli.income_file.clone(),
        balance_file: cli.balance_file.clone(),
        cash_flow_file: cli.cash_flow_file.clone(),
        years: (cli.first_year..=cli.last_year).collect(),
        first_year_column: cli.first_year_column,
    })
}

fn target(fixed: Option<f64>, benchmark: Benchmark) -> TargetMultiple {
    fixed.map_or(TargetMultiple::Peers(benchmark), TargetMultiple::Fixed)
}

fn build_plan(
    cli: &Cli,
    peers: Vec<Peer>,
    statements: FinancialStatements,
) -> Result<ValuationPlan, String> {
    if !cli.shares.is_finite() || cli.shares <= 0.0 {
        return Err("--shares must be > 0".to_string());
    }
    if !cli.unit_scale.is_finite() || cli.unit_scale <= 0.0 {
        return Err("--unit-scale must be > 0".to_string());
    }
    let rates = [
        ("--risk-free-rate", cli.risk_free_rate),
        ("--beta", cli.beta),
        ("--market-premium", cli.market_premium),
        ("--cost-of-debt", cli.cost_of_debt),
        ("--revenue-growth", cli.revenue_growth),
        ("--net-income-growth", cli.net_income_growth),
        ("--terminal-growth", cli.terminal_growth),
        ("--ddm-stable-growth", cli.ddm_stable_growth),
        ("--ddm-high-growth", cli.ddm_high_growth),
        ("--fcfe-net-borrowing", cli.fcfe_net_borrowing),
        ("--debt", cli.debt),
    ];
    if let Some((flag, _)) = rates.iter().find(|(_, v)| !v.is_finite()) {
        return Err(format!("{flag} must be a finite number"));
    }
    if !(0.0..=100.0).contains(&cli.tax_rate) {
        return Err("--tax-rate must be between 0 and 100".to_string());
    }
    if !cli.debt_to_equity.is_finite() || cli.debt_to_equity < 0.0 {
        return Err("--debt-to-equity must be >= 0".to_string());
    }
    if !(1..=MAX_HORIZON_YEARS).contains(&cli.projection_years) {
        return Err(format!(
            "--projection-years must be between 1 and {MAX_HORIZON_YEARS}"
        ));
    }
    if cli.ddm_high_growth_years > MAX_HORIZON_YEARS {
        return Err(format!(
            "--ddm-high-growth-years must be <= {MAX_HORIZON_YEARS}"
        ));
    }
    if !cli.ddm_half_life.is_finite() || cli.ddm_half_life < 0.0 {
        return Err("--ddm-half-life must be >= 0".to_string());
    }
    if cli.ke_range.is_empty() || cli.g_range.is_empty() {
        return Err("--ke-range and --g-range must not be empty".to_string());
    }
    if !cli.wacc_step.is_finite() || cli.wacc_step <= 0.0 {
        return Err("--wacc-step must be > 0".to_string());
    }
    let optional_positive = [
        ("--current-price", cli.current_price),
        ("--target-pe", cli.target_pe),
        ("--target-pb", cli.target_pb),
        ("--target-ev-ebitda", cli.target_ev_ebitda),
        ("--ddm-dividend", cli.ddm_dividend),
    ];
    if let Some((flag, _)) = optional_positive
        .iter()
        .find(|(_, v)| v.is_some_and(|v| !v.is_finite() || v <= 0.0))
    {
        return Err(format!("{flag} must be > 0"));
    }
    if cli
        .depreciation_pct
        .is_some_and(|pct| !pct.is_finite() || pct < 0.0)
    {
        return Err("--depreciation-pct must be >= 0".to_string());
    }

    let to_rates = |values: &[f64]| values.iter().map(|v| v / 100.0).collect::<Vec<f64>>();
    let tax_rate = cli.tax_rate / 100.0;
    let benchmark = Benchmark::from(cli.benchmark);

    Ok(ValuationPlan {
        company: cli.company.clone(),
        statements,
        basis: ShareBasis::new(cli.shares, cli.unit_scale),
        wacc: WaccInputs {
            capm: CapmInputs {
                risk_free_rate: cli.risk_free_rate / 100.0,
                beta: cli.beta,
                market_premium: cli.market_premium / 100.0,
            },
            cost_of_debt: cli.cost_of_debt / 100.0,
            debt_to_equity: cli.debt_to_equity,
            tax_rate,
        },
        current_price: cli.current_price,
        fcff: FcffPlan {
            projection_years: cli.projection_years,
            revenue_growth: cli.revenue_growth / 100.0,
            tax_rate,
            terminal_growth: cli.terminal_growth / 100.0,
            debt: cli.debt,
            depreciation: cli
                .depreciation_pct
                .map_or(DepreciationPolicy::MatchCapex, |pct| {
                    DepreciationPolicy::PercentOfRevenue(pct / 100.0)
                }),
        },
        fcfe: FcfePlan {
            projection_years: cli.projection_years,
            net_income_growth: cli.net_income_growth / 100.0,
            revenue_growth: cli.revenue_growth / 100.0,
            terminal_growth: cli.terminal_growth / 100.0,
            net_borrowing: cli.fcfe_net_borrowing,
        },
        peers: PeerSet::new(peers),
        targets: RelativeTargets {
            pe: target(cli.target_pe, benchmark),
            pb: target(cli.target_pb, benchmark),
            ev_ebitda: target(cli.target_ev_ebitda, benchmark),
        },
        ddm: DdmAssumptions {
            d0: cli.ddm_dividend,
            g_high: Some(cli.ddm_high_growth / 100.0),
            g_stable: Some(cli.ddm_stable_growth / 100.0),
            high_growth_years: cli.ddm_high_growth_years,
            half_life_years: cli.ddm_half_life,
            ke: None,
        },
        sensitivity: SensitivityPlan {
            ke_range: to_rates(&cli.ke_range),
            g_range: to_rates(&cli.g_range),
            wacc_range: (!cli.wacc_range.is_empty()).then(|| to_rates(&cli.wacc_range)),
            wacc_step: cli.wacc_step / 100.0,
        },
    })
}

fn write_output(path: Option<&Path>, rendered: &str) -> AppResult<()> {
    match path {
        Some(path) => fs::write(path, rendered).map_err(AppError::Output),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(AppError::Output)
        }
    }
}

fn run(mut cli: Cli) -> AppResult<()> {
    let mut peers = default_peers();
    if let Some(path) = cli.config.clone() {
        let payload = read_plan_file(&path)?;
        if let Some(plan_peers) = apply_payload(&mut cli, payload) {
            peers = plan_peers;
        }
        info!(path = %path.display(), "plan file applied");
    }

    let ingest = ingest_config(&cli).map_err(AppError::InvalidInput)?;
    let statements = load_statements(&ingest, &DEFAULT_RULES)?;
    let plan = build_plan(&cli, peers, statements).map_err(AppError::InvalidInput)?;

    let valuations = run_all(&plan);
    let missing = unavailable_methods(&valuations);
    info!(
        priced = valuations.outcomes().len() - missing.len(),
        unavailable = missing.len(),
        "valuation run finished"
    );

    let rendered = match cli.format {
        OutputFormat::Text => render_text(&valuations, &cli.currency),
        OutputFormat::Json => render_json(&valuations)?,
    };
    write_output(cli.output.as_deref(), &rendered)
}

/// Parses the command line, runs every valuation and writes the report.
pub fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "valuation failed");
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LineItem, Method, sample_statements};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        Cli::try_parse_from(["fairvalue"]).expect("defaults parse")
    }

    fn plan_from_json(json: &str) -> Result<(Cli, Vec<Peer>), String> {
        let payload = serde_json::from_str::<PlanPayload>(json)
            .map_err(|e| format!("Invalid plan JSON: {e}"))?;
        let mut cli = sample_cli();
        let peers = apply_payload(&mut cli, payload).unwrap_or_else(default_peers);
        Ok((cli, peers))
    }

    #[test]
    fn build_plan_converts_percent_flags_to_rates() {
        let plan = build_plan(&sample_cli(), default_peers(), sample_statements())
            .expect("valid plan");

        assert_approx(plan.wacc.capm.cost_of_equity(), 0.11);
        assert_approx(plan.wacc.tax_rate, 0.20);
        assert_approx(plan.fcff.revenue_growth, 0.05);
        assert_approx(plan.fcfe.terminal_growth, 0.03);
        assert_eq!(plan.ddm.g_stable, Some(0.03));
        assert_eq!(plan.ddm.g_high, Some(0.08));
        assert_approx(plan.ddm.half_life_years, 6.0);
        assert_eq!(plan.sensitivity.ke_range.len(), 5);
        assert_approx(plan.sensitivity.ke_range[0], 0.09);
        assert_eq!(plan.sensitivity.wacc_range, None);
        assert_eq!(plan.fcff.depreciation, DepreciationPolicy::MatchCapex);
        assert_eq!(plan.peers.peers.len(), 3);
        assert_eq!(plan.targets.pe, TargetMultiple::Peers(Benchmark::Mean));
    }

    #[test]
    fn flags_parse_ranges_and_overrides() {
        let cli = Cli::try_parse_from([
            "fairvalue",
            "--ke-range",
            "8,9.5",
            "--wacc-range",
            "10,12",
            "--target-pe",
            "14",
            "--benchmark",
            "median",
            "--depreciation-pct",
            "3",
            "--format",
            "json",
        ])
        .expect("flags parse");
        let plan = build_plan(&cli, default_peers(), sample_statements()).expect("valid plan");

        assert_eq!(plan.sensitivity.ke_range, vec![0.08, 0.095]);
        assert_eq!(plan.sensitivity.wacc_range, Some(vec![0.10, 0.12]));
        assert_eq!(plan.targets.pe, TargetMultiple::Fixed(14.0));
        assert_eq!(plan.targets.pb, TargetMultiple::Peers(Benchmark::Median));
        assert_eq!(
            plan.fcff.depreciation,
            DepreciationPolicy::PercentOfRevenue(0.03)
        );
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn build_plan_rejects_non_positive_shares() {
        let mut cli = sample_cli();
        cli.shares = 0.0;
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert!(err.contains("--shares"));
    }

    #[test]
    fn build_plan_rejects_tax_rate_outside_percent_range() {
        let mut cli = sample_cli();
        cli.tax_rate = 120.0;
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert!(err.contains("--tax-rate"));
    }

    #[test]
    fn build_plan_rejects_non_finite_rates_and_empty_ranges() {
        let mut cli = sample_cli();
        cli.market_premium = f64::NAN;
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert!(err.contains("--market-premium"));

        let mut cli = sample_cli();
        cli.g_range.clear();
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert!(err.contains("--g-range"));

        let mut cli = sample_cli();
        cli.projection_years = 0;
        assert!(build_plan(&cli, default_peers(), sample_statements()).is_err());

        let mut cli = sample_cli();
        cli.debt_to_equity = -0.5;
        assert!(build_plan(&cli, default_peers(), sample_statements()).is_err());
    }

    #[test]
    fn build_plan_rejects_horizons_beyond_limit() {
        let mut cli = sample_cli();
        cli.projection_years = MAX_HORIZON_YEARS + 1;
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert_eq!(err, "--projection-years must be between 1 and 100");

        let mut cli = sample_cli();
        cli.ddm_high_growth_years = usize::MAX;
        let err = build_plan(&cli, default_peers(), sample_statements()).expect_err("reject");
        assert_eq!(err, "--ddm-high-growth-years must be <= 100");

        let mut cli = sample_cli();
        cli.projection_years = MAX_HORIZON_YEARS;
        cli.ddm_high_growth_years = MAX_HORIZON_YEARS;
        assert!(build_plan(&cli, default_peers(), sample_statements()).is_ok());
    }

    #[test]
    fn build_plan_rejects_non_positive_fixed_multiples_and_dividend() {
        let cases: [(&str, fn(&mut Cli)); 4] = [
            ("--target-pe", |c| c.target_pe = Some(f64::NAN)),
            ("--target-pb", |c| c.target_pb = Some(0.0)),
            ("--target-ev-ebitda", |c| c.target_ev_ebitda = Some(-6.0)),
            ("--ddm-dividend", |c| c.ddm_dividend = Some(f64::INFINITY)),
        ];
        for (flag, apply) in cases {
            let mut cli = sample_cli();
            apply(&mut cli);
            let err = build_plan(&cli, default_peers(), sample_statements()).expect_err(flag);
            assert_eq!(err, format!("{flag} must be > 0"));
        }
    }

    #[test]
    fn ingest_config_rejects_reversed_years() {
        let mut cli = sample_cli();
        cli.first_year = 2025;
        cli.last_year = 2021;
        assert!(ingest_config(&cli).is_err());

        let config = ingest_config(&sample_cli()).expect("config");
        assert_eq!(config.years, vec![2021, 2022, 2023, 2024, 2025]);
        assert_eq!(config.first_year_column, 3);
    }

    #[test]
    fn plan_file_overrides_flags_and_peers() {
        let json = r#"{
          "company": "Tien Phong",
          "shares": 128.5,
          "rf": 4,
          "beta": 1.1,
          "deRatio": 0.5,
          "d0": 1500,
          "benchmark": "median",
          "targetEvEbitda": 6,
          "keRange": [10, 12],
          "format": "json",
          "peers": [
            {"name": "A", "pe": 9, "pb": 1.5, "evEbitda": 6},
            {"name": "B", "pe": 13}
          ]
        }"#;
        let (cli, peers) = plan_from_json(json).expect("json should parse");
        let plan = build_plan(&cli, peers, sample_statements()).expect("valid plan");

        assert_eq!(plan.company, "Tien Phong");
        assert_approx(plan.basis.shares, 128.5);
        assert_approx(plan.wacc.capm.risk_free_rate, 0.04);
        assert_approx(plan.wacc.capm.beta, 1.1);
        assert_approx(plan.wacc.debt_to_equity, 0.5);
        assert_eq!(plan.ddm.d0, Some(1500.0));
        assert_eq!(plan.targets.pe, TargetMultiple::Peers(Benchmark::Median));
        assert_eq!(plan.targets.ev_ebitda, TargetMultiple::Fixed(6.0));
        assert_eq!(plan.sensitivity.ke_range, vec![0.10, 0.12]);
        assert_eq!(plan.peers.peers.len(), 2);
        assert_eq!(plan.peers.peers[1].pb, None);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_approx(plan.wacc.tax_rate, 0.20);
    }

    #[test]
    fn plan_file_rejects_unknown_benchmark() {
        let err = plan_from_json(r#"{"benchmark": "mode"}"#).expect_err("reject");
        assert!(err.contains("Invalid plan JSON"));
    }

    fn write_statements(dir: &Path) {
        fs::write(
            dir.join("kqkd.csv"),
            "Chỉ tiêu,Mã,TM,2024,2025\n\
             3. Doanh thu thuần,10,,5200,5500\n\
             15. Tổng lợi nhuận kế toán trước thuế,50,,850,900\n\
             18. Lợi nhuận sau thuế,60,,680,720\n\
             19. Lãi cơ bản trên cổ phiếu,70,,\"8,300\",\"8,800\"\n",
        )
        .expect("write kqkd");
        fs::write(
            dir.join("cdkt.csv"),
            "Chỉ tiêu,Mã,TM,2024,2025\n\
             A. TÀI SẢN NGẮN HẠN,100,,3000,3200\n\
             I. Tiền và các khoản tương đương tiền,110,,450,500\n\
             I. Nợ ngắn hạn,310,,1050,1100\n\
             A. NỢ PHẢI TRẢ,300,,1150,1200\n\
             B. VỐN CHỦ SỞ HỮU,400,,3400,3600\n",
        )
        .expect("write cdkt");
        fs::write(
            dir.join("lctt.csv"),
            "Chỉ tiêu,Mã,TM,2024,2025\n\
             Khấu hao TSCĐ,02,,180,190\n\
             1. Tiền chi để mua sắm TSCĐ,21,,-230,-240\n\
             \"Cổ tức, lợi nhuận đã trả\",36,,-380,-400\n",
        )
        .expect("write lctt");
    }

    #[test]
    fn run_writes_json_report_from_statement_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_statements(dir.path());
        let output = dir.path().join("out.json");

        let mut cli = sample_cli();
        cli.data_dir = dir.path().to_path_buf();
        cli.first_year = 2024;
        cli.last_year = 2025;
        cli.format = OutputFormat::Json;
        cli.output = Some(output.clone());
        run(cli).expect("run succeeds");

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).expect("output")).expect("json");
        assert_eq!(json["company"], "BMP");
        assert_eq!(json["years"], serde_json::json!([2024, 2025]));
        assert_eq!(json["methods"].as_array().expect("methods").len(), 8);
        assert!(json["relative"]["pe"]["targetPrice"].is_f64());
    }

    #[test]
    fn run_applies_plan_file_before_ingest() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_statements(dir.path());
        let output = dir.path().join("report.txt");
        let plan_path = dir.path().join("plan.json");
        let plan = serde_json::json!({
            "dataDir": dir.path(),
            "firstYear": 2024,
            "lastYear": 2025,
            "company": "Plan Co",
            "output": output,
        });
        fs::write(&plan_path, plan.to_string()).expect("write plan");

        let mut cli = sample_cli();
        cli.config = Some(plan_path);
        run(cli).expect("run succeeds");

        let text = fs::read_to_string(&output).expect("report");
        assert!(text.contains("EQUITY VALUATION SUMMARY: Plan Co"));
        assert!(text.contains("Statements: 2024-2025"));
    }

    #[test]
    fn run_maps_bad_input_to_usage_exit_code() {
        let mut cli = sample_cli();
        cli.first_year = 2026;
        let err = run(cli).expect_err("reject");
        assert_eq!(err.exit_code(), 2);

        let dir = tempfile::tempdir().expect("tempdir");
        let mut cli = sample_cli();
        cli.data_dir = dir.path().to_path_buf();
        let err = run(cli).expect_err("missing files");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn run_keeps_going_when_a_statement_item_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_statements(dir.path());
        let mut cli = sample_cli();
        cli.first_year = 2024;
        cli.last_year = 2025;
        let mut ingest = ingest_config(&cli).expect("config");
        ingest.data_dir = dir.path().to_path_buf();
        let mut statements = load_statements(&ingest, &DEFAULT_RULES).expect("statements");
        statements.set(LineItem::BasicEps, vec![0.0, 0.0]);

        let plan = build_plan(&cli, default_peers(), statements).expect("plan");
        let v = run_all(&plan);
        assert_eq!(unavailable_methods(&v), vec![Method::Pe]);
    }
}
