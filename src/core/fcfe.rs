use serde::Serialize;

use super::sensitivity::{SensitivityGrid, sweep};
use super::types::{ShareBasis, ValuationResult, check_horizon, check_len, discount, ratios};

const DEFAULT_PROJECTION_YEARS: usize = 5;
const DEFAULT_NET_INCOME_GROWTH: f64 = 0.05;
const DEFAULT_REVENUE_GROWTH: f64 = 0.05;
const DEFAULT_DEPRECIATION_PCT: f64 = 0.02;
const DEFAULT_CAPEX_PCT: f64 = 0.02;
const DEFAULT_NWC_PCT: f64 = 0.10;
const DEFAULT_TERMINAL_GROWTH: f64 = 0.03;
/// Assumed net margin when revenue has to be backed out of net income.
const IMPLIED_NET_MARGIN: f64 = 0.2;

/// Historical line items and the reconstructed free cash flow to equity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcfeHistory {
    pub years: Vec<i32>,
    pub net_income: Vec<f64>,
    pub depreciation: Vec<f64>,
    pub capex: Vec<f64>,
    pub nwc: Vec<f64>,
    pub net_borrowing: Vec<f64>,
    pub dividends: Vec<f64>,
    pub fcfe: Vec<f64>,
    pub payout_ratio: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct FcfeHistoryInput<'a> {
    pub years: &'a [i32],
    pub net_income: &'a [f64],
    pub depreciation: &'a [f64],
    pub capex: &'a [f64],
    pub nwc: &'a [f64],
    pub net_borrowing: Option<&'a [f64]>,
    pub dividends: Option<&'a [f64]>,
}

impl FcfeHistory {
    /// FCFE_t = NI + D&A - CapEx - dNWC + net borrowing, with dNWC = 0 in the first year.
    pub fn new(input: FcfeHistoryInput<'_>) -> ValuationResult<Self> {
        let n = input.years.len();
        let zeros = vec![0.0; n];
        let net_borrowing = input.net_borrowing.unwrap_or(&zeros[..]);
        let dividends = input.dividends.unwrap_or(&zeros[..]);

        check_len("net income", input.net_income, n)?;
        check_len("depreciation", input.depreciation, n)?;
        check_len("capex", input.capex, n)?;
        check_len("net working capital", input.nwc, n)?;
        check_len("net borrowing", net_borrowing, n)?;
        check_len("dividends", dividends, n)?;

        let fcfe = (0..n)
            .map(|i| {
                let nwc_change = if i == 0 {
                    0.0
                } else {
                    input.nwc[i] - input.nwc[i - 1]
                };
                input.net_income[i] + input.depreciation[i] - input.capex[i] - nwc_change
                    + net_borrowing[i]
            })
            .collect();

        Ok(Self {
            years: input.years.to_vec(),
            net_income: input.net_income.to_vec(),
            depreciation: input.depreciation.to_vec(),
            capex: input.capex.to_vec(),
            nwc: input.nwc.to_vec(),
            net_borrowing: net_borrowing.to_vec(),
            payout_ratio: ratios(dividends, input.net_income),
            dividends: dividends.to_vec(),
            fcfe,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcfeAssumptions {
    pub projection_years: usize,
    pub net_income_growth: Vec<f64>,
    pub revenue_growth: Vec<f64>,
    pub depreciation_pct_revenue: Vec<f64>,
    pub capex_pct_revenue: Vec<f64>,
    pub nwc_pct_revenue: Vec<f64>,
    /// Net borrowing per projected year, in aggregate units.
    pub net_borrowing: Vec<f64>,
    pub terminal_growth: f64,
    pub base_revenue: f64,
}

impl FcfeAssumptions {
    /// Default assumptions; base revenue is backed out of the last net income
    /// when the caller does not know it.
    pub fn defaults(history: &FcfeHistory, base_revenue: Option<f64>) -> Self {
        Self::defaults_over(history, base_revenue, DEFAULT_PROJECTION_YEARS)
    }

    /// Defaults stretched over an `n`-year projection.
    pub fn defaults_over(history: &FcfeHistory, base_revenue: Option<f64>, n: usize) -> Self {
        let base_revenue = base_revenue.unwrap_or_else(|| {
            history.net_income.last().copied().unwrap_or(1000.0) / IMPLIED_NET_MARGIN
        });
        Self {
            projection_years: n,
            net_income_growth: vec![DEFAULT_NET_INCOME_GROWTH; n],
            revenue_growth: vec![DEFAULT_REVENUE_GROWTH; n],
            depreciation_pct_revenue: vec![DEFAULT_DEPRECIATION_PCT; n],
            capex_pct_revenue: vec![DEFAULT_CAPEX_PCT; n],
            nwc_pct_revenue: vec![DEFAULT_NWC_PCT; n],
            net_borrowing: vec![0.0; n],
            terminal_growth: DEFAULT_TERMINAL_GROWTH,
            base_revenue,
        }
    }

    pub fn validate(&self) -> ValuationResult<()> {
        let n = self.projection_years;
        check_horizon("FCFE projection", n)?;
        check_len("net income growth", &self.net_income_growth, n)?;
        check_len("revenue growth", &self.revenue_growth, n)?;
        check_len("depreciation % revenue", &self.depreciation_pct_revenue, n)?;
        check_len("capex % revenue", &self.capex_pct_revenue, n)?;
        check_len("nwc % revenue", &self.nwc_pct_revenue, n)?;
        check_len("projected net borrowing", &self.net_borrowing, n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcfeYear {
    pub year: usize,
    pub revenue: f64,
    pub net_income: f64,
    pub depreciation: f64,
    pub capex: f64,
    pub nwc: f64,
    pub nwc_change: f64,
    pub net_borrowing: f64,
    pub fcfe: f64,
}

/// Projects FCFE year by year from the last historical year.
///
/// NWC change is measured against the previous projected year; the first
/// projected year compares against the last historical NWC.
pub fn project_fcfe(
    history: &FcfeHistory,
    assumptions: &FcfeAssumptions,
) -> ValuationResult<Vec<FcfeYear>> {
    assumptions.validate()?;

    let mut prev_net_income = history.net_income.last().copied().unwrap_or(0.0);
    let mut prev_revenue = assumptions.base_revenue;
    let mut prev_nwc = history.nwc.last().copied().unwrap_or(0.0);

    let mut years = Vec::with_capacity(assumptions.projection_years);
    for i in 0..assumptions.projection_years {
        let revenue = prev_revenue * (1.0 + assumptions.revenue_growth[i]);
        let net_income = prev_net_income * (1.0 + assumptions.net_income_growth[i]);
        let depreciation = revenue * assumptions.depreciation_pct_revenue[i];
        let capex = revenue * assumptions.capex_pct_revenue[i];
        let nwc = revenue * assumptions.nwc_pct_revenue[i];
        let nwc_change = nwc - prev_nwc;
        let net_borrowing = assumptions.net_borrowing[i];

        years.push(FcfeYear {
            year: i + 1,
            revenue,
            net_income,
            depreciation,
            capex,
            nwc,
            nwc_change,
            net_borrowing,
            fcfe: net_income + depreciation - capex - nwc_change + net_borrowing,
        });

        prev_net_income = net_income;
        prev_revenue = revenue;
        prev_nwc = nwc;
    }
    Ok(years)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityValuation {
    pub ke: f64,
    pub terminal_growth: f64,
    pub pv_fcfe: f64,
    pub pv_fcfe_detail: Vec<f64>,
    pub terminal_value: f64,
    pub pv_terminal: f64,
    /// Set when Ke <= terminal growth and the terminal value was zeroed.
    pub terminal_suppressed: bool,
    pub terminal_pct: f64,
    pub equity_value: f64,
    pub shares: f64,
    pub value_per_share: f64,
}

/// Discounts projected FCFE at `ke` and adds a Gordon terminal value.
pub fn equity_value(
    projection: &[FcfeYear],
    ke: f64,
    terminal_growth: f64,
    basis: ShareBasis,
) -> EquityValuation {
    let pv_fcfe_detail: Vec<f64> = projection
        .iter()
        .enumerate()
        .map(|(i, y)| discount(y.fcfe, ke, i + 1))
        .collect();
    let pv_fcfe: f64 = pv_fcfe_detail.iter().sum();

    let terminal_suppressed = ke <= terminal_growth;
    let (terminal_value, pv_terminal) = match projection.last() {
        Some(last) if !terminal_suppressed => {
            let terminal_value = last.fcfe * (1.0 + terminal_growth) / (ke - terminal_growth);
            (
                terminal_value,
                discount(terminal_value, ke, projection.len()),
            )
        }
        _ => (0.0, 0.0),
    };

    let equity_value = pv_fcfe + pv_terminal;
    EquityValuation {
        ke,
        terminal_growth,
        pv_fcfe,
        pv_fcfe_detail,
        terminal_value,
        pv_terminal,
        terminal_suppressed,
        terminal_pct: if equity_value > 0.0 {
            pv_terminal / equity_value * 100.0
        } else {
            0.0
        },
        equity_value,
        shares: basis.shares,
        value_per_share: basis.per_share(equity_value),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcfeValuation {
    pub history: FcfeHistory,
    pub assumptions: FcfeAssumptions,
    pub projection: Vec<FcfeYear>,
    pub valuation: EquityValuation,
}

/// Projection plus equity valuation at explicit `ke` and terminal growth.
pub fn value_fcfe(
    history: &FcfeHistory,
    assumptions: &FcfeAssumptions,
    ke: f64,
    basis: ShareBasis,
) -> ValuationResult<FcfeValuation> {
    let projection = project_fcfe(history, assumptions)?;
    let valuation = equity_value(&projection, ke, assumptions.terminal_growth, basis);
    Ok(FcfeValuation {
        history: history.clone(),
        assumptions: assumptions.clone(),
        projection,
        valuation,
    })
}

/// Per-share value over Ke (rows) x terminal growth (columns).
///
/// The projection does not depend on either rate, so it is computed once and
/// each cell re-values it with its own parameters.
pub fn fcfe_sensitivity(
    history: &FcfeHistory,
    assumptions: &FcfeAssumptions,
    basis: ShareBasis,
    ke_range: &[f64],
    g_range: &[f64],
) -> ValuationResult<SensitivityGrid> {
    let projection = project_fcfe(history, assumptions)?;
    Ok(sweep("Ke", ke_range, g_range, |ke, g| {
        Some(equity_value(&projection, ke, g, basis).value_per_share)
    }))
}
