use serde::Serialize;

use super::sensitivity::{SensitivityGrid, sweep};
use super::types::{
    DiscountRates, ShareBasis, ValuationResult, check_horizon, check_len, discount, mean, ratios,
};

const DEFAULT_PROJECTION_YEARS: usize = 5;
const DEFAULT_REVENUE_GROWTH: f64 = 0.10;
const DEFAULT_TAX_RATE: f64 = 0.20;
const DEFAULT_TERMINAL_GROWTH: f64 = 0.03;

/// Historical operating figures and their revenue ratios.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcffHistory {
    pub years: Vec<i32>,
    pub revenue: Vec<f64>,
    pub ebitda: Vec<f64>,
    pub capex: Vec<f64>,
    pub nwc: Vec<f64>,
    pub ebitda_margin: Vec<f64>,
    pub capex_pct: Vec<f64>,
    pub nwc_pct: Vec<f64>,
}

impl FcffHistory {
    pub fn new(
        years: &[i32],
        revenue: &[f64],
        ebitda: &[f64],
        capex: &[f64],
        nwc: &[f64],
    ) -> ValuationResult<Self> {
        let n = years.len();
        check_len("revenue", revenue, n)?;
        check_len("EBITDA", ebitda, n)?;
        check_len("capex", capex, n)?;
        check_len("net working capital", nwc, n)?;

        Ok(Self {
            years: years.to_vec(),
            revenue: revenue.to_vec(),
            ebitda: ebitda.to_vec(),
            capex: capex.to_vec(),
            nwc: nwc.to_vec(),
            ebitda_margin: ratios(ebitda, revenue),
            capex_pct: ratios(capex, revenue),
            nwc_pct: ratios(nwc, revenue),
        })
    }
}

/// How projected depreciation is derived.
///
/// `MatchCapex` is a maintenance-mode shortcut (D&A = CapEx, so they cancel in
/// FCF apart from the tax shield); it is the default, not an economic claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "pctRevenue")]
pub enum DepreciationPolicy {
    MatchCapex,
    PercentOfRevenue(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcffAssumptions {
    pub projection_years: usize,
    pub revenue_growth: Vec<f64>,
    pub ebitda_margin: Vec<f64>,
    pub tax_rate: f64,
    pub capex_pct: Vec<f64>,
    pub nwc_pct: Vec<f64>,
    pub terminal_growth: f64,
    pub depreciation: DepreciationPolicy,
}

impl FcffAssumptions {
    /// Margins and ratios default to the historical averages.
    pub fn defaults(history: &FcffHistory) -> Self {
        Self::defaults_over(history, DEFAULT_PROJECTION_YEARS)
    }

    /// Defaults stretched over an `n`-year projection.
    pub fn defaults_over(history: &FcffHistory, n: usize) -> Self {
        Self {
            projection_years: n,
            revenue_growth: vec![DEFAULT_REVENUE_GROWTH; n],
            ebitda_margin: vec![mean(&history.ebitda_margin); n],
            tax_rate: DEFAULT_TAX_RATE,
            capex_pct: vec![mean(&history.capex_pct); n],
            nwc_pct: vec![mean(&history.nwc_pct); n],
            terminal_growth: DEFAULT_TERMINAL_GROWTH,
            depreciation: DepreciationPolicy::MatchCapex,
        }
    }

    pub fn validate(&self) -> ValuationResult<()> {
        let n = self.projection_years;
        check_horizon("FCFF projection", n)?;
        check_len("revenue growth", &self.revenue_growth, n)?;
        check_len("EBITDA margin", &self.ebitda_margin, n)?;
        check_len("capex % revenue", &self.capex_pct, n)?;
        check_len("nwc % revenue", &self.nwc_pct, n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcffYear {
    pub year: usize,
    pub revenue: f64,
    pub ebitda: f64,
    pub depreciation: f64,
    pub ebit: f64,
    pub tax: f64,
    pub nopat: f64,
    pub capex: f64,
    pub nwc: f64,
    pub nwc_change: f64,
    pub fcf: f64,
}

pub fn project_fcff(
    history: &FcffHistory,
    assumptions: &FcffAssumptions,
) -> ValuationResult<Vec<FcffYear>> {
    assumptions.validate()?;

    let mut prev_revenue = history.revenue.last().copied().unwrap_or(0.0);
    let mut prev_nwc = history.nwc.last().copied().unwrap_or(0.0);

    let mut years = Vec::with_capacity(assumptions.projection_years);
    for i in 0..assumptions.projection_years {
        let revenue = prev_revenue * (1.0 + assumptions.revenue_growth[i]);
        let ebitda = revenue * assumptions.ebitda_margin[i];
        let capex = revenue * assumptions.capex_pct[i];
        let depreciation = match assumptions.depreciation {
            DepreciationPolicy::MatchCapex => capex,
            DepreciationPolicy::PercentOfRevenue(pct) => revenue * pct,
        };
        let ebit = ebitda - depreciation;
        let tax = ebit * assumptions.tax_rate;
        let nopat = ebit - tax;
        let nwc = revenue * assumptions.nwc_pct[i];
        let nwc_change = nwc - prev_nwc;

        years.push(FcffYear {
            year: i + 1,
            revenue,
            ebitda,
            depreciation,
            ebit,
            tax,
            nopat,
            capex,
            nwc,
            nwc_change,
            fcf: nopat + depreciation - capex - nwc_change,
        });

        prev_revenue = revenue;
        prev_nwc = nwc;
    }
    Ok(years)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseValuation {
    pub wacc: f64,
    pub terminal_growth: f64,
    pub pv_fcf: f64,
    pub terminal_value: f64,
    pub pv_terminal: f64,
    pub enterprise_value: f64,
    /// Set when WACC <= terminal growth; every figure is then zero.
    pub undefined: bool,
}

/// Discounts projected FCF at `wacc` plus a Gordon terminal value.
///
/// Returns an all-zero valuation when `wacc <= terminal_growth`.
pub fn enterprise_value(projection: &[FcffYear], wacc: f64, terminal_growth: f64) -> EnterpriseValuation {
    if wacc <= terminal_growth {
        return EnterpriseValuation {
            wacc,
            terminal_growth,
            pv_fcf: 0.0,
            terminal_value: 0.0,
            pv_terminal: 0.0,
            enterprise_value: 0.0,
            undefined: true,
        };
    }

    let pv_fcf: f64 = projection
        .iter()
        .enumerate()
        .map(|(i, y)| discount(y.fcf, wacc, i + 1))
        .sum();
    let terminal_value = projection
        .last()
        .map(|y| y.fcf * (1.0 + terminal_growth) / (wacc - terminal_growth))
        .unwrap_or(0.0);
    let pv_terminal = discount(terminal_value, wacc, projection.len());

    EnterpriseValuation {
        wacc,
        terminal_growth,
        pv_fcf,
        terminal_value,
        pv_terminal,
        enterprise_value: pv_fcf + pv_terminal,
        undefined: false,
    }
}

/// Balance-sheet items bridging enterprise value to equity value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityBridge {
    pub cash: f64,
    pub debt: f64,
    pub basis: ShareBasis,
}

impl EquityBridge {
    pub fn equity_value(&self, enterprise_value: f64) -> f64 {
        enterprise_value - self.debt + self.cash
    }

    pub fn price(&self, enterprise_value: f64) -> f64 {
        self.basis.per_share(self.equity_value(enterprise_value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcffValuation {
    pub rates: DiscountRates,
    pub assumptions: FcffAssumptions,
    pub projection: Vec<FcffYear>,
    pub enterprise: EnterpriseValuation,
    pub bridge: EquityBridge,
    pub equity_value: f64,
    pub target_price: f64,
}

pub fn value_fcff(
    history: &FcffHistory,
    assumptions: &FcffAssumptions,
    rates: DiscountRates,
    bridge: EquityBridge,
) -> ValuationResult<FcffValuation> {
    let projection = project_fcff(history, assumptions)?;
    let enterprise = enterprise_value(&projection, rates.wacc, assumptions.terminal_growth);
    Ok(FcffValuation {
        rates,
        assumptions: assumptions.clone(),
        equity_value: bridge.equity_value(enterprise.enterprise_value),
        target_price: bridge.price(enterprise.enterprise_value),
        projection,
        enterprise,
        bridge,
    })
}

/// Price per share over WACC (rows) x terminal growth (columns).
pub fn fcff_sensitivity(
    history: &FcffHistory,
    assumptions: &FcffAssumptions,
    bridge: EquityBridge,
    wacc_range: &[f64],
    g_range: &[f64],
) -> ValuationResult<SensitivityGrid> {
    let projection = project_fcff(history, assumptions)?;
    Ok(sweep("WACC", wacc_range, g_range, |wacc, g| {
        let ev = enterprise_value(&projection, wacc, g);
        (!ev.undefined).then(|| bridge.price(ev.enterprise_value))
    }))
}
