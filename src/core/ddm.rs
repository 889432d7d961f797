use serde::Serialize;

use super::sensitivity::{SensitivityGrid, sweep};
use super::types::{
    FairValueRange, ShareBasis, ValuationError, ValuationResult, check_horizon, check_len, discount,
    mean, ratios,
};

const GORDON: &str = "Gordon Growth Model";
const TWO_STAGE: &str = "Two-Stage DDM";
const H_MODEL: &str = "H-Model";

const FALLBACK_KE: f64 = 0.10;
const FALLBACK_GROWTH: f64 = 0.03;
const FALLBACK_HIGH_GROWTH: f64 = 0.08;
const MIN_HIGH_GROWTH: f64 = 0.05;
const DEFAULT_STABLE_GROWTH: f64 = 0.03;

/// Per-share dividend history derived from aggregate dividends paid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DividendHistory {
    pub years: Vec<i32>,
    pub dividends_paid: Vec<f64>,
    pub net_income: Vec<f64>,
    pub dps: Vec<f64>,
    pub payout_ratio: Vec<f64>,
    pub avg_payout: f64,
    pub avg_dps: f64,
    pub dividend_growth: Vec<f64>,
    pub avg_dividend_growth: f64,
}

impl DividendHistory {
    pub fn new(
        years: &[i32],
        dividends_paid: &[f64],
        net_income: &[f64],
        basis: ShareBasis,
    ) -> ValuationResult<Self> {
        let n = years.len();
        check_len("dividends paid", dividends_paid, n)?;
        check_len("net income", net_income, n)?;

        let dps: Vec<f64> = dividends_paid.iter().map(|d| basis.per_share(*d)).collect();
        let payout_ratio = ratios(dividends_paid, net_income);
        let dividend_growth: Vec<f64> = dps
            .windows(2)
            .map(|pair| {
                if pair[0] > 0.0 {
                    pair[1] / pair[0] - 1.0
                } else {
                    0.0
                }
            })
            .collect();

        Ok(Self {
            years: years.to_vec(),
            dividends_paid: dividends_paid.to_vec(),
            net_income: net_income.to_vec(),
            avg_payout: mean(&payout_ratio),
            avg_dps: mean(&dps),
            avg_dividend_growth: mean(&dividend_growth),
            dps,
            payout_ratio,
            dividend_growth,
        })
    }

    pub fn last_dps(&self) -> Option<f64> {
        self.dps.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GordonValuation {
    pub d0: f64,
    pub d1: f64,
    pub growth_rate: f64,
    pub ke: f64,
    pub target_price: f64,
    pub dividend_yield_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDividend {
    pub year: usize,
    pub dividend: f64,
    pub present_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoStageValuation {
    pub d0: f64,
    pub g_high: f64,
    pub g_stable: f64,
    pub high_growth_years: usize,
    pub ke: f64,
    pub stage_one: Vec<StageDividend>,
    pub pv_stage_one: f64,
    pub terminal_price: f64,
    pub pv_terminal: f64,
    pub terminal_pct: f64,
    pub target_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HModelValuation {
    pub d0: f64,
    pub g_high: f64,
    pub g_stable: f64,
    pub half_life_years: f64,
    pub h: f64,
    pub ke: f64,
    pub stable_component: f64,
    pub extra_growth_component: f64,
    pub target_price: f64,
}

fn ensure_rate_above_growth(method: &'static str, ke: f64, growth: f64) -> ValuationResult<()> {
    if ke <= growth {
        Err(ValuationError::DiscountRateNotAboveGrowth {
            method,
            rate: ke,
            growth,
        })
    } else {
        Ok(())
    }
}

/// P0 = D0 (1 + g) / (Ke - g)
pub fn gordon_growth(d0: f64, growth: f64, ke: f64) -> ValuationResult<GordonValuation> {
    ensure_rate_above_growth(GORDON, ke, growth)?;

    let d1 = d0 * (1.0 + growth);
    let price = d1 / (ke - growth);
    Ok(GordonValuation {
        d0,
        d1,
        growth_rate: growth,
        ke,
        target_price: price,
        dividend_yield_pct: if price > 0.0 { d1 / price * 100.0 } else { 0.0 },
    })
}

/// High growth for `high_growth_years`, then a Gordon terminal price discounted back.
pub fn two_stage(
    d0: f64,
    g_high: f64,
    g_stable: f64,
    high_growth_years: usize,
    ke: f64,
) -> ValuationResult<TwoStageValuation> {
    ensure_rate_above_growth(TWO_STAGE, ke, g_stable)?;
    check_horizon("Two-Stage high-growth phase", high_growth_years)?;

    let mut stage_one = Vec::with_capacity(high_growth_years);
    let mut dividend = d0;
    for year in 1..=high_growth_years {
        dividend *= 1.0 + g_high;
        stage_one.push(StageDividend {
            year,
            dividend,
            present_value: discount(dividend, ke, year),
        });
    }
    let pv_stage_one: f64 = stage_one.iter().map(|d| d.present_value).sum();

    let terminal_price = dividend * (1.0 + g_stable) / (ke - g_stable);
    let pv_terminal = discount(terminal_price, ke, high_growth_years);
    let price = pv_stage_one + pv_terminal;

    Ok(TwoStageValuation {
        d0,
        g_high,
        g_stable,
        high_growth_years,
        ke,
        stage_one,
        pv_stage_one,
        terminal_price,
        pv_terminal,
        terminal_pct: if price > 0.0 {
            pv_terminal / price * 100.0
        } else {
            0.0
        },
        target_price: price,
    })
}

/// Growth declines linearly from `g_high` to `g_stable` with H = half_life / 2.
pub fn h_model(
    d0: f64,
    g_high: f64,
    g_stable: f64,
    half_life_years: f64,
    ke: f64,
) -> ValuationResult<HModelValuation> {
    ensure_rate_above_growth(H_MODEL, ke, g_stable)?;

    let h = half_life_years / 2.0;
    let stable_component = d0 * (1.0 + g_stable) / (ke - g_stable);
    let extra_growth_component = d0 * h * (g_high - g_stable) / (ke - g_stable);

    Ok(HModelValuation {
        d0,
        g_high,
        g_stable,
        half_life_years,
        h,
        ke,
        stable_component,
        extra_growth_component,
        target_price: stable_component + extra_growth_component,
    })
}

/// Gordon prices over Ke (rows) x g (columns).
pub fn gordon_sensitivity(d0: f64, ke_range: &[f64], g_range: &[f64]) -> SensitivityGrid {
    sweep("Ke", ke_range, g_range, |ke, g| {
        gordon_growth(d0, g, ke).ok().map(|v| v.target_price)
    })
}

/// Caller-supplied DDM parameters; anything left `None` falls back to history.
#[derive(Debug, Clone, PartialEq)]
pub struct DdmAssumptions {
    pub d0: Option<f64>,
    pub g_high: Option<f64>,
    pub g_stable: Option<f64>,
    pub high_growth_years: usize,
    pub half_life_years: f64,
    pub ke: Option<f64>,
}

impl Default for DdmAssumptions {
    fn default() -> Self {
        Self {
            d0: None,
            g_high: None,
            g_stable: None,
            high_growth_years: 5,
            half_life_years: 5.0,
            ke: None,
        }
    }
}

/// Assumptions with every default filled in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDdm {
    pub d0: f64,
    pub gordon_growth: f64,
    pub g_high: f64,
    pub g_stable: f64,
    pub high_growth_years: usize,
    pub half_life_years: f64,
    pub ke: f64,
}

impl DdmAssumptions {
    pub fn resolve(&self, history: Option<&DividendHistory>) -> ResolvedDdm {
        let d0 = self
            .d0
            .or_else(|| history.and_then(DividendHistory::last_dps))
            .unwrap_or(0.0);
        let avg_growth = history.map(|h| h.avg_dividend_growth);
        let ke = self.ke.unwrap_or(FALLBACK_KE);
        let g_high = self.g_high.unwrap_or_else(|| {
            avg_growth
                .unwrap_or(FALLBACK_HIGH_GROWTH)
                .max(MIN_HIGH_GROWTH)
        });
        let gordon_growth = self
            .g_stable
            .or(avg_growth)
            .unwrap_or(FALLBACK_GROWTH);

        ResolvedDdm {
            d0,
            gordon_growth,
            g_high,
            g_stable: self.g_stable.unwrap_or(DEFAULT_STABLE_GROWTH),
            high_growth_years: self.high_growth_years,
            half_life_years: self.half_life_years,
            ke,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DdmSummary {
    pub assumptions: ResolvedDdm,
    pub gordon: ValuationResult<GordonValuation>,
    pub two_stage: ValuationResult<TwoStageValuation>,
    pub h_model: ValuationResult<HModelValuation>,
    pub fair_value: Option<FairValueRange>,
}

impl DdmSummary {
    pub fn prices(&self) -> [Option<f64>; 3] {
        [
            self.gordon.as_ref().ok().map(|v| v.target_price),
            self.two_stage.as_ref().ok().map(|v| v.target_price),
            self.h_model.as_ref().ok().map(|v| v.target_price),
        ]
    }
}

/// Runs the three variants; each fails independently.
pub fn run_ddm(history: Option<&DividendHistory>, assumptions: &DdmAssumptions) -> DdmSummary {
    let a = assumptions.resolve(history);
    let gordon = gordon_growth(a.d0, a.gordon_growth, a.ke);
    let two_stage = two_stage(a.d0, a.g_high, a.g_stable, a.high_growth_years, a.ke);
    let h_model = h_model(a.d0, a.g_high, a.g_stable, a.half_life_years, a.ke);

    let mut summary = DdmSummary {
        assumptions: a,
        gordon,
        two_stage,
        h_model,
        fair_value: None,
    };
    summary.fair_value = FairValueRange::from_prices(summary.prices().into_iter().flatten());
    summary
}
