use serde::Serialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Fcff,
    Fcfe,
    Pe,
    Pb,
    EvEbitda,
    DdmGordon,
    DdmTwoStage,
    DdmHModel,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Fcff,
        Method::Fcfe,
        Method::Pe,
        Method::Pb,
        Method::EvEbitda,
        Method::DdmGordon,
        Method::DdmTwoStage,
        Method::DdmHModel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Method::Fcff => "FCFF (DCF)",
            Method::Fcfe => "FCFE",
            Method::Pe => "P/E",
            Method::Pb => "P/B",
            Method::EvEbitda => "EV/EBITDA",
            Method::DdmGordon => "DDM (Gordon)",
            Method::DdmTwoStage => "DDM (Two-Stage)",
            Method::DdmHModel => "DDM (H-Model)",
        }
    }
}

/// Why a valuation formula could not produce a price.
///
/// These are ordinary values: a failed method is reported next to the
/// successful ones and never aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    #[error(
        "{method}: discount rate ({rate_pct:.1}%) must be > growth ({growth_pct:.1}%)",
        rate_pct = .rate * 100.0,
        growth_pct = .growth * 100.0
    )]
    DiscountRateNotAboveGrowth {
        method: &'static str,
        rate: f64,
        growth: f64,
    },
    #[error("{method}: {metric} <= 0, cannot apply {method}")]
    NonPositiveMetric {
        method: &'static str,
        metric: &'static str,
    },
    #[error("{method}: no target {multiple} available")]
    MultipleUnavailable {
        method: &'static str,
        multiple: &'static str,
    },
    #[error("{field} of {years} years exceeds the {max}-year limit", max = MAX_HORIZON_YEARS)]
    HorizonTooLong { field: &'static str, years: usize },
    #[error("{field} has {actual} values, expected {expected}")]
    MismatchedSeries {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type ValuationResult<T> = Result<T, ValuationError>;

/// Longest explicit forecast any model accepts, in years.
pub const MAX_HORIZON_YEARS: usize = 100;

/// Share count together with the factor that turns aggregate currency units
/// per share into per-share currency units.
///
/// With aggregates in billions and shares in millions the factor is 1000.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareBasis {
    pub shares: f64,
    pub unit_scale: f64,
}

impl ShareBasis {
    pub fn new(shares: f64, unit_scale: f64) -> Self {
        Self { shares, unit_scale }
    }

    /// Aggregate value to a per-share price; zero when there are no shares.
    pub fn per_share(self, aggregate: f64) -> f64 {
        if self.shares > 0.0 {
            aggregate / self.shares * self.unit_scale
        } else {
            0.0
        }
    }

    /// Market capitalisation in aggregate units for a per-share price.
    pub fn market_cap(self, price: f64) -> f64 {
        if self.unit_scale != 0.0 {
            price * self.shares / self.unit_scale
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapmInputs {
    pub risk_free_rate: f64,
    pub beta: f64,
    pub market_premium: f64,
}

impl CapmInputs {
    pub fn cost_of_equity(&self) -> f64 {
        self.risk_free_rate + self.beta * self.market_premium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaccInputs {
    pub capm: CapmInputs,
    pub cost_of_debt: f64,
    pub debt_to_equity: f64,
    pub tax_rate: f64,
}

/// Discount rates resolved once from the CAPM / WACC inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRates {
    pub inputs: WaccInputs,
    pub cost_of_equity: f64,
    pub after_tax_cost_of_debt: f64,
    pub equity_weight: f64,
    pub debt_weight: f64,
    pub wacc: f64,
}

impl DiscountRates {
    pub fn new(inputs: WaccInputs) -> Self {
        let cost_of_equity = inputs.capm.cost_of_equity();
        let equity_weight = 1.0 / (1.0 + inputs.debt_to_equity);
        let debt_weight = inputs.debt_to_equity / (1.0 + inputs.debt_to_equity);
        let after_tax_cost_of_debt = inputs.cost_of_debt * (1.0 - inputs.tax_rate);
        Self {
            inputs,
            cost_of_equity,
            after_tax_cost_of_debt,
            equity_weight,
            debt_weight,
            wacc: equity_weight * cost_of_equity + debt_weight * after_tax_cost_of_debt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FairValueRange {
    pub low: f64,
    pub average: f64,
    pub high: f64,
    pub count: usize,
}

impl FairValueRange {
    /// Range over the strictly positive, finite prices; `None` when there are none.
    pub fn from_prices<I>(prices: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let valid: Vec<f64> = prices
            .into_iter()
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();
        if valid.is_empty() {
            return None;
        }
        let low = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let high = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            low,
            average: valid.iter().sum::<f64>() / valid.len() as f64,
            high,
            count: valid.len(),
        })
    }
}

pub(crate) fn check_len(field: &'static str, values: &[f64], expected: usize) -> ValuationResult<()> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ValuationError::MismatchedSeries {
            field,
            expected,
            actual: values.len(),
        })
    }
}

pub(crate) fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub(crate) fn ratios(numerators: &[f64], denominators: &[f64]) -> Vec<f64> {
    numerators
        .iter()
        .zip(denominators)
        .map(|(n, d)| safe_ratio(*n, *d))
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn discount(value: f64, rate: f64, periods: usize) -> f64 {
    let factor = match i32::try_from(periods) {
        Ok(n) => (1.0 + rate).powi(n),
        Err(_) => (1.0 + rate).powf(periods as f64),
    };
    value / factor
}

pub(crate) fn check_horizon(field: &'static str, years: usize) -> ValuationResult<()> {
    if years > MAX_HORIZON_YEARS {
        Err(ValuationError::HorizonTooLong { field, years })
    } else {
        Ok(())
    }
}
