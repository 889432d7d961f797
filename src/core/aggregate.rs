use serde::Serialize;
use tracing::{debug, warn};

use super::ddm::{DdmAssumptions, DdmSummary, DividendHistory, gordon_sensitivity, run_ddm};
use super::fcfe::{
    FcfeAssumptions, FcfeHistory, FcfeHistoryInput, FcfeValuation, fcfe_sensitivity, value_fcfe,
};
use super::fcff::{
    DepreciationPolicy, EquityBridge, FcffAssumptions, FcffHistory, FcffValuation,
    fcff_sensitivity, value_fcff,
};
use super::relative::{CompanyMetrics, PeerSet, RelativeSummary, RelativeTargets, run_relative};
use super::sensitivity::{SensitivityGrid, centered_range};
use super::statements::{FinancialStatements, LineItem};
use super::types::{
    DiscountRates, FairValueRange, Method, ShareBasis, ValuationError, ValuationResult, WaccInputs,
    check_horizon, mean, ratios,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FcffPlan {
    pub projection_years: usize,
    pub revenue_growth: f64,
    pub tax_rate: f64,
    pub terminal_growth: f64,
    /// Debt deducted when bridging enterprise value to equity value.
    pub debt: f64,
    pub depreciation: DepreciationPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FcfePlan {
    pub projection_years: usize,
    pub net_income_growth: f64,
    pub revenue_growth: f64,
    pub terminal_growth: f64,
    pub net_borrowing: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityPlan {
    pub ke_range: Vec<f64>,
    pub g_range: Vec<f64>,
    /// Rows of the DCF table; centred on the computed WACC when `None`.
    pub wacc_range: Option<Vec<f64>>,
    pub wacc_step: f64,
}

/// Everything needed for one valuation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationPlan {
    pub company: String,
    pub statements: FinancialStatements,
    pub basis: ShareBasis,
    pub wacc: WaccInputs,
    pub current_price: Option<f64>,
    pub fcff: FcffPlan,
    pub fcfe: FcfePlan,
    pub peers: PeerSet,
    pub targets: RelativeTargets,
    pub ddm: DdmAssumptions,
    pub sensitivity: SensitivityPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodOutcome {
    pub method: Method,
    pub label: &'static str,
    pub price: Option<f64>,
    pub error: Option<String>,
}

impl MethodOutcome {
    fn new(method: Method, result: Result<f64, String>) -> Self {
        let (price, error) = match result {
            Ok(price) if price.is_finite() && price > 0.0 => (Some(price), None),
            Ok(price) if price.is_finite() => (
                None,
                Some(format!("{}: price {price:.2} <= 0", method.label())),
            ),
            Ok(_) => (None, Some(format!("{}: price is not finite", method.label()))),
            Err(error) => (None, Some(error)),
        };
        Self {
            method,
            label: method.label(),
            price,
            error,
        }
    }

    /// A price usable in the aggregate range.
    pub fn usable_price(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuations {
    pub company: String,
    pub years: Vec<i32>,
    pub basis: ShareBasis,
    pub rates: DiscountRates,
    pub fcff: ValuationResult<FcffValuation>,
    pub fcfe: ValuationResult<FcfeValuation>,
    pub relative: RelativeSummary,
    pub dividend_history: Option<DividendHistory>,
    pub ddm: DdmSummary,
    pub fcff_sensitivity: Option<SensitivityGrid>,
    pub fcfe_sensitivity: Option<SensitivityGrid>,
    pub ddm_sensitivity: SensitivityGrid,
}

impl Valuations {
    pub fn outcomes(&self) -> Vec<MethodOutcome> {
        fn price_of<T>(r: &ValuationResult<T>, f: impl Fn(&T) -> f64) -> Result<f64, String> {
            r.as_ref().map(f).map_err(ToString::to_string)
        }

        Method::ALL
            .iter()
            .map(|&method| {
                let result = match method {
                    Method::Fcff => match &self.fcff {
                        Ok(v) if v.enterprise.undefined => {
                            Err(ValuationError::DiscountRateNotAboveGrowth {
                                method: "FCFF",
                                rate: v.enterprise.wacc,
                                growth: v.enterprise.terminal_growth,
                            }
                            .to_string())
                        }
                        result => price_of(result, |v| v.target_price),
                    },
                    Method::Fcfe => price_of(&self.fcfe, |v| v.valuation.value_per_share),
                    Method::Pe => price_of(&self.relative.pe, |v| v.target_price),
                    Method::Pb => price_of(&self.relative.pb, |v| v.target_price),
                    Method::EvEbitda => price_of(&self.relative.ev_ebitda, |v| v.target_price),
                    Method::DdmGordon => price_of(&self.ddm.gordon, |v| v.target_price),
                    Method::DdmTwoStage => price_of(&self.ddm.two_stage, |v| v.target_price),
                    Method::DdmHModel => price_of(&self.ddm.h_model, |v| v.target_price),
                };
                MethodOutcome::new(method, result)
            })
            .collect()
    }

    pub fn fair_value(&self) -> Option<FairValueRange> {
        FairValueRange::from_prices(self.outcomes().iter().filter_map(MethodOutcome::usable_price))
    }
}

fn fcff_inputs(plan: &ValuationPlan) -> ValuationResult<(FcffHistory, FcffAssumptions)> {
    check_horizon("FCFF projection", plan.fcff.projection_years)?;
    let s = &plan.statements;
    let nwc: Vec<f64> = s.nwc().iter().map(|v| v.abs()).collect();
    let history = FcffHistory::new(
        &s.years,
        &s.series(LineItem::Revenue),
        &s.ebitda(),
        &s.series(LineItem::Capex),
        &nwc,
    )?;

    let n = plan.fcff.projection_years;
    let assumptions = FcffAssumptions {
        revenue_growth: vec![plan.fcff.revenue_growth; n],
        tax_rate: plan.fcff.tax_rate,
        terminal_growth: plan.fcff.terminal_growth,
        depreciation: plan.fcff.depreciation,
        ..FcffAssumptions::defaults_over(&history, n)
    };
    Ok((history, assumptions))
}

fn fcfe_inputs(plan: &ValuationPlan) -> ValuationResult<(FcfeHistory, FcfeAssumptions)> {
    check_horizon("FCFE projection", plan.fcfe.projection_years)?;
    let s = &plan.statements;
    let revenue = s.series(LineItem::Revenue);
    let depreciation = s.series(LineItem::Depreciation);
    let capex = s.series(LineItem::Capex);
    let nwc: Vec<f64> = s.nwc().iter().map(|v| v.abs()).collect();
    let net_borrowing = s.net_borrowing();
    let dividends = s.series(LineItem::DividendsPaid);

    let history = FcfeHistory::new(FcfeHistoryInput {
        years: &s.years,
        net_income: &s.series(LineItem::NetIncome),
        depreciation: &depreciation,
        capex: &capex,
        nwc: &nwc,
        net_borrowing: Some(net_borrowing.as_slice()),
        dividends: Some(dividends.as_slice()),
    })?;

    let n = plan.fcfe.projection_years;
    let assumptions = FcfeAssumptions {
        net_income_growth: vec![plan.fcfe.net_income_growth; n],
        revenue_growth: vec![plan.fcfe.revenue_growth; n],
        depreciation_pct_revenue: vec![mean(&ratios(&depreciation, &revenue)); n],
        capex_pct_revenue: vec![mean(&ratios(&capex, &revenue)); n],
        nwc_pct_revenue: vec![mean(&ratios(&nwc, &revenue)); n],
        net_borrowing: vec![plan.fcfe.net_borrowing; n],
        terminal_growth: plan.fcfe.terminal_growth,
        ..FcfeAssumptions::defaults_over(&history, Some(s.latest(LineItem::Revenue)), n)
    };
    Ok((history, assumptions))
}

fn company_metrics(plan: &ValuationPlan) -> CompanyMetrics {
    let s = &plan.statements;
    CompanyMetrics {
        eps: s.latest(LineItem::BasicEps),
        bvps: s.book_value_per_share(plan.basis),
        ebitda: s.ebitda().last().copied().unwrap_or(0.0),
        net_debt: s.net_debt(),
        cash: s.total_cash(),
        basis: plan.basis,
        current_price: plan.current_price,
    }
}

/// Runs every method; a failure in one never stops the others.
pub fn run_all(plan: &ValuationPlan) -> Valuations {
    let rates = DiscountRates::new(plan.wacc);
    debug!(
        ke = rates.cost_of_equity,
        wacc = rates.wacc,
        "resolved discount rates"
    );
    let sens = &plan.sensitivity;

    let bridge = EquityBridge {
        cash: plan.statements.total_cash(),
        debt: plan.fcff.debt,
        basis: plan.basis,
    };
    let fcff_model = fcff_inputs(plan);
    let fcff = fcff_model
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|(h, a)| value_fcff(h, a, rates, bridge));
    let wacc_range = sens
        .wacc_range
        .clone()
        .unwrap_or_else(|| centered_range(rates.wacc, sens.wacc_step, 3));
    let fcff_sensitivity = fcff_model
        .as_ref()
        .ok()
        .and_then(|(h, a)| fcff_sensitivity(h, a, bridge, &wacc_range, &sens.g_range).ok());

    let fcfe_model = fcfe_inputs(plan);
    let fcfe = fcfe_model
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|(h, a)| value_fcfe(h, a, rates.cost_of_equity, plan.basis));
    let fcfe_sensitivity = fcfe_model.as_ref().ok().and_then(|(h, a)| {
        fcfe_sensitivity(h, a, plan.basis, &sens.ke_range, &sens.g_range).ok()
    });

    let relative = run_relative(&company_metrics(plan), &plan.peers, plan.targets);

    let s = &plan.statements;
    let dividend_history = match DividendHistory::new(
        &s.years,
        &s.series(LineItem::DividendsPaid),
        &s.series(LineItem::NetIncome),
        plan.basis,
    ) {
        Ok(history) => Some(history),
        Err(err) => {
            warn!(error = %err, "dividend history unavailable");
            None
        }
    };
    let ddm_assumptions = DdmAssumptions {
        ke: plan.ddm.ke.or(Some(rates.cost_of_equity)),
        ..plan.ddm.clone()
    };
    let ddm = run_ddm(dividend_history.as_ref(), &ddm_assumptions);
    let ddm_sensitivity = gordon_sensitivity(ddm.assumptions.d0, &sens.ke_range, &sens.g_range);

    let valuations = Valuations {
        company: plan.company.clone(),
        years: s.years.clone(),
        basis: plan.basis,
        rates,
        fcff,
        fcfe,
        relative,
        dividend_history,
        ddm,
        fcff_sensitivity,
        fcfe_sensitivity,
        ddm_sensitivity,
    };
    for outcome in valuations.outcomes() {
        match (&outcome.price, &outcome.error) {
            (Some(price), _) => debug!(method = outcome.label, price, "valuation complete"),
            (None, Some(error)) => warn!(method = outcome.label, %error, "valuation unavailable"),
            (None, None) => {}
        }
    }
    valuations
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{Benchmark, CapmInputs, Peer, TargetMultiple};

    pub(crate) fn sample_statements() -> FinancialStatements {
        FinancialStatements::new(vec![2021, 2022, 2023, 2024, 2025])
            .with(LineItem::Revenue, vec![4000.0, 4500.0, 5000.0, 5200.0, 5500.0])
            .with(LineItem::ProfitBeforeTax, vec![600.0, 700.0, 800.0, 850.0, 900.0])
            .with(LineItem::InterestExpense, vec![5.0, 4.0, 3.0, 2.0, 1.0])
            .with(LineItem::NetIncome, vec![480.0, 560.0, 640.0, 680.0, 720.0])
            .with(LineItem::BasicEps, vec![5800.0, 6800.0, 7800.0, 8300.0, 8800.0])
            .with(LineItem::CurrentAssets, vec![2500.0, 2700.0, 2900.0, 3000.0, 3200.0])
            .with(LineItem::Cash, vec![300.0, 350.0, 400.0, 450.0, 500.0])
            .with(LineItem::ShortTermInvestments, vec![500.0, 600.0, 700.0, 800.0, 900.0])
            .with(LineItem::CurrentLiabilities, vec![900.0, 950.0, 1000.0, 1050.0, 1100.0])
            .with(LineItem::TotalLiabilities, vec![1000.0, 1050.0, 1100.0, 1150.0, 1200.0])
            .with(LineItem::Equity, vec![2800.0, 3000.0, 3200.0, 3400.0, 3600.0])
            .with(LineItem::Depreciation, vec![150.0, 160.0, 170.0, 180.0, 190.0])
            .with(LineItem::Capex, vec![-200.0, -210.0, -220.0, -230.0, -240.0])
            .with(LineItem::DividendsPaid, vec![-300.0, -330.0, -360.0, -380.0, -400.0])
    }

    pub(crate) fn sample_plan() -> ValuationPlan {
        ValuationPlan {
            company: "Example Plastics".to_string(),
            statements: sample_statements(),
            basis: ShareBasis::new(81.86, 1000.0),
            wacc: WaccInputs {
                capm: CapmInputs {
                    risk_free_rate: 0.03,
                    beta: 0.8,
                    market_premium: 0.10,
                },
                cost_of_debt: 0.06,
                debt_to_equity: 0.0,
                tax_rate: 0.20,
            },
            current_price: None,
            fcff: FcffPlan {
                projection_years: 5,
                revenue_growth: 0.05,
                tax_rate: 0.20,
                terminal_growth: 0.03,
                debt: 0.0,
                depreciation: DepreciationPolicy::MatchCapex,
            },
            fcfe: FcfePlan {
                projection_years: 5,
                net_income_growth: 0.05,
                revenue_growth: 0.05,
                terminal_growth: 0.03,
                net_borrowing: 0.0,
            },
            peers: PeerSet::new(vec![
                Peer {
                    name: "NTP".to_string(),
                    pe: Some(10.0),
                    pb: Some(1.8),
                    ev_ebitda: Some(6.5),
                },
                Peer {
                    name: "Industry Avg".to_string(),
                    pe: Some(11.0),
                    pb: Some(2.0),
                    ev_ebitda: Some(7.5),
                },
            ]),
            targets: RelativeTargets::default(),
            ddm: DdmAssumptions {
                g_high: Some(0.08),
                g_stable: Some(0.03),
                half_life_years: 6.0,
                ..DdmAssumptions::default()
            },
            sensitivity: SensitivityPlan {
                ke_range: vec![0.09, 0.10, 0.11, 0.12, 0.13],
                g_range: vec![0.02, 0.03, 0.04],
                wacc_range: None,
                wacc_step: 0.01,
            },
        }
    }

    #[test]
    fn run_all_prices_every_method_for_healthy_company() {
        let v = run_all(&sample_plan());
        let outcomes = v.outcomes();
        assert_eq!(outcomes.len(), 8);
        for outcome in &outcomes {
            assert!(
                outcome.usable_price().is_some(),
                "{} should be priced: {:?}",
                outcome.label,
                outcome.error
            );
        }
        let range = v.fair_value().expect("range");
        assert_eq!(range.count, 8);
        assert!(range.low <= range.average && range.average <= range.high);
    }

    #[test]
    fn run_all_uses_capm_for_ddm_and_wacc_for_fcff() {
        let v = run_all(&sample_plan());
        assert!((v.ddm.assumptions.ke - 0.11).abs() < 1e-12);
        let fcff = v.fcff.as_ref().expect("fcff");
        assert!((fcff.enterprise.wacc - 0.11).abs() < 1e-12);
        let fcfe = v.fcfe.as_ref().expect("fcfe");
        assert!((fcfe.valuation.ke - 0.11).abs() < 1e-12);
        assert!((fcfe.assumptions.base_revenue - 5500.0).abs() < 1e-12);
    }

    #[test]
    fn run_all_builds_all_sensitivity_tables() {
        let v = run_all(&sample_plan());
        let fcfe = v.fcfe_sensitivity.as_ref().expect("fcfe grid");
        assert_eq!(fcfe.cells.len(), 5);
        assert_eq!(fcfe.cells[0].len(), 3);
        let fcff = v.fcff_sensitivity.as_ref().expect("fcff grid");
        assert_eq!(fcff.rates.len(), 3);
        assert!((fcff.rates[1] - v.rates.wacc).abs() < 1e-12);
        assert_eq!(v.ddm_sensitivity.cells.len(), 5);
    }

    #[test]
    fn run_all_isolates_failing_methods() {
        let mut plan = sample_plan();
        plan.statements.set(LineItem::BasicEps, vec![-100.0; 5]);
        plan.ddm.g_stable = Some(0.20);
        plan.targets.pb = TargetMultiple::Peers(Benchmark::Median);

        let v = run_all(&plan);
        let outcomes = v.outcomes();
        let by_method = |m: Method| {
            outcomes
                .iter()
                .find(|o| o.method == m)
                .expect("method present")
                .clone()
        };
        assert!(by_method(Method::Pe).error.is_some());
        assert!(by_method(Method::DdmGordon).error.is_some());
        assert!(by_method(Method::DdmTwoStage).error.is_some());
        assert!(by_method(Method::Pb).price.is_some());
        assert!(by_method(Method::Fcff).price.is_some());
        assert_eq!(v.fair_value().expect("range").count, 4);
    }

    #[test]
    fn undefined_dcf_is_reported_as_unavailable() {
        let mut plan = sample_plan();
        plan.fcff.terminal_growth = 0.12;
        let v = run_all(&plan);
        assert!(v.fcff.as_ref().expect("fcff").enterprise.undefined);

        let outcomes = v.outcomes();
        let fcff = outcomes
            .iter()
            .find(|o| o.method == Method::Fcff)
            .expect("fcff outcome");
        assert_eq!(fcff.price, None);
        assert_eq!(
            fcff.error.as_deref(),
            Some("FCFF: discount rate (11.0%) must be > growth (12.0%)")
        );
        assert_eq!(v.fair_value().expect("range").count, 7);
    }

    #[test]
    fn oversized_projection_fails_only_its_own_method() {
        let mut plan = sample_plan();
        plan.fcff.projection_years = usize::MAX;
        let v = run_all(&plan);
        assert!(v.fcff.is_err());
        assert!(v.fcff_sensitivity.is_none());
        assert!(v.fcfe.is_ok());
    }

    #[test]
    fn zero_price_carries_an_error() {
        let mut plan = sample_plan();
        plan.statements.set(LineItem::DividendsPaid, vec![0.0; 5]);
        let v = run_all(&plan);
        let gordon = v
            .outcomes()
            .into_iter()
            .find(|o| o.method == Method::DdmGordon)
            .expect("gordon outcome");
        assert_eq!(gordon.price, None);
        assert_eq!(gordon.error.as_deref(), Some("DDM (Gordon): price 0.00 <= 0"));
    }

    #[test]
    fn non_finite_price_carries_an_error() {
        let outcome = MethodOutcome::new(Method::Pe, Ok(f64::NAN));
        assert_eq!(outcome.price, None);
        assert_eq!(outcome.error.as_deref(), Some("P/E: price is not finite"));
    }

    #[test]
    fn company_metrics_follow_latest_year() {
        let plan = sample_plan();
        let m = company_metrics(&plan);
        assert_eq!(m.eps, 8800.0);
        assert_eq!(m.ebitda, 900.0 + 1.0 + 190.0);
        assert_eq!(m.net_debt, 1200.0 - 500.0 - 900.0);
        assert_eq!(m.cash, 1400.0);
    }
}
