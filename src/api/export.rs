use serde::Serialize;

use crate::core::{
    DiscountRates, DividendHistory, FairValueRange, FcfeValuation, FcffValuation, GordonValuation,
    HModelValuation, MethodOutcome, MultipleValuation, ResolvedDdm, SensitivityGrid, ShareBasis,
    TwoStageValuation, ValuationResult, Valuations,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelativeExport<'a> {
    pe: Option<&'a MultipleValuation>,
    pb: Option<&'a MultipleValuation>,
    ev_ebitda: Option<&'a MultipleValuation>,
    fair_value: Option<FairValueRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DdmExport<'a> {
    assumptions: ResolvedDdm,
    dividend_history: Option<&'a DividendHistory>,
    gordon: Option<&'a GordonValuation>,
    two_stage: Option<&'a TwoStageValuation>,
    h_model: Option<&'a HModelValuation>,
    fair_value: Option<FairValueRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SensitivityExport<'a> {
    fcfe: Option<&'a SensitivityGrid>,
    ddm_gordon: &'a SensitivityGrid,
    dcf: Option<&'a SensitivityGrid>,
}

/// Machine-readable view of a run. Failed methods appear in `methods` with
/// an `error` string and no price; their detail blocks are null.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationExport<'a> {
    company: &'a str,
    years: &'a [i32],
    basis: ShareBasis,
    rates: DiscountRates,
    methods: Vec<MethodOutcome>,
    fair_value: Option<FairValueRange>,
    fcff: Option<&'a FcffValuation>,
    fcfe: Option<&'a FcfeValuation>,
    relative: RelativeExport<'a>,
    ddm: DdmExport<'a>,
    sensitivity: SensitivityExport<'a>,
}

fn detail<T>(result: &ValuationResult<T>) -> Option<&T> {
    result.as_ref().ok()
}

impl<'a> ValuationExport<'a> {
    pub fn new(v: &'a Valuations) -> Self {
        Self {
            company: &v.company,
            years: &v.years,
            basis: v.basis,
            rates: v.rates,
            methods: v.outcomes(),
            fair_value: v.fair_value(),
            fcff: detail(&v.fcff),
            fcfe: detail(&v.fcfe),
            relative: RelativeExport {
                pe: detail(&v.relative.pe),
                pb: detail(&v.relative.pb),
                ev_ebitda: detail(&v.relative.ev_ebitda),
                fair_value: v.relative.fair_value,
            },
            ddm: DdmExport {
                assumptions: v.ddm.assumptions,
                dividend_history: v.dividend_history.as_ref(),
                gordon: detail(&v.ddm.gordon),
                two_stage: detail(&v.ddm.two_stage),
                h_model: detail(&v.ddm.h_model),
                fair_value: v.ddm.fair_value,
            },
            sensitivity: SensitivityExport {
                fcfe: v.fcfe_sensitivity.as_ref(),
                ddm_gordon: &v.ddm_sensitivity,
                dcf: v.fcff_sensitivity.as_ref(),
            },
        }
    }
}

pub fn render_json(v: &Valuations) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ValuationExport::new(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LineItem, run_all, sample_plan};
    use serde_json::Value;

    fn export(plan: &crate::core::ValuationPlan) -> Value {
        let v = run_all(plan);
        let json = render_json(&v).expect("json");
        serde_json::from_str(&json).expect("parse")
    }

    #[test]
    fn export_lists_every_method_with_price() {
        let json = export(&sample_plan());
        let methods = json["methods"].as_array().expect("methods");
        assert_eq!(methods.len(), 8);
        assert_eq!(methods[0]["method"], "fcff");
        assert_eq!(methods[0]["label"], "FCFF (DCF)");
        assert!(methods.iter().all(|m| m["price"].is_f64() && m["error"].is_null()));
        assert_eq!(json["fairValue"]["count"], 8);
        assert!(json["rates"]["wacc"].is_f64());
        assert!(json["fcff"]["enterprise"]["enterpriseValue"].is_f64());
    }

    #[test]
    fn failed_method_carries_error_and_null_detail() {
        let mut plan = sample_plan();
        plan.statements.set(LineItem::BasicEps, vec![-1.0; 5]);
        let json = export(&plan);

        let pe = json["methods"]
            .as_array()
            .expect("methods")
            .iter()
            .find(|m| m["method"] == "pe")
            .expect("pe")
            .clone();
        assert!(pe["price"].is_null());
        assert_eq!(pe["error"], "P/E: EPS <= 0, cannot apply P/E");
        assert!(json["relative"]["pe"].is_null());
        assert!(json["relative"]["pb"]["targetPrice"].is_f64());
    }

    #[test]
    fn zero_price_exports_null_with_reason() {
        let mut plan = sample_plan();
        plan.statements.set(LineItem::DividendsPaid, vec![0.0; 5]);
        let json = export(&plan);
        let gordon = json["methods"]
            .as_array()
            .expect("methods")
            .iter()
            .find(|m| m["method"] == "ddm-gordon")
            .expect("gordon")
            .clone();
        assert!(gordon["price"].is_null());
        assert_eq!(gordon["error"], "DDM (Gordon): price 0.00 <= 0");
    }

    #[test]
    fn sensitivity_cells_serialize_as_null_when_undefined() {
        let mut plan = sample_plan();
        plan.sensitivity.ke_range = vec![0.03, 0.11];
        let json = export(&plan);
        let grid = &json["sensitivity"]["ddmGordon"];
        assert_eq!(grid["rateLabel"], "Ke");
        assert!(grid["cells"][0][0].is_f64());
        assert!(grid["cells"][0][1].is_null());
        assert!(grid["cells"][0][2].is_null());
        assert!(grid["cells"][1][2].is_f64());
    }
}
