mod aggregate;
mod ddm;
mod fcfe;
mod fcff;
mod relative;
mod sensitivity;
mod statements;
mod types;

#[cfg(test)]
pub(crate) use aggregate::tests::{sample_plan, sample_statements};
pub use aggregate::{
    FcfePlan, FcffPlan, MethodOutcome, SensitivityPlan, ValuationPlan, Valuations, run_all,
};
pub use ddm::{
    DdmAssumptions, DdmSummary, DividendHistory, GordonValuation, HModelValuation, ResolvedDdm,
    StageDividend, TwoStageValuation, gordon_growth, gordon_sensitivity, h_model, run_ddm,
    two_stage,
};
pub use fcfe::{
    EquityValuation, FcfeAssumptions, FcfeHistory, FcfeHistoryInput, FcfeValuation, FcfeYear,
    equity_value, fcfe_sensitivity, project_fcfe, value_fcfe,
};
pub use fcff::{
    DepreciationPolicy, EnterpriseValuation, EquityBridge, FcffAssumptions, FcffHistory,
    FcffValuation, FcffYear, enterprise_value, fcff_sensitivity, project_fcff, value_fcff,
};
pub use relative::{
    Benchmark, CompanyMetrics, Multiple, MultipleValuation, Peer, PeerSet, RelativeSummary,
    RelativeTargets, TargetMultiple, median, run_relative, value_ev_ebitda, value_pb, value_pe,
};
pub use sensitivity::{SensitivityGrid, centered_range, sweep};
pub use statements::{FinancialStatements, LineItem};
pub use types::{
    CapmInputs, DiscountRates, FairValueRange, MAX_HORIZON_YEARS, Method, ShareBasis,
    ValuationError, ValuationResult, WaccInputs,
};
