use serde::{Deserialize, Serialize};

use super::types::{FairValueRange, ShareBasis, ValuationError, ValuationResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Multiple {
    Pe,
    Pb,
    EvEbitda,
}

impl Multiple {
    pub fn label(self) -> &'static str {
        match self {
            Multiple::Pe => "P/E",
            Multiple::Pb => "P/B",
            Multiple::EvEbitda => "EV/EBITDA",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Benchmark {
    #[default]
    Mean,
    Median,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Peer {
    pub name: String,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub ev_ebitda: Option<f64>,
}

impl Peer {
    pub fn multiple(&self, multiple: Multiple) -> Option<f64> {
        match multiple {
            Multiple::Pe => self.pe,
            Multiple::Pb => self.pb,
            Multiple::EvEbitda => self.ev_ebitda,
        }
    }
}

/// Comparable companies, kept in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeerSet {
    pub peers: Vec<Peer>,
}

impl PeerSet {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self { peers }
    }

    /// Values of `multiple` across peers, skipping missing and zero entries.
    fn values(&self, multiple: Multiple) -> Vec<f64> {
        self.peers
            .iter()
            .filter_map(|p| p.multiple(multiple))
            .filter(|v| *v != 0.0 && v.is_finite())
            .collect()
    }

    pub fn mean(&self, multiple: Multiple) -> Option<f64> {
        let values = self.values(multiple);
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn median(&self, multiple: Multiple) -> Option<f64> {
        median(self.values(multiple))
    }

    pub fn benchmark(&self, multiple: Multiple, benchmark: Benchmark) -> Option<f64> {
        match benchmark {
            Benchmark::Mean => self.mean(multiple),
            Benchmark::Median => self.median(multiple),
        }
    }
}

pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Where the target multiple comes from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TargetMultiple {
    Peers(Benchmark),
    Fixed(f64),
}

impl Default for TargetMultiple {
    fn default() -> Self {
        TargetMultiple::Peers(Benchmark::Mean)
    }
}

/// Latest-year per-share and aggregate figures for the company being valued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMetrics {
    pub eps: f64,
    pub bvps: f64,
    pub ebitda: f64,
    pub net_debt: f64,
    pub cash: f64,
    pub basis: ShareBasis,
    pub current_price: Option<f64>,
}

impl CompanyMetrics {
    fn market_price(&self) -> Option<f64> {
        self.current_price.filter(|p| *p > 0.0)
    }

    pub fn current_multiple(&self, multiple: Multiple) -> Option<f64> {
        let price = self.market_price()?;
        match multiple {
            Multiple::Pe if self.eps > 0.0 => Some(price / self.eps),
            Multiple::Pb if self.bvps > 0.0 => Some(price / self.bvps),
            Multiple::EvEbitda if self.ebitda > 0.0 => {
                Some((self.basis.market_cap(price) + self.net_debt) / self.ebitda)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleValuation {
    pub multiple: Multiple,
    /// EPS, BVPS or EBITDA depending on the multiple.
    pub metric: f64,
    pub target_multiple: f64,
    pub peer_mean: Option<f64>,
    pub peer_median: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub equity_value: Option<f64>,
    pub net_debt: Option<f64>,
    pub target_price: f64,
    pub current_price: Option<f64>,
    pub current_multiple: Option<f64>,
    pub upside_pct: Option<f64>,
}

fn resolve_target(
    peers: &PeerSet,
    multiple: Multiple,
    target: TargetMultiple,
) -> ValuationResult<f64> {
    let resolved = match target {
        TargetMultiple::Fixed(value) => Some(value),
        TargetMultiple::Peers(benchmark) => peers.benchmark(multiple, benchmark),
    };
    resolved.ok_or(ValuationError::MultipleUnavailable {
        method: multiple.label(),
        multiple: multiple.label(),
    })
}

fn finish(
    company: &CompanyMetrics,
    peers: &PeerSet,
    multiple: Multiple,
    metric: f64,
    target_multiple: f64,
    target_price: f64,
) -> MultipleValuation {
    let current_price = company.market_price();
    MultipleValuation {
        multiple,
        metric,
        target_multiple,
        peer_mean: peers.mean(multiple),
        peer_median: peers.median(multiple),
        enterprise_value: None,
        equity_value: None,
        net_debt: None,
        target_price,
        current_price,
        current_multiple: company.current_multiple(multiple),
        upside_pct: current_price.map(|p| (target_price / p - 1.0) * 100.0),
    }
}

/// Target price = EPS x target P/E.
pub fn value_pe(
    company: &CompanyMetrics,
    peers: &PeerSet,
    target: TargetMultiple,
) -> ValuationResult<MultipleValuation> {
    if company.eps <= 0.0 {
        return Err(ValuationError::NonPositiveMetric {
            method: Multiple::Pe.label(),
            metric: "EPS",
        });
    }
    let multiple = resolve_target(peers, Multiple::Pe, target)?;
    Ok(finish(
        company,
        peers,
        Multiple::Pe,
        company.eps,
        multiple,
        company.eps * multiple,
    ))
}

/// Target price = BVPS x target P/B.
pub fn value_pb(
    company: &CompanyMetrics,
    peers: &PeerSet,
    target: TargetMultiple,
) -> ValuationResult<MultipleValuation> {
    if company.bvps <= 0.0 {
        return Err(ValuationError::NonPositiveMetric {
            method: Multiple::Pb.label(),
            metric: "BVPS",
        });
    }
    let multiple = resolve_target(peers, Multiple::Pb, target)?;
    Ok(finish(
        company,
        peers,
        Multiple::Pb,
        company.bvps,
        multiple,
        company.bvps * multiple,
    ))
}

/// EV = EBITDA x multiple; equity = EV - net debt; price = equity per share.
pub fn value_ev_ebitda(
    company: &CompanyMetrics,
    peers: &PeerSet,
    target: TargetMultiple,
) -> ValuationResult<MultipleValuation> {
    if company.ebitda <= 0.0 {
        return Err(ValuationError::NonPositiveMetric {
            method: Multiple::EvEbitda.label(),
            metric: "EBITDA",
        });
    }
    let multiple = resolve_target(peers, Multiple::EvEbitda, target)?;
    let enterprise_value = company.ebitda * multiple;
    let equity_value = enterprise_value - company.net_debt;
    let target_price = company.basis.per_share(equity_value);

    let mut valuation = finish(
        company,
        peers,
        Multiple::EvEbitda,
        company.ebitda,
        multiple,
        target_price,
    );
    valuation.enterprise_value = Some(enterprise_value);
    valuation.equity_value = Some(equity_value);
    valuation.net_debt = Some(company.net_debt);
    Ok(valuation)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelativeTargets {
    pub pe: TargetMultiple,
    pub pb: TargetMultiple,
    pub ev_ebitda: TargetMultiple,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelativeSummary {
    pub pe: ValuationResult<MultipleValuation>,
    pub pb: ValuationResult<MultipleValuation>,
    pub ev_ebitda: ValuationResult<MultipleValuation>,
    pub fair_value: Option<FairValueRange>,
}

pub fn run_relative(
    company: &CompanyMetrics,
    peers: &PeerSet,
    targets: RelativeTargets,
) -> RelativeSummary {
    let pe = value_pe(company, peers, targets.pe);
    let pb = value_pb(company, peers, targets.pb);
    let ev_ebitda = value_ev_ebitda(company, peers, targets.ev_ebitda);
    let fair_value = FairValueRange::from_prices(
        [&pe, &pb, &ev_ebitda]
            .into_iter()
            .filter_map(|r| r.as_ref().ok().map(|v| v.target_price)),
    );
    RelativeSummary {
        pe,
        pb,
        ev_ebitda,
        fair_value,
    }
}
