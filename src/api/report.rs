use std::fmt::Write;

use crate::core::{
    FairValueRange, Method, MultipleValuation, SensitivityGrid, ValuationResult, Valuations,
};

const RULE_WIDTH: usize = 65;

/// Rounds to whole units and groups thousands with commas.
pub fn grouped(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn pct(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn whole_pct(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

struct Report<'a> {
    out: String,
    currency: &'a str,
}

impl Report<'_> {
    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn header(&mut self, title: &str) {
        self.out.push('\n');
        self.line("=".repeat(RULE_WIDTH));
        self.line(format!("  {title}"));
        self.line("=".repeat(RULE_WIDTH));
    }

    fn separator(&mut self) {
        self.line("-".repeat(RULE_WIDTH));
    }

    fn aggregate(&mut self, label: &str, value: f64) {
        let unit = format!("bn {}", self.currency);
        self.line(format!("  {label:<22}{:>18} {unit}", grouped(value)));
    }

    fn target(&mut self, method: &str, price: f64) {
        self.separator();
        let line = format!(
            "  >>> TARGET PRICE ({method}): {} {}/share",
            grouped(price),
            self.currency
        );
        self.line(line);
    }

    fn error(&mut self, err: &impl std::fmt::Display) {
        self.line(format!("  Error: {err}"));
    }
}

fn fcff_section(r: &mut Report<'_>, v: &Valuations) {
    r.header("1. FCFF (Discounted Cash Flow)");
    match &v.fcff {
        Ok(f) => {
            r.line(format!("  WACC: {}", pct(f.enterprise.wacc)));
            r.line(format!("  Terminal growth: {}", pct(f.enterprise.terminal_growth)));
            if let Some(margin) = f.assumptions.ebitda_margin.first() {
                r.line(format!("  EBITDA margin (avg): {}", pct(*margin)));
            }
            if f.enterprise.undefined {
                r.line("  WACC <= terminal growth: enterprise value undefined");
                r.separator();
                r.line("  >>> TARGET PRICE (FCFF): N/A");
                return;
            }
            r.aggregate("Enterprise value:", f.enterprise.enterprise_value);
            r.aggregate("+ Cash & ST invest.:", f.bridge.cash);
            r.aggregate("- Debt:", f.bridge.debt);
            r.aggregate("= Equity value:", f.equity_value);
            r.target("FCFF", f.target_price);
        }
        Err(err) => r.error(err),
    }
}

fn fcfe_section(r: &mut Report<'_>, v: &Valuations) {
    r.header("2. FCFE (Free Cash Flow to Equity)");
    match &v.fcfe {
        Ok(f) => {
            let e = &f.valuation;
            r.line(format!("  Ke: {}", pct(e.ke)));
            r.line(format!("  Terminal growth: {}", pct(e.terminal_growth)));
            r.aggregate("PV FCFE:", e.pv_fcfe);
            r.aggregate("PV terminal:", e.pv_terminal);
            if e.terminal_suppressed {
                r.line("  Ke <= terminal growth: terminal value excluded");
            } else {
                r.line(format!("  Terminal share of value: {:.1}%", e.terminal_pct));
            }
            r.aggregate("Equity value:", e.equity_value);
            r.target("FCFE", e.value_per_share);
        }
        Err(err) => r.error(err),
    }
}

fn multiple_section(
    r: &mut Report<'_>,
    title: &str,
    metric_label: &str,
    result: &ValuationResult<MultipleValuation>,
) {
    r.header(title);
    match result {
        Ok(m) => {
            let label = m.multiple.label();
            if m.enterprise_value.is_some() {
                r.aggregate(&format!("{metric_label}:"), m.metric);
            } else {
                r.line(format!("  {metric_label}: {} {}", grouped(m.metric), r.currency));
            }
            r.line(format!("  Target {label}: {:.1}x", m.target_multiple));
            if let (Some(mean), Some(median)) = (m.peer_mean, m.peer_median) {
                r.line(format!("  Peer mean / median: {mean:.1}x / {median:.1}x"));
            }
            if let Some(ev) = m.enterprise_value {
                r.aggregate("Enterprise value:", ev);
            }
            if let Some(net_debt) = m.net_debt {
                r.aggregate("- Net debt:", net_debt);
            }
            if let Some(equity) = m.equity_value {
                r.aggregate("= Equity value:", equity);
            }
            r.target(label, m.target_price);
            if let (Some(current), Some(upside)) = (m.current_price, m.upside_pct) {
                r.line(format!(
                    "  Current price {} {}, upside {upside:+.1}%",
                    grouped(current),
                    r.currency
                ));
            }
        }
        Err(err) => r.error(err),
    }
}

fn ddm_section(r: &mut Report<'_>, v: &Valuations) {
    r.header("6. DDM (Dividend Discount Model)");
    let a = &v.ddm.assumptions;
    r.line(format!("  Ke: {}", pct(a.ke)));
    if let Some(h) = &v.dividend_history {
        r.line("  DPS history:");
        for ((year, dps), payout) in h.years.iter().zip(&h.dps).zip(&h.payout_ratio) {
            r.line(format!(
                "    {year}: DPS = {} {} (payout {:.0}%)",
                grouped(*dps),
                r.currency,
                payout * 100.0
            ));
        }
    }
    r.line(format!("  D0 = {} {}/share", grouped(a.d0), r.currency));
    r.line("");

    match &v.ddm.gordon {
        Ok(g) => r.line(format!(
            "  Gordon Growth (g={}): {} {}/share",
            pct(g.growth_rate),
            grouped(g.target_price),
            r.currency
        )),
        Err(err) => r.line(format!("  Gordon Growth: {err}")),
    }
    match &v.ddm.two_stage {
        Ok(t) => r.line(format!(
            "  Two-Stage ({} -> {}, {}y): {} {}/share",
            pct(t.g_high),
            pct(t.g_stable),
            t.high_growth_years,
            grouped(t.target_price),
            r.currency
        )),
        Err(err) => r.line(format!("  Two-Stage: {err}")),
    }
    match &v.ddm.h_model {
        Ok(h) => r.line(format!(
            "  H-Model ({} -> {}, {}y): {} {}/share",
            pct(h.g_high),
            pct(h.g_stable),
            h.half_life_years,
            grouped(h.target_price),
            r.currency
        )),
        Err(err) => r.line(format!("  H-Model: {err}")),
    }
    match v.ddm.fair_value {
        Some(range) => r.target("DDM avg", range.average),
        None => {
            r.separator();
            r.line("  >>> TARGET PRICE (DDM avg): N/A");
        }
    }
}

fn summary_section(r: &mut Report<'_>, v: &Valuations, range: Option<FairValueRange>) {
    r.header("TARGET PRICE SUMMARY");
    let price_header = format!("Target ({})", r.currency);
    r.line(format!("  {:<20} {price_header:>20}", "Method"));
    r.line(format!("  {}", "-".repeat(42)));
    for outcome in v.outcomes() {
        let price = outcome
            .usable_price()
            .map_or_else(|| "N/A".to_string(), grouped);
        r.line(format!("  {:<20} {price:>20}", outcome.label));
    }
    if let Some(range) = range {
        r.line(format!("  {}", "-".repeat(42)));
        r.line(format!("  FAIR VALUE RANGE ({} methods)", range.count));
        r.line(format!("    Low:  {:>17} {}", grouped(range.low), r.currency));
        r.line(format!("    Avg:  {:>17} {}", grouped(range.average), r.currency));
        r.line(format!("    High: {:>17} {}", grouped(range.high), r.currency));
    }
}

fn grid_section(r: &mut Report<'_>, title: &str, note: Option<String>, grid: &SensitivityGrid) {
    r.header(title);
    if let Some(note) = note {
        r.line(format!("  {note}"));
    }
    r.line(format!(
        "  Target price ({}) by {} (rows) vs g (columns)",
        r.currency, grid.rate_label
    ));
    r.line("");

    let mut header = format!("  {:<10}", format!("{} \\ g", grid.rate_label));
    for g in &grid.growth_rates {
        let _ = write!(header, "{:>14}", format!("g={}", whole_pct(*g)));
    }
    r.line(header);
    r.line(format!("  {}", "-".repeat(10 + 14 * grid.growth_rates.len())));

    for (rate, row) in grid.rates.iter().zip(&grid.cells) {
        let mut line = format!("  {:<10}", format!("{}={}", grid.rate_label, pct(*rate)));
        for cell in row {
            let text = cell.map_or_else(|| "N/A".to_string(), grouped);
            let _ = write!(line, "{text:>14}");
        }
        r.line(line);
    }
}

/// Renders the full plain-text valuation report.
pub fn render_text(v: &Valuations, currency: &str) -> String {
    let mut r = Report {
        out: String::new(),
        currency,
    };
    let inputs = v.rates.inputs;

    r.header(&format!("EQUITY VALUATION SUMMARY: {}", v.company));
    r.line(format!("  Shares outstanding: {:.2} million", v.basis.shares));
    if let (Some(first), Some(last)) = (v.years.first(), v.years.last()) {
        r.line(format!("  Statements: {first}-{last}"));
    }
    r.line(format!(
        "  Rf = {}, Beta = {:.2}, Market premium = {}",
        pct(inputs.capm.risk_free_rate),
        inputs.capm.beta,
        pct(inputs.capm.market_premium)
    ));
    r.line(format!(
        "  Ke (CAPM) = {}, WACC = {} (D/E {:.2}, Kd {}, tax {})",
        pct(v.rates.cost_of_equity),
        pct(v.rates.wacc),
        inputs.debt_to_equity,
        pct(inputs.cost_of_debt),
        pct(inputs.tax_rate)
    ));

    fcff_section(&mut r, v);
    fcfe_section(&mut r, v);
    multiple_section(&mut r, "3. P/E (Price-to-Earnings)", "EPS", &v.relative.pe);
    multiple_section(&mut r, "4. P/B (Price-to-Book)", "BVPS", &v.relative.pb);
    multiple_section(&mut r, "5. EV/EBITDA", "EBITDA", &v.relative.ev_ebitda);
    ddm_section(&mut r, v);
    summary_section(&mut r, v, v.fair_value());

    if let Some(grid) = &v.fcfe_sensitivity {
        grid_section(&mut r, "SENSITIVITY - FCFE", None, grid);
    }
    let d0 = format!("D0 = {} {}/share", grouped(v.ddm.assumptions.d0), currency);
    grid_section(&mut r, "SENSITIVITY - DDM Gordon", Some(d0), &v.ddm_sensitivity);
    if let Some(grid) = &v.fcff_sensitivity {
        grid_section(&mut r, "SENSITIVITY - DCF", None, grid);
    }

    r.out.push('\n');
    r.line("=".repeat(RULE_WIDTH));
    r.line("  Disclaimer: model output for reference only, not investment");
    r.line("  advice. Results depend on the assumptions above.");
    r.line("=".repeat(RULE_WIDTH));
    r.out
}

/// Names the methods that produced no usable price.
pub fn unavailable_methods(v: &Valuations) -> Vec<Method> {
    v.outcomes()
        .into_iter()
        .filter(|o| o.usable_price().is_none())
        .map(|o| o.method)
        .collect()
}
