use serde::Serialize;

/// Two-way table of prices: one row per discount rate, one column per growth rate.
///
/// A `None` cell means the formula is undefined at that point (discount rate
/// not above growth); it renders as "N/A".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityGrid {
    pub rate_label: &'static str,
    pub rates: Vec<f64>,
    pub growth_rates: Vec<f64>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl SensitivityGrid {
    pub fn cell(&self, rate_index: usize, growth_index: usize) -> Option<f64> {
        self.cells
            .get(rate_index)
            .and_then(|row| row.get(growth_index))
            .copied()
            .flatten()
    }
}

/// Evaluates `price_at` for every (rate, growth) pair.
///
/// Cells with `rate <= growth` are `None` without calling `price_at`; each
/// other cell is an independent call with explicit parameters.
pub fn sweep<F>(
    rate_label: &'static str,
    rates: &[f64],
    growth_rates: &[f64],
    price_at: F,
) -> SensitivityGrid
where
    F: Fn(f64, f64) -> Option<f64>,
{
    let cells = rates
        .iter()
        .map(|&rate| {
            growth_rates
                .iter()
                .map(|&growth| {
                    if rate <= growth {
                        None
                    } else {
                        price_at(rate, growth).filter(|p| p.is_finite())
                    }
                })
                .collect()
        })
        .collect();

    SensitivityGrid {
        rate_label,
        rates: rates.to_vec(),
        growth_rates: growth_rates.to_vec(),
        cells,
    }
}

/// `count` evenly spaced rates centred on `center`.
pub fn centered_range(center: f64, step: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let half = (count - 1) as f64 / 2.0;
    (0..count)
        .map(|i| center + (i as f64 - half) * step)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn sweep_marks_undefined_cells_without_evaluating_them() {
        let calls = Cell::new(0);
        let grid = sweep("Ke", &[0.03, 0.10], &[0.03, 0.05], |rate, growth| {
            calls.set(calls.get() + 1);
            Some(rate - growth)
        });

        assert_eq!(grid.cells.len(), 2);
        assert_eq!(grid.cell(0, 0), None);
        assert_eq!(grid.cell(0, 1), None);
        assert!(grid.cell(1, 0).is_some());
        assert!(grid.cell(1, 1).is_some());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn sweep_drops_non_finite_prices() {
        let grid = sweep("Ke", &[0.10], &[0.02], |_, _| Some(f64::INFINITY));
        assert_eq!(grid.cell(0, 0), None);
    }

    #[test]
    fn centered_range_is_symmetric() {
        let range = centered_range(0.11, 0.01, 5);
        assert_eq!(range.len(), 5);
        assert!((range[0] - 0.09).abs() < 1e-12);
        assert!((range[2] - 0.11).abs() < 1e-12);
        assert!((range[4] - 0.13).abs() < 1e-12);
        assert!(centered_range(0.1, 0.01, 0).is_empty());
    }
}
