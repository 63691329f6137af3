//! Automatic ARIMA order selection.
//!
//! [`ModelSelector`] is the seam the forecasting pipeline depends on;
//! [`StepwiseSelector`] is the default strategy. It never fails: when no
//! order can be estimated it reports [`ArimaOrder::FALLBACK`] with the
//! `degraded` flag set.

use std::collections::HashMap;
use std::fmt::Debug;

use demand_core::ArimaOrder;
use tracing::{debug, warn};

use crate::arima::ArimaModel;
use crate::stationarity::ndiffs;

/// Outcome of an order search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderSelection {
    /// Selected order.
    pub order: ArimaOrder,
    /// AIC of the selected order, when one was fitted.
    pub aic: Option<f64>,
    /// True when the fixed fallback order was returned.
    pub degraded: bool,
}

impl OrderSelection {
    /// The fallback selection.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            order: ArimaOrder::FALLBACK,
            aic: None,
            degraded: true,
        }
    }
}

/// Strategy that chooses an ARIMA order for a series.
pub trait ModelSelector: Send + Sync + Debug {
    /// Chooses an order for `series`. Must not fail.
    fn select_order(&self, series: &[f64]) -> OrderSelection;
}

/// Greedy stepwise AIC search in the style of Hyndman and Khandakar.
///
/// `d` comes from repeated KPSS tests. The search starts from
/// `(start_p, start_q)`, `(0, 0)`, `(1, 0)` and `(0, 1)`, then moves to any
/// neighbour (±1 on `p`, `q`, or both) that lowers AIC until no neighbour
/// improves or `max_steps` moves were made.
#[derive(Clone, Copy, Debug)]
pub struct StepwiseSelector {
    max_p: usize,
    max_q: usize,
    max_d: usize,
    start_p: usize,
    start_q: usize,
    max_steps: usize,
}

impl Default for StepwiseSelector {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_q: 5,
            max_d: 2,
            start_p: 0,
            start_q: 0,
            max_steps: 100,
        }
    }
}

impl StepwiseSelector {
    /// Creates a selector searching p, q in `[0, 5]` and d in `[0, 2]`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upper bounds of the search.
    #[must_use]
    pub const fn with_bounds(mut self, max_p: usize, max_d: usize, max_q: usize) -> Self {
        self.max_p = max_p;
        self.max_d = max_d;
        self.max_q = max_q;
        self
    }

    /// Sets the first (p, q) pair evaluated.
    #[must_use]
    pub const fn with_start(mut self, start_p: usize, start_q: usize) -> Self {
        self.start_p = start_p;
        self.start_q = start_q;
        self
    }

    fn neighbours(&self, p: usize, q: usize) -> Vec<(usize, usize)> {
        const MOVES: [(isize, isize); 8] = [
            (-1, 0),
            (1, 0),
            (0, -1),
            (0, 1),
            (-1, -1),
            (1, 1),
            (-1, 1),
            (1, -1),
        ];
        MOVES
            .iter()
            .filter_map(|(dp, dq)| {
                let np = p.checked_add_signed(*dp)?;
                let nq = q.checked_add_signed(*dq)?;
                (np <= self.max_p && nq <= self.max_q).then_some((np, nq))
            })
            .collect()
    }
}

impl ModelSelector for StepwiseSelector {
    fn select_order(&self, series: &[f64]) -> OrderSelection {
        let clean: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.is_empty() {
            warn!("No finite observations for order selection, using fallback order");
            return OrderSelection::fallback();
        }

        let d = ndiffs(&clean, self.max_d);
        let mut fitted: HashMap<(usize, usize), Option<f64>> = HashMap::new();
        let mut aic_of = |p: usize, q: usize| -> Option<f64> {
            *fitted.entry((p, q)).or_insert_with(|| {
                ArimaModel::new(ArimaOrder::new(p, d, q))
                    .fit(&clean)
                    .ok()
                    .map(|m| m.aic())
                    .filter(|aic| aic.is_finite())
            })
        };

        let mut best: Option<((usize, usize), f64)> = None;
        let starts = [
            (self.start_p.min(self.max_p), self.start_q.min(self.max_q)),
            (0, 0),
            (1.min(self.max_p), 0),
            (0, 1.min(self.max_q)),
        ];
        for (p, q) in starts {
            if let Some(aic) = aic_of(p, q) {
                if best.is_none_or(|(_, b)| aic < b) {
                    best = Some(((p, q), aic));
                }
            }
        }

        let Some(((mut p, mut q), mut best_aic)) = best else {
            warn!(d, "No candidate ARIMA order could be fitted, using fallback order");
            return OrderSelection::fallback();
        };

        for _ in 0..self.max_steps {
            let improvement = self.neighbours(p, q).into_iter().find_map(|(np, nq)| {
                aic_of(np, nq)
                    .filter(|aic| *aic < best_aic)
                    .map(|aic| (np, nq, aic))
            });
            match improvement {
                Some((np, nq, aic)) => {
                    p = np;
                    q = nq;
                    best_aic = aic;
                }
                None => break,
            }
        }

        let order = ArimaOrder::new(p, d, q);
        debug!(%order, aic = best_aic, candidates = fitted.len(), "Selected ARIMA order");
        OrderSelection {
            order,
            aic: Some(best_aic),
            degraded: false,
        }
    }
}
