//! Fan-out over many items and candidate configurations.
//!
//! Item pipelines run concurrently up to a worker limit. A failing item is
//! logged and counted; it never aborts the rest of the batch.

use std::collections::BTreeMap;
use std::future::ready;
use std::sync::Arc;

use demand_core::{
    EngineConfig, ForecastError, ForecastMetrics, ForecastRecord, ItemId, OptimizationRecord,
    OptimizerConfig, PeriodType, Result, ScoreWeights,
};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pipeline::{ForecastOutcome, ForecastPipeline};

/// A (period, horizon) pair tried by the best-forecast search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForecastCandidate {
    /// Period granularity.
    pub period: PeriodType,
    /// Forecast horizon in periods.
    pub horizon: u32,
}

impl ForecastCandidate {
    /// Creates a candidate.
    #[must_use]
    pub const fn new(period: PeriodType, horizon: u32) -> Self {
        Self { period, horizon }
    }

    /// The default search grid.
    pub const DEFAULT_GRID: [Self; 7] = [
        Self::new(PeriodType::Weekly, 8),
        Self::new(PeriodType::Weekly, 12),
        Self::new(PeriodType::Weekly, 16),
        Self::new(PeriodType::Monthly, 6),
        Self::new(PeriodType::Monthly, 12),
        Self::new(PeriodType::Daily, 7),
        Self::new(PeriodType::Daily, 14),
    ];
}

/// Result of a batch forecast.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    /// Stored forecasts, in input order.
    pub succeeded: Vec<ForecastRecord>,
    /// Number of items whose pipeline failed.
    pub failed_count: usize,
}

/// A candidate forecast with its composite score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    /// Item the forecast belongs to.
    pub item_id: ItemId,
    /// Configuration that produced it.
    pub candidate: ForecastCandidate,
    /// The stored forecast.
    pub record: ForecastRecord,
    /// Composite score; lower is better.
    pub score: f64,
}

impl ScoredCandidate {
    /// Metrics that produced the score.
    #[must_use]
    pub const fn metrics(&self) -> &ForecastMetrics {
        &self.record.metrics
    }
}

/// Why a candidate was left out of the best-forecast search.
#[derive(Debug, Error)]
pub enum SkipReason {
    /// The pipeline failed for this item and configuration.
    #[error("pipeline failed: {0}")]
    Pipeline(#[from] ForecastError),

    /// The history is too short to rank this configuration.
    #[error("history has {actual} points, need at least {required}")]
    ShortHistory {
        /// Minimum number of points for a candidate.
        required: usize,
        /// Number of points in the history.
        actual: usize,
    },

    /// The metrics did not produce a comparable score.
    #[error("composite score {0} is not finite")]
    NonFiniteScore(f64),
}

/// Drives item pipelines concurrently.
#[derive(Debug, Clone)]
pub struct BulkOrchestrator {
    pipeline: Arc<ForecastPipeline>,
    worker_limit: usize,
    weights: ScoreWeights,
    min_candidate_points: usize,
}

impl BulkOrchestrator {
    /// Creates an orchestrator with the worker limit, score weights and
    /// candidate minimum of `config`.
    #[must_use]
    pub fn new(pipeline: Arc<ForecastPipeline>, config: &EngineConfig) -> Self {
        Self {
            pipeline,
            worker_limit: config.worker_limit().max(1),
            weights: config.score_weights,
            min_candidate_points: config.min_candidate_points,
        }
    }

    /// Forecasts every item in `items`.
    ///
    /// Failures are logged and counted; successful records keep input order.
    pub async fn run(&self, items: &[ItemId], period: PeriodType, horizon: u32) -> BatchOutcome {
        let results: Vec<(ItemId, Result<ForecastOutcome>)> = stream::iter(items.iter().copied())
            .map(|item| async move { (item, self.pipeline.forecast(item, period, horizon).await) })
            .buffered(self.worker_limit)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (item, result) in results {
            match result {
                Ok(forecast) => outcome.succeeded.push(forecast.record),
                Err(e) => {
                    warn!(item = %item, error = %e, "Forecast failed for item");
                    outcome.failed_count += 1;
                }
            }
        }

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed_count,
            "Batch forecast finished"
        );
        outcome
    }

    /// Forecasts and optimizes every item in `items`.
    ///
    /// Items whose forecast or optimization fails are left out of the result.
    pub async fn optimize(
        &self,
        items: &[ItemId],
        period: PeriodType,
        horizon: u32,
        config: &OptimizerConfig,
    ) -> BTreeMap<ItemId, OptimizationRecord> {
        let results: Vec<(ItemId, Result<OptimizationRecord>)> =
            stream::iter(items.iter().copied())
                .map(|item| async move {
                    let result: Result<OptimizationRecord> = async {
                        let forecast = self.pipeline.forecast(item, period, horizon).await?;
                        self.pipeline.optimize(&forecast.record, config).await
                    }
                    .await;
                    (item, result)
                })
                .buffered(self.worker_limit)
                .collect()
                .await;

        results
            .into_iter()
            .filter_map(|(item, result)| match result {
                Ok(record) => Some((item, record)),
                Err(e) => {
                    warn!(item = %item, error = %e, "Supply chain optimization failed for item");
                    None
                }
            })
            .collect()
    }

    /// Runs the full pipeline for one item and candidate and scores it.
    ///
    /// Histories shorter than the candidate minimum are skipped before
    /// anything is fitted or stored.
    ///
    /// # Errors
    /// Returns the [`SkipReason`] if the candidate cannot be compared.
    pub async fn evaluate_candidate(
        &self,
        item: ItemId,
        candidate: ForecastCandidate,
    ) -> std::result::Result<ScoredCandidate, SkipReason> {
        let history = self.pipeline.history(item, candidate.period).await?;
        if history.len() < self.min_candidate_points {
            return Err(SkipReason::ShortHistory {
                required: self.min_candidate_points,
                actual: history.len(),
            });
        }
        let outcome = self
            .pipeline
            .forecast_history(item, candidate.period, candidate.horizon, history)
            .await?;
        let score = self
            .weights
            .score(&outcome.record.metrics, outcome.history_mean);
        if !score.is_finite() {
            return Err(SkipReason::NonFiniteScore(score));
        }
        Ok(ScoredCandidate {
            item_id: item,
            candidate,
            record: outcome.record,
            score,
        })
    }

    /// Returns the lowest-scoring forecast over every item and candidate.
    ///
    /// Every candidate that reaches fitting is persisted. Ties keep the earliest
    /// candidate in `items` x `candidates` order.
    ///
    /// # Errors
    /// Returns [`ForecastError::NoViableCandidate`] if every candidate was skipped.
    pub async fn find_best(
        &self,
        items: &[ItemId],
        candidates: &[ForecastCandidate],
    ) -> Result<ScoredCandidate> {
        let pairs: Vec<(ItemId, ForecastCandidate)> = items
            .iter()
            .flat_map(|item| candidates.iter().map(move |c| (*item, *c)))
            .collect();
        let evaluated = pairs.len();

        let best = stream::iter(pairs)
            .map(|(item, candidate)| async move {
                (item, candidate, self.evaluate_candidate(item, candidate).await)
            })
            .buffered(self.worker_limit)
            .filter_map(|(item, candidate, result)| {
                ready(match result {
                    Ok(scored) => Some(scored),
                    Err(reason) => {
                        debug!(
                            item = %item,
                            period = %candidate.period,
                            horizon = candidate.horizon,
                            %reason,
                            "Skipping forecast candidate"
                        );
                        None
                    }
                })
            })
            .fold(None, |best: Option<ScoredCandidate>, scored| {
                ready(match best {
                    Some(current) if current.score <= scored.score => Some(current),
                    _ => Some(scored),
                })
            })
            .await;

        best.ok_or_else(|| {
            ForecastError::NoViableCandidate(format!(
                "none of {evaluated} item and configuration combinations produced a usable forecast"
            ))
        })
    }
}
