//! Engine configuration.
//!
//! Every tunable constant of the pipeline lives here so deployments can
//! override them from JSON without touching code. All structs default to the
//! values the engine was calibrated with.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::{ForecastError, Result};
use crate::period::PeriodType;
use crate::types::{CategoryClass, ForecastMetrics};

/// Minimum number of observed periods required before a model is fitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinDataPoints {
    /// Minimum for daily series.
    pub daily: usize,
    /// Minimum for weekly series.
    pub weekly: usize,
    /// Minimum for monthly series.
    pub monthly: usize,
}

impl MinDataPoints {
    /// Returns the minimum for `period`.
    #[must_use]
    pub const fn for_period(&self, period: PeriodType) -> usize {
        match period {
            PeriodType::Daily => self.daily,
            PeriodType::Weekly => self.weekly,
            PeriodType::Monthly => self.monthly,
        }
    }
}

impl Default for MinDataPoints {
    fn default() -> Self {
        Self {
            daily: 30,
            weekly: 12,
            monthly: 6,
        }
    }
}

/// Largest forecast horizon accepted per granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxHorizon {
    /// Cap for daily forecasts.
    pub daily: u32,
    /// Cap for weekly forecasts.
    pub weekly: u32,
    /// Cap for monthly forecasts.
    pub monthly: u32,
}

impl MaxHorizon {
    /// Returns the cap for `period`.
    #[must_use]
    pub const fn for_period(&self, period: PeriodType) -> u32 {
        match period {
            PeriodType::Daily => self.daily,
            PeriodType::Weekly => self.weekly,
            PeriodType::Monthly => self.monthly,
        }
    }
}

impl Default for MaxHorizon {
    fn default() -> Self {
        Self {
            daily: 30,
            weekly: 52,
            monthly: 24,
        }
    }
}

/// Bounded retry policy for writes to a contention-prone store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// Returns the delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

/// Weights of the composite score used to rank forecast candidates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of MAPE.
    pub mape: f64,
    /// Weight of RMSE normalised by mean historical demand.
    pub rmse: f64,
    /// Weight of AIC / 1000.
    pub aic: f64,
    /// Weight of BIC / 1000.
    pub bic: f64,
}

impl ScoreWeights {
    /// Composite score of a forecast; lower is better.
    ///
    /// `mean_demand` is floored at 1 before normalising RMSE.
    #[must_use]
    pub fn score(&self, metrics: &ForecastMetrics, mean_demand: f64) -> f64 {
        let mean_demand = if mean_demand.is_finite() {
            mean_demand.max(1.0)
        } else {
            1.0
        };
        self.mape * metrics.mape
            + self.rmse * (metrics.rmse / mean_demand) * 100.0
            + self.aic * (metrics.aic / 1000.0)
            + self.bic * (metrics.bic / 1000.0)
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            mape: 0.4,
            rmse: 0.3,
            aic: 0.2,
            bic: 0.1,
        }
    }
}

/// Inputs of the inventory optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Target service level in percent.
    pub service_level: f64,
    /// Replenishment lead time in days.
    pub lead_time_days: u32,
    /// Annual holding cost as a percentage of unit price.
    pub holding_cost_percentage: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            service_level: 95.0,
            lead_time_days: 7,
            holding_cost_percentage: 20.0,
        }
    }
}

/// Fixed cost of placing one order, by category class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingCostTable {
    /// Controlled and prescription items.
    pub controlled: Decimal,
    /// Supplements and vitamins.
    pub supplement: Decimal,
    /// Emergency and critical items.
    pub emergency: Decimal,
    /// Everything else.
    pub general: Decimal,
}

impl OrderingCostTable {
    /// Returns the ordering cost for `class`.
    #[must_use]
    pub const fn cost_for(&self, class: CategoryClass) -> Decimal {
        match class {
            CategoryClass::Controlled => self.controlled,
            CategoryClass::Supplement => self.supplement,
            CategoryClass::Emergency => self.emergency,
            CategoryClass::General => self.general,
        }
    }
}

impl Default for OrderingCostTable {
    fn default() -> Self {
        Self {
            controlled: Decimal::from(100),
            supplement: Decimal::from(25),
            emergency: Decimal::from(75),
            general: Decimal::from(50),
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum observed periods per granularity.
    pub min_data_points: MinDataPoints,
    /// Largest horizon per granularity, counting any extension.
    pub max_horizon: MaxHorizon,
    /// History length below which a best-forecast candidate is skipped,
    /// regardless of granularity.
    pub min_candidate_points: usize,
    /// Write retry policy.
    pub retry: RetryPolicy,
    /// Composite score weights for best-candidate search.
    pub score_weights: ScoreWeights,
    /// Default optimizer inputs.
    pub optimizer: OptimizerConfig,
    /// Ordering cost per category class.
    pub ordering_costs: OrderingCostTable,
    /// Confidence level of forecast intervals, in percent.
    pub confidence_level: f64,
    /// Upper bound on concurrently running item pipelines.
    ///
    /// `None` uses the number of available CPU cores.
    pub max_workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_data_points: MinDataPoints::default(),
            max_horizon: MaxHorizon::default(),
            min_candidate_points: 30,
            retry: RetryPolicy::default(),
            score_weights: ScoreWeights::default(),
            optimizer: OptimizerConfig::default(),
            ordering_costs: OrderingCostTable::default(),
            confidence_level: 95.0,
            max_workers: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns [`ForecastError::Parse`] for malformed JSON and
    /// [`ForecastError::InvalidParameter`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ForecastError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within its meaningful range.
    ///
    /// # Errors
    /// Returns [`ForecastError::InvalidParameter`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ForecastError::InvalidParameter(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 100.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "confidence_level must be in (0, 100), got {}",
                self.confidence_level
            )));
        }
        if !(self.optimizer.service_level > 0.0 && self.optimizer.service_level < 100.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "optimizer.service_level must be in (0, 100), got {}",
                self.optimizer.service_level
            )));
        }
        if [PeriodType::Daily, PeriodType::Weekly, PeriodType::Monthly]
            .into_iter()
            .any(|period| self.max_horizon.for_period(period) == 0)
        {
            return Err(ForecastError::InvalidParameter(
                "max_horizon must be at least 1 for every period".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of item pipelines allowed to run at once.
    #[must_use]
    pub fn worker_limit(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}
