//! Safety stock, reorder point and economic order quantity.

use demand_core::{
    CategoryClass, ForecastRecord, NewOptimization, OptimizerConfig, OrderingCostTable,
};
use demand_model::{inverse_normal_cdf, mean, population_std};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::debug;

/// Order quantity used when the EOQ formula has no valid solution.
const FALLBACK_ORDER_QUANTITY: u64 = 10;

/// Share of lost revenue charged per expected stockout.
const STOCKOUT_PENALTY: f64 = 0.1;

fn positive_or_one(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

/// Rounds a cost to cents, flooring unrepresentable or negative values at zero.
fn cost(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).round_dp(2)
}

fn cost_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).map_or(Decimal::ZERO, cost)
}

/// Derives inventory levels and cost projections from a forecast.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryOptimizer {
    ordering_costs: OrderingCostTable,
}

impl InventoryOptimizer {
    /// Creates an optimizer with the given ordering cost table.
    #[must_use]
    pub const fn new(ordering_costs: OrderingCostTable) -> Self {
        Self { ordering_costs }
    }

    /// Computes the optimal stock levels for `forecast`.
    ///
    /// Never fails: degenerate demand or prices fall back to floors so every
    /// level is a non-negative integer and every cost a non-negative amount.
    #[must_use]
    pub fn optimize(
        &self,
        forecast: &ForecastRecord,
        config: &OptimizerConfig,
        unit_price: Decimal,
        category: CategoryClass,
    ) -> NewOptimization {
        let values = &forecast.forecasted_values;
        let lead_time_weeks = f64::from(config.lead_time_days) / 7.0;

        let avg_demand_lead_time = positive_or_one(mean(values) * lead_time_weeks);
        let demand_std = positive_or_one(population_std(values));
        let z = inverse_normal_cdf(config.service_level / 100.0);

        let raw_safety = (z * demand_std * lead_time_weeks.sqrt()).round();
        let safety_stock = if raw_safety.is_finite() && raw_safety >= 0.0 {
            raw_safety as u64
        } else {
            1
        };
        let reorder_point = ((avg_demand_lead_time + safety_stock as f64).round() as u64).max(1);

        let annual_demand = positive_or_one(
            values.iter().sum::<f64>() * (52.0 / f64::from(forecast.horizon.max(1))),
        );
        let ordering_cost = self.ordering_costs.cost_for(category);
        let holding_pct = Decimal::from_f64(config.holding_cost_percentage).unwrap_or(Decimal::ZERO);
        let holding_cost_per_unit = unit_price * holding_pct / Decimal::ONE_HUNDRED;

        let eoq = (2.0 * annual_demand * ordering_cost.to_f64().unwrap_or(0.0)
            / holding_cost_per_unit.to_f64().unwrap_or(0.0))
        .sqrt();
        let optimal_order_quantity = if eoq.is_finite() && eoq > 0.0 {
            eoq.max(1.0).round() as u64
        } else {
            FALLBACK_ORDER_QUANTITY
        };
        let optimal_maximum_stock = reorder_point + optimal_order_quantity;

        let expected_holding_cost = cost(
            Decimal::from(optimal_order_quantity) / Decimal::TWO * holding_cost_per_unit,
        );
        let expected_stockout_cost = cost_from_f64(
            (1.0 - config.service_level / 100.0)
                * annual_demand
                * unit_price.to_f64().unwrap_or(0.0)
                * STOCKOUT_PENALTY,
        );
        let total_expected_cost = cost(expected_holding_cost + expected_stockout_cost);

        debug!(
            forecast = forecast.id,
            safety_stock,
            reorder_point,
            optimal_order_quantity,
            "Optimized inventory levels"
        );

        NewOptimization {
            forecast_id: forecast.id,
            item_id: forecast.item_id,
            service_level: config.service_level,
            lead_time_days: config.lead_time_days,
            holding_cost_percentage: config.holding_cost_percentage,
            safety_stock,
            reorder_point,
            optimal_order_quantity,
            optimal_maximum_stock,
            expected_holding_cost,
            expected_stockout_cost,
            total_expected_cost,
        }
    }
}
