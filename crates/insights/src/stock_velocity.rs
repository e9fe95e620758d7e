//! Stock-velocity prediction.
//!
//! For each (location, product) the job averages daily units sold over a
//! window, compares the recent half of the window with the older half, and
//! projects when on-hand stock runs out and how much to reorder to cover
//! lead time plus a target number of days.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use retailops_core::{AggregateId, TenantId};

use crate::job::InsightJob;
use crate::result::{InsightError, InsightResult};

pub const DEFAULT_LEAD_TIME_DAYS: u32 = 3;
pub const DEFAULT_TARGET_COVER_DAYS: u32 = 14;

/// Full-confidence window length.
const CONFIDENT_WINDOW_DAYS: f64 = 28.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesHistorySnapshot {
    pub tenant_id: TenantId,
    /// Last day included in the history.
    pub as_of: NaiveDate,
    pub window_days: u32,
    pub items: Vec<ItemSalesHistory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSalesHistory {
    pub location_id: AggregateId,
    pub product_id: AggregateId,
    pub on_hand: i64,
    /// Units sold per day, oldest first. Shorter series are padded with
    /// leading zeros; longer ones keep the newest `window_days` entries.
    pub daily_units: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemVelocity {
    pub location_id: AggregateId,
    pub product_id: AggregateId,
    pub on_hand: i64,
    pub avg_daily: f64,
    /// Recent-half average minus older-half average (units/day).
    pub trend: f64,
    pub days_of_cover: Option<f64>,
    pub predicted_stockout: Option<NaiveDate>,
    pub suggested_reorder: i64,
}

#[derive(Debug, Clone)]
pub struct StockVelocityJob {
    tenant_id: TenantId,
    input: SalesHistorySnapshot,
    lead_time_days: u32,
    target_cover_days: u32,
}

impl StockVelocityJob {
    pub fn new(tenant_id: TenantId, input: SalesHistorySnapshot) -> Self {
        Self {
            tenant_id,
            input,
            lead_time_days: DEFAULT_LEAD_TIME_DAYS,
            target_cover_days: DEFAULT_TARGET_COVER_DAYS,
        }
    }

    pub fn with_lead_time(mut self, days: u32) -> Self {
        self.lead_time_days = days;
        self
    }

    pub fn with_target_cover(mut self, days: u32) -> Self {
        self.target_cover_days = days;
        self
    }

    /// Per-item forecast, most urgent first (no velocity last).
    pub fn forecast(&self) -> Result<Vec<ItemVelocity>, InsightError> {
        if self.input.tenant_id != self.tenant_id {
            return Err(InsightError::InvalidInput(
                "tenant_id mismatch between job and snapshot".to_string(),
            ));
        }
        if self.input.window_days == 0 {
            return Err(InsightError::InvalidInput("window_days must be >= 1".to_string()));
        }

        let horizon = f64::from(self.lead_time_days) + f64::from(self.target_cover_days);
        let mut out: Vec<ItemVelocity> = self
            .input
            .items
            .iter()
            .map(|item| self.item_velocity(item, horizon))
            .collect();

        out.sort_by(|a, b| match (a.days_of_cover, b.days_of_cover) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => core::cmp::Ordering::Less,
            (None, Some(_)) => core::cmp::Ordering::Greater,
            (None, None) => core::cmp::Ordering::Equal,
        }
        .then_with(|| a.location_id.cmp(&b.location_id))
        .then_with(|| a.product_id.cmp(&b.product_id)));

        Ok(out)
    }

    fn item_velocity(&self, item: &ItemSalesHistory, horizon: f64) -> ItemVelocity {
        let series = window(&item.daily_units, self.input.window_days as usize);
        let avg_daily = mean(&series);

        let half = series.len() / 2;
        let trend = if half == 0 {
            0.0
        } else {
            mean(&series[series.len() - half..]) - mean(&series[..half])
        };

        let days_of_cover = (avg_daily > 0.0).then(|| item.on_hand.max(0) as f64 / avg_daily);
        let predicted_stockout = days_of_cover
            .and_then(|d| self.input.as_of.checked_add_days(Days::new(d.floor() as u64)));

        let needed = (avg_daily * horizon).ceil() as i64;
        let suggested_reorder = (needed - item.on_hand).max(0);

        ItemVelocity {
            location_id: item.location_id,
            product_id: item.product_id,
            on_hand: item.on_hand,
            avg_daily,
            trend,
            days_of_cover,
            predicted_stockout,
            suggested_reorder,
        }
    }
}

impl InsightJob for StockVelocityJob {
    type Input = SalesHistorySnapshot;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<InsightResult, InsightError> {
        let items = self.forecast()?;
        let at_risk = items
            .iter()
            .filter(|i| matches!(i.days_of_cover, Some(d) if d <= self.lead_time_days as f64))
            .count();
        let confidence = (self.input.window_days as f64 / CONFIDENT_WINDOW_DAYS).min(1.0);

        Ok(InsightResult::new(at_risk as f64, confidence)
            .with_explanation(format!(
                "{at_risk} of {} item(s) will run out within the {}-day lead time (window={} days)",
                items.len(),
                self.lead_time_days,
                self.input.window_days
            ))
            .with_metadata(json!({
                "kind": "inventory.stock_velocity",
                "tenant_id": self.tenant_id.to_string(),
                "as_of": self.input.as_of,
                "window_days": self.input.window_days,
                "lead_time_days": self.lead_time_days,
                "target_cover_days": self.target_cover_days,
                "items": items,
            })))
    }
}

/// Newest `len` values, left-padded with zeros; negatives count as zero.
fn window(series: &[i64], len: usize) -> Vec<f64> {
    let tail = &series[series.len().saturating_sub(len)..];
    let mut out = vec![0.0; len - tail.len()];
    out.extend(tail.iter().map(|u| (*u).max(0) as f64));
    out
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(on_hand: i64, daily_units: Vec<i64>) -> ItemSalesHistory {
        ItemSalesHistory {
            location_id: AggregateId::new(),
            product_id: AggregateId::new(),
            on_hand,
            daily_units,
        }
    }

    fn job(window_days: u32, items: Vec<ItemSalesHistory>) -> StockVelocityJob {
        let tenant_id = TenantId::new();
        StockVelocityJob::new(
            tenant_id,
            SalesHistorySnapshot {
                tenant_id,
                as_of: date(2026, 3, 10),
                window_days,
                items,
            },
        )
    }

    #[test]
    fn steady_seller_forecast() {
        let j = job(4, vec![item(20, vec![2, 2, 2, 2])]);
        let f = &j.forecast().unwrap()[0];
        assert_eq!(f.avg_daily, 2.0);
        assert_eq!(f.trend, 0.0);
        assert_eq!(f.days_of_cover, Some(10.0));
        assert_eq!(f.predicted_stockout, Some(date(2026, 3, 20)));
        // 2/day * (3 + 14) = 34 needed, 20 on hand
        assert_eq!(f.suggested_reorder, 14);
    }

    #[test]
    fn short_history_is_padded_and_trend_detected() {
        let j = job(4, vec![item(5, vec![4, 4])]);
        let f = &j.forecast().unwrap()[0];
        assert_eq!(f.avg_daily, 2.0);
        assert_eq!(f.trend, 4.0);
        assert_eq!(f.days_of_cover, Some(2.5));
        assert_eq!(f.predicted_stockout, Some(date(2026, 3, 12)));
    }

    #[test]
    fn no_sales_means_no_cover_estimate() {
        let j = job(7, vec![item(3, vec![]), item(1, vec![1; 7])]);
        let f = j.forecast().unwrap();
        assert_eq!(f[0].days_of_cover, Some(1.0));
        assert_eq!(f[1].days_of_cover, None);
        assert_eq!(f[1].predicted_stockout, None);
        assert_eq!(f[1].suggested_reorder, 0);
    }

    #[test]
    fn out_of_stock_sorts_first() {
        let j = job(2, vec![item(10, vec![1, 1]), item(0, vec![1, 1])]);
        let f = j.forecast().unwrap();
        assert_eq!(f[0].on_hand, 0);
        assert_eq!(f[0].days_of_cover, Some(0.0));
    }

    #[test]
    fn run_counts_items_at_risk() {
        let j = job(14, vec![item(2, vec![1; 14]), item(100, vec![1; 14])]);
        let r = j.run().unwrap();
        assert_eq!(r.score, 1.0);
        assert!((r.confidence - 0.5).abs() < 1e-9);
        assert_eq!(r.metadata["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn zero_window_is_invalid() {
        assert!(matches!(job(0, vec![]).forecast(), Err(InsightError::InvalidInput(_))));
    }

    #[test]
    fn configurable_horizon() {
        let j = job(1, vec![item(0, vec![3])]).with_lead_time(1).with_target_cover(1);
        assert_eq!(j.forecast().unwrap()[0].suggested_reorder, 6);
    }

    #[test]
    fn extreme_horizons_do_not_overflow() {
        let j = job(1, vec![item(0, vec![3])]).with_lead_time(u32::MAX).with_target_cover(u32::MAX);
        let reorder = j.forecast().unwrap()[0].suggested_reorder;
        assert_eq!(reorder, (3.0 * 2.0 * f64::from(u32::MAX)).ceil() as i64);
    }
}
