//! Monthly totals per (user, fleet, month) over raw charge rows.

use super::MonthlyRecord;
use crate::source::ChargeRow;
use std::collections::HashMap;

/// Running sums for one group. Missing values are ignored; a sum with no
/// present value stays missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTotals {
    pub user_id: i64,
    pub fleet_id: i64,
    pub month: String,
    pub cost: Option<f64>,
    pub kwh: Option<f64>,
}

fn add(acc: &mut Option<f64>, v: Option<f64>) {
    if let Some(v) = v {
        *acc = Some(acc.unwrap_or(0.0) + v);
    }
}

impl MonthlyTotals {
    /// Group rows by (user, fleet, month of finish). Groups come out in the
    /// order their key first appears. Rows the source could not place in a
    /// month are skipped.
    pub fn from_rows(rows: &[ChargeRow]) -> Vec<MonthlyTotals> {
        let mut index: HashMap<(i64, i64, String), usize> = HashMap::new();
        let mut out: Vec<MonthlyTotals> = Vec::new();
        let mut undated = 0usize;

        for row in rows {
            let Some(month) = row.month.clone() else {
                undated += 1;
                continue;
            };
            let key = (row.user_id, row.fleet_id, month);
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                out.push(MonthlyTotals {
                    user_id: key.0,
                    fleet_id: key.1,
                    month: key.2,
                    cost: None,
                    kwh: None,
                });
                out.len() - 1
            });
            let t = &mut out[slot];
            add(&mut t.cost, row.price);
            add(&mut t.kwh, row.charge_added);
        }

        if undated > 0 {
            tracing::debug!(undated, "charges without finish time left out of monthly totals");
        }
        out
    }

    /// Derive price per kWh, neutralize degenerate values and clip. Returns
    /// `None` when either feature is missing after cleaning.
    pub fn into_record(self, clip: f64) -> Option<MonthlyRecord> {
        let price_per_kwh = match (self.cost, self.kwh) {
            (Some(c), Some(k)) => Some(c / k).filter(|v| v.is_finite()),
            _ => None,
        };
        let cost = self.cost.filter(|v| v.is_finite()).map(|v| v.min(clip));
        let kwh = self.kwh.filter(|v| v.is_finite()).map(|v| v.min(clip));
        Some(MonthlyRecord {
            user_id: self.user_id,
            fleet_id: self.fleet_id,
            month: self.month,
            monthly_cost: cost?,
            monthly_kwh: kwh?,
            price_per_kwh,
        })
    }
}
