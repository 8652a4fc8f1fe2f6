//! Request-time scoring and the result rows handed to callers.

mod scorer;

pub use crate::model::AnomalyLabel;
pub use scorer::{score_with, Scored, Scorer};

use crate::features::{ChargeRecord, MonthlyRecord};
use chrono::NaiveDateTime;
use serde::Serialize;

/// One user's month within a fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAnomaly {
    pub user_id: i64,
    pub fleet_id: i64,
    pub monthly_cost: f64,
    #[serde(rename = "monthly_kWh")]
    pub monthly_kwh: f64,
    #[serde(rename = "price_per_kWh")]
    pub price_per_kwh: Option<f64>,
    pub anomaly_scores: f64,
    pub anomaly: AnomalyLabel,
}

impl From<Scored<MonthlyRecord>> for MonthlyAnomaly {
    fn from(s: Scored<MonthlyRecord>) -> Self {
        Self {
            user_id: s.record.user_id,
            fleet_id: s.record.fleet_id,
            monthly_cost: s.record.monthly_cost,
            monthly_kwh: s.record.monthly_kwh,
            price_per_kwh: s.record.price_per_kwh,
            anomaly_scores: s.anomaly_score,
            anomaly: s.anomaly,
        }
    }
}

/// One charge of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeAnomaly {
    pub month: Option<String>,
    pub user_id: i64,
    pub price: f64,
    pub charge_added: f64,
    pub started_charging_at: Option<NaiveDateTime>,
    pub finished_charging_at: Option<NaiveDateTime>,
    /// Seconds from start to finish
    pub charging_time: Option<i64>,
    pub anomaly_scores: f64,
    pub anomaly: AnomalyLabel,
}

impl From<Scored<ChargeRecord>> for ChargeAnomaly {
    fn from(s: Scored<ChargeRecord>) -> Self {
        Self {
            month: s.record.month,
            user_id: s.record.user_id,
            price: s.record.price,
            charge_added: s.record.charge_added,
            started_charging_at: s.record.started_charging_at,
            finished_charging_at: s.record.finished_charging_at,
            charging_time: s.record.charging_time,
            anomaly_scores: s.anomaly_score,
            anomaly: s.anomaly,
        }
    }
}
