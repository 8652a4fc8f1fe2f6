//! Feature tables built from charge history.

mod monthly;
mod pipeline;

pub use monthly::MonthlyTotals;
pub use pipeline::Aggregator;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pair of numeric columns a model is fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// `monthly_cost`, `monthly_kWh`
    Monthly,
    /// `price`, `charge_added`
    PerCharge,
}

impl FeatureSet {
    pub fn columns(self) -> [&'static str; 2] {
        match self {
            FeatureSet::Monthly => ["monthly_cost", "monthly_kWh"],
            FeatureSet::PerCharge => ["price", "charge_added"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureSet::Monthly => "monthly",
            FeatureSet::PerCharge => "per_charge",
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row that belongs to one (fleet, user) partition and carries the two
/// feature values of its feature set.
pub trait FeatureRow {
    const FEATURE_SET: FeatureSet;

    fn fleet_id(&self) -> i64;
    fn user_id(&self) -> i64;
    fn features(&self) -> [f64; 2];
}

/// Spend and energy of one user in one fleet over one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    pub user_id: i64,
    pub fleet_id: i64,
    /// `YYYY-MM`
    pub month: String,
    pub monthly_cost: f64,
    #[serde(rename = "monthly_kWh")]
    pub monthly_kwh: f64,
    /// Missing when energy is zero
    #[serde(rename = "price_per_kWh")]
    pub price_per_kwh: Option<f64>,
}

impl FeatureRow for MonthlyRecord {
    const FEATURE_SET: FeatureSet = FeatureSet::Monthly;

    fn fleet_id(&self) -> i64 {
        self.fleet_id
    }
    fn user_id(&self) -> i64 {
        self.user_id
    }
    fn features(&self) -> [f64; 2] {
        [self.monthly_cost, self.monthly_kwh]
    }
}

/// A single charge event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub user_id: i64,
    pub fleet_id: i64,
    /// `YYYY-MM` of the finish time, if known
    pub month: Option<String>,
    pub price: f64,
    pub charge_added: f64,
    pub started_charging_at: Option<NaiveDateTime>,
    pub finished_charging_at: Option<NaiveDateTime>,
    /// Seconds between start and finish
    pub charging_time: Option<i64>,
}

impl FeatureRow for ChargeRecord {
    const FEATURE_SET: FeatureSet = FeatureSet::PerCharge;

    fn fleet_id(&self) -> i64 {
        self.fleet_id
    }
    fn user_id(&self) -> i64 {
        self.user_id
    }
    fn features(&self) -> [f64; 2] {
        [self.price, self.charge_added]
    }
}

/// Restriction applied to an aggregator query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every fleet and user; used for training
    All,
    Fleet(i64),
    UserMonth {
        fleet_id: i64,
        user_id: i64,
        month: String,
    },
}

/// Check a caller-supplied `YYYY-MM` month.
pub fn is_valid_month(month: &str) -> bool {
    month.len() == 7
        && chrono::NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").is_ok()
}
