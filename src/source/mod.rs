//! Read-only access to charge history.

mod sqlite;

pub use sqlite::SqliteSource;

use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Parameters of a charge history query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeFilter {
    pub currency_code: String,
    pub excluded_brand: String,
    pub fleet_id: Option<i64>,
    pub user_id: Option<i64>,
    /// Year-month (`YYYY-MM`) of `finished_charging_at`
    pub month: Option<String>,
}

/// One charge event joined to its user and fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRow {
    pub user_id: i64,
    pub fleet_id: i64,
    /// Year-month of `finished_charging_at` as the source computes it
    pub month: Option<String>,
    pub price: Option<f64>,
    pub charge_added: Option<f64>,
    pub started_charging_at: Option<NaiveDateTime>,
    pub finished_charging_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    pub id: i64,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Queryable charge history. Implementations own connections and pooling;
/// callers treat each query as a pure function of its filter.
pub trait ChargeSource: Send + Sync {
    fn charges(&self, filter: &ChargeFilter) -> Result<Vec<ChargeRow>>;

    fn fleets(&self) -> Result<Vec<Fleet>>;
}
