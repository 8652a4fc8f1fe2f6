//! Feature aggregation: charge history → cleaned monthly or per-charge tables.

use super::{ChargeRecord, MonthlyRecord, MonthlyTotals, Scope};
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::source::{ChargeFilter, ChargeRow, ChargeSource};
use std::sync::Arc;

pub struct Aggregator {
    source: Arc<dyn ChargeSource>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn ChargeSource>, config: AggregatorConfig) -> Self {
        Self { source, config }
    }

    fn filter(&self, scope: &Scope) -> ChargeFilter {
        let mut f = ChargeFilter {
            currency_code: self.config.currency_code.clone(),
            excluded_brand: self.config.excluded_brand.clone(),
            ..Default::default()
        };
        match scope {
            Scope::All => {}
            Scope::Fleet(fleet_id) => f.fleet_id = Some(*fleet_id),
            Scope::UserMonth {
                fleet_id,
                user_id,
                month,
            } => {
                f.fleet_id = Some(*fleet_id);
                f.user_id = Some(*user_id);
                f.month = Some(month.clone());
            }
        }
        f
    }

    /// Monthly cost and energy per (user, fleet, month). Rows whose features
    /// are missing after cleaning are dropped; an empty table means no data.
    pub fn monthly(&self, scope: &Scope) -> Result<Vec<MonthlyRecord>> {
        let rows = self.source.charges(&self.filter(scope))?;
        let totals = MonthlyTotals::from_rows(&rows);
        let groups = totals.len();
        let records: Vec<MonthlyRecord> = totals
            .into_iter()
            .filter_map(|t| t.into_record(self.config.feature_clip))
            .collect();
        if records.len() < groups {
            tracing::debug!(
                dropped = groups - records.len(),
                "monthly rows with missing features dropped"
            );
        }
        Ok(records)
    }

    /// One record per charge event with both features present.
    pub fn per_charge(&self, scope: &Scope) -> Result<Vec<ChargeRecord>> {
        let rows = self.source.charges(&self.filter(scope))?;
        let total = rows.len();
        let records: Vec<ChargeRecord> = rows.into_iter().filter_map(charge_record).collect();
        if records.len() < total {
            tracing::debug!(
                dropped = total - records.len(),
                "charge rows with missing features dropped"
            );
        }
        Ok(records)
    }
}

fn charge_record(row: ChargeRow) -> Option<ChargeRecord> {
    let price = row.price.filter(|v| v.is_finite())?;
    let charge_added = row.charge_added.filter(|v| v.is_finite())?;
    let charging_time = match (row.started_charging_at, row.finished_charging_at) {
        (Some(start), Some(end)) => Some((end - start).num_seconds()),
        _ => None,
    };
    Some(ChargeRecord {
        user_id: row.user_id,
        fleet_id: row.fleet_id,
        month: row.month,
        price,
        charge_added,
        started_charging_at: row.started_charging_at,
        finished_charging_at: row.finished_charging_at,
        charging_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SqliteSource;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32, d: u32, h: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, m, d).and_then(|d| d.and_hms_opt(h, 0, 0))
    }

    fn fixture() -> Aggregator {
        let s = SqliteSource::open_in_memory().unwrap();
        s.insert_fleet(7, None, None).unwrap();
        s.insert_brand(1, "tesla").unwrap();
        s.insert_user(3, "EUR").unwrap();
        s.insert_user(4, "EUR").unwrap();
        s.insert_car(30, 3, 1).unwrap();
        s.insert_car(40, 4, 1).unwrap();
        s.attach_car(30, 7).unwrap();
        s.attach_car(40, 7).unwrap();
        s.insert_charge(30, Some(70.0), Some(35.0), at(1, 3, 8), at(1, 3, 10)).unwrap();
        s.insert_charge(30, Some(50.0), Some(25.0), at(1, 9, 8), at(1, 9, 9)).unwrap();
        s.insert_charge(30, Some(9.0), None, at(2, 1, 8), at(2, 1, 9)).unwrap();
        s.insert_charge(40, Some(5.0), Some(0.0), at(1, 4, 8), at(1, 4, 9)).unwrap();
        Aggregator::new(Arc::new(s), AggregatorConfig::default())
    }

    #[test]
    fn monthly_totals_for_fleet() {
        let agg = fixture();
        let table = agg.monthly(&Scope::Fleet(7)).unwrap();
        // user 3 February has cost but no energy, so it is dropped
        assert_eq!(table.len(), 2);
        let jan = table.iter().find(|r| r.user_id == 3).unwrap();
        assert_eq!(jan.month, "2024-01");
        assert_eq!(jan.monthly_cost, 120.0);
        assert_eq!(jan.monthly_kwh, 60.0);
        assert_eq!(jan.price_per_kwh, Some(2.0));
        let zero = table.iter().find(|r| r.user_id == 4).unwrap();
        assert_eq!(zero.price_per_kwh, None);
        assert!(table.iter().all(|r| r.price_per_kwh.map_or(true, f64::is_finite)));
    }

    #[test]
    fn per_charge_scoped_to_user_month() {
        let agg = fixture();
        let scope = Scope::UserMonth {
            fleet_id: 7,
            user_id: 3,
            month: "2024-01".into(),
        };
        let table = agg.per_charge(&scope).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].charging_time, Some(7200));
        assert_eq!(table[0].month.as_deref(), Some("2024-01"));

        let feb = Scope::UserMonth {
            fleet_id: 7,
            user_id: 3,
            month: "2024-02".into(),
        };
        assert!(agg.per_charge(&feb).unwrap().is_empty());
    }

    #[test]
    fn unknown_fleet_is_empty() {
        let agg = fixture();
        assert!(agg.monthly(&Scope::Fleet(99)).unwrap().is_empty());
        assert!(agg.per_charge(&Scope::Fleet(99)).unwrap().is_empty());
    }
}
