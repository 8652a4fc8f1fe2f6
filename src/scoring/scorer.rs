//! Annotates feature rows with the score and label of their partition's model.

use crate::error::Result;
use crate::features::FeatureRow;
use crate::model::forest::matrix;
use crate::model::{AnomalyLabel, Generation, ModelKey, ModelRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A feature row plus its anomaly annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<R> {
    #[serde(flatten)]
    pub record: R,
    /// Decision value; higher is more normal, negative is anomalous
    #[serde(rename = "anomaly_scores")]
    pub anomaly_score: f64,
    pub anomaly: AnomalyLabel,
}

pub struct Scorer {
    registry: Arc<ModelRegistry>,
}

impl Scorer {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Score against the currently visible generation.
    pub fn score<R: FeatureRow>(&self, rows: Vec<R>) -> Result<Vec<Scored<R>>> {
        let generation = self.registry.snapshot();
        score_with(&generation, rows)
    }
}

/// Score `rows` with the models of `generation`.
///
/// Rows are grouped by (fleet, user) in order of first appearance and each
/// group keeps its input order. Rows of a partition without a model are left
/// out of the result; callers must expect fewer rows back than they passed in.
pub fn score_with<R: FeatureRow>(generation: &Generation, rows: Vec<R>) -> Result<Vec<Scored<R>>> {
    let mut order: Vec<(i64, i64)> = Vec::new();
    let mut groups: HashMap<(i64, i64), Vec<R>> = HashMap::new();
    for row in rows {
        let key = (row.fleet_id(), row.user_id());
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    let mut out = Vec::new();
    let mut unmodeled = 0usize;
    for key @ (fleet_id, user_id) in order {
        let Some(group) = groups.remove(&key) else {
            continue;
        };
        let Some(model) = generation.get(&ModelKey::new(R::FEATURE_SET, fleet_id, user_id)) else {
            unmodeled += 1;
            continue;
        };
        let points: Vec<[f64; 2]> = group.iter().map(FeatureRow::features).collect();
        let decisions = model.decision_function(matrix(&points).view())?;
        out.extend(group.into_iter().zip(decisions).map(|(record, d)| Scored {
            record,
            anomaly_score: d,
            anomaly: AnomalyLabel::from_decision(d),
        }));
    }

    if unmodeled > 0 {
        let feature_set = R::FEATURE_SET;
        tracing::debug!(
            %feature_set,
            generation = generation.id,
            unmodeled,
            "partitions without a model left out of scores"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;
    use crate::features::{ChargeRecord, MonthlyRecord};
    use crate::model::Trainer;

    fn rec(user: i64, month: u32, cost: f64, kwh: f64) -> MonthlyRecord {
        MonthlyRecord {
            user_id: user,
            fleet_id: 7,
            month: format!("2024-{:02}", month),
            monthly_cost: cost,
            monthly_kwh: kwh,
            price_per_kwh: Some(cost / kwh),
        }
    }

    fn registry_for(rows: &[MonthlyRecord]) -> Arc<ModelRegistry> {
        let registry = Arc::new(ModelRegistry::new());
        registry.swap(Trainer::new(ForestConfig::default()).train(rows));
        registry
    }

    #[test]
    fn scenario_single_month() {
        let rows = vec![rec(3, 1, 120.0, 60.0)];
        let scorer = Scorer::new(registry_for(&rows));
        let scored = scorer.score(rows).unwrap();
        assert_eq!(scored.len(), 1);
        assert!(scored[0].anomaly_score.is_finite());
        assert!(matches!(scored[0].anomaly, AnomalyLabel::Normal | AnomalyLabel::Anomalous));
    }

    #[test]
    fn unmodeled_users_are_skipped() {
        let trained: Vec<_> = (1..=6).map(|m| rec(3, m, 100.0 + m as f64, 50.0)).collect();
        let scorer = Scorer::new(registry_for(&trained));

        let mut rows = vec![rec(4, 1, 10.0, 5.0)];
        rows.extend(trained.clone());
        rows.push(rec(4, 2, 11.0, 5.0));
        let scored = scorer.score(rows).unwrap();
        assert_eq!(scored.len(), 6);
        assert!(scored.iter().all(|s| s.record.user_id == 3));
        let months: Vec<_> = scored.iter().map(|s| s.record.month.as_str()).collect();
        assert_eq!(months, ["2024-01", "2024-02", "2024-03", "2024-04", "2024-05", "2024-06"]);
    }

    #[test]
    fn empty_registry_scores_nothing() {
        let scorer = Scorer::new(Arc::new(ModelRegistry::new()));
        assert!(scorer.score(vec![rec(3, 1, 1.0, 1.0)]).unwrap().is_empty());
    }

    #[test]
    fn feature_sets_do_not_share_models() {
        let rows = vec![rec(3, 1, 120.0, 60.0)];
        let scorer = Scorer::new(registry_for(&rows));
        let charge = ChargeRecord {
            user_id: 3,
            fleet_id: 7,
            month: Some("2024-01".into()),
            price: 10.0,
            charge_added: 5.0,
            started_charging_at: None,
            finished_charging_at: None,
            charging_time: None,
        };
        assert!(scorer.score(vec![charge]).unwrap().is_empty());
    }

    #[test]
    fn serializes_flat() {
        let s = Scored {
            record: rec(3, 1, 120.0, 60.0),
            anomaly_score: 0.1,
            anomaly: AnomalyLabel::Normal,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["user_id"], 3);
        assert_eq!(v["anomaly_scores"], 0.1);
        assert_eq!(v["anomaly"], 1);
    }
}
