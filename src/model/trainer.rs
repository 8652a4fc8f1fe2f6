//! Fits one forest per (fleet, user) partition of a feature table.

use super::forest::{matrix, IsolationForest};
use super::registry::{ModelKey, ModelMap};
use crate::config::ForestConfig;
use crate::features::FeatureRow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Split rows into (fleet, user) partitions, keeping row order within each.
pub fn partition<R: FeatureRow>(rows: &[R]) -> BTreeMap<(i64, i64), Vec<[f64; 2]>> {
    let mut parts: BTreeMap<(i64, i64), Vec<[f64; 2]>> = BTreeMap::new();
    for row in rows {
        parts
            .entry((row.fleet_id(), row.user_id()))
            .or_default()
            .push(row.features());
    }
    parts
}

pub struct Trainer {
    config: ForestConfig,
}

impl Trainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    /// Train every partition present in `rows`. Each model sees only its own
    /// partition's rows; partitions without rows produce no entry.
    pub fn train<R: FeatureRow>(&self, rows: &[R]) -> ModelMap {
        let feature_set = R::FEATURE_SET;
        let parts = partition(rows);
        let mut models = ModelMap::with_capacity(parts.len());

        for ((fleet_id, user_id), points) in parts {
            let data = matrix(&points);
            match IsolationForest::fit(data.view(), &self.config) {
                Ok(forest) => {
                    models.insert(ModelKey::new(feature_set, fleet_id, user_id), Arc::new(forest));
                }
                Err(e) => {
                    tracing::warn!(%feature_set, fleet_id, user_id, error = %e, "partition not trained");
                }
            }
        }

        tracing::debug!(
            %feature_set,
            columns = ?feature_set.columns(),
            rows = rows.len(),
            models = models.len(),
            "training pass done"
        );
        models
    }
}
