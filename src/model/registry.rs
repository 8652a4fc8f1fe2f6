//! Process-wide registry of trained models.
//!
//! Readers load the current [`Generation`] once per operation and keep that
//! `Arc` for the whole operation. A refresh builds a complete new map off to
//! the side and publishes it with a single atomic pointer store, so a reader
//! never sees a mix of two generations.

use super::forest::IsolationForest;
use crate::features::FeatureSet;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Partition a model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub feature_set: FeatureSet,
    pub fleet_id: i64,
    pub user_id: i64,
}

impl ModelKey {
    pub fn new(feature_set: FeatureSet, fleet_id: i64, user_id: i64) -> Self {
        Self {
            feature_set,
            fleet_id,
            user_id,
        }
    }
}

pub type ModelMap = HashMap<ModelKey, Arc<IsolationForest>>;

/// One complete, immutable set of models from a single refresh.
#[derive(Debug)]
pub struct Generation {
    /// 0 for the empty generation present before the first refresh
    pub id: u64,
    pub built_at: Option<DateTime<Utc>>,
    models: ModelMap,
}

impl Generation {
    pub fn empty() -> Self {
        Self {
            id: 0,
            built_at: None,
            models: ModelMap::new(),
        }
    }

    pub fn get(&self, key: &ModelKey) -> Option<&Arc<IsolationForest>> {
        self.models.get(key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn count(&self, feature_set: FeatureSet) -> usize {
        self.models.keys().filter(|k| k.feature_set == feature_set).count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ModelKey> {
        self.models.keys()
    }
}

/// Summary of the visible generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatus {
    pub generation: u64,
    pub built_at: Option<DateTime<Utc>>,
    pub monthly_models: usize,
    pub per_charge_models: usize,
}

pub struct ModelRegistry {
    current: ArcSwap<Generation>,
    next_id: AtomicU64,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Generation::empty()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The currently visible generation.
    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn lookup(&self, key: &ModelKey) -> Option<Arc<IsolationForest>> {
        self.current.load().get(key).cloned()
    }

    /// Publish `models` as the new generation, replacing the old one whole.
    /// Returns the new generation id.
    pub fn swap(&self, models: ModelMap) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let generation = Generation {
            id,
            built_at: Some(Utc::now()),
            models,
        };
        self.current.store(Arc::new(generation));
        id
    }

    pub fn status(&self) -> RegistryStatus {
        let g = self.current.load();
        RegistryStatus {
            generation: g.id,
            built_at: g.built_at,
            monthly_models: g.count(FeatureSet::Monthly),
            per_charge_models: g.count(FeatureSet::PerCharge),
        }
    }
}
