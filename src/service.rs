//! The operations exposed to the HTTP layer.

use crate::config::ServiceConfig;
use crate::error::{AnomalyError, Result};
use crate::features::{is_valid_month, Aggregator, Scope};
use crate::model::{ModelRegistry, RegistryStatus, Trainer};
use crate::refresh::{RefreshReport, Refresher};
use crate::scoring::{ChargeAnomaly, MonthlyAnomaly, Scorer};
use crate::source::{ChargeSource, Fleet, SqliteSource};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct AnomalyService {
    source: Arc<dyn ChargeSource>,
    aggregator: Arc<Aggregator>,
    registry: Arc<ModelRegistry>,
    refresher: Arc<Refresher>,
    scorer: Scorer,
    config: ServiceConfig,
}

fn check_month(month: &str) -> Result<()> {
    if is_valid_month(month) {
        Ok(())
    } else {
        Err(AnomalyError::InvalidMonth(month.to_string()))
    }
}

impl AnomalyService {
    /// Wire the components around `source`. The registry starts empty.
    pub fn new(source: Arc<dyn ChargeSource>, config: ServiceConfig) -> Self {
        let aggregator = Arc::new(Aggregator::new(source.clone(), config.aggregator()));
        let registry = Arc::new(ModelRegistry::new());
        let refresher = Arc::new(Refresher::new(
            aggregator.clone(),
            Trainer::new(config.forest.clone()),
            registry.clone(),
        ));
        Self {
            source,
            aggregator,
            scorer: Scorer::new(registry.clone()),
            registry,
            refresher,
            config,
        }
    }

    /// Open the configured database and train the first generation. Any
    /// failure here is fatal: the service never serves from an untrained
    /// registry because the source was unreachable.
    pub fn start(config: ServiceConfig) -> Result<Self> {
        let source = SqliteSource::open(&config.database_path)?;
        let service = Self::new(Arc::new(source), config);
        service.refresh().map_err(|e| {
            error!(error = %e, "initial model training failed");
            AnomalyError::Config(format!("initial model training failed: {}", e))
        })?;
        info!(database = %service.config.database_path.display(), "anomaly service ready");
        Ok(service)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Handle for the periodic refresh thread.
    pub fn refresher(&self) -> Arc<Refresher> {
        self.refresher.clone()
    }

    pub fn refresh(&self) -> Result<RefreshReport> {
        self.refresher.refresh()
    }

    /// Monthly anomalies of every modeled user of `fleet_id` in `month`.
    pub fn score_fleet_month(&self, fleet_id: i64, month: &str) -> Result<Vec<MonthlyAnomaly>> {
        check_month(month)?;
        let table = self.aggregator.monthly(&Scope::Fleet(fleet_id))?;
        if table.is_empty() {
            return Err(AnomalyError::NotFound(format!(
                "no data found for fleet {}",
                fleet_id
            )));
        }

        let in_month: Vec<_> = table.into_iter().filter(|r| r.month == month).collect();
        let scored = self.scorer.score(in_month)?;
        if scored.is_empty() {
            return Err(AnomalyError::NotFound(format!(
                "no anomaly data found for month {}",
                month
            )));
        }
        debug!(fleet_id, month, rows = scored.len(), "fleet month scored");
        Ok(scored.into_iter().map(MonthlyAnomaly::from).collect())
    }

    /// Per-charge anomalies of one user in one month. A user without a model
    /// yields an empty list rather than an error.
    pub fn score_user_month(
        &self,
        fleet_id: i64,
        user_id: i64,
        month: &str,
    ) -> Result<Vec<ChargeAnomaly>> {
        check_month(month)?;
        let scope = Scope::UserMonth {
            fleet_id,
            user_id,
            month: month.to_string(),
        };
        let table = self.aggregator.per_charge(&scope)?;
        if table.is_empty() {
            return Err(AnomalyError::NotFound(format!(
                "no data found for user {} in fleet {} for month {}",
                user_id, fleet_id, month
            )));
        }
        let scored = self.scorer.score(table)?;
        debug!(fleet_id, user_id, month, rows = scored.len(), "user month scored");
        Ok(scored.into_iter().map(ChargeAnomaly::from).collect())
    }

    pub fn fleets(&self) -> Result<Vec<Fleet>> {
        self.source.fleets()
    }

    pub fn registry_status(&self) -> RegistryStatus {
        self.registry.status()
    }
}
