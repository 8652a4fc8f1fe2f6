//! Model refresh: aggregate both feature sets, train, publish one generation.

use crate::error::Result;
use crate::features::{Aggregator, Scope};
use crate::model::{ModelRegistry, Trainer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub generation: u64,
    pub monthly_rows: usize,
    pub charge_rows: usize,
    pub monthly_models: usize,
    pub per_charge_models: usize,
    pub elapsed_ms: u64,
}

pub struct Refresher {
    aggregator: Arc<Aggregator>,
    trainer: Trainer,
    registry: Arc<ModelRegistry>,
    running: Mutex<()>,
}

impl Refresher {
    pub fn new(aggregator: Arc<Aggregator>, trainer: Trainer, registry: Arc<ModelRegistry>) -> Self {
        Self {
            aggregator,
            trainer,
            registry,
            running: Mutex::new(()),
        }
    }

    /// Retrain every partition from the full history and swap the result in.
    ///
    /// An empty feature set contributes no models, so its previous models are
    /// dropped with the old generation. A source error leaves the visible
    /// generation untouched.
    pub fn refresh(&self) -> Result<RefreshReport> {
        let _running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        let started = Instant::now();
        info!("updating anomaly models");

        let monthly = self.aggregator.monthly(&Scope::All)?;
        let charges = self.aggregator.per_charge(&Scope::All)?;
        if monthly.is_empty() {
            warn!("no monthly data; monthly models cleared");
        }
        if charges.is_empty() {
            warn!("no charge data; per-charge models cleared");
        }

        let mut models = self.trainer.train(&monthly);
        let monthly_models = models.len();
        let per_charge = self.trainer.train(&charges);
        let per_charge_models = per_charge.len();
        models.extend(per_charge);

        let generation = self.registry.swap(models);
        let report = RefreshReport {
            generation,
            monthly_rows: monthly.len(),
            charge_rows: charges.len(),
            monthly_models,
            per_charge_models,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            generation,
            monthly_rows = report.monthly_rows,
            charge_rows = report.charge_rows,
            monthly_models,
            per_charge_models,
            elapsed_ms = report.elapsed_ms,
            "anomaly models updated"
        );
        Ok(report)
    }
}

/// Refresh every `interval` on a background thread until `stop` is set.
/// A failed refresh is logged and the previous generation stays visible.
pub fn spawn_periodic(
    refresher: Arc<Refresher>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let step = interval.min(Duration::from_secs(1)).max(Duration::from_millis(1));
    std::thread::Builder::new()
        .name("model-refresh".into())
        .spawn(move || {
            let mut cycle: u64 = 0;
            loop {
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if stop.load(Ordering::Relaxed) {
                        info!(cycles = cycle, "periodic refresh stopped");
                        return;
                    }
                    std::thread::sleep(step);
                    waited += step;
                }
                if stop.load(Ordering::Relaxed) {
                    info!(cycles = cycle, "periodic refresh stopped");
                    return;
                }
                cycle += 1;
                if let Err(e) = refresher.refresh() {
                    warn!(cycle, error = %e, "periodic refresh failed; keeping previous models");
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregatorConfig, ForestConfig};
    use crate::error::AnomalyError;
    use crate::source::{ChargeFilter, ChargeRow, ChargeSource, Fleet};
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    /// Serves a fixed set of rows, or fails when `broken` is set.
    struct FixedSource {
        rows: Mutex<Vec<ChargeRow>>,
        broken: AtomicBool,
        queries: AtomicUsize,
    }

    impl ChargeSource for FixedSource {
        fn charges(&self, _filter: &ChargeFilter) -> Result<Vec<ChargeRow>> {
            self.queries.fetch_add(1, Ordering::Relaxed);
            if self.broken.load(Ordering::Relaxed) {
                return Err(AnomalyError::Source(rusqlite::Error::InvalidQuery));
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        fn fleets(&self) -> Result<Vec<Fleet>> {
            Ok(Vec::new())
        }
    }

    fn charge(user: i64, day: u32, price: f64) -> ChargeRow {
        let at = NaiveDate::from_ymd_opt(2024, 1, day).and_then(|d| d.and_hms_opt(10, 0, 0));
        ChargeRow {
            user_id: user,
            fleet_id: 1,
            month: Some("2024-01".into()),
            price: Some(price),
            charge_added: Some(price / 2.0),
            started_charging_at: at,
            finished_charging_at: at,
        }
    }

    fn setup(rows: Vec<ChargeRow>) -> (Arc<FixedSource>, Arc<ModelRegistry>, Arc<Refresher>) {
        let source = Arc::new(FixedSource {
            rows: Mutex::new(rows),
            broken: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        });
        let aggregator = Arc::new(Aggregator::new(source.clone(), AggregatorConfig::default()));
        let registry = Arc::new(ModelRegistry::new());
        let trainer = Trainer::new(ForestConfig {
            n_estimators: 10,
            ..Default::default()
        });
        let refresher = Arc::new(Refresher::new(aggregator, trainer, registry.clone()));
        (source, registry, refresher)
    }

    #[test]
    fn trains_both_feature_sets() {
        let (_, registry, refresher) = setup(vec![charge(1, 1, 10.0), charge(1, 2, 12.0), charge(2, 3, 8.0)]);
        let report = refresher.refresh().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.monthly_models, 2);
        assert_eq!(report.per_charge_models, 2);
        assert_eq!(registry.snapshot().len(), 4);
    }

    #[test]
    fn empty_source_clears_models() {
        let (source, registry, refresher) = setup(vec![charge(1, 1, 10.0)]);
        refresher.refresh().unwrap();
        assert_eq!(registry.snapshot().len(), 2);
        source.rows.lock().unwrap().clear();
        let report = refresher.refresh().unwrap();
        assert_eq!(report.generation, 2);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn failed_refresh_keeps_previous_generation() {
        let (source, registry, refresher) = setup(vec![charge(1, 1, 10.0)]);
        refresher.refresh().unwrap();
        source.broken.store(true, Ordering::Relaxed);
        assert!(refresher.refresh().is_err());
        let g = registry.snapshot();
        assert_eq!(g.id, 1);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn periodic_refresh_runs_until_stopped() {
        let (source, registry, refresher) = setup(vec![charge(1, 1, 10.0)]);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_periodic(refresher, Duration::from_millis(5), stop.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while registry.snapshot().id < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(registry.snapshot().id >= 2);
        assert!(source.queries.load(Ordering::Relaxed) >= 4);
    }
}
