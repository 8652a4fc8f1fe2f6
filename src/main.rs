//! charge-anomaly entrypoint: trains every partition at startup, then either
//! answers one query (rows printed as NDJSON on stdout) or serves.
//!
//! `serve` with `refresh_interval_secs > 0` keeps the models fresh until
//! Ctrl+C. With the default interval of 0 it prints the registry status of the
//! startup generation and exits.
//!
//! Usage:
//!   charge-anomaly [serve]
//!   charge-anomaly fleets | status
//!   charge-anomaly fleet <fleet_id> <YYYY-MM>
//!   charge-anomaly user <fleet_id> <user_id> <YYYY-MM>

use charge_anomaly::{
    config::ServiceConfig,
    logging::StructuredLogger,
    refresh::spawn_periodic,
    service::AnomalyService,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn arg<T: std::str::FromStr>(args: &[String], i: usize, name: &str) -> Result<T, BoxError> {
    let raw = args.get(i).ok_or_else(|| format!("missing argument <{}>", name))?;
    raw.parse::<T>()
        .map_err(|_| format!("invalid <{}>: {}", name, raw).into())
}

fn serve(service: AnomalyService) -> Result<(), BoxError> {
    let interval_secs = service.config().refresh_interval_secs;
    if interval_secs == 0 {
        info!("periodic refresh disabled; reporting the startup generation");
        StructuredLogger::emit_json(&[service.registry_status()], &mut std::io::stdout().lock())?;
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "could not install Ctrl+C handler");
    }
    info!(interval_secs, "refreshing periodically (Ctrl+C to stop)");
    let handle = spawn_periodic(
        service.refresher(),
        Duration::from_secs(interval_secs),
        stop,
    )?;
    handle
        .join()
        .map_err(|_| "refresh thread panicked".to_string())?;
    info!("charge-anomaly stopping");
    Ok(())
}

fn main() -> Result<(), BoxError> {
    let config_path = std::env::var("CHARGE_ANOMALY_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let (config, config_error) = match ServiceConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (ServiceConfig::default().with_env_overrides(), Some(e)),
    };

    StructuredLogger::init(&config.log);
    if let Some(e) = config_error {
        warn!(path = %config_path.display(), error = %e, "using default config");
    }
    info!(database = %config.database_path.display(), "charge-anomaly starting");

    let service = AnomalyService::start(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut out = std::io::stdout().lock();
    let command = args.first().map(String::as_str).unwrap_or("serve");
    let result = match command {
        "serve" => return serve(service),
        "fleets" => service
            .fleets()
            .map_err(BoxError::from)
            .and_then(|rows| Ok(StructuredLogger::emit_json(&rows, &mut out)?)),
        "status" => Ok(StructuredLogger::emit_json(&[service.registry_status()], &mut out)?),
        "fleet" => {
            let fleet_id: i64 = arg(&args, 1, "fleet_id")?;
            let month: String = arg(&args, 2, "month")?;
            service
                .score_fleet_month(fleet_id, &month)
                .map_err(BoxError::from)
                .and_then(|rows| Ok(StructuredLogger::emit_json(&rows, &mut out)?))
        }
        "user" => {
            let fleet_id: i64 = arg(&args, 1, "fleet_id")?;
            let user_id: i64 = arg(&args, 2, "user_id")?;
            let month: String = arg(&args, 3, "month")?;
            service
                .score_user_month(fleet_id, user_id, &month)
                .map_err(BoxError::from)
                .and_then(|rows| Ok(StructuredLogger::emit_json(&rows, &mut out)?))
        }
        other => Err(format!("unknown command {:?}", other).into()),
    };

    match result {
        Ok(rows) => {
            info!(command, rows, "done");
            Ok(())
        }
        Err(e) => {
            warn!(command, error = %e, "request failed");
            Err(e)
        }
    }
}
