//! Pipeline benchmark: aggregation, full refresh, and request-time scoring.

use charge_anomaly::config::ServiceConfig;
use charge_anomaly::features::{Aggregator, Scope};
use charge_anomaly::service::AnomalyService;
use charge_anomaly::source::SqliteSource;
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn make_fleet(users: i64, months: u32) -> SqliteSource {
    let s = SqliteSource::open_in_memory().unwrap();
    s.insert_fleet(1, Some("NL"), Some("Delft")).unwrap();
    s.insert_brand(1, "tesla").unwrap();
    for user in 0..users {
        s.insert_user(user, "EUR").unwrap();
        s.insert_car(user, user, 1).unwrap();
        s.attach_car(user, 1).unwrap();
        for month in 1..=months {
            for day in [3, 11, 19, 27] {
                let at = NaiveDate::from_ymd_opt(2024, month, day)
                    .and_then(|d| d.and_hms_opt(7, 30, 0));
                let kwh = 20.0 + ((user as u32 + day) % 9) as f64;
                s.insert_charge(user, Some(kwh * 0.35), Some(kwh), at, at).unwrap();
            }
        }
    }
    s
}

fn bench_aggregation(c: &mut Criterion) {
    let aggregator = Aggregator::new(Arc::new(make_fleet(20, 12)), Default::default());

    c.bench_function("aggregate_monthly_all", |b| {
        b.iter(|| black_box(aggregator.monthly(&Scope::All)).unwrap())
    });
    c.bench_function("aggregate_per_charge_all", |b| {
        b.iter(|| black_box(aggregator.per_charge(&Scope::All)).unwrap())
    });
}

fn bench_refresh(c: &mut Criterion) {
    let service = AnomalyService::new(Arc::new(make_fleet(20, 12)), ServiceConfig::default());

    let mut g = c.benchmark_group("refresh");
    g.sample_size(10);
    g.bench_function("refresh_20_users_12_months", |b| {
        b.iter(|| black_box(service.refresh()).unwrap())
    });
    g.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let service = AnomalyService::new(Arc::new(make_fleet(20, 12)), ServiceConfig::default());
    service.refresh().unwrap();

    c.bench_function("score_fleet_month", |b| {
        b.iter(|| black_box(service.score_fleet_month(1, "2024-06")).unwrap())
    });
    c.bench_function("score_user_month", |b| {
        b.iter(|| black_box(service.score_user_month(1, 4, "2024-06")).unwrap())
    });
}

criterion_group!(benches, bench_aggregation, bench_refresh, bench_scoring);
criterion_main!(benches);
