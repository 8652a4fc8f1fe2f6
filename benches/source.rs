//! Charge history benchmark: filtered queries against SQLite.

use charge_anomaly::source::{ChargeFilter, ChargeSource, SqliteSource};
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn seeded(path: &std::path::Path) -> SqliteSource {
    let s = SqliteSource::create(path).unwrap();
    s.insert_fleet(1, None, None).unwrap();
    s.insert_brand(1, "tesla").unwrap();
    for user in 0..20 {
        s.insert_user(user, "EUR").unwrap();
        s.insert_car(user, user, 1).unwrap();
        s.attach_car(user, 1).unwrap();
        for day in 1..=28 {
            let at = NaiveDate::from_ymd_opt(2024, 1, day).and_then(|d| d.and_hms_opt(9, 0, 0));
            s.insert_charge(user, Some(day as f64), Some(day as f64 / 2.0), at, at)
                .unwrap();
        }
    }
    s
}

fn bench_queries(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let source = seeded(&dir.path().join("charges.db"));
    let all = ChargeFilter {
        currency_code: "EUR".into(),
        excluded_brand: "skoda".into(),
        ..Default::default()
    };
    let user_month = ChargeFilter {
        fleet_id: Some(1),
        user_id: Some(3),
        month: Some("2024-01".into()),
        ..all.clone()
    };

    c.bench_function("source_all_charges", |b| {
        b.iter(|| black_box(source.charges(&all)).unwrap())
    });
    c.bench_function("source_user_month", |b| {
        b.iter(|| black_box(source.charges(&user_month)).unwrap())
    });
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
