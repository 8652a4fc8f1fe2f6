//! SQLite-backed charge history: users → cars → brands → car_fleet → fleets → charges.

use super::{ChargeFilter, ChargeRow, ChargeSource, Fleet};
use crate::error::{AnomalyError, Result};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS fleets (
        id INTEGER PRIMARY KEY,
        country TEXT,
        city TEXT
    );
    CREATE TABLE IF NOT EXISTS brands (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        currency_code TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS cars (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        brand_id INTEGER NOT NULL REFERENCES brands(id)
    );
    CREATE TABLE IF NOT EXISTS car_fleet (
        car_id INTEGER NOT NULL REFERENCES cars(id),
        fleet_id INTEGER NOT NULL REFERENCES fleets(id),
        PRIMARY KEY (car_id, fleet_id)
    );
    CREATE TABLE IF NOT EXISTS charges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        car_id INTEGER NOT NULL REFERENCES cars(id),
        price REAL,
        charge_added REAL,
        started_charging_at TEXT,
        finished_charging_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_charges_car ON charges(car_id);
"#;

const CHARGES_QUERY: &str = r#"
    SELECT
        u.id, f.id, strftime('%Y-%m', c.finished_charging_at),
        c.price, c.charge_added,
        c.started_charging_at, c.finished_charging_at
    FROM users AS u
        JOIN cars AS ca ON u.id = ca.user_id
        JOIN brands AS b ON ca.brand_id = b.id
        JOIN car_fleet AS cf ON ca.id = cf.car_id
        JOIN fleets AS f ON cf.fleet_id = f.id
        JOIN charges AS c ON ca.id = c.car_id
    WHERE u.currency_code = ?1
        AND b.name != ?2
        AND (?3 IS NULL OR f.id = ?3)
        AND (?4 IS NULL OR u.id = ?4)
        AND (?5 IS NULL OR strftime('%Y-%m', c.finished_charging_at) = ?5)
    ORDER BY c.id, f.id
"#;

/// Read a stored timestamp. Fractional seconds are optional; an RFC 3339
/// offset is folded into UTC the same way SQLite's date functions do it.
fn parse_ts(raw: Option<String>) -> Option<NaiveDateTime> {
    let raw = raw?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|t| t.naive_utc()))
        .map_err(|e| tracing::debug!(value = %raw, error = %e, "unparseable charge timestamp"))
        .ok()
}

fn format_ts(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format(TS_FORMAT).to_string())
}

pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open an existing database read-only. A missing or unreadable file is a
    /// startup configuration error.
    pub fn open(path: &Path) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            AnomalyError::Config(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open or create a writable database with the schema in place.
    pub fn create(path: &Path) -> Result<Self> {
        let source = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        source.init_schema()?;
        Ok(source)
    }

    pub fn open_in_memory() -> Result<Self> {
        let source = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        source.init_schema()?;
        Ok(source)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself intact.
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Create the tables when missing.
    pub fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert_fleet(&self, id: i64, country: Option<&str>, city: Option<&str>) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO fleets (id, country, city) VALUES (?1, ?2, ?3)",
            params![id, country, city],
        )?;
        Ok(())
    }

    pub fn insert_brand(&self, id: i64, name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO brands (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    }

    pub fn insert_user(&self, id: i64, currency_code: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO users (id, currency_code) VALUES (?1, ?2)",
            params![id, currency_code],
        )?;
        Ok(())
    }

    pub fn insert_car(&self, id: i64, user_id: i64, brand_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO cars (id, user_id, brand_id) VALUES (?1, ?2, ?3)",
            params![id, user_id, brand_id],
        )?;
        Ok(())
    }

    /// Put a car in a fleet.
    pub fn attach_car(&self, car_id: i64, fleet_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO car_fleet (car_id, fleet_id) VALUES (?1, ?2)",
            params![car_id, fleet_id],
        )?;
        Ok(())
    }

    /// Record one charge; returns its row id.
    pub fn insert_charge(
        &self,
        car_id: i64,
        price: Option<f64>,
        charge_added: Option<f64>,
        started_charging_at: Option<NaiveDateTime>,
        finished_charging_at: Option<NaiveDateTime>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO charges (car_id, price, charge_added, started_charging_at, finished_charging_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                car_id,
                price,
                charge_added,
                format_ts(started_charging_at),
                format_ts(finished_charging_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl ChargeSource for SqliteSource {
    fn charges(&self, filter: &ChargeFilter) -> Result<Vec<ChargeRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(CHARGES_QUERY)?;
        let rows = stmt.query_map(
            params![
                filter.currency_code,
                filter.excluded_brand,
                filter.fleet_id,
                filter.user_id,
                filter.month
            ],
            |row| {
                Ok(ChargeRow {
                    user_id: row.get(0)?,
                    fleet_id: row.get(1)?,
                    month: row.get(2)?,
                    price: row.get(3)?,
                    charge_added: row.get(4)?,
                    started_charging_at: parse_ts(row.get(5)?),
                    finished_charging_at: parse_ts(row.get(6)?),
                })
            },
        )?;
        let out = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!(
            fleet_id = ?filter.fleet_id,
            user_id = ?filter.user_id,
            month = ?filter.month,
            rows = out.len(),
            "charge query"
        );
        Ok(out)
    }

    fn fleets(&self) -> Result<Vec<Fleet>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT id, country, city FROM fleets ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Fleet {
                id: row.get(0)?,
                country: row.get(1)?,
                city: row.get(2)?,
            })
        })?;
        let out = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(out)
    }
}
