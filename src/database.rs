//! Local SQLite metric store
//!
//! Holds daily wearable rows and athlete baselines so the CLI can evaluate alerts
//! without re-importing files. Rows are keyed by athlete and calendar day; importing
//! the same day twice replaces the earlier row.

use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, ToSql};
use std::path::Path;
use tracing::{debug, info};

use crate::baseline::{BaselineCalculator, BaselineTable};
use crate::models::{AthleteId, BaselineHorizon, BaselineStat, DailyMetricRow, MetricKind};

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Database busy: {0}")]
    Busy(String),
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                DatabaseError::Busy(err.to_string())
            }
            _ => DatabaseError::Sqlite(err),
        }
    }
}

/// SQLite-backed store of daily metric rows and baselines
pub struct MetricStore {
    conn: Connection,
}

impl MetricStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path.as_ref())?;

        // WAL lets the CLI read while an import is running
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn };
        store.init_schema()?;

        info!(path = %db_path.as_ref().display(), "Opened metric store");
        Ok(store)
    }

    /// Create a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn metric_columns() -> Vec<&'static str> {
        MetricKind::ALL.iter().map(|m| m.column_name()).collect()
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let metric_defs: Vec<String> = Self::metric_columns()
            .into_iter()
            .map(|column| format!("{} REAL", column))
            .collect();

        self.conn.execute(
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS daily_metrics (
                    athlete_id INTEGER NOT NULL,
                    recorded_on DATE NOT NULL,
                    {},
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (athlete_id, recorded_on)
                )
                "#,
                metric_defs.join(",\n                    ")
            ),
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS athlete_baselines (
                athlete_id INTEGER NOT NULL,
                metric TEXT NOT NULL,
                horizon TEXT NOT NULL,
                mean REAL NOT NULL,
                std_dev REAL NOT NULL,
                computed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (athlete_id, metric, horizon)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_daily_metrics_date ON daily_metrics (recorded_on)",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace daily rows, returning how many were written
    pub fn upsert_rows(&mut self, rows: &[DailyMetricRow]) -> Result<usize, DatabaseError> {
        let columns = Self::metric_columns();
        let placeholders: Vec<String> = (3..columns.len() + 3).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO daily_metrics (athlete_id, recorded_on, {}, updated_at) \
             VALUES (?1, ?2, {}, CURRENT_TIMESTAMP)",
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let values: Vec<Option<f64>> = MetricKind::ALL.iter().map(|m| row.value(*m)).collect();
                let mut bound: Vec<&dyn ToSql> = vec![&row.athlete_id as &dyn ToSql, &row.date as &dyn ToSql];
                bound.extend(values.iter().map(|v| v as &dyn ToSql));
                written += stmt.execute(bound.as_slice())?;
            }
        }
        tx.commit()?;

        debug!(rows = rows.len(), written, "Upserted daily metric rows");
        Ok(written)
    }

    /// Load rows ordered by athlete and date, optionally only from `since` onwards
    pub fn load_rows(&self, since: Option<NaiveDate>) -> Result<Vec<DailyMetricRow>, DatabaseError> {
        let sql = format!(
            "SELECT athlete_id, recorded_on, {} FROM daily_metrics \
             WHERE ?1 IS NULL OR recorded_on >= ?1 \
             ORDER BY athlete_id, recorded_on",
            Self::metric_columns().join(", ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![since], |sql_row| {
                let mut row = DailyMetricRow::new(sql_row.get(0)?, sql_row.get(1)?);
                for (offset, metric) in MetricKind::ALL.iter().enumerate() {
                    row.set_value(*metric, sql_row.get(offset + 2)?);
                }
                Ok(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Distinct athletes with at least one stored row
    pub fn athlete_ids(&self) -> Result<Vec<AthleteId>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT athlete_id FROM daily_metrics ORDER BY athlete_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<AthleteId>, _>>()?;
        Ok(ids)
    }

    /// Replace every stored baseline with the contents of `table`
    pub fn store_baselines(&mut self, table: &BaselineTable) -> Result<usize, DatabaseError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM athlete_baselines", [])?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO athlete_baselines (athlete_id, metric, horizon, mean, std_dev) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (athlete_id, metric, horizon, stat) in table.entries() {
                written += stmt.execute(params![
                    athlete_id,
                    metric.column_name(),
                    horizon.column_prefix(),
                    stat.mean,
                    stat.std_dev,
                ])?;
            }
        }
        tx.commit()?;

        info!(entries = written, athletes = table.len(), "Stored baselines");
        Ok(written)
    }

    /// Load every stored baseline
    pub fn load_baselines(&self) -> Result<BaselineTable, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT athlete_id, metric, horizon, mean, std_dev FROM athlete_baselines")?;

        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, AthleteId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = BaselineTable::new();
        for (athlete_id, metric, horizon, mean, std_dev) in raw {
            let metric: MetricKind = metric.parse().map_err(DatabaseError::InvalidData)?;
            let horizon: BaselineHorizon = horizon.parse().map_err(DatabaseError::InvalidData)?;
            table.insert(athlete_id, metric, horizon, BaselineStat::new(mean, std_dev));
        }

        Ok(table)
    }

    /// Recompute baselines from every stored row and replace the stored set
    pub fn refresh_baselines(
        &mut self,
        today: NaiveDate,
        calculator: &BaselineCalculator,
    ) -> Result<usize, DatabaseError> {
        let rows = self.load_rows(None)?;
        let samples: Vec<_> = rows.iter().flat_map(|row| row.samples()).collect();
        let table = calculator.calculate(&samples, today);
        self.store_baselines(&table)
    }
}
