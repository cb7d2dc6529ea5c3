//! DuckDB-backed persistence layer for Bubbles.

use bubbles_core::{PersistenceBatch, WorldPersistence};
use duckdb::{Connection, OptionalExt, Transaction, params};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_SAMPLE_BUFFER: usize = 16;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Summary row written to the `market_samples` table.
#[derive(Debug, Clone)]
struct MarketRow {
    tick: i64,
    econ_count: i64,
    dead_count: i64,
    avg_value: f64,
    deprecation_factor: f64,
    total_econ_cash: f64,
    avg_econ_cash: f64,
    player_food: f64,
    player_bubbles: i64,
    marketing_points: f64,
    last_trade_amount: Option<i64>,
    last_trade_price: Option<f64>,
}

/// Metric row written to the `metrics` table.
#[derive(Debug, Clone)]
struct MetricRow {
    tick: i64,
    name: String,
    value: f64,
}

/// Market checkpoint read back for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSample {
    pub tick: i64,
    pub econ_count: i64,
    pub dead_count: i64,
    pub avg_value: f64,
    pub deprecation_factor: f64,
    pub player_food: f64,
    pub last_trade_price: Option<f64>,
}

/// Latest metric reading fetched for reporting.
#[derive(Debug, Clone)]
pub struct MetricReading {
    pub tick: i64,
    pub name: String,
    pub value: f64,
}

#[derive(Default)]
struct StorageBuffer {
    samples: Vec<MarketRow>,
    metrics: Vec<MetricRow>,
}

impl StorageBuffer {
    fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.metrics.is_empty()
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.metrics.clear();
    }
}

/// DuckDB-backed persistence sink with buffered writes.
pub struct Storage {
    conn: Connection,
    buffer: StorageBuffer,
    sample_flush_threshold: usize,
}

#[allow(clippy::cast_possible_wrap)]
fn to_i64(value: u64) -> i64 {
    value as i64
}

impl Storage {
    /// Open or create a DuckDB database at the provided path with default buffering.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::with_threshold(path, DEFAULT_SAMPLE_BUFFER)
    }

    /// Open a database that flushes after `samples` buffered checkpoints.
    pub fn with_threshold(path: &str, samples: usize) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let mut storage = Self {
            conn,
            buffer: StorageBuffer::default(),
            sample_flush_threshold: samples.max(1),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "create table if not exists highscores (
                name text primary key,
                value double
            )",
            [],
        )?;
        self.conn.execute(
            "create table if not exists market_samples (
                tick bigint primary key,
                econ_count integer,
                dead_count integer,
                avg_value double,
                deprecation_factor double,
                total_econ_cash double,
                avg_econ_cash double,
                player_food double,
                player_bubbles bigint,
                marketing_points double,
                last_trade_amount bigint,
                last_trade_price double
            )",
            [],
        )?;
        self.conn.execute(
            "create table if not exists metrics (
                tick bigint,
                name text,
                value double,
                primary key (tick, name)
            )",
            [],
        )?;
        Ok(())
    }

    fn enqueue(&mut self, payload: &PersistenceBatch) {
        let summary = &payload.summary;
        let tick = to_i64(summary.tick.0);

        self.buffer.samples.push(MarketRow {
            tick,
            econ_count: to_i64(summary.econ_count as u64),
            dead_count: to_i64(summary.dead_count as u64),
            avg_value: summary.avg_value,
            deprecation_factor: summary.deprecation_factor,
            total_econ_cash: summary.total_econ_cash,
            avg_econ_cash: summary.avg_econ_cash,
            player_food: summary.player_food,
            player_bubbles: i64::from(summary.player_bubbles),
            marketing_points: summary.marketing_points,
            last_trade_amount: payload.last_trade.map(|t| i64::from(t.amount)),
            last_trade_price: payload.last_trade.map(|t| t.price),
        });

        for metric in &payload.metrics {
            self.buffer.metrics.push(MetricRow {
                tick,
                name: metric.name.to_string(),
                value: metric.value,
            });
        }
    }

    /// Persist a checkpoint, buffering until the threshold is met.
    pub fn persist(&mut self, payload: &PersistenceBatch) -> Result<(), StorageError> {
        self.enqueue(payload);
        if self.buffer.samples.len() >= self.sample_flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn insert_samples(tx: &Transaction<'_>, rows: &[MarketRow]) -> Result<(), duckdb::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt = tx.prepare(
            "insert or replace into market_samples (
                tick, econ_count, dead_count, avg_value, deprecation_factor,
                total_econ_cash, avg_econ_cash, player_food, player_bubbles,
                marketing_points, last_trade_amount, last_trade_price
            ) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.tick,
                row.econ_count,
                row.dead_count,
                row.avg_value,
                row.deprecation_factor,
                row.total_econ_cash,
                row.avg_econ_cash,
                row.player_food,
                row.player_bubbles,
                row.marketing_points,
                row.last_trade_amount,
                row.last_trade_price,
            ])?;
        }
        Ok(())
    }

    fn insert_metrics(tx: &Transaction<'_>, rows: &[MetricRow]) -> Result<(), duckdb::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt =
            tx.prepare("insert or replace into metrics (tick, name, value) values (?, ?, ?)")?;
        for row in rows {
            stmt.execute(params![row.tick, row.name, row.value])?;
        }
        Ok(())
    }

    /// Force flush buffered records to disk.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        Self::insert_samples(&tx, &self.buffer.samples)?;
        Self::insert_metrics(&tx, &self.buffer.metrics)?;
        tx.commit()?;
        debug!(samples = self.buffer.samples.len(), "flushed market samples");
        self.buffer.clear();
        Ok(())
    }

    /// Best score recorded under `name`, if any.
    pub fn load_highscore(&self, name: &str) -> Result<Option<f64>, StorageError> {
        let score = self
            .conn
            .query_row(
                "select value from highscores where name = ?",
                params![name],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(score)
    }

    /// Record `value` under `name`, replacing any previous score.
    pub fn store_highscore(&mut self, name: &str, value: f64) -> Result<(), StorageError> {
        self.conn.execute(
            "insert or replace into highscores (name, value) values (?, ?)",
            params![name, value],
        )?;
        Ok(())
    }

    /// Most recent market checkpoints, newest first.
    pub fn latest_samples(&mut self, limit: usize) -> Result<Vec<MarketSample>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select tick, econ_count, dead_count, avg_value, deprecation_factor,
                    player_food, last_trade_price
             from market_samples
             order by tick desc
             limit ?",
        )?;
        let mut rows = stmt.query(params![to_i64(limit as u64)])?;
        let mut samples = Vec::with_capacity(limit.min(64));
        while let Some(row) = rows.next()? {
            samples.push(MarketSample {
                tick: row.get(0)?,
                econ_count: row.get(1)?,
                dead_count: row.get(2)?,
                avg_value: row.get(3)?,
                deprecation_factor: row.get(4)?,
                player_food: row.get(5)?,
                last_trade_price: row.get(6)?,
            });
        }
        Ok(samples)
    }

    /// Fetch the metrics of the latest checkpoint (ordered by name) up to `limit`.
    pub fn latest_metrics(&mut self, limit: usize) -> Result<Vec<MetricReading>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.flush()?;
        let latest_tick: Option<i64> =
            self.conn
                .query_row("select max(tick) from metrics", [], |row| row.get(0))?;
        let Some(tick) = latest_tick else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "select name, value
             from metrics
             where tick = ?
             order by name asc
             limit ?",
        )?;
        let mut rows = stmt.query(params![tick, to_i64(limit as u64)])?;
        let mut readings = Vec::new();
        while let Some(row) = rows.next()? {
            readings.push(MetricReading {
                tick,
                name: row.get(0)?,
                value: row.get(1)?,
            });
        }
        Ok(readings)
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(%err, "failed to flush persistence buffer on drop");
        }
    }
}

impl WorldPersistence for Storage {
    fn on_sample(&mut self, payload: &PersistenceBatch) {
        if let Err(err) = self.persist(payload) {
            warn!(
                tick = payload.summary.tick.0,
                %err,
                "failed to persist market sample"
            );
        }
    }
}

/// Persistence sink sharing a [`Storage`] with the embedding application.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<Storage>>,
}

impl SharedStorage {
    #[must_use]
    pub fn new(inner: Arc<Mutex<Storage>>) -> Self {
        Self { inner }
    }
}

impl WorldPersistence for SharedStorage {
    fn on_sample(&mut self, payload: &PersistenceBatch) {
        match self.inner.lock() {
            Ok(mut storage) => storage.on_sample(payload),
            Err(_) => warn!(
                tick = payload.summary.tick.0,
                "storage lock poisoned; dropping market sample"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubbles_core::{MetricSample, Tick, TickSummary, TradeRecord};
    use std::{
        fs,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    fn temp_db_path(prefix: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        path.push(format!(
            "{}-{}-{}.duckdb",
            prefix,
            std::process::id(),
            timestamp
        ));
        path
    }

    fn sample_batch(tick: u64, avg_value: f64) -> PersistenceBatch {
        PersistenceBatch {
            summary: TickSummary {
                tick: Tick(tick),
                econ_count: 30,
                dead_count: 2,
                avg_value,
                deprecation_factor: 0.9,
                total_econ_cash: 300.0,
                avg_econ_cash: 10.0,
                player_food: 120.0,
                player_bubbles: 2000,
                marketing_points: 3.0,
            },
            metrics: vec![
                MetricSample::new("avg_value", avg_value),
                MetricSample::new("player_food", 120.0),
            ],
            last_trade: Some(TradeRecord {
                amount: 2,
                price: 1.25,
            }),
        }
    }

    #[test]
    fn persist_batch_writes_all_tables() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_db_path("bubbles-storage-persist");
        let path_string = path.to_string_lossy().to_string();
        let mut storage = Storage::with_threshold(&path_string, 1)?;

        let batch = sample_batch(60, 1.5);
        storage.persist(&batch)?;

        let sample_count: i64 =
            storage
                .conn
                .query_row("select count(*) from market_samples", [], |row| row.get(0))?;
        assert_eq!(sample_count, 1);

        let metric_count: i64 =
            storage
                .conn
                .query_row("select count(*) from metrics", [], |row| row.get(0))?;
        assert_eq!(metric_count, batch.metrics.len() as i64);

        let latest = storage.latest_metrics(8)?;
        assert_eq!(latest.len(), batch.metrics.len());
        assert!(latest.iter().all(|m| m.tick == 60));

        drop(storage);
        let _ = fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn buffered_samples_surface_on_query() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_db_path("bubbles-storage-buffer");
        let path_string = path.to_string_lossy().to_string();
        let mut storage = Storage::open(&path_string)?;

        storage.persist(&sample_batch(60, 1.0))?;
        storage.persist(&sample_batch(120, 2.0))?;
        storage.persist(&sample_batch(180, 3.0))?;

        let samples = storage.latest_samples(2)?;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].tick, 180);
        assert_eq!(samples[1].tick, 120);
        assert!((samples[0].avg_value - 3.0).abs() < 1e-12);
        assert_eq!(samples[0].last_trade_price, Some(1.25));

        drop(storage);
        let _ = fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn highscore_round_trips_and_replaces() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_db_path("bubbles-storage-highscore");
        let path_string = path.to_string_lossy().to_string();
        let mut storage = Storage::open(&path_string)?;

        assert_eq!(storage.load_highscore("highscore")?, None);
        storage.store_highscore("highscore", 150.0)?;
        storage.store_highscore("highscore", 175.5)?;
        assert_eq!(storage.load_highscore("highscore")?, Some(175.5));
        assert_eq!(storage.load_highscore("other")?, None);

        drop(storage);
        let _ = fs::remove_file(path);
        Ok(())
    }
}
