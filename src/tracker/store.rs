use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::metrics::{AccuracyFilter, AccuracyReport, TrackerStats};
use crate::error::{ensure_finite, ForecastError, Result};
use crate::types::normalize_symbol;

/// One logged prediction, optionally resolved with its observed actual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub id: Uuid,
    pub model_name: String,
    pub symbol: String,
    pub predicted_value: f64,
    pub actual_value: Option<f64>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl TrackerEntry {
    pub fn is_resolved(&self) -> bool {
        self.actual_value.is_some()
    }

    pub fn pair(&self) -> Option<(f64, f64)> {
        self.actual_value.map(|a| (self.predicted_value, a))
    }
}

/// Export row: the plain append-list shape consumed by external tooling.
#[derive(Serialize)]
struct LedgerRecord<'a> {
    model_name: &'a str,
    symbol: &'a str,
    predicted_value: f64,
    actual_value: Option<f64>,
    timestamp: i64,
}

/// Durable prediction ledger on SQLite.
///
/// Actuals are market facts keyed by `(symbol, timestamp)`: logging one
/// resolves every entry with that key, and later predictions for the same
/// key adopt it.
pub struct TrackerStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl TrackerStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing tracker ledger at: {}", database_url);
        if database_url.contains(":memory:") {
            return Self::in_memory().await;
        }
        create_parent_dir(database_url)?;

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory ledger; a single pinned connection keeps the data alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracker_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                model_name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                predicted_value REAL NOT NULL,
                actual_value REAL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tracker_symbol_ts ON tracker_entries(symbol, timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tracker_model ON tracker_entries(model_name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observed_actuals (
                symbol TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                actual_value REAL NOT NULL,
                observed_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a prediction. Without an explicit actual, an already-observed
    /// actual for the same symbol and timestamp is adopted.
    pub async fn log_prediction(
        &self,
        model_name: &str,
        symbol: &str,
        predicted_value: f64,
        actual_value: Option<f64>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<TrackerEntry> {
        let model_name = model_name.trim();
        let symbol = normalize_symbol(symbol);
        if model_name.is_empty() || symbol.is_empty() {
            return Err(ForecastError::validation("model_name and symbol are required"));
        }
        ensure_finite("predicted_value", predicted_value)?;
        if let Some(a) = actual_value {
            ensure_finite("actual_value", a)?;
        }

        let timestamp = timestamp.unwrap_or_else(Utc::now).trunc_subsecs(0);
        let id = Uuid::new_v4();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let actual_value = match actual_value {
            Some(a) => Some(a),
            None => sqlx::query(
                r#"
                SELECT actual_value FROM observed_actuals
                WHERE symbol = ? AND timestamp = ?
                "#,
            )
            .bind(symbol.as_str())
            .bind(timestamp.timestamp())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<f64, _>("actual_value"))
            .transpose()?,
        };

        sqlx::query(
            r#"
            INSERT INTO tracker_entries (id, model_name, symbol, predicted_value, actual_value, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(model_name)
        .bind(symbol.as_str())
        .bind(predicted_value)
        .bind(actual_value)
        .bind(timestamp.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Logged {} prediction for {} at {}: {}", model_name, symbol, timestamp, predicted_value);
        Ok(TrackerEntry {
            id,
            model_name: model_name.to_string(),
            symbol,
            predicted_value,
            actual_value,
            timestamp,
        })
    }

    /// Record the observed value for `(symbol, timestamp)` and resolve every
    /// matching entry. Returns how many entries were updated.
    pub async fn log_actual(&self, symbol: &str, timestamp: DateTime<Utc>, actual_value: f64) -> Result<u64> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(ForecastError::validation("symbol is required"));
        }
        ensure_finite("actual_value", actual_value)?;
        let ts = timestamp.timestamp();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO observed_actuals (symbol, timestamp, actual_value, observed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol, timestamp) DO UPDATE SET
                actual_value = excluded.actual_value,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(symbol.as_str())
        .bind(ts)
        .bind(actual_value)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        let resolved = sqlx::query(
            r#"
            UPDATE tracker_entries SET actual_value = ?
            WHERE symbol = ? AND timestamp = ?
            "#,
        )
        .bind(actual_value)
        .bind(symbol.as_str())
        .bind(ts)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!("Actual {} for {} at {} resolved {} entries", actual_value, symbol, timestamp, resolved);
        Ok(resolved)
    }

    async fn fetch_entries(&self, symbol: Option<&str>) -> Result<Vec<TrackerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, model_name, symbol, predicted_value, actual_value, timestamp
            FROM tracker_entries
            WHERE (? IS NULL OR symbol = ?)
            ORDER BY seq ASC
            "#,
        )
        .bind(symbol)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match entry_from_row(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable tracker row: {}", e),
            }
        }
        Ok(entries)
    }

    /// Every entry in insertion order. Read failures degrade to an empty list.
    pub async fn get_all(&self) -> Vec<TrackerEntry> {
        self.fetch_entries(None).await.unwrap_or_else(|e| {
            warn!("Failed to read tracker ledger: {}", e);
            Vec::new()
        })
    }

    /// Entries for one symbol, oldest first.
    pub async fn history(&self, symbol: &str) -> Vec<TrackerEntry> {
        let symbol = normalize_symbol(symbol);
        let mut entries = self.fetch_entries(Some(symbol.as_str())).await.unwrap_or_else(|e| {
            warn!("Failed to read tracker history for {}: {}", symbol, e);
            Vec::new()
        });
        entries.sort_by_key(|e| e.timestamp);
        entries
    }

    pub async fn accuracy(&self, filter: &AccuracyFilter) -> AccuracyReport {
        let entries = self.get_all().await;
        AccuracyReport::from_pairs(
            entries
                .iter()
                .filter(|e| filter.matches(&e.model_name, &e.symbol))
                .filter_map(TrackerEntry::pair),
        )
    }

    pub async fn stats(&self) -> TrackerStats {
        let entries = self.get_all().await;
        let resolved = entries.iter().filter(|e| e.is_resolved()).count();

        let mut by_model: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
        let mut by_symbol: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
        for entry in &entries {
            if let Some(pair) = entry.pair() {
                by_model.entry(entry.model_name.clone()).or_default().push(pair);
                by_symbol.entry(entry.symbol.clone()).or_default().push(pair);
            }
        }

        TrackerStats {
            total_entries: entries.len(),
            resolved,
            pending: entries.len() - resolved,
            overall: AccuracyReport::from_pairs(entries.iter().filter_map(TrackerEntry::pair)),
            by_model: by_model
                .into_iter()
                .map(|(k, pairs)| (k, AccuracyReport::from_pairs(pairs)))
                .collect(),
            by_symbol: by_symbol
                .into_iter()
                .map(|(k, pairs)| (k, AccuracyReport::from_pairs(pairs)))
                .collect(),
        }
    }

    /// Write the ledger as a JSON list. Returns the number of entries written.
    pub async fn export_json(&self, path: &Path) -> Result<usize> {
        let entries = self.fetch_entries(None).await?;
        let records: Vec<LedgerRecord<'_>> = entries
            .iter()
            .map(|e| LedgerRecord {
                model_name: &e.model_name,
                symbol: &e.symbol,
                predicted_value: e.predicted_value,
                actual_value: e.actual_value,
                timestamp: e.timestamp.timestamp(),
            })
            .collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&records)?)?;

        info!("Exported {} tracker entries to {}", records.len(), path.display());
        Ok(records.len())
    }
}

fn entry_from_row(row: &SqliteRow) -> std::result::Result<TrackerEntry, String> {
    let id: String = row.try_get("id").map_err(|e| e.to_string())?;
    let ts: i64 = row.try_get("timestamp").map_err(|e| e.to_string())?;

    Ok(TrackerEntry {
        id: Uuid::parse_str(&id).map_err(|e| format!("bad id {}: {}", id, e))?,
        model_name: row.try_get("model_name").map_err(|e| e.to_string())?,
        symbol: row.try_get("symbol").map_err(|e| e.to_string())?,
        predicted_value: row.try_get("predicted_value").map_err(|e| e.to_string())?,
        actual_value: row.try_get("actual_value").map_err(|e| e.to_string())?,
        timestamp: Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| format!("bad timestamp {}", ts))?,
    })
}

/// SQLite will not create missing directories for a file database.
fn create_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_log_then_get_all_round_trip() {
        let store = TrackerStore::in_memory().await.unwrap();
        let entry = store
            .log_prediction("lstm", "AAPL", 190.5, None, Some(ts(1_700_000_000)))
            .await
            .unwrap();

        let all = store.get_all().await;
        assert_eq!(all, vec![entry.clone()]);
        assert_eq!(all[0].timestamp, ts(1_700_000_000));
        assert_eq!(all[0].actual_value, None);
    }

    #[tokio::test]
    async fn test_entries_keep_insertion_order() {
        let store = TrackerStore::in_memory().await.unwrap();
        store.log_prediction("arima", "AAPL", 1.0, None, Some(ts(300))).await.unwrap();
        store.log_prediction("arima", "AAPL", 2.0, None, Some(ts(100))).await.unwrap();
        store.log_prediction("arima", "AAPL", 2.0, None, Some(ts(100))).await.unwrap();

        let values: Vec<f64> = store.get_all().await.iter().map(|e| e.predicted_value).collect();
        assert_eq!(values, vec![1.0, 2.0, 2.0]);

        let history = store.history("AAPL").await;
        assert_eq!(history[0].timestamp, ts(100));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_accuracy() {
        let store = TrackerStore::in_memory().await.unwrap();
        store.log_prediction("lstm", "AAPL", 1.0, None, None).await.unwrap();

        let report = store.accuracy(&AccuracyFilter::default()).await;
        assert_eq!(report.count, 0);
        assert!(report.rmse.is_none());

        let report = store.accuracy(&AccuracyFilter::model("sarima")).await;
        assert_eq!(report, AccuracyReport::empty());
    }

    #[tokio::test]
    async fn test_log_actual_resolves_matching_entries() {
        let store = TrackerStore::in_memory().await.unwrap();
        let t = ts(1_700_000_000);
        store.log_prediction("lstm", "AAPL", 190.0, None, Some(t)).await.unwrap();
        store.log_prediction("arima", "AAPL", 186.0, None, Some(t)).await.unwrap();
        store.log_prediction("lstm", "AAPL", 200.0, None, Some(t + Duration::seconds(60))).await.unwrap();
        store.log_prediction("lstm", "TSLA", 240.0, None, Some(t)).await.unwrap();

        assert_eq!(store.log_actual("AAPL", t, 188.0).await.unwrap(), 2);

        let report = store.accuracy(&AccuracyFilter::symbol("AAPL")).await;
        assert_eq!(report.count, 2);
        assert_eq!(report.mae, Some(2.0));
        assert_eq!(report.max_error, Some(2.0));

        // Latest observation wins.
        assert_eq!(store.log_actual("AAPL", t, 190.0).await.unwrap(), 2);
        let report = store.accuracy(&AccuracyFilter::model("lstm")).await;
        assert_eq!(report.count, 1);
        assert_eq!(report.mae, Some(0.0));

        let stats = store.stats().await;
        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.by_model["arima"].count, 1);
        assert!(!stats.by_symbol.contains_key("TSLA"));
    }

    #[tokio::test]
    async fn test_late_prediction_adopts_observed_actual() {
        let store = TrackerStore::in_memory().await.unwrap();
        let t = ts(1_700_000_000);

        assert_eq!(store.log_actual("MSFT", t, 410.0).await.unwrap(), 0);
        let entry = store.log_prediction("lightgbm", "MSFT", 400.0, None, Some(t)).await.unwrap();
        assert_eq!(entry.actual_value, Some(410.0));

        let explicit = store.log_prediction("lightgbm", "MSFT", 400.0, Some(405.0), Some(t)).await.unwrap();
        assert_eq!(explicit.actual_value, Some(405.0));
    }

    #[tokio::test]
    async fn test_symbols_are_case_insensitive() {
        let store = TrackerStore::in_memory().await.unwrap();
        let t = ts(1_700_000_000);
        let entry = store.log_prediction("lstm", " aapl", 190.0, None, Some(t)).await.unwrap();
        assert_eq!(entry.symbol, "AAPL");

        assert_eq!(store.log_actual("AAPL", t, 188.0).await.unwrap(), 1);
        assert_eq!(store.history("Aapl").await.len(), 1);
        assert_eq!(store.accuracy(&AccuracyFilter::symbol("aapl")).await.count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logs_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("tracker.db").display());
        let store = std::sync::Arc::new(TrackerStore::new(&url).await.unwrap());
        let t = ts(1_700_000_000);

        let mut handles = Vec::new();
        for i in 0..20 {
            let predictions = store.clone();
            handles.push(tokio::spawn(async move {
                predictions
                    .log_prediction("lstm", "AAPL", 180.0 + i as f64, None, Some(t))
                    .await
                    .map(|_| ())
            }));
            let actuals = store.clone();
            handles.push(tokio::spawn(async move {
                actuals.log_actual("AAPL", t, 190.0).await.map(|_| ())
            }));
        }
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        let all = store.get_all().await;
        assert_eq!(all.len(), 20);
        // Whichever side landed first, every entry ends up resolved.
        assert!(all.iter().all(|e| e.actual_value == Some(190.0)));
    }

    #[tokio::test]
    async fn test_rejects_non_finite_values() {
        let store = assert_ok!(TrackerStore::in_memory().await);
        let err = assert_err!(store.log_prediction("lstm", "AAPL", f64::NAN, None, None).await);
        assert!(matches!(err, ForecastError::Validation(_)));
        let err = assert_err!(store.log_actual("AAPL", ts(0), f64::INFINITY).await);
        assert!(matches!(err, ForecastError::Validation(_)));
        assert_err!(store.log_prediction(" ", "AAPL", 1.0, None, None).await);
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_ledger_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("tracker.db");
        let url = format!("sqlite://{}", db.display());

        {
            let store = TrackerStore::new(&url).await.unwrap();
            store.log_prediction("sarima", "AAPL", 1.5, Some(1.0), Some(ts(42))).await.unwrap();
        }

        let store = TrackerStore::new(&url).await.unwrap();
        assert_eq!(store.get_all().await.len(), 1);

        let out = dir.path().join("export.json");
        assert_eq!(store.export_json(&out).await.unwrap(), 1);

        let exported: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(
            exported,
            serde_json::json!([{
                "model_name": "sarima",
                "symbol": "AAPL",
                "predicted_value": 1.5,
                "actual_value": 1.0,
                "timestamp": 42
            }])
        );
    }
}
