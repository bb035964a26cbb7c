//! SQLite result history

use crate::results::ResultSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use measure::{MeasurementResult, SpeedSample};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct ResultStore {
    conn: Mutex<Connection>,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;

        // WAL lets history queries run while a result is written
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        conn.pragma_update(None, "busy_timeout", "5000")
            .context("Failed to set busy timeout")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    pub fn initialize(&self) -> Result<()> {
        info!("Initializing database schema");
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                completed_at INTEGER NOT NULL,
                download_mbps REAL NOT NULL,
                upload_mbps REAL NOT NULL,
                ping_ms INTEGER NOT NULL,
                jitter_ms INTEGER NOT NULL,
                packet_loss_pct INTEGER NOT NULL,
                server_name TEXT NOT NULL,
                server_location TEXT NOT NULL,
                connection_type TEXT NOT NULL,
                provider_name TEXT NOT NULL,
                internal_ip TEXT NOT NULL,
                external_ip TEXT NOT NULL,
                download_history TEXT NOT NULL,
                upload_history TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_completed_at ON results(completed_at)",
            [],
        )?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn store_result(&self, result: &MeasurementResult) -> Result<()> {
        let download_history = serde_json::to_string(&result.download_history)
            .context("Failed to encode download history")?;
        let upload_history = serde_json::to_string(&result.upload_history)
            .context("Failed to encode upload history")?;

        self.conn()?.execute(
            "INSERT INTO results (
                completed_at, download_mbps, upload_mbps, ping_ms, jitter_ms,
                packet_loss_pct, server_name, server_location, connection_type,
                provider_name, internal_ip, external_ip, download_history, upload_history
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                result.completed_at.timestamp_millis(),
                result.download_mbps,
                result.upload_mbps,
                result.ping_ms,
                result.jitter_ms,
                result.packet_loss_pct,
                &result.server_name,
                &result.server_location,
                &result.connection_type,
                &result.provider_name,
                &result.internal_ip,
                &result.external_ip,
                download_history,
                upload_history,
            ],
        )?;

        debug!("Stored result completed at {}", result.completed_at);
        Ok(())
    }

    /// Most recent results, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<MeasurementResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT
                completed_at, download_mbps, upload_mbps, ping_ms, jitter_ms,
                packet_loss_pct, server_name, server_location, connection_type,
                provider_name, internal_ip, external_ip, download_history, upload_history
            FROM results
            ORDER BY completed_at DESC, id DESC
            LIMIT ?1",
        )?;

        let results = stmt
            .query_map(params![limit as i64], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(results)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete results completed before `cutoff`
    pub fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self.conn()?.execute(
            "DELETE FROM results WHERE completed_at < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        info!("Deleted {} stored results", deleted);
        Ok(deleted)
    }
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<MeasurementResult> {
    let completed_ms: i64 = row.get(0)?;
    Ok(MeasurementResult {
        completed_at: DateTime::<Utc>::from_timestamp_millis(completed_ms).unwrap_or_default(),
        download_mbps: row.get(1)?,
        upload_mbps: row.get(2)?,
        ping_ms: row.get(3)?,
        jitter_ms: row.get(4)?,
        packet_loss_pct: row.get(5)?,
        server_name: row.get(6)?,
        server_location: row.get(7)?,
        connection_type: row.get(8)?,
        provider_name: row.get(9)?,
        internal_ip: row.get(10)?,
        external_ip: row.get(11)?,
        download_history: decode_history(&row.get::<_, String>(12)?),
        upload_history: decode_history(&row.get::<_, String>(13)?),
    })
}

fn decode_history(json: &str) -> Vec<SpeedSample> {
    serde_json::from_str(json).unwrap_or_default()
}

#[async_trait]
impl ResultSink for ResultStore {
    async fn store(&self, result: &MeasurementResult) -> Result<()> {
        self.store_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_result(download: f64, completed_at: DateTime<Utc>) -> MeasurementResult {
        MeasurementResult {
            download_mbps: download,
            upload_mbps: 12.5,
            download_history: vec![
                SpeedSample { index: 0, mbps: download / 2.0 },
                SpeedSample { index: 1, mbps: download },
            ],
            upload_history: vec![SpeedSample { index: 0, mbps: 12.5 }],
            ping_ms: 18,
            jitter_ms: 3,
            packet_loss_pct: 0,
            server_name: "Cloudflare".to_string(),
            server_location: "Global, Worldwide".to_string(),
            connection_type: "Wi-Fi".to_string(),
            provider_name: "HomeNet".to_string(),
            internal_ip: "192.168.1.20".to_string(),
            external_ip: "N/A".to_string(),
            completed_at,
        }
    }

    fn open_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results.db")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_and_recent() {
        let (_dir, store) = open_store();
        let now = DateTime::<Utc>::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        let older = sample_result(40.0, now - Duration::minutes(5));
        let newer = sample_result(95.5, now);
        store.store_result(&older).unwrap();
        store.store_result(&newer).unwrap();

        assert_eq!(store.count().unwrap(), 2);

        let recent = store.recent(10).unwrap();
        assert_eq!(recent, vec![newer.clone(), older]);
        assert_eq!(store.recent(1).unwrap(), vec![newer]);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_dir, store) = open_store();
        store.initialize().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_before() {
        let (_dir, store) = open_store();
        let now = Utc::now();
        store
            .store_result(&sample_result(10.0, now - Duration::days(40)))
            .unwrap();
        store.store_result(&sample_result(20.0, now)).unwrap();

        assert_eq!(store.delete_before(now - Duration::days(30)).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_through_sink() {
        let (_dir, store) = open_store();
        let sink: &dyn ResultSink = &store;
        sink.store(&sample_result(55.0, Utc::now())).await.unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
