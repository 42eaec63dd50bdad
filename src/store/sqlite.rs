// SQLite metric store. One row per Metric; embedded processes live in a versioned BLOB.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::instrument;

use super::{MetricFilter, MetricStore, blob};
use crate::models::{Bucket, Metric, Readings};

const READING_COLUMNS: &str = "cpu_load_percent, mem_used_percent, disk_used_percent, net_used_percent, \
     net_kbps, net_rx_kbps, net_tx_kbps, disk_read_kbps, disk_write_kbps";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_id TEXT NOT NULL,
                lab_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                sample_count INTEGER NOT NULL,
                cpu_load_percent REAL NOT NULL,
                mem_used_percent REAL NOT NULL,
                disk_used_percent REAL NOT NULL,
                net_used_percent REAL NOT NULL,
                net_kbps REAL NOT NULL,
                net_rx_kbps REAL NOT NULL,
                net_tx_kbps REAL NOT NULL,
                disk_read_kbps REAL NOT NULL,
                disk_write_kbps REAL NOT NULL,
                uptime_seconds INTEGER NOT NULL,
                process_data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metrics_lab_ts ON metrics(lab_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metrics_machine_ts ON metrics(machine_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn parse_metric_row(row: &SqliteRow) -> anyhow::Result<Metric> {
        let sample_count: i64 = row.try_get("sample_count")?;
        let uptime_seconds: i64 = row.try_get("uptime_seconds")?;
        let process_data: Vec<u8> = row.try_get("process_data")?;
        Ok(Metric {
            machine_id: row.try_get("machine_id")?,
            lab_id: row.try_get("lab_id")?,
            timestamp: row.try_get("timestamp")?,
            sample_count: sample_count.max(0) as u64,
            readings: parse_readings(row)?,
            uptime_seconds: uptime_seconds.max(0) as u64,
            processes: blob::decode_processes(&process_data),
        })
    }
}

fn parse_readings(row: &SqliteRow) -> anyhow::Result<Readings> {
    Ok(Readings {
        cpu_load_percent: row.try_get("cpu_load_percent")?,
        mem_used_percent: row.try_get("mem_used_percent")?,
        disk_used_percent: row.try_get("disk_used_percent")?,
        net_used_percent: row.try_get("net_used_percent")?,
        net_kbps: row.try_get("net_kbps")?,
        net_rx_kbps: row.try_get("net_rx_kbps")?,
        net_tx_kbps: row.try_get("net_tx_kbps")?,
        disk_read_kbps: row.try_get("disk_read_kbps")?,
        disk_write_kbps: row.try_get("disk_write_kbps")?,
    })
}

#[async_trait]
impl MetricStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, metric), fields(store = "sqlite", operation = "insert", machine_id = %metric.machine_id, sample_count = metric.sample_count))]
    async fn insert(&self, metric: &Metric) -> anyhow::Result<()> {
        metric.validate()?;
        let process_data = blob::encode_processes(&metric.processes)?;
        let r = &metric.readings;
        sqlx::query(
            r#"
            INSERT INTO metrics
            (machine_id, lab_id, timestamp, sample_count,
             cpu_load_percent, mem_used_percent, disk_used_percent, net_used_percent,
             net_kbps, net_rx_kbps, net_tx_kbps, disk_read_kbps, disk_write_kbps,
             uptime_seconds, process_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&metric.machine_id)
        .bind(&metric.lab_id)
        .bind(metric.timestamp)
        .bind(metric.sample_count as i64)
        .bind(r.cpu_load_percent)
        .bind(r.mem_used_percent)
        .bind(r.disk_used_percent)
        .bind(r.net_used_percent)
        .bind(r.net_kbps)
        .bind(r.net_rx_kbps)
        .bind(r.net_tx_kbps)
        .bind(r.disk_read_kbps)
        .bind(r.disk_write_kbps)
        .bind(metric.uptime_seconds as i64)
        .bind(&process_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(store = "sqlite", operation = "recent"))]
    async fn recent(&self, filter: MetricFilter<'_>, limit: u32) -> anyhow::Result<Vec<Metric>> {
        let sql = format!(
            "SELECT machine_id, lab_id, timestamp, sample_count, {READING_COLUMNS}, uptime_seconds, process_data
             FROM metrics
             WHERE ($1 IS NULL OR machine_id = $1) AND ($2 IS NULL OR lab_id = $2)
             ORDER BY timestamp DESC, id DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.machine_id)
            .bind(filter.lab_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_metric_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(store = "sqlite", operation = "machine_ids"))]
    async fn machine_ids(&self, lab_id: Option<&str>) -> anyhow::Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT machine_id FROM metrics WHERE ($1 IS NULL OR lab_id = $1) ORDER BY machine_id ASC",
        )
        .bind(lab_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[instrument(skip(self), fields(store = "sqlite", operation = "lab_ids"))]
    async fn lab_ids(&self) -> anyhow::Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT lab_id FROM metrics ORDER BY lab_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Bucketing runs in SQL: newest `limit` rows of the lab, floored to `width_ms`
    /// (floor also for negative timestamps), grouped, then re-sorted ascending.
    #[instrument(skip(self), fields(store = "sqlite", operation = "lab_buckets"))]
    async fn lab_buckets(
        &self,
        lab_id: &str,
        limit: u32,
        width_ms: i64,
    ) -> anyhow::Result<Vec<Bucket>> {
        anyhow::ensure!(width_ms > 0, "bucket width must be > 0, got {}", width_ms);
        let rows = sqlx::query(
            r#"
            SELECT timestamp - (((timestamp % $3) + $3) % $3) AS bucket,
                   COUNT(*) AS count,
                   AVG(cpu_load_percent) AS cpu_load_percent,
                   AVG(mem_used_percent) AS mem_used_percent,
                   AVG(disk_used_percent) AS disk_used_percent,
                   AVG(net_used_percent) AS net_used_percent,
                   AVG(net_kbps) AS net_kbps,
                   AVG(net_rx_kbps) AS net_rx_kbps,
                   AVG(net_tx_kbps) AS net_tx_kbps,
                   AVG(disk_read_kbps) AS disk_read_kbps,
                   AVG(disk_write_kbps) AS disk_write_kbps
            FROM (
                SELECT * FROM metrics WHERE lab_id = $1
                ORDER BY timestamp DESC, id DESC LIMIT $2
            )
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(lab_id)
        .bind(limit as i64)
        .bind(width_ms)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = row.try_get("count")?;
            out.push(Bucket {
                timestamp: row.try_get("bucket")?,
                count: count.max(0) as u64,
                readings: parse_readings(&row)?,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(store = "sqlite", operation = "prune_older_than"))]
    async fn prune_older_than(&self, cutoff_ms: i64) -> anyhow::Result<u64> {
        let r = sqlx::query("DELETE FROM metrics WHERE timestamp < $1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(store = "sqlite", operation = "vacuum"))]
    async fn compact(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
