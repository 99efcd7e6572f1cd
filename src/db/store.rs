//! SQLite persistence for pipeline definitions and finished benchmark runs.

use crate::benchmark::{BenchmarkRun, BenchmarkStatus};
use crate::db::migrate::{embedded_migrations, run_migrations};
use crate::db::Db;
use crate::error::{RagstudioError, Result};
use crate::pipeline::{PipelineConfig, PipelineConfigProvider, PipelineVariant};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// Listing row for a stored pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRecord {
    pub id: String,
    pub name: String,
    pub variant: PipelineVariant,
    pub updated_at: String,
}

/// Listing row for a stored benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRunSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub started_at: Option<String>,
    pub duration_secs: f64,
}

pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply pending migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        let applied = db
            .with_connection(|conn| run_migrations(conn, &embedded_migrations()))
            .await?;
        if applied > 0 {
            log::info!("Applied {} migrations to {}", applied, db.path().display());
        }
        Ok(Self { db })
    }

    /// Insert or replace a pipeline definition. Invalid configs are rejected.
    pub async fn save_pipeline(&self, config: &PipelineConfig) -> Result<()> {
        config.validate()?;
        let config_json = serde_json::to_string(config)?;
        let id = config.id.clone();
        let name = config.display_name().to_string();
        let variant = config.variant.as_str();
        let now = Utc::now().to_rfc3339();

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO pipelines (id, name, variant, config_json, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        variant = excluded.variant,
                        config_json = excluded.config_json,
                        updated_at = excluded.updated_at",
                    params![id, name, variant, config_json, now],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_pipeline(&self, id: &str) -> Result<Option<PipelineConfig>> {
        let id = id.to_string();
        let json: Option<String> = self
            .db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT config_json FROM pipelines WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        json.map(|j| serde_json::from_str(&j).map_err(RagstudioError::from))
            .transpose()
    }

    pub async fn list_pipelines(&self) -> Result<Vec<PipelineRecord>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, variant, updated_at FROM pipelines ORDER BY id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut records = Vec::new();
                for row in rows {
                    let (id, name, variant, updated_at) = row?;
                    records.push(PipelineRecord {
                        id,
                        name,
                        variant: variant.parse()?,
                        updated_at,
                    });
                }
                Ok(records)
            })
            .await
    }

    pub async fn delete_pipeline(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let deleted = conn.execute("DELETE FROM pipelines WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Store a run, replacing any earlier copy with the same id.
    pub async fn save_run(&self, run: &BenchmarkRun) -> Result<()> {
        let run_json = serde_json::to_string(run)?;
        let pipeline_ids = serde_json::to_string(&run.pipeline_ids)?;
        let id = run.id.clone();
        let name = run.name.clone();
        let status = run.status.as_str();
        let started_at = run.started_at.map(|t| t.to_rfc3339());
        let finished_at = run.finished_at.map(|t| t.to_rfc3339());
        let duration_secs = run.duration_secs;

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO benchmark_runs
                        (id, name, status, pipeline_ids, started_at, finished_at, duration_secs, run_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![id, name, status, pipeline_ids, started_at, finished_at, duration_secs, run_json],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<BenchmarkRun>> {
        let id = id.to_string();
        let json: Option<String> = self
            .db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT run_json FROM benchmark_runs WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        json.map(|j| serde_json::from_str(&j).map_err(RagstudioError::from))
            .transpose()
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<BenchmarkRunSummary>> {
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, status, started_at, duration_secs FROM benchmark_runs
                     ORDER BY started_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| {
                    Ok(BenchmarkRunSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        status: row.get(2)?,
                        started_at: row.get(3)?,
                        duration_secs: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?)
            })
            .await
    }

    pub async fn count_runs(&self, status: BenchmarkStatus) -> Result<u64> {
        self.db
            .with_connection(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM benchmark_runs WHERE status = ?1",
                    params![status.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
    }
}

#[async_trait]
impl PipelineConfigProvider for SqliteStore {
    async fn pipeline_config(&self, id: &str) -> Result<PipelineConfig> {
        self.get_pipeline(id)
            .await?
            .ok_or_else(|| RagstudioError::PipelineNotFound(id.to_string()))
    }
}
