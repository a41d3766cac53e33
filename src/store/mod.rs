//! Durable local storage for saved workouts, session history, and
//! preferences. All SQLite access happens on one dedicated worker thread;
//! callers send closures over a channel and await the reply, so the async
//! side never blocks on disk I/O.

use std::{
    collections::HashMap,
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;
use uuid::Uuid;

mod migrations;

use crate::{
    recorder::{SessionSummary, SpeedSnapshot},
    workout::{SavedWorkoutTemplate, SpeedUnit},
};
use migrations::run_migrations;

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("column {column} holds out-of-range value {value}"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn unit_from_str(value: &str) -> Result<SpeedUnit> {
    match value {
        "mph" => Ok(SpeedUnit::Mph),
        "kph" => Ok(SpeedUnit::Kph),
        _ => Err(anyhow!("unknown speed unit '{value}'")),
    }
}

fn speeds_from_json(value: &str) -> Result<SpeedSnapshot> {
    serde_json::from_str(value).with_context(|| format!("invalid speeds record '{value}'"))
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
    db_path: Arc<PathBuf>,
}

impl Store {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("fartlek-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Store thread shutting down");
            })
            .with_context(|| "failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("Store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }

    pub async fn save_template(&self, template: &SavedWorkoutTemplate) -> Result<()> {
        let record = template.clone();
        self.execute(move |conn| {
            let speeds = serde_json::to_string(&record.speeds)
                .context("failed to serialize speeds snapshot")?;
            conn.execute(
                "INSERT INTO templates (name, warm_up, fast_run, slow_run, repeats, cool_down, speeds, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.name,
                    i64::from(record.warm_up),
                    i64::from(record.fast_run),
                    i64::from(record.slow_run),
                    i64::from(record.repeats),
                    i64::from(record.cool_down),
                    speeds,
                    record.date.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert workout template")?;
            Ok(())
        })
        .await
    }

    pub async fn load_templates(&self) -> Result<Vec<SavedWorkoutTemplate>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, warm_up, fast_run, slow_run, repeats, cool_down, speeds, date
                 FROM templates
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut templates = Vec::new();
            while let Some(row) = rows.next()? {
                templates.push(template_from_row(row)?);
            }
            Ok(templates)
        })
        .await
    }

    /// Deletes by position in insertion order, mirroring the array-index
    /// deletion of the original records.
    pub async fn delete_template(&self, index: usize) -> Result<()> {
        let offset = i64::try_from(index).map_err(|_| anyhow!("template index out of range"))?;
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM templates
                     WHERE id = (SELECT id FROM templates ORDER BY id ASC LIMIT 1 OFFSET ?1)",
                    params![offset],
                )
                .with_context(|| "failed to delete workout template")?;
            if changed == 0 {
                return Err(anyhow!("no saved workout at index {offset}"));
            }
            Ok(())
        })
        .await
    }

    pub async fn append_summary(&self, summary: &SessionSummary) -> Result<()> {
        let record = summary.clone();
        self.execute(move |conn| {
            let speeds = serde_json::to_string(&record.speeds)
                .context("failed to serialize speeds snapshot")?;
            conn.execute(
                "INSERT INTO history (id, name, warm_up, fast_run, slow_run, repeats, completed_repeats,
                                      cool_down, total_time, speeds, date, intervals, distance, units)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    Uuid::new_v4().to_string(),
                    record.name,
                    i64::from(record.warm_up),
                    i64::from(record.fast_run),
                    i64::from(record.slow_run),
                    i64::from(record.repeats),
                    i64::from(record.completed_repeats),
                    i64::from(record.cool_down),
                    i64::from(record.total_time),
                    speeds,
                    record.date.to_rfc3339(),
                    record.intervals,
                    record.distance,
                    record.units.as_str(),
                ],
            )
            .with_context(|| "failed to append session summary")?;
            Ok(())
        })
        .await
    }

    pub async fn load_history(&self) -> Result<Vec<SessionSummary>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, warm_up, fast_run, slow_run, repeats, completed_repeats, cool_down,
                        total_time, speeds, date, intervals, distance, units
                 FROM history
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut summaries = Vec::new();
            while let Some(row) = rows.next()? {
                summaries.push(summary_from_row(row)?);
            }
            Ok(summaries)
        })
        .await
    }

    pub async fn delete_summary(&self, index: usize) -> Result<()> {
        let offset = i64::try_from(index).map_err(|_| anyhow!("history index out of range"))?;
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM history
                     WHERE id = (SELECT id FROM history ORDER BY rowid ASC LIMIT 1 OFFSET ?1)",
                    params![offset],
                )
                .with_context(|| "failed to delete session summary")?;
            if changed == 0 {
                return Err(anyhow!("no history entry at index {offset}"));
            }
            Ok(())
        })
        .await
    }

    pub async fn save_preference(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO preferences (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| "failed to save preference")?;
            Ok(())
        })
        .await
    }

    pub async fn load_preferences(&self) -> Result<HashMap<String, String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM preferences")?;
            let mut rows = stmt.query([])?;
            let mut preferences = HashMap::new();
            while let Some(row) = rows.next()? {
                preferences.insert(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
            }
            Ok(preferences)
        })
        .await
    }
}

fn template_from_row(row: &Row<'_>) -> Result<SavedWorkoutTemplate> {
    Ok(SavedWorkoutTemplate {
        name: row.get::<_, String>(0)?,
        warm_up: to_u32(row.get::<_, i64>(1)?, "warm_up")?,
        fast_run: to_u32(row.get::<_, i64>(2)?, "fast_run")?,
        slow_run: to_u32(row.get::<_, i64>(3)?, "slow_run")?,
        repeats: to_u32(row.get::<_, i64>(4)?, "repeats")?,
        cool_down: to_u32(row.get::<_, i64>(5)?, "cool_down")?,
        speeds: speeds_from_json(&row.get::<_, String>(6)?)?,
        date: parse_datetime(&row.get::<_, String>(7)?)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> Result<SessionSummary> {
    Ok(SessionSummary {
        name: row.get::<_, String>(0)?,
        warm_up: to_u32(row.get::<_, i64>(1)?, "warm_up")?,
        fast_run: to_u32(row.get::<_, i64>(2)?, "fast_run")?,
        slow_run: to_u32(row.get::<_, i64>(3)?, "slow_run")?,
        repeats: to_u32(row.get::<_, i64>(4)?, "repeats")?,
        completed_repeats: to_u32(row.get::<_, i64>(5)?, "completed_repeats")?,
        cool_down: to_u32(row.get::<_, i64>(6)?, "cool_down")?,
        total_time: to_u32(row.get::<_, i64>(7)?, "total_time")?,
        speeds: speeds_from_json(&row.get::<_, String>(8)?)?,
        date: parse_datetime(&row.get::<_, String>(9)?)?,
        intervals: row.get::<_, String>(10)?,
        distance: row.get::<_, f64>(11)?,
        units: unit_from_str(&row.get::<_, String>(12)?)?,
    })
}
