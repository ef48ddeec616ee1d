//! SQLite-backed item store.
//!
//! Every mutation runs on the single writer connection behind `writer`
//! (the writer gate), inside a transaction, on the blocking pool. Reads open
//! their own short-lived connection and never take the gate; they rely on
//! WAL snapshot isolation to see only committed state.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{DashboardRow, FetchStatus, NewSample, PriceSample, TrackedItem},
};

use super::db_init;

pub type StoreResult<T> = Result<T, StoreError>;

const ITEM_COLUMNS: &str = "id, name, url, target_price, last_alert_at, created_at";
const SAMPLE_COLUMNS: &str = "id, item_id, checked_at, price, status, raw_text";

#[derive(Clone)]
pub struct Store {
    writer: Arc<Mutex<Connection>>,
    path: Arc<PathBuf>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        db_init::configure_writer(&conn)?;
        db_init::ensure_schema(&conn)?;
        db_init::check_integrity(&conn)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            path: Arc::new(path),
        })
    }

    /// Open the store, or, if it cannot be opened or fails its integrity
    /// check, delete it and start over empty. Destructive on purpose: the
    /// engine must not run on top of a store in an unknown state.
    pub fn open_or_recreate(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    "store unusable ({e}); deleting it and recreating an empty one"
                );
                remove_db_files(path)?;
                Self::open(path)
            }
        }
    }

    async fn write<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let gate = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || {
            let mut conn = gate.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await?
    }

    async fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path.as_path())?;
            db_init::configure_reader(&conn)?;
            f(&conn)
        })
        .await?
    }

    // ---------------- Items ----------------

    pub async fn list_items(&self) -> StoreResult<Vec<TrackedItem>> {
        self.read(|conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at, rowid");
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map([], |row| item_from_row(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    pub async fn get_item(&self, id: &str) -> StoreResult<Option<TrackedItem>> {
        let id = id.to_string();
        self.read(move |conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
            let item = conn
                .query_row(&sql, params![id], |row| item_from_row(row, 0))
                .optional()?;
            Ok(item)
        })
        .await
    }

    /// Returns the new item's id.
    pub async fn add_item(
        &self,
        name: Option<&str>,
        url: &str,
        target_price: f64,
    ) -> StoreResult<String> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(StoreError::Validation("url must not be empty".into()));
        }
        validate_target(target_price)?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| url.clone());

        let id = Uuid::new_v4().to_string();
        let now = to_ms(Utc::now());

        let new_id = id.clone();
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO items (id, name, url, target_price, last_alert_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
                params![new_id, name, url, target_price, now],
            )?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    pub async fn update_target(&self, id: &str, target_price: f64) -> StoreResult<()> {
        validate_target(target_price)?;
        let id = id.to_string();
        self.write(move |conn| {
            let n = conn.execute(
                "UPDATE items SET target_price = ?1 WHERE id = ?2",
                params![target_price, id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    /// Removes the item and its whole price history in one transaction.
    pub async fn delete_item(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.write(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM prices WHERE item_id = ?1", params![id])?;
            let n = tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            if n == 0 {
                return Err(StoreError::NotFound(id));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Replace a defaulted name (one still equal to the URL) with `name`.
    /// Returns whether anything changed; a user-given name is never touched.
    pub async fn fill_default_name(&self, id: &str, name: &str) -> StoreResult<bool> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Ok(false);
        }
        let id = id.to_string();
        self.write(move |conn| {
            let n = conn.execute(
                "UPDATE items SET name = ?1 WHERE id = ?2 AND name = url",
                params![name, id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    pub async fn set_last_alert_at(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let id = id.to_string();
        let at = to_ms(at);
        self.write(move |conn| {
            let n = conn.execute(
                "UPDATE items SET last_alert_at = ?1 WHERE id = ?2",
                params![at, id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    // ---------------- Samples ----------------

    /// Append one sample. `checked_at` is raised to the item's latest
    /// sample time if it would otherwise go backwards, so history stays
    /// ordered under concurrent scheduled and on-demand fetches.
    pub async fn record_sample(&self, sample: NewSample) -> StoreResult<PriceSample> {
        if let Some(p) = sample.price {
            if !p.is_finite() {
                return Err(StoreError::Validation(format!("price {p} is not finite")));
            }
        }

        self.write(move |conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row("SELECT 1 FROM items WHERE id = ?1", params![sample.item_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound(sample.item_id));
            }

            let last: Option<i64> = tx.query_row(
                "SELECT MAX(checked_at) FROM prices WHERE item_id = ?1",
                params![sample.item_id],
                |row| row.get(0),
            )?;
            let checked_at = last.map_or(to_ms(sample.checked_at), |l| l.max(to_ms(sample.checked_at)));

            tx.execute(
                "INSERT INTO prices (item_id, checked_at, price, status, raw_text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sample.item_id,
                    checked_at,
                    sample.price,
                    sample.status.as_str(),
                    sample.raw_text
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(PriceSample {
                id,
                item_id: sample.item_id,
                checked_at: from_ms(checked_at),
                price: sample.price,
                status: sample.status,
                raw_text: sample.raw_text,
            })
        })
        .await
    }

    pub async fn latest_sample_for(&self, item_id: &str) -> StoreResult<Option<PriceSample>> {
        Ok(self.history_for(item_id, 1).await?.into_iter().next())
    }

    /// Most recent first, at most `limit` rows.
    pub async fn history_for(&self, item_id: &str, limit: usize) -> StoreResult<Vec<PriceSample>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let item_id = item_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.read(move |conn| {
            let sql = format!(
                "SELECT {SAMPLE_COLUMNS} FROM prices WHERE item_id = ?1 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![item_id, limit], |row| sample_from_row(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Every item with its most recent sample, read in one statement so the
    /// pairs are consistent with each other.
    pub async fn dashboard_snapshot(&self) -> StoreResult<Vec<DashboardRow>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.name, i.url, i.target_price, i.last_alert_at, i.created_at,
                        p.id, p.item_id, p.checked_at, p.price, p.status, p.raw_text
                 FROM items i
                 LEFT JOIN prices p
                   ON p.id = (SELECT MAX(id) FROM prices WHERE item_id = i.id)
                 ORDER BY i.created_at, i.rowid",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    let item = item_from_row(row, 0)?;
                    let latest = match row.get::<_, Option<i64>>(6)? {
                        Some(_) => Some(sample_from_row(row, 6)?),
                        None => None,
                    };
                    Ok(DashboardRow { item, latest })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn validate_target(target_price: f64) -> StoreResult<()> {
    if !target_price.is_finite() || target_price < 0.0 {
        return Err(StoreError::Validation(
            "target price must be a non-negative number".into(),
        ));
    }
    Ok(())
}

fn remove_db_files(path: &Path) -> StoreResult<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.as_os_str().to_owned();
        p.push(suffix);
        match fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn item_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<TrackedItem> {
    Ok(TrackedItem {
        id: row.get(at)?,
        name: row.get(at + 1)?,
        url: row.get(at + 2)?,
        target_price: row.get(at + 3)?,
        last_alert_at: row.get::<_, Option<i64>>(at + 4)?.map(from_ms),
        created_at: from_ms(row.get(at + 5)?),
    })
}

fn sample_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<PriceSample> {
    let status: String = row.get(at + 4)?;
    Ok(PriceSample {
        id: row.get(at)?,
        item_id: row.get(at + 1)?,
        checked_at: from_ms(row.get(at + 2)?),
        price: row.get(at + 3)?,
        status: FetchStatus::parse(&status).unwrap_or(FetchStatus::NoPrice),
        raw_text: row.get(at + 5)?,
    })
}
