use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use shared::domain::Record;

mod import;

pub use import::{parse_json_array, ImportError, ImportSource, JsonImportFile};

/// Load-all / replace-all persistence for the canonical collections.
pub trait CollectionStore {
    /// Returns an empty list for a collection that was never saved.
    fn load_all<T: Record>(&self) -> Result<Vec<T>>;
    fn save_all<T: Record>(&self, items: &[T]) -> Result<()>;
}

/// One pretty-printed JSON array per collection under a data directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for<T: Record>(&self) -> PathBuf {
        self.root.join(format!("{}.json", T::KIND.name()))
    }
}

impl CollectionStore for JsonDirStore {
    fn load_all<T: Record>(&self) -> Result<Vec<T>> {
        let path = self.path_for::<T>();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
            }
        };
        serde_json::from_str(&raw).with_context(|| {
            format!(
                "failed to parse {} collection from '{}'",
                T::KIND,
                path.display()
            )
        })
    }

    fn save_all<T: Record>(&self, items: &[T]) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("failed to create data directory '{}'", self.root.display())
        })?;
        let path = self.path_for::<T>();
        let staging = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(items)
            .with_context(|| format!("failed to encode {} collection", T::KIND))?;
        fs::write(&staging, bytes)
            .with_context(|| format!("failed to write '{}'", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace '{}'", path.display()))?;
        debug!(collection = %T::KIND, count = items.len(), path = %path.display(), "saved collection");
        Ok(())
    }
}

/// SQLite-backed collections, one row per element, ordered by position.
///
/// Calls block on a private runtime, so this must not be used from inside
/// another tokio runtime.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    runtime: Runtime,
}

impl SqliteStore {
    pub fn open(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("failed to build sqlite runtime")?;
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = runtime
            .block_on(async {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(connect_options)
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .with_context(|| format!("failed to open sqlite store at '{database_url}'"))?;
        Ok(Self { pool, runtime })
    }

    pub fn health_check(&self) -> Result<()> {
        let _: i64 = self
            .runtime
            .block_on(sqlx::query_scalar("SELECT 1").fetch_one(&self.pool))
            .context("sqlite ping failed")?;
        Ok(())
    }
}

impl CollectionStore for SqliteStore {
    fn load_all<T: Record>(&self) -> Result<Vec<T>> {
        let collection = T::KIND.name();
        let rows = self
            .runtime
            .block_on(
                sqlx::query(
                    "SELECT payload FROM collection_items WHERE collection = ? ORDER BY position",
                )
                .bind(collection)
                .fetch_all(&self.pool),
            )
            .with_context(|| format!("failed to load {collection} collection"))?;

        rows.iter()
            .enumerate()
            .map(|(position, row)| {
                let payload: String = row.try_get("payload")?;
                serde_json::from_str(&payload).with_context(|| {
                    format!("failed to decode {collection} element at position {position}")
                })
            })
            .collect()
    }

    fn save_all<T: Record>(&self, items: &[T]) -> Result<()> {
        let collection = T::KIND.name();
        let payloads = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to encode {collection} collection"))?;

        self.runtime
            .block_on(async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("DELETE FROM collection_items WHERE collection = ?")
                    .bind(collection)
                    .execute(&mut *tx)
                    .await?;
                for (position, payload) in payloads.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO collection_items (collection, position, payload) VALUES (?, ?, ?)",
                    )
                    .bind(collection)
                    .bind(position as i64)
                    .bind(payload)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok::<_, anyhow::Error>(())
            })
            .with_context(|| format!("failed to save {collection} collection"))?;
        debug!(collection, count = items.len(), "saved collection");
        Ok(())
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

/// The configured persistence backend.
pub enum Backend {
    Json(JsonDirStore),
    Sqlite(SqliteStore),
}

impl Backend {
    /// SQLite when a database url is given, otherwise JSON files under `data_dir`.
    pub fn open(data_dir: &Path, database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) if !url.trim().is_empty() => Ok(Self::Sqlite(SqliteStore::open(url.trim())?)),
            _ => Ok(Self::Json(JsonDirStore::new(data_dir))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Json(store) => format!("json:{}", store.root().display()),
            Backend::Sqlite(_) => "sqlite".to_string(),
        }
    }
}

impl CollectionStore for Backend {
    fn load_all<T: Record>(&self) -> Result<Vec<T>> {
        match self {
            Backend::Json(store) => store.load_all(),
            Backend::Sqlite(store) => store.load_all(),
        }
    }

    fn save_all<T: Record>(&self, items: &[T]) -> Result<()> {
        match self {
            Backend::Json(store) => store.save_all(items),
            Backend::Sqlite(store) => store.save_all(items),
        }
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
