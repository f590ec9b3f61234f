//! Dataset bootstrap: locate or download the parquet file, load it into a
//! DuckDB table and hand out a read-only executor.
//!
//! Every failure here is fatal; the server refuses to start without data.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use duckdb::{AccessMode, Config, Connection};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use fathom_common::config::{is_uri, DatasetSettings};
use fathom_error::{ErrorCode, ErrorContext, FathomError, Result};

use crate::engine::DuckDbExecutor;

/// Where the parquet file lives on disk: downloads land in `data_dir`, local
/// sources are used in place.
pub fn local_path(settings: &DatasetSettings) -> PathBuf {
    if !is_uri(&settings.source) {
        return PathBuf::from(&settings.source);
    }
    let file_name = url::Url::parse(&settings.source)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}.parquet", settings.table_name));
    Path::new(&settings.data_dir).join(file_name)
}

/// Make sure the dataset exists locally, downloading it if needed.
pub async fn fetch_dataset(settings: &DatasetSettings) -> Result<PathBuf> {
    let path = local_path(settings);
    let context = ErrorContext::Dataset {
        source: settings.source.clone(),
        local_path: path.display().to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            FathomError::new(ErrorCode::DatasetUnavailable, e.to_string())
                .with_context(context.clone())
        })?;
    }

    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        info!(path = %path.display(), "Dataset found");
        return Ok(path);
    }

    info!(path = %path.display(), "Dataset not found");
    if !is_uri(&settings.source) {
        warn!(source = %settings.source, "Dataset source is not a URL, cannot download");
        return Err(FathomError::new(
            ErrorCode::DatasetUnavailable,
            format!("Dataset not found at {}", path.display()),
        )
        .with_context(context)
        .with_hint("Set dataset.source to an http(s) URL or an existing parquet file"));
    }

    info!(url = %settings.source, "Downloading dataset");
    download(&settings.source, &path)
        .await
        .map_err(|e| e.with_context(context))?;
    Ok(path)
}

async fn download(url: &str, dest: &Path) -> Result<()> {
    let failed = |e: &dyn std::fmt::Display| {
        FathomError::new(ErrorCode::DatasetDownloadFailed, e.to_string())
    };

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| failed(&e))?;

    // Write to a temporary file first so an interrupted download never
    // looks like a complete dataset on the next start.
    let tmp_path = dest.with_extension("download");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| failed(&e))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| failed(&e))?;
        file.write_all(&chunk).await.map_err(|e| failed(&e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| failed(&e))?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .map_err(|e| failed(&e))?;
    info!(bytes = written, path = %dest.display(), "Dataset downloaded");
    Ok(())
}

/// Load `parquet_path` into a fresh database file and reopen it read-only.
pub async fn create_database(
    parquet_path: &Path,
    settings: &DatasetSettings,
) -> Result<DuckDbExecutor> {
    let db_path = Path::new(&settings.data_dir).join(&settings.database_file);
    let parquet_path = parquet_path.to_path_buf();
    let table = settings.table_name.clone();

    tokio::fs::create_dir_all(&settings.data_dir)
        .await
        .map_err(|e| FathomError::new(ErrorCode::TableCreationFailed, e.to_string()))?;

    tokio::task::spawn_blocking(move || {
        info!("Loading database");
        let started = Instant::now();
        build_table(&db_path, &table, &parquet_path)?;
        info!(
            table = %table,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "DuckDB database created"
        );

        let conn = open_read_only(&db_path)?;
        info!(path = %db_path.display(), "DuckDB database set to read only");

        let settings = read_settings(&conn)?;
        info!(count = settings.len(), "DuckDB database running");
        debug!(settings = ?settings, "DuckDB settings");

        Ok(DuckDbExecutor::new(conn))
    })
    .await
    .map_err(|e| FathomError::new(ErrorCode::ExecutorJoin, e.to_string()))?
}

fn build_table(db_path: &Path, table: &str, parquet_path: &Path) -> Result<()> {
    let failed = |e: &dyn std::fmt::Display| {
        FathomError::new(ErrorCode::TableCreationFailed, e.to_string()).with_context(
            ErrorContext::TableCreation {
                table: table.to_string(),
                parquet_path: parquet_path.display().to_string(),
            },
        )
    };

    // Start from an empty file on every boot.
    let wal_path = PathBuf::from(format!("{}.wal", db_path.display()));
    for stale in [db_path.to_path_buf(), wal_path] {
        if stale.exists() {
            std::fs::remove_file(&stale).map_err(|e| failed(&e))?;
        }
    }

    let conn = Connection::open(db_path).map_err(|e| failed(&e))?;
    let sql = format!(
        "CREATE TABLE {} AS SELECT * FROM parquet_scan('{}')",
        table,
        parquet_path.display().to_string().replace('\'', "''")
    );
    conn.execute_batch(&sql).map_err(|e| failed(&e))?;
    conn.close().map_err(|(_, e)| failed(&e))
}

fn open_read_only(db_path: &Path) -> Result<Connection> {
    let failed = |e: duckdb::Error| FathomError::new(ErrorCode::EngineConfigFailed, e.to_string());
    let config = Config::default()
        .access_mode(AccessMode::ReadOnly)
        .map_err(failed)?;
    Connection::open_with_flags(db_path, config).map_err(failed)
}

fn read_settings(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let failed = |e: duckdb::Error| FathomError::new(ErrorCode::EngineConfigFailed, e.to_string());
    let mut stmt = conn
        .prepare("SELECT name, value FROM duckdb_settings()")
        .map_err(failed)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(failed)?;

    let mut settings = BTreeMap::new();
    for row in rows {
        let (name, value) = row.map_err(failed)?;
        settings.insert(name, value.unwrap_or_default());
    }
    Ok(settings)
}

/// Run the whole bootstrap sequence for `settings`.
pub async fn bootstrap(settings: &DatasetSettings) -> Result<DuckDbExecutor> {
    let parquet_path = fetch_dataset(settings).await?;
    create_database(&parquet_path, settings).await
}
