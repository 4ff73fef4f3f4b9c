use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Open an existing Jellyfin database for repair
///
/// The pool holds a single connection: every repair step runs on it in
/// order, and nothing else may touch the store meanwhile. The journal mode
/// is left as the server configured it.
pub async fn open_store(path: &Path) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    tracing::debug!("Opened {}", path.display());

    Ok(pool)
}

/// Copy a database file next to itself as `<name>.<timestamp>.bak`
///
/// WAL and shared-memory sidecars are copied along when present so the
/// backup reflects the last committed state.
pub async fn backup_store(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let backup = backup_path(path, &stamp.to_string());

    tokio::fs::copy(path, &backup)
        .await
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;

    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(path, suffix);
        if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
            tokio::fs::copy(&sidecar, sidecar_path(&backup, suffix))
                .await
                .with_context(|| format!("Failed to back up {}", sidecar.display()))?;
        }
    }

    tracing::info!("Backed up {} to {}", path.display(), backup.display());

    Ok(backup)
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    path.with_file_name(format!("{}.{}.bak", file_name, stamp))
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path_format() {
        let path = Path::new("/var/lib/jellyfin/data/library.db");
        assert_eq!(
            backup_path(path, "20240101-120000"),
            PathBuf::from("/var/lib/jellyfin/data/library.db.20240101-120000.bak")
        );
    }

    #[test]
    fn test_sidecar_path() {
        let path = Path::new("/data/users.db");
        assert_eq!(sidecar_path(path, "-wal"), PathBuf::from("/data/users.db-wal"));
    }

    #[tokio::test]
    async fn test_backup_store_copies_file_and_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("library.db");
        std::fs::write(&db, b"main").unwrap();
        std::fs::write(dir.path().join("library.db-wal"), b"wal").unwrap();

        let backup = backup_store(&db).await.unwrap();

        assert_eq!(std::fs::read(&backup).unwrap(), b"main");
        assert_eq!(std::fs::read(sidecar_path(&backup, "-wal")).unwrap(), b"wal");
        assert!(!sidecar_path(&backup, "-shm").exists());
    }

    #[tokio::test]
    async fn test_open_store_refuses_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_store(&dir.path().join("missing.db")).await;
        assert!(result.is_err());
    }
}
