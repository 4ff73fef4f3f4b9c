// Checks run before any store is opened for writing

use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::PreflightError;

/// Whether a process with the given name (ignoring case and `.exe`) is running
pub fn server_running(process_name: &str) -> bool {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing(),
    );

    system
        .processes()
        .values()
        .any(|process| matches_process_name(process.name(), process_name))
}

fn matches_process_name(name: &OsStr, expected: &str) -> bool {
    let name = name.to_string_lossy();
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".exe").unwrap_or(&lower);
    stem.eq_ignore_ascii_case(expected)
}

pub fn ensure_server_stopped(process_name: &str) -> Result<(), PreflightError> {
    if server_running(process_name) {
        return Err(PreflightError::ServerRunning {
            process: process_name.to_string(),
        });
    }
    tracing::debug!("No running {} process found", process_name);
    Ok(())
}

pub fn ensure_exists(path: &Path) -> Result<(), PreflightError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PreflightError::StoreNotFound(path.to_path_buf()))
    }
}

/// Open the file for writing (without truncating) to prove we may modify it
pub fn ensure_writable(path: &Path) -> Result<(), PreflightError> {
    match OpenOptions::new().write(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(PreflightError::StoreNotFound(path.to_path_buf()))
        }
        Err(e) => {
            tracing::debug!("Write check on {} failed: {}", path.display(), e);
            Err(PreflightError::NotWritable {
                path: path.to_path_buf(),
                hint: rerun_hint(path),
            })
        }
    }
}

/// Suggest re-running the current command line as the file's owner
#[cfg(unix)]
fn rerun_hint(path: &Path) -> String {
    use std::os::unix::fs::MetadataExt;

    let command = std::env::args().collect::<Vec<_>>().join(" ");
    match std::fs::metadata(path) {
        Ok(meta) => format!(
            "Try running this tool as the jellyfin user:\nsudo -u '#{}' {}",
            meta.uid(),
            command
        ),
        Err(_) => "Try running this tool as the jellyfin user".to_string(),
    }
}

#[cfg(not(unix))]
fn rerun_hint(_path: &Path) -> String {
    "Try running this tool as an Administrator".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_matching() {
        assert!(matches_process_name(OsStr::new("jellyfin"), "jellyfin"));
        assert!(matches_process_name(OsStr::new("Jellyfin.exe"), "jellyfin"));
        assert!(matches_process_name(OsStr::new("JELLYFIN.EXE"), "jellyfin"));
        assert!(!matches_process_name(OsStr::new("jellyfin-repair"), "jellyfin"));
        assert!(!matches_process_name(OsStr::new("jellyfin-web"), "jellyfin"));
    }

    #[test]
    fn test_unknown_process_is_not_running() {
        assert!(!server_running("no-such-media-server-process-4242"));
        assert!(ensure_server_stopped("no-such-media-server-process-4242").is_ok());
    }

    #[test]
    fn test_existing_file_is_writable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ensure_exists(file.path()).is_ok());
        assert!(ensure_writable(file.path()).is_ok());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("library.db");
        assert!(matches!(
            ensure_exists(&missing),
            Err(PreflightError::StoreNotFound(_))
        ));
        assert!(matches!(
            ensure_writable(&missing),
            Err(PreflightError::StoreNotFound(_))
        ));
    }

    #[test]
    fn test_directory_is_not_a_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_exists(dir.path()).is_err());
    }
}
