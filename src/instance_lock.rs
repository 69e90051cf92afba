//! Single-writer lock for a file-backed store, using a Unix socket.
//!
//! Two servers sharing one data file would each keep their own in-memory
//! copy and overwrite each other's writes, so only one may hold the file.
//! The socket is cleaned up by the OS when the process dies, avoiding stale
//! lock files.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another server already owns the data file.
    #[error("another instance is already using {0}")]
    AlreadyRunning(PathBuf),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as this struct exists. When dropped, the socket file is
/// removed.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for `data_file`.
    pub fn acquire(data_file: &Path) -> Result<Self, InstanceLockError> {
        let path = Self::socket_path(data_file);

        // Remove stale socket if it exists but no process holds it
        // This handles the case where the process was SIGKILL'd and
        // the Drop handler never ran, but the OS released the socket
        if path.exists() {
            match std::os::unix::net::UnixStream::connect(&path) {
                Ok(_) => {
                    return Err(InstanceLockError::AlreadyRunning(data_file.to_path_buf()));
                }
                Err(_) => {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                // Race condition: another instance bound between our check and bind
                Err(InstanceLockError::AlreadyRunning(data_file.to_path_buf()))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Socket path for `data_file`. Short enough for `sun_path` whatever the
    /// length of the data file path.
    pub fn socket_path(data_file: &Path) -> PathBuf {
        let canonical = data_file
            .parent()
            .and_then(|dir| dir.canonicalize().ok())
            .zip(data_file.file_name())
            .map(|(dir, name)| dir.join(name))
            .unwrap_or_else(|| data_file.to_path_buf());
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);

        // Use XDG_RUNTIME_DIR if available (auto-cleaned on logout)
        // Fallback to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join(format!("irrigation-sync-{:016x}.sock", hasher.finish()))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Clean up the socket file on normal exit
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_file() -> PathBuf {
        std::env::temp_dir().join(format!("irrigation-lock-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_socket_path_is_per_data_file() {
        let a = InstanceLock::socket_path(Path::new("/srv/a/store.json"));
        let b = InstanceLock::socket_path(Path::new("/srv/b/store.json"));
        assert_ne!(a, b);
        assert_eq!(a, InstanceLock::socket_path(Path::new("/srv/a/store.json")));
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("irrigation-sync-")
        );
    }

    #[test]
    fn test_second_acquire_fails_until_released() {
        let file = data_file();
        let lock = InstanceLock::acquire(&file).unwrap();
        assert!(matches!(
            InstanceLock::acquire(&file),
            Err(InstanceLockError::AlreadyRunning(_))
        ));

        drop(lock);
        let again = InstanceLock::acquire(&file);
        assert!(again.is_ok());
    }
}
