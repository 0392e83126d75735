//! Durable setup log
//!
//! Append-only record of timestamped lines, written through to a local
//! file and kept in memory for the upload at process exit. The sink is
//! shared between the main pipeline and the terminal reporting path, so
//! appends go through a mutex and survive a poisoned lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ProvisionError;

/// Log file permissions: owner/group writable, world readable
#[cfg(unix)]
const LOG_FILE_MODE: u32 = 0o664;

#[derive(Clone)]
pub struct LogSink {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    file: Option<File>,
    lines: Vec<String>,
}

impl LogSink {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(LOG_FILE_MODE))?;
        }

        Ok(Self {
            path,
            inner: Arc::new(Mutex::new(Inner {
                file: Some(file),
                lines: Vec::new(),
            })),
        })
    }

    /// In-memory sink with no backing file (tests).
    pub fn memory() -> Self {
        Self {
            path: PathBuf::new(),
            inner: Arc::new(Mutex::new(Inner {
                file: None,
                lines: Vec::new(),
            })),
        }
    }

    /// Append one timestamped line and flush it to disk.
    ///
    /// Never fails: a write error degrades to the in-memory copy, which
    /// the exit-path upload still carries.
    pub fn append(&self, line: &str) {
        let stamped = format!("{} {}", epoch_stamp(), line);
        let mut inner = self.lock();
        if let Some(file) = inner.file.as_mut() {
            let _ = writeln!(file, "{stamped}").and_then(|()| file.flush());
        }
        inner.lines.push(stamped);
    }

    /// Flush buffered file contents to disk.
    pub fn flush(&self) {
        let mut inner = self.lock();
        if let Some(file) = inner.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Last `n` lines, most recent last.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let inner = self.lock();
        let start = inner.lines.len().saturating_sub(n);
        inner.lines[start..].to_vec()
    }

    /// Local path of the backing file (empty for memory sinks).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // The sink must keep working from the terminal reporting path even if
    // a writer panicked mid-append, so recover from poisoning.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Epoch timestamp prefix (lightweight, no chrono dependency)
fn epoch_stamp() -> String {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("[{}.{:03}]", elapsed.as_secs(), elapsed.subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_writes_through() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("setup.log");

        let sink = LogSink::open(&path).unwrap();
        sink.append("first line");
        sink.append("second line");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("first line"));
        assert!(contents.contains("second line"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_lines_are_timestamped() {
        let sink = LogSink::memory();
        sink.append("hello");

        let tail = sink.tail(1);
        assert_eq!(tail.len(), 1);
        assert!(tail[0].starts_with('['));
        assert!(tail[0].ends_with("hello"));
    }

    #[test]
    fn test_tail_returns_most_recent() {
        let sink = LogSink::memory();
        for i in 0..10 {
            sink.append(&format!("line {i}"));
        }

        let tail = sink.tail(3);
        assert_eq!(tail.len(), 3);
        assert!(tail[2].ends_with("line 9"));
    }

    #[cfg(unix)]
    #[test]
    fn test_log_file_group_writable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("setup.log");
        let _sink = LogSink::open(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("setup.log");
        let sink = LogSink::open(&path).unwrap();

        let a = sink.clone();
        let b = sink.clone();
        let t1 = tokio::spawn(async move {
            for i in 0..50 {
                a.append(&format!("a{i}"));
            }
        });
        let t2 = tokio::spawn(async move {
            for i in 0..50 {
                b.append(&format!("b{i}"));
            }
        });
        t1.await.unwrap();
        t2.await.unwrap();

        assert_eq!(sink.tail(1000).len(), 100);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 100);
    }
}
