//! Output sinks
//!
//! Every pipeline writes one named payload. Writing a name again replaces
//! the previous payload completely.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SinkError;

/// Destination for pipeline payloads
pub trait OutputSink: Send + Sync {
    /// Store `payload` under `name`, replacing whatever was there
    fn write(&self, name: &str, payload: &[u8]) -> Result<(), SinkError>;

    /// Remove `name`. Removing a missing name is not an error.
    fn remove(&self, name: &str) -> Result<(), SinkError>;
}

/// Output names are plain file names
pub fn validate_output_name(name: &str) -> Result<(), SinkError> {
    let invalid = |reason: &str| SinkError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name contains a path separator"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name refers to a parent or current directory"));
    }
    Ok(())
}

/// Writes each payload to `<dir>/<name>`
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl OutputSink for FileSink {
    fn write(&self, name: &str, payload: &[u8]) -> Result<(), SinkError> {
        validate_output_name(name)?;
        let io_err = |source: std::io::Error| SinkError::Write {
            name: name.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Rename within one directory is atomic
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(payload).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
                .map_err(io_err)?;
        }

        let target = self.path_for(name);
        tmp.persist(&target).map_err(|e| io_err(e.error))?;

        tracing::debug!(output = name, path = %target.display(), bytes = payload.len(), "output written");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), SinkError> {
        validate_output_name(name)?;
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SinkError::Remove {
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// Keeps payloads in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    outputs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map is still a consistent map
        self.outputs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OutputSink for MemorySink {
    fn write(&self, name: &str, payload: &[u8]) -> Result<(), SinkError> {
        validate_output_name(name)?;
        self.lock().insert(name.to_string(), payload.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), SinkError> {
        validate_output_name(name)?;
        self.lock().remove(name);
        Ok(())
    }
}
