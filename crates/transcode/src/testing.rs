//! Fake external tools for tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

/// Serializes writing and spawning scripts, avoiding ETXTBSY when another
/// test forks while a script is still open for writing.
static TOOL_LOCK: Mutex<()> = Mutex::new(());

/// A shell script standing in for an external tool.
pub(crate) struct FakeTool {
    _dir: TempDir,
    pub(crate) path: PathBuf,
    record: PathBuf,
    _guard: MutexGuard<'static, ()>,
}

impl FakeTool {
    /// Write `body` as a `/bin/sh` script. `$last` holds the final argument
    /// and `$record` a file the script may write for [`FakeTool::recorded`].
    pub(crate) fn new(body: &str) -> Self {
        let guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::Builder::new()
            .prefix("pptslim-tool-")
            .tempdir()
            .unwrap();
        let path = dir.path().join("tool.sh");
        let record = dir.path().join("recorded");
        let script = format!(
            "#!/bin/sh\nrecord='{}'\nfor last; do :; done\n{}\n",
            record.display(),
            body
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            _dir: dir,
            path,
            record,
            _guard: guard,
        }
    }

    /// What the script wrote to `$record`.
    pub(crate) fn recorded(&self) -> PathBuf {
        let text = fs::read_to_string(&self.record).unwrap();
        Path::new(text.trim_end()).to_path_buf()
    }
}
