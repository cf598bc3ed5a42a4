//! Durable file helpers shared by the archive and the publisher.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// fsync a directory so a rename or create inside it survives a crash
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

/// Hidden temp path next to `target` (same directory, so rename is atomic)
pub(crate) fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

/// Write `chunks` to a temp file, fsync it, then rename it onto `target`
///
/// Readers of `target` see either nothing or the complete file. A leftover
/// temp file from a failed attempt is removed best-effort.
pub(crate) fn write_atomic(target: &Path, chunks: &[&[u8]]) -> io::Result<()> {
    let temp = temp_path_for(target);
    let result = (|| {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;
        for chunk in chunks {
            file.write_all(chunk)?;
        }
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, target)?;
        if let Some(parent) = target.parent() {
            sync_dir(parent)?;
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// True for hidden temp files left behind by `write_atomic`
pub(crate) fn is_temp_name(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.contains(".tmp-")
}
