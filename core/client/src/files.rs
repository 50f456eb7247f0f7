//! Writing keys and objects to disk.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use uuid::Uuid;

use deaddrop_common::{Error, Result};

fn io_error(action: &str, path: &Path, e: io::Error) -> Error {
    Error::Io(io::Error::new(
        e.kind(),
        format!("{} '{}': {}", action, path.display(), e),
    ))
}

fn create_new(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path)
}

/// Create `path` with permission bits `mode` and write `contents`.
///
/// Refuses to overwrite an existing file.
pub fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut file = create_new(path, mode).map_err(|e| io_error("Failed to create", path, e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| io_error("Failed to write", path, e))
}

/// Replace `dest` with `contents`.
///
/// The data goes to a hidden sibling first and is renamed into place once
/// fully written, so `dest` either keeps its previous state or holds the
/// complete contents. The sibling is removed on failure.
pub fn write_atomically(dest: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let file_name = dest.file_name().ok_or_else(|| {
        Error::InvalidInput(format!("'{}' is not a file path", dest.display()))
    })?;
    let temp = dest.with_file_name(format!(
        ".{}.{}.partial",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let result = create_new(&temp, mode).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp, dest)
    });

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp);
        return Err(io_error("Error writing object to", dest, e));
    }
    Ok(())
}
