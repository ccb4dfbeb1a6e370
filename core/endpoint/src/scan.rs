//! Filesystem scanning into entry trees.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use duosync_common::{DigestWriter, Error, Result};
use duosync_sync::Entry;

/// Build an entry tree describing `root`.
///
/// Returns `Ok(None)` if nothing exists at `root`. File contents are hashed;
/// symbolic links are recorded without being followed. Entries other than
/// regular files, directories and symbolic links (sockets, devices, pipes)
/// are skipped.
///
/// This performs blocking I/O; async callers should run it on
/// `tokio::task::spawn_blocking`.
///
/// # Errors
/// - I/O errors while reading metadata or contents
/// - [`Error::InvalidInput`] for names or link targets that are not valid UTF-8
pub fn scan(root: &Path, probe_executable: bool) -> Result<Option<Entry>> {
    match fs::symlink_metadata(root) {
        Ok(metadata) => scan_entry(root, &metadata, probe_executable),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

fn scan_entry(path: &Path, metadata: &fs::Metadata, probe_executable: bool) -> Result<Option<Entry>> {
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        let target = target
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("Non UTF-8 link target at {}", path.display())))?;
        return Ok(Some(Entry::symlink(target)));
    }

    if file_type.is_dir() {
        let mut contents = BTreeMap::new();
        for dir_entry in fs::read_dir(path)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().into_string().map_err(|name| {
                Error::InvalidInput(format!("Non UTF-8 name {:?} in {}", name, path.display()))
            })?;
            let child_metadata = dir_entry.path().symlink_metadata()?;
            if let Some(child) = scan_entry(&dir_entry.path(), &child_metadata, probe_executable)? {
                contents.insert(name, child);
            }
        }
        return Ok(Some(Entry::Directory { contents }));
    }

    if file_type.is_file() {
        let mut file = fs::File::open(path)?;
        let mut writer = DigestWriter::new();
        io::copy(&mut file, &mut writer)?;
        let executable = probe_executable && is_executable(metadata);
        return Ok(Some(Entry::file(writer.finish(), executable)));
    }

    Ok(None)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
